//! HTTP backend
//!
//! JSON over HTTP against the admin API. All endpoints are relative to
//! `api_base_url`; uploads go straight to the presigned URL as multipart.

use std::time::Duration;

use async_trait::async_trait;
use composer_types::{
    AnalyzeRequest, AnalyzeResponse, AutocompleteRequest, AutocompleteResponse, EntityItem,
    EntitySearchRequest, EntitySearchResponse, ExecuteRequest, ExecutionResult, UploadTarget,
    UploadTargetRequest,
};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

use super::{CapabilityDirectory, ExecutionGateway, Result, SuggestionEngine, UploadService};
use crate::composer::FileUpload;
use crate::config::ComposerConfig;
use crate::error::BackendError;

const AUTOCOMPLETE_PATH: &str = "composer/autocomplete";
const ENTITY_SEARCH_PATH: &str = "composer/entities/search";
const EXECUTE_PATH: &str = "composer/execute";
const PRESIGN_PATH: &str = "uploads/presign";
const ANALYZE_PATH: &str = "documents/analyze";

/// Error bodies are truncated to this many characters.
const MAX_ERROR_BODY: usize = 200;

pub struct HttpBackend {
    http: Client,
    base: Url,
}

impl HttpBackend {
    pub fn new(config: &ComposerConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base: base_url(&config.api_base_url)?,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    async fn post_json<Req, Resp>(
        &self,
        service: &'static str,
        path: &str,
        body: &Req,
    ) -> Result<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = self.base.join(path)?;
        tracing::debug!(%url, service, "POST");
        let response = self.http.post(url).json(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                service,
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY).collect(),
            });
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// `Url::join` drops the last path segment unless the base ends in `/`.
fn base_url(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

#[async_trait]
impl CapabilityDirectory for HttpBackend {
    async fn autocomplete(&self, request: &AutocompleteRequest) -> Result<AutocompleteResponse> {
        self.post_json("directory", AUTOCOMPLETE_PATH, request).await
    }

    async fn search_entities(&self, request: &EntitySearchRequest) -> Result<Vec<EntityItem>> {
        let response: EntitySearchResponse = self
            .post_json("directory", ENTITY_SEARCH_PATH, request)
            .await?;
        Ok(response.entities)
    }
}

#[async_trait]
impl ExecutionGateway for HttpBackend {
    async fn execute_action(&self, request: &ExecuteRequest) -> Result<ExecutionResult> {
        self.post_json("gateway", EXECUTE_PATH, request).await
    }
}

#[async_trait]
impl UploadService for HttpBackend {
    async fn request_upload_target(&self, request: &UploadTargetRequest) -> Result<UploadTarget> {
        self.post_json("uploads", PRESIGN_PATH, request).await
    }

    async fn upload(&self, target: &UploadTarget, file: &FileUpload) -> Result<()> {
        let mut form = Form::new();
        for (name, value) in &target.fields {
            form = form.text(name.clone(), value.clone());
        }
        let mut part = Part::bytes(file.bytes.clone()).file_name(file.filename.clone());
        if !file.content_type.trim().is_empty() {
            part = part.mime_str(&file.content_type)?;
        }
        form = form.part("file", part);

        let response = self.http.post(&target.url).multipart(form).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                service: "storage",
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY).collect(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SuggestionEngine for HttpBackend {
    async fn analyze_documents(&self, request: &AnalyzeRequest) -> Result<AnalyzeResponse> {
        self.post_json("analysis", ANALYZE_PATH, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_gets_trailing_slash() {
        let url = base_url("https://clinic.example/api").unwrap();
        assert_eq!(
            url.join(EXECUTE_PATH).unwrap().as_str(),
            "https://clinic.example/api/composer/execute"
        );
    }

    #[test]
    fn invalid_base_url_is_an_error() {
        let config = ComposerConfig {
            api_base_url: "not a url".into(),
            ..ComposerConfig::default()
        };
        assert!(matches!(HttpBackend::new(&config), Err(BackendError::Url(_))));
    }
}
