//! Upload and analysis pipelines.
//!
//! Each runs as its own task and reports back to the composer only through
//! a `ComposerEvent`. Within one file the order is fixed: presign, upload,
//! then (after the composer has committed the slot) analysis.

use composer_types::{AnalysisSuggestion, AnalyzeRequest, UploadTargetRequest};

use super::types::{FileUpload, StoredFile};
use crate::client::{SuggestionEngine, UploadService};
use crate::error::BackendError;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Presign, then upload. Nothing is retained on failure.
pub async fn run_upload(
    uploads: &dyn UploadService,
    folder: &str,
    file: &FileUpload,
) -> Result<StoredFile, BackendError> {
    let content_type = if file.content_type.trim().is_empty() {
        DEFAULT_CONTENT_TYPE.to_string()
    } else {
        file.content_type.clone()
    };
    let request = UploadTargetRequest {
        filename: file.filename.clone(),
        folder: folder.to_string(),
        content_type,
    };

    let target = uploads.request_upload_target(&request).await?;
    tracing::debug!(filename = %file.filename, key = %target.key, "upload target issued");

    uploads.upload(&target, file).await?;
    tracing::info!(
        filename = %file.filename,
        key = %target.key,
        bytes = file.bytes.len(),
        "file uploaded"
    );

    Ok(StoredFile {
        key: target.key,
        filename: file.filename.clone(),
    })
}

/// Ask the suggestion engine about one stored file.
pub async fn run_analysis(
    analyzer: &dyn SuggestionEngine,
    file_key: &str,
    intent: &str,
) -> Result<Vec<AnalysisSuggestion>, BackendError> {
    let request = AnalyzeRequest {
        file_keys: vec![file_key.to_string()],
        intent: intent.to_string(),
    };
    let response = analyzer.analyze_documents(&request).await?;
    tracing::debug!(
        file_key,
        count = response.suggestions.len(),
        "analysis returned suggestions"
    );
    Ok(response.suggestions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::StubBackend;

    #[tokio::test]
    async fn upload_presigns_before_uploading() {
        let stub = StubBackend::new();
        let file = FileUpload::new("recete.pdf", "", b"%PDF".to_vec());
        let stored = run_upload(&stub, "composer", &file).await.unwrap();

        assert_eq!(stored.key, "composer/recete.pdf");
        assert_eq!(stored.filename, "recete.pdf");
        let presigns = stub.upload_target_requests();
        assert_eq!(presigns.len(), 1);
        assert_eq!(presigns[0].content_type, DEFAULT_CONTENT_TYPE);
        assert_eq!(stub.uploaded_files(), vec!["recete.pdf"]);
    }

    #[tokio::test]
    async fn failed_upload_returns_error() {
        let stub = StubBackend::new().failing_upload();
        let file = FileUpload::new("recete.pdf", "application/pdf", vec![1, 2, 3]);
        assert!(run_upload(&stub, "composer", &file).await.is_err());
        assert!(stub.uploaded_files().is_empty());
    }

    #[tokio::test]
    async fn analysis_sends_key_and_intent() {
        let stub = StubBackend::new()
            .with_suggestion(AnalysisSuggestion::new("amount", serde_json::json!(500), 0.8));
        let suggestions = run_analysis(&stub, "composer/fatura.pdf", "Taksit Oluştur")
            .await
            .unwrap();
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].source_file.as_deref(), Some("composer/fatura.pdf"));
        let sent = stub.analyze_requests();
        assert_eq!(sent[0].intent, "Taksit Oluştur");
        assert_eq!(sent[0].file_keys, vec!["composer/fatura.pdf"]);
    }
}
