//! In-memory backend for tests and offline demos.
//!
//! Behaves like a small directory over a fixed catalogue and records every
//! request it receives so tests can assert on what the composer sent.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use composer_types::{
    AnalysisSuggestion, AnalyzeRequest, AnalyzeResponse, AutocompleteRequest,
    AutocompleteResponse, Capability, EntityItem, EntitySearchRequest, ExecuteRequest,
    ExecutionResult, UploadTarget, UploadTargetRequest,
};

use super::{CapabilityDirectory, ExecutionGateway, Result, SuggestionEngine, UploadService};
use crate::composer::FileUpload;
use crate::error::BackendError;

#[derive(Default)]
struct StubLog {
    autocomplete: Vec<AutocompleteRequest>,
    entity_searches: Vec<EntitySearchRequest>,
    executions: Vec<ExecuteRequest>,
    upload_targets: Vec<UploadTargetRequest>,
    uploads: Vec<String>,
    analyses: Vec<AnalyzeRequest>,
}

#[derive(Default)]
pub struct StubBackend {
    entities: Vec<EntityItem>,
    actions: Vec<Capability>,
    /// Actions offered only when the context has this entity type.
    context_actions: HashMap<String, Vec<Capability>>,
    execution_result: Option<ExecutionResult>,
    suggestions: Vec<AnalysisSuggestion>,
    fail_directory: bool,
    fail_upload: bool,
    fail_analysis: bool,
    log: Mutex<StubLog>,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity(mut self, entity: EntityItem) -> Self {
        self.entities.push(entity);
        self
    }

    pub fn with_action(mut self, action: Capability) -> Self {
        self.actions.push(action);
        self
    }

    pub fn with_context_action(mut self, entity_type: &str, action: Capability) -> Self {
        self.context_actions
            .entry(entity_type.to_string())
            .or_default()
            .push(action);
        self
    }

    /// Fixed gateway reply. Without one, confirms succeed and dry runs
    /// report `dry_run`.
    pub fn with_execution_result(mut self, result: ExecutionResult) -> Self {
        self.execution_result = Some(result);
        self
    }

    pub fn with_suggestion(mut self, suggestion: AnalysisSuggestion) -> Self {
        self.suggestions.push(suggestion);
        self
    }

    pub fn failing_directory(mut self) -> Self {
        self.fail_directory = true;
        self
    }

    pub fn failing_upload(mut self) -> Self {
        self.fail_upload = true;
        self
    }

    pub fn failing_analysis(mut self) -> Self {
        self.fail_analysis = true;
        self
    }

    fn log(&self) -> MutexGuard<'_, StubLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn autocomplete_requests(&self) -> Vec<AutocompleteRequest> {
        self.log().autocomplete.clone()
    }

    pub fn entity_search_requests(&self) -> Vec<EntitySearchRequest> {
        self.log().entity_searches.clone()
    }

    pub fn execute_requests(&self) -> Vec<ExecuteRequest> {
        self.log().executions.clone()
    }

    pub fn upload_target_requests(&self) -> Vec<UploadTargetRequest> {
        self.log().upload_targets.clone()
    }

    /// Filenames whose bytes reached storage.
    pub fn uploaded_files(&self) -> Vec<String> {
        self.log().uploads.clone()
    }

    pub fn analyze_requests(&self) -> Vec<AnalyzeRequest> {
        self.log().analyses.clone()
    }

    fn matching_entities(&self, query: &str, entity_type: Option<&str>) -> Vec<EntityItem> {
        let needle = query.to_lowercase();
        self.entities
            .iter()
            .filter(|e| entity_type.map_or(true, |t| e.entity_type == t))
            .filter(|e| needle.is_empty() || e.label.to_lowercase().contains(&needle))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl CapabilityDirectory for StubBackend {
    async fn autocomplete(&self, request: &AutocompleteRequest) -> Result<AutocompleteResponse> {
        self.log().autocomplete.push(request.clone());
        if self.fail_directory {
            return Err(BackendError::Rejected("directory unavailable".into()));
        }
        let mut actions = self.actions.clone();
        if let Some(ctx) = &request.context_type {
            if let Some(extra) = self.context_actions.get(ctx) {
                actions.extend(extra.iter().cloned());
            }
        }
        let entities = if request.query.is_empty() {
            Vec::new()
        } else {
            self.matching_entities(&request.query, request.context_type.as_deref())
        };
        Ok(AutocompleteResponse { entities, actions })
    }

    async fn search_entities(&self, request: &EntitySearchRequest) -> Result<Vec<EntityItem>> {
        self.log().entity_searches.push(request.clone());
        if self.fail_directory {
            return Err(BackendError::Rejected("directory unavailable".into()));
        }
        Ok(self.matching_entities(&request.query, request.entity_type.as_deref()))
    }
}

#[async_trait]
impl ExecutionGateway for StubBackend {
    async fn execute_action(&self, request: &ExecuteRequest) -> Result<ExecutionResult> {
        self.log().executions.push(request.clone());
        if let Some(result) = &self.execution_result {
            return Ok(result.clone());
        }
        Ok(if request.dry_run {
            ExecutionResult::dry_run()
        } else {
            ExecutionResult::success(format!("audit-{}", request.capability_id))
        })
    }
}

#[async_trait]
impl UploadService for StubBackend {
    async fn request_upload_target(&self, request: &UploadTargetRequest) -> Result<UploadTarget> {
        self.log().upload_targets.push(request.clone());
        Ok(UploadTarget {
            url: "memory://uploads".into(),
            fields: HashMap::from([("acl".to_string(), "private".to_string())]),
            key: format!("{}/{}", request.folder, request.filename),
        })
    }

    async fn upload(&self, _target: &UploadTarget, file: &FileUpload) -> Result<()> {
        if self.fail_upload {
            return Err(BackendError::Status {
                service: "storage",
                status: 500,
                body: "upload interrupted".into(),
            });
        }
        self.log().uploads.push(file.filename.clone());
        Ok(())
    }
}

#[async_trait]
impl SuggestionEngine for StubBackend {
    async fn analyze_documents(&self, request: &AnalyzeRequest) -> Result<AnalyzeResponse> {
        self.log().analyses.push(request.clone());
        if self.fail_analysis {
            return Err(BackendError::Rejected("analysis unavailable".into()));
        }
        let source = request.file_keys.first().cloned();
        let suggestions = self
            .suggestions
            .iter()
            .cloned()
            .map(|mut s| {
                if s.source_file.is_none() {
                    s.source_file = source.clone();
                }
                s
            })
            .collect();
        Ok(AnalyzeResponse { suggestions })
    }
}
