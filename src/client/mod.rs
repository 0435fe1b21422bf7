//! Collaborator contracts
//!
//! The composer never talks to a service directly; it holds one
//! [`ComposerBackend`] bundling the four contracts below. `http` implements
//! them against the admin API, `stub` in memory for tests and demos.

pub mod http;
pub mod stub;

use std::sync::Arc;

use async_trait::async_trait;
use composer_types::{
    AnalyzeRequest, AnalyzeResponse, AutocompleteRequest, AutocompleteResponse, EntityItem,
    EntitySearchRequest, ExecuteRequest, ExecutionResult, UploadTarget, UploadTargetRequest,
};

use crate::composer::FileUpload;
use crate::error::BackendError;

pub use http::HttpBackend;
pub use stub::StubBackend;

pub type Result<T> = std::result::Result<T, BackendError>;

/// Entities and permitted actions for a query; read-only.
#[async_trait]
pub trait CapabilityDirectory: Send + Sync {
    async fn autocomplete(&self, request: &AutocompleteRequest) -> Result<AutocompleteResponse>;

    /// Entity-search mode, scoped to one entity type.
    async fn search_entities(&self, request: &EntitySearchRequest) -> Result<Vec<EntityItem>>;
}

/// Sole authority on whether an action runs.
#[async_trait]
pub trait ExecutionGateway: Send + Sync {
    async fn execute_action(&self, request: &ExecuteRequest) -> Result<ExecutionResult>;
}

/// Presigned uploads: ask for a target, then post the bytes to it.
#[async_trait]
pub trait UploadService: Send + Sync {
    async fn request_upload_target(&self, request: &UploadTargetRequest) -> Result<UploadTarget>;

    async fn upload(&self, target: &UploadTarget, file: &FileUpload) -> Result<()>;
}

/// Document analysis producing candidate slot values.
#[async_trait]
pub trait SuggestionEngine: Send + Sync {
    async fn analyze_documents(&self, request: &AnalyzeRequest) -> Result<AnalyzeResponse>;
}

/// The collaborators one composer instance talks to.
#[derive(Clone)]
pub struct ComposerBackend {
    pub directory: Arc<dyn CapabilityDirectory>,
    pub gateway: Arc<dyn ExecutionGateway>,
    pub uploads: Arc<dyn UploadService>,
    pub analyzer: Arc<dyn SuggestionEngine>,
}

impl ComposerBackend {
    /// Use one service object for all four contracts.
    pub fn uniform<B>(backend: Arc<B>) -> Self
    where
        B: CapabilityDirectory + ExecutionGateway + UploadService + SuggestionEngine + 'static,
    {
        Self {
            directory: backend.clone(),
            gateway: backend.clone(),
            uploads: backend.clone(),
            analyzer: backend,
        }
    }

    pub fn with_gateway(mut self, gateway: Arc<dyn ExecutionGateway>) -> Self {
        self.gateway = gateway;
        self
    }
}

impl std::fmt::Debug for ComposerBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComposerBackend").finish_non_exhaustive()
    }
}
