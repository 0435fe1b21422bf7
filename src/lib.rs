//! Clinic Action Composer
//!
//! Client-side orchestration for the command-palette action composer:
//! a free-text query becomes a validated, permission-checked, confirmed
//! (or simulated) invocation of a backend capability.
//!
//! - [`composer`]: the state machine, slot resolution, suggestion merge,
//!   permission filter and execution protocol
//! - [`client`]: collaborator contracts plus HTTP and stub backends
//! - [`config`]: YAML + environment configuration
//! - [`error`]: error taxonomy

pub mod client;
pub mod composer;
pub mod config;
pub mod error;

pub use client::{
    CapabilityDirectory, ComposerBackend, ExecutionGateway, SuggestionEngine, UploadService,
};
pub use composer::{Composer, ComposerMode, ComposerState, PermissionChecker};
pub use config::ComposerConfig;
pub use error::{BackendError, ComposerError, ConfigError};

pub use composer_types as types;
