//! Action composer
//!
//! - `state`: the explicit state machine (`ComposerState`)
//! - `orchestrator`: `Composer`, which spawns collaborator calls and
//!   applies their responses under generation guards
//! - `slot_resolution`: per-ui-type input parsing and coercion
//! - `suggestions`: slot-tagged suggestion merge
//! - `permissions`: advisory capability filter
//! - `execution`: dry-run / confirm request building and dispatch
//! - `pipelines`: upload and analysis tasks

pub mod events;
pub mod execution;
pub mod orchestrator;
pub mod permissions;
pub mod pipelines;
pub mod slot_resolution;
pub mod state;
pub mod suggestions;
pub mod types;

pub use events::{ComposerEvent, DiscardReason, EventDisposition};
pub use execution::strip_shadow_keys;
pub use orchestrator::{Composer, ExecutedCallback};
pub use permissions::{filter_capabilities, PermissionChecker, PermissionSet};
pub use slot_resolution::SlotWidget;
pub use state::ComposerState;
pub use suggestions::{PendingSuggestion, SuggestionList, GENERAL_TAG};
pub use types::{
    shadow_key, ComposerMode, ExecutionKind, ExecutionReceipt, FileUpload, Notice, NoticeKind,
    PinnedContext, SlotValue, SlotValues, StoredFile,
};
