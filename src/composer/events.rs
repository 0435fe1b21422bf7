//! Messages posted back to the composer by background tasks.
//!
//! Every event carries the generation it was issued under; the composer
//! drops events from an earlier generation (a `reset()` happened since).

use composer_types::{AnalysisSuggestion, AutocompleteResponse, EntityItem, ExecutionResult};
use serde::Serialize;

use super::types::{ExecutionKind, StoredFile};

#[derive(Debug, Clone)]
pub enum ComposerEvent {
    AutocompleteLoaded {
        generation: u64,
        query: String,
        /// Context pinned when the request went out.
        context_id: Option<String>,
        outcome: Result<AutocompleteResponse, String>,
    },
    SlotSearchLoaded {
        generation: u64,
        slot: String,
        query: String,
        outcome: Result<Vec<EntityItem>, String>,
    },
    UploadFinished {
        generation: u64,
        slot: String,
        outcome: Result<StoredFile, String>,
    },
    AnalysisFinished {
        generation: u64,
        origin_slot: String,
        outcome: Result<Vec<AnalysisSuggestion>, String>,
    },
    ExecutionFinished {
        generation: u64,
        kind: ExecutionKind,
        capability_id: String,
        args: serde_json::Map<String, serde_json::Value>,
        result: ExecutionResult,
    },
}

impl ComposerEvent {
    pub fn generation(&self) -> u64 {
        match self {
            Self::AutocompleteLoaded { generation, .. }
            | Self::SlotSearchLoaded { generation, .. }
            | Self::UploadFinished { generation, .. }
            | Self::AnalysisFinished { generation, .. }
            | Self::ExecutionFinished { generation, .. } => *generation,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::AutocompleteLoaded { .. } => "autocomplete_loaded",
            Self::SlotSearchLoaded { .. } => "slot_search_loaded",
            Self::UploadFinished { .. } => "upload_finished",
            Self::AnalysisFinished { .. } => "analysis_finished",
            Self::ExecutionFinished { .. } => "execution_finished",
        }
    }
}

/// What the composer did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "disposition", content = "reason", rename_all = "snake_case")]
pub enum EventDisposition {
    Applied,
    Discarded(DiscardReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscardReason {
    /// Issued before the last reset.
    StaleGeneration,
    /// A newer query (or slot) superseded it.
    Superseded,
}
