//! Composer state machine
//!
//! `ComposerState` is the explicit state object owned by one composer
//! instance. Every mutation goes through a named transition below; the
//! async glue in `orchestrator` only decides *when* to call them.
//!
//! # Transitions
//!
//! | Current mode              | Transition            | Next mode                     |
//! |---------------------------|-----------------------|-------------------------------|
//! | Idle / ContextLocked      | set_query()           | unchanged                     |
//! | Idle / ContextLocked      | pin_context()         | ContextLocked                 |
//! | ContextLocked             | clear_context()       | Idle                          |
//! | Idle / ContextLocked      | select_capability()   | SlotFilling or Confirmation   |
//! | SlotFilling               | commit_current()      | SlotFilling or Confirmation   |
//! | SlotFilling               | next_slot()           | SlotFilling or Confirmation   |
//! | SlotFilling/Confirmation  | edit_slot()           | SlotFilling                   |
//! | Confirmation              | finish_execution(sim) | Confirmation                  |
//! | Confirmation              | finish_execution(ok)  | Result                        |
//! | Result (error)            | retry()               | Confirmation                  |
//! | any                       | reset()               | Idle                          |
//!
//! Invariant: `Confirmation` is only entered through `enter_confirmation`,
//! which refuses while any declared slot lacks a value.

use std::sync::Arc;

use composer_types::{
    AnalysisSuggestion, Capability, EntityItem, ExecuteRequest, ExecutionResult,
    ExecutionStatus, SlotSchema, SlotUiType,
};

use super::execution::build_request;
use super::permissions::{filter_capabilities, PermissionChecker};
use super::slot_resolution::{coerce_suggestion, stored_file};
use super::suggestions::{PendingSuggestion, SuggestionList};
use super::types::{
    ComposerMode, ExecutionKind, Notice, NoticeKind, PinnedContext, SlotValue, SlotValues,
    StoredFile,
};
use crate::error::ComposerError;

#[derive(Debug, Clone)]
pub struct ComposerState {
    mode: ComposerMode,
    /// Bumped by `reset()`; responses from older generations are dropped.
    generation: u64,

    // Directory search
    query: String,
    entities: Vec<EntityItem>,
    /// Already permission-filtered.
    actions: Vec<Capability>,

    context: Option<PinnedContext>,
    capability: Option<Arc<Capability>>,
    /// Index into `capability.slots`; `Some` only while slot filling.
    cursor: Option<usize>,
    slots: SlotValues,

    // Entity search for the displayed slot
    slot_query: String,
    slot_results: Vec<EntityItem>,

    suggestions: SuggestionList,
    result: Option<ExecutionResult>,
    notice: Option<Notice>,

    uploading: Option<String>,
    executing: Option<ExecutionKind>,
}

impl Default for ComposerState {
    fn default() -> Self {
        Self::new()
    }
}

impl ComposerState {
    pub fn new() -> Self {
        Self {
            mode: ComposerMode::Idle,
            generation: 0,
            query: String::new(),
            entities: Vec::new(),
            actions: Vec::new(),
            context: None,
            capability: None,
            cursor: None,
            slots: SlotValues::default(),
            slot_query: String::new(),
            slot_results: Vec::new(),
            suggestions: SuggestionList::default(),
            result: None,
            notice: None,
            uploading: None,
            executing: None,
        }
    }

    // ------------------------------------------------------------------
    // Read access
    // ------------------------------------------------------------------

    pub fn mode(&self) -> ComposerMode {
        self.mode
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn entities(&self) -> &[EntityItem] {
        &self.entities
    }

    pub fn actions(&self) -> &[Capability] {
        &self.actions
    }

    pub fn context(&self) -> Option<&EntityItem> {
        self.context.as_deref()
    }

    pub fn capability(&self) -> Option<&Capability> {
        self.capability.as_deref()
    }

    pub fn slots(&self) -> &SlotValues {
        &self.slots
    }

    pub fn slot_query(&self) -> &str {
        &self.slot_query
    }

    pub fn slot_results(&self) -> &[EntityItem] {
        &self.slot_results
    }

    pub fn suggestions(&self) -> &SuggestionList {
        &self.suggestions
    }

    pub fn result(&self) -> Option<&ExecutionResult> {
        self.result.as_ref()
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    pub fn uploading(&self) -> Option<&str> {
        self.uploading.as_deref()
    }

    pub fn executing(&self) -> Option<ExecutionKind> {
        self.executing
    }

    /// The slot being displayed, while slot filling.
    pub fn current_slot(&self) -> Option<&SlotSchema> {
        if self.mode != ComposerMode::SlotFilling {
            return None;
        }
        let cap = self.capability.as_ref()?;
        cap.slots.get(self.cursor?)
    }

    /// Declared slots with no value yet, in resolution order.
    pub fn missing_slots(&self) -> Vec<String> {
        self.capability
            .as_ref()
            .map(|cap| {
                cap.slots
                    .iter()
                    .filter(|s| !self.slots.contains(&s.name))
                    .map(|s| s.name.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Suggestions offered on the displayed slot.
    pub fn visible_suggestions(&self) -> Vec<&PendingSuggestion> {
        match self.current_slot() {
            Some(slot) => self.suggestions.visible_for(&slot.name),
            None => Vec::new(),
        }
    }

    /// True when nothing survives from a previous action sequence.
    pub fn is_pristine(&self) -> bool {
        self.mode == ComposerMode::Idle
            && self.context.is_none()
            && self.capability.is_none()
            && self.slots.is_empty()
            && self.suggestions.is_empty()
            && self.result.is_none()
    }

    // ------------------------------------------------------------------
    // Directory search & context
    // ------------------------------------------------------------------

    pub(crate) fn set_query(&mut self, query: &str) -> Result<(), ComposerError> {
        self.require_query_mode("search")?;
        self.query = query.to_string();
        Ok(())
    }

    pub(crate) fn clear_results(&mut self) {
        self.entities.clear();
        self.actions.clear();
    }

    pub(crate) fn clear_entities(&mut self) {
        self.entities.clear();
    }

    /// Apply an autocomplete response if it answers the latest query under
    /// the context that is pinned now.
    pub(crate) fn apply_autocomplete(
        &mut self,
        query: &str,
        context_id: Option<&str>,
        entities: Vec<EntityItem>,
        actions: Vec<Capability>,
        checker: &dyn PermissionChecker,
    ) -> bool {
        if !self.mode.accepts_query() || query != self.query {
            return false;
        }
        if context_id != self.context.as_ref().map(|c| c.id.as_str()) {
            return false;
        }
        self.entities = entities;
        self.actions = filter_capabilities(actions, checker);
        true
    }

    pub(crate) fn find_entity(&self, id: &str) -> Option<&EntityItem> {
        self.entities.iter().find(|e| e.id == id)
    }

    pub(crate) fn pin_context(&mut self, entity: PinnedContext) -> Result<(), ComposerError> {
        self.require_query_mode("pin a context")?;
        tracing::info!(id = %entity.id, entity_type = %entity.entity_type, "context pinned");
        self.context = Some(entity);
        self.mode = ComposerMode::ContextLocked;
        self.query.clear();
        self.clear_results();
        self.notice = None;
        Ok(())
    }

    pub(crate) fn clear_context(&mut self) -> Result<(), ComposerError> {
        if self.mode != ComposerMode::ContextLocked {
            return Err(self.invalid("clear the context"));
        }
        self.context = None;
        self.mode = ComposerMode::Idle;
        self.query.clear();
        self.clear_results();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Slot filling
    // ------------------------------------------------------------------

    pub(crate) fn select_capability(&mut self, name: &str) -> Result<ComposerMode, ComposerError> {
        self.require_query_mode("select a capability")?;
        let cap = self
            .actions
            .iter()
            .find(|c| c.name == name)
            .cloned()
            .ok_or_else(|| ComposerError::UnknownCapability(name.to_string()))?;

        tracing::info!(capability = %cap.name, slots = cap.slots.len(), "capability selected");
        self.capability = Some(Arc::new(cap));
        self.slots.clear();
        self.prefill_from_context();
        self.query.clear();
        self.clear_results();
        self.notice = None;

        match self.first_unresolved() {
            Some(idx) => {
                self.cursor = Some(idx);
                self.mode = ComposerMode::SlotFilling;
                Ok(self.mode)
            }
            None => self.enter_confirmation(),
        }
    }

    /// Entity slots scoped to the pinned context's type start resolved.
    fn prefill_from_context(&mut self) {
        let (Some(ctx), Some(cap)) = (self.context.clone(), self.capability.clone()) else {
            return;
        };
        for slot in &cap.slots {
            if slot.ui_type == SlotUiType::EntitySearch
                && slot.entity_type.as_deref() == Some(ctx.entity_type.as_str())
            {
                tracing::debug!(slot = %slot.name, "slot prefilled from context");
                self.slots.insert(&slot.name, SlotValue::entity(&ctx));
            }
        }
    }

    fn first_unresolved(&self) -> Option<usize> {
        let cap = self.capability.as_ref()?;
        cap.slots.iter().position(|s| !self.slots.contains(&s.name))
    }

    /// Commit a value for the displayed slot and advance.
    pub(crate) fn commit_current(
        &mut self,
        value: SlotValue,
    ) -> Result<ComposerMode, ComposerError> {
        let slot = self
            .current_slot()
            .map(|s| s.name.clone())
            .ok_or_else(|| self.invalid("commit a slot value"))?;
        self.write_slot(&slot, value)?;
        self.notice = None;
        self.next_slot()
    }

    /// Write a value under a declared slot of matching ui type.
    fn write_slot(&mut self, name: &str, value: SlotValue) -> Result<(), ComposerError> {
        let cap = self
            .capability
            .as_ref()
            .ok_or_else(|| self.invalid("write a slot"))?;
        let slot = cap
            .slot(name)
            .ok_or_else(|| ComposerError::validation(name, "not a declared slot"))?;
        if slot.ui_type != value.ui_type() {
            return Err(ComposerError::WrongSlotKind {
                slot: name.to_string(),
                expected: slot.ui_type.to_string(),
            });
        }
        if self.slots.insert(name, value).is_some() {
            tracing::debug!(slot = name, "slot value replaced");
        }
        self.slot_query.clear();
        self.slot_results.clear();
        Ok(())
    }

    /// Move to the next unresolved slot, or to confirmation when none remain.
    pub(crate) fn next_slot(&mut self) -> Result<ComposerMode, ComposerError> {
        if self.mode != ComposerMode::SlotFilling {
            return Err(self.invalid("advance to the next slot"));
        }
        let cap = self
            .capability
            .clone()
            .ok_or_else(|| self.invalid("advance to the next slot"))?;
        let len = cap.slots.len();
        let start = self.cursor.map_or(0, |c| c + 1);

        let next = (0..len)
            .map(|offset| (start + offset) % len)
            .find(|&idx| !self.slots.contains(&cap.slots[idx].name));

        match next {
            Some(idx) => {
                self.cursor = Some(idx);
                self.slot_query.clear();
                self.slot_results.clear();
                Ok(self.mode)
            }
            None => self.enter_confirmation(),
        }
    }

    fn enter_confirmation(&mut self) -> Result<ComposerMode, ComposerError> {
        let missing = self.missing_slots();
        if !missing.is_empty() {
            let capability = self
                .capability
                .as_ref()
                .map(|c| c.name.clone())
                .unwrap_or_default();
            return Err(ComposerError::Incomplete {
                capability,
                missing,
            });
        }
        self.mode = ComposerMode::Confirmation;
        self.cursor = None;
        tracing::info!(
            capability = ?self.capability.as_ref().map(|c| c.name.as_str()),
            "ready for confirmation"
        );
        Ok(self.mode)
    }

    /// Re-open a slot (back-navigation). Clears any stale result.
    pub(crate) fn edit_slot(&mut self, name: &str) -> Result<(), ComposerError> {
        if !matches!(self.mode, ComposerMode::SlotFilling | ComposerMode::Confirmation) {
            return Err(self.invalid("edit a slot"));
        }
        if self.executing.is_some() {
            return Err(ComposerError::ExecutionInFlight);
        }
        let idx = self
            .capability
            .as_ref()
            .and_then(|c| c.slots.iter().position(|s| s.name == name))
            .ok_or_else(|| ComposerError::validation(name, "not a declared slot"))?;
        self.cursor = Some(idx);
        self.mode = ComposerMode::SlotFilling;
        self.result = None;
        self.notice = None;
        self.slot_query.clear();
        self.slot_results.clear();
        Ok(())
    }

    pub(crate) fn previous_slot(&mut self) -> Result<(), ComposerError> {
        let target = match (self.mode, self.cursor) {
            (ComposerMode::SlotFilling, Some(c)) => c.saturating_sub(1),
            (ComposerMode::Confirmation, _) => self
                .capability
                .as_ref()
                .map(|c| c.slots.len().saturating_sub(1))
                .unwrap_or(0),
            _ => return Err(self.invalid("go back a slot")),
        };
        let name = self
            .capability
            .as_ref()
            .and_then(|c| c.slots.get(target))
            .map(|s| s.name.clone())
            .ok_or_else(|| self.invalid("go back a slot"))?;
        self.edit_slot(&name)
    }

    // ------------------------------------------------------------------
    // Entity search for the displayed slot
    // ------------------------------------------------------------------

    /// Record the partial input; returns the slot being searched.
    pub(crate) fn set_slot_query(&mut self, query: &str) -> Result<SlotSchema, ComposerError> {
        let slot = self
            .current_slot()
            .cloned()
            .ok_or_else(|| self.invalid("search entities"))?;
        if slot.ui_type != SlotUiType::EntitySearch {
            return Err(ComposerError::WrongSlotKind {
                slot: slot.name,
                expected: SlotUiType::EntitySearch.to_string(),
            });
        }
        self.slot_query = query.to_string();
        self.slot_results.clear();
        Ok(slot)
    }

    pub(crate) fn apply_slot_search(
        &mut self,
        slot: &str,
        query: &str,
        results: Vec<EntityItem>,
    ) -> bool {
        let on_slot = self.current_slot().is_some_and(|s| s.name == slot);
        if !on_slot || query != self.slot_query {
            return false;
        }
        self.slot_results = results;
        true
    }

    pub(crate) fn find_slot_result(&self, id: &str) -> Option<&EntityItem> {
        self.slot_results.iter().find(|e| e.id == id)
    }

    // ------------------------------------------------------------------
    // File slots
    // ------------------------------------------------------------------

    pub(crate) fn begin_upload(&mut self) -> Result<String, ComposerError> {
        let slot = self
            .current_slot()
            .cloned()
            .ok_or_else(|| self.invalid("attach a file"))?;
        if slot.ui_type != SlotUiType::File {
            return Err(ComposerError::WrongSlotKind {
                slot: slot.name,
                expected: SlotUiType::File.to_string(),
            });
        }
        if let Some(active) = &self.uploading {
            return Err(ComposerError::UploadInFlight(active.clone()));
        }
        self.uploading = Some(slot.name.clone());
        self.notice = None;
        Ok(slot.name)
    }

    /// Record an upload outcome. Returns true when the file was stored and
    /// should be analysed.
    pub(crate) fn finish_upload(
        &mut self,
        slot: &str,
        outcome: Result<StoredFile, String>,
    ) -> bool {
        if self.uploading.as_deref() == Some(slot) {
            self.uploading = None;
        }
        let stored = match outcome {
            Ok(stored) => stored,
            Err(message) => {
                tracing::warn!(slot, error = %message, "upload failed");
                self.notice = Some(Notice::new(
                    NoticeKind::UploadFailed,
                    format!("Upload failed: {message}"),
                ));
                return false;
            }
        };

        // Values are frozen once execution starts.
        if !matches!(self.mode, ComposerMode::SlotFilling | ComposerMode::Confirmation)
            || self.executing.is_some()
        {
            tracing::debug!(slot, mode = %self.mode, "upload finished after values were frozen");
            return false;
        }

        let value = match self
            .capability
            .as_ref()
            .and_then(|c| c.slot(slot))
            .map(|schema| stored_file(schema, &stored))
        {
            Some(Ok(value)) => value,
            _ => {
                tracing::debug!(slot, "upload finished for a slot no longer present");
                return false;
            }
        };
        if let Err(e) = self.write_slot(slot, value) {
            tracing::warn!(slot, error = %e, "could not store uploaded file");
            return false;
        }

        let still_displayed = self.current_slot().is_some_and(|s| s.name == slot);
        if still_displayed {
            if let Err(e) = self.next_slot() {
                tracing::debug!(slot, error = %e, "cursor not advanced after upload");
            }
        }
        true
    }

    // ------------------------------------------------------------------
    // Suggestions
    // ------------------------------------------------------------------

    pub(crate) fn merge_suggestions(
        &mut self,
        origin_slot: &str,
        batch: Vec<AnalysisSuggestion>,
        min_confidence: f64,
    ) -> usize {
        match self.capability.clone() {
            Some(cap) => self
                .suggestions
                .merge(&cap, origin_slot, batch, min_confidence),
            None => 0,
        }
    }

    /// Write a suggestion into its slot and drop it from the list. The
    /// cursor does not move.
    pub(crate) fn apply_suggestion(&mut self, id: u64) -> Result<String, ComposerError> {
        let slot = self
            .current_slot()
            .cloned()
            .ok_or_else(|| self.invalid("apply a suggestion"))?;
        let entry = self
            .suggestions
            .get(id)
            .ok_or(ComposerError::UnknownSuggestion(id))?;
        if !entry.offered_on(&slot.name) {
            return Err(ComposerError::validation(
                &slot.name,
                format!("suggestion {id} belongs to slot '{}'", entry.tag),
            ));
        }
        let value = coerce_suggestion(&slot, &entry.suggestion.value)?;
        self.write_slot(&slot.name, value)?;
        self.suggestions.take(id);
        tracing::info!(slot = %slot.name, suggestion = id, "suggestion applied");
        Ok(slot.name)
    }

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------

    pub(crate) fn begin_execution(
        &mut self,
        kind: ExecutionKind,
    ) -> Result<ExecuteRequest, ComposerError> {
        let action = match kind {
            ExecutionKind::Simulate => "simulate",
            ExecutionKind::Confirm => "confirm",
        };
        if self.mode != ComposerMode::Confirmation {
            return Err(self.invalid(action));
        }
        if self.executing.is_some() {
            return Err(ComposerError::ExecutionInFlight);
        }
        if let Some(slot) = &self.uploading {
            return Err(ComposerError::UploadInFlight(slot.clone()));
        }
        let cap = self.capability.as_ref().ok_or_else(|| self.invalid(action))?;
        let request = build_request(cap, &self.slots, kind);
        self.executing = Some(kind);
        Ok(request)
    }

    /// Store the result. Returns true for a committed success.
    pub(crate) fn finish_execution(
        &mut self,
        kind: ExecutionKind,
        result: ExecutionResult,
    ) -> bool {
        self.executing = None;
        let committed = kind == ExecutionKind::Confirm && result.status == ExecutionStatus::Success;
        self.result = Some(result);
        if kind == ExecutionKind::Confirm {
            self.mode = ComposerMode::Result;
        }
        committed
    }

    pub(crate) fn retry(&mut self) -> Result<(), ComposerError> {
        let failed = self.result.as_ref().is_some_and(ExecutionResult::is_error);
        if self.mode != ComposerMode::Result || !failed {
            return Err(self.invalid("retry"));
        }
        self.mode = ComposerMode::Confirmation;
        self.result = None;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Notices & reset
    // ------------------------------------------------------------------

    pub(crate) fn set_notice(&mut self, kind: NoticeKind, message: impl Into<String>) {
        self.notice = Some(Notice::new(kind, message));
    }

    pub(crate) fn clear_notice(&mut self) {
        self.notice = None;
    }

    /// Back to idle with nothing pinned, selected, resolved or pending.
    pub(crate) fn reset(&mut self) {
        let generation = self.generation.wrapping_add(1);
        *self = Self {
            generation,
            ..Self::new()
        };
        tracing::debug!(generation, "composer reset");
    }

    fn require_query_mode(&self, action: &'static str) -> Result<(), ComposerError> {
        if self.mode.accepts_query() {
            Ok(())
        } else {
            Err(self.invalid(action))
        }
    }

    fn invalid(&self, action: &'static str) -> ComposerError {
        ComposerError::InvalidTransition {
            action,
            mode: self.mode,
        }
    }
}
