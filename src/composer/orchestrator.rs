//! The async shell around `ComposerState`.
//!
//! Owns the state object, the collaborator backend and an event channel.
//! Operations that need a collaborator spawn a task and return at once;
//! the task posts a `ComposerEvent` back, and the host applies it with
//! `next_event()`, `drain_ready()` or `settle()`. The composer is never
//! blocked on a request, so new input can arrive while one is outstanding.
//!
//! # Dispatch
//!
//! | Operation              | Collaborator call              | Event applied             |
//! |------------------------|--------------------------------|---------------------------|
//! | query()                | directory.autocomplete         | AutocompleteLoaded        |
//! | select_entity()        | directory.autocomplete (ctx)   | AutocompleteLoaded        |
//! | search_slot_entities() | directory.search_entities      | SlotSearchLoaded          |
//! | attach_file()          | presign → upload               | UploadFinished            |
//! | (upload applied)       | analyzer.analyze_documents     | AnalysisFinished          |
//! | simulate() / confirm() | gateway.execute_action         | ExecutionFinished         |
//!
//! Spawning requires a running tokio runtime.

use std::future::Future;
use std::sync::Arc;

use composer_types::{AutocompleteRequest, EntityItem, EntitySearchRequest, SlotSchema};
use tokio::sync::mpsc;

use super::events::{ComposerEvent, DiscardReason, EventDisposition};
use super::execution::execute;
use super::permissions::PermissionChecker;
use super::pipelines::{run_analysis, run_upload};
use super::slot_resolution::{self, SlotWidget};
use super::state::ComposerState;
use super::suggestions::PendingSuggestion;
use super::types::{ComposerMode, ExecutionKind, ExecutionReceipt, FileUpload, NoticeKind};
use crate::client::ComposerBackend;
use crate::config::ComposerConfig;
use crate::error::ComposerError;

/// Fired after a confirmed execution succeeds (cache invalidation hooks).
pub type ExecutedCallback = Box<dyn Fn(&ExecutionReceipt) + Send + Sync>;

pub struct Composer {
    state: ComposerState,
    backend: ComposerBackend,
    permissions: Arc<dyn PermissionChecker>,
    config: ComposerConfig,
    open: bool,
    events_tx: mpsc::UnboundedSender<ComposerEvent>,
    events_rx: mpsc::UnboundedReceiver<ComposerEvent>,
    /// Spawned tasks whose event has not been received yet.
    in_flight: usize,
    on_executed: Vec<ExecutedCallback>,
}

impl Composer {
    pub fn new(
        backend: ComposerBackend,
        permissions: Arc<dyn PermissionChecker>,
        config: ComposerConfig,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            state: ComposerState::new(),
            backend,
            permissions,
            config,
            open: false,
            events_tx,
            events_rx,
            in_flight: 0,
            on_executed: Vec::new(),
        }
    }

    pub fn state(&self) -> &ComposerState {
        &self.state
    }

    pub fn mode(&self) -> ComposerMode {
        self.state.mode()
    }

    pub fn config(&self) -> &ComposerConfig {
        &self.config
    }

    /// Requests spawned but not yet applied.
    pub fn pending_requests(&self) -> usize {
        self.in_flight
    }

    // ------------------------------------------------------------------
    // Host surface
    // ------------------------------------------------------------------

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn open(&mut self) {
        self.open = true;
    }

    /// Closing is how the user leaves a result: it resets the composer.
    pub fn close(&mut self) {
        self.open = false;
        self.reset();
    }

    /// Keyboard-shortcut toggle.
    pub fn toggle(&mut self) {
        if self.open {
            self.close();
        } else {
            self.open();
        }
    }

    pub fn on_executed(&mut self, callback: ExecutedCallback) {
        self.on_executed.push(callback);
    }

    pub fn dismiss_notice(&mut self) {
        self.state.clear_notice();
    }

    pub fn reset(&mut self) {
        self.state.reset();
    }

    // ------------------------------------------------------------------
    // Directory search & context
    // ------------------------------------------------------------------

    /// New query text. Only searches once the input is long enough. A
    /// shorter query clears the results, except that a pinned context
    /// falls back to its own actions.
    pub fn query(&mut self, text: &str) -> Result<(), ComposerError> {
        self.state.set_query(text)?;
        if text.trim().chars().count() >= self.config.min_query_len {
            self.request_autocomplete(text.to_string(), text.trim());
        } else if self.state.context().is_some() {
            self.state.clear_entities();
            self.request_autocomplete(text.to_string(), "");
        } else {
            self.state.clear_results();
        }
        Ok(())
    }

    /// Pin an entity from the current search results.
    pub fn select_entity(&mut self, id: &str) -> Result<(), ComposerError> {
        let entity = self
            .state
            .find_entity(id)
            .cloned()
            .ok_or_else(|| ComposerError::UnknownEntity(id.to_string()))?;
        self.pin_context(Arc::new(entity))
    }

    /// Pin a context and load the actions valid for it.
    pub fn pin_context(&mut self, entity: Arc<EntityItem>) -> Result<(), ComposerError> {
        self.state.pin_context(entity)?;
        self.request_autocomplete(String::new(), "");
        Ok(())
    }

    pub fn clear_context(&mut self) -> Result<(), ComposerError> {
        self.state.clear_context()
    }

    /// `query` keys the response against the latest input; `sent` is what
    /// the directory is asked for.
    fn request_autocomplete(&mut self, query: String, sent: &str) {
        let context = self.state.context();
        let context_id = context.map(|c| c.id.clone());
        let request = AutocompleteRequest {
            query: sent.to_string(),
            context_type: context.map(|c| c.entity_type.clone()),
            context_id: context_id.clone(),
        };
        let directory = self.backend.directory.clone();
        let generation = self.state.generation();
        tracing::debug!(query = %request.query, context = ?request.context_type, "autocomplete");
        self.spawn(async move {
            let outcome = directory
                .autocomplete(&request)
                .await
                .map_err(|e| e.to_string());
            ComposerEvent::AutocompleteLoaded {
                generation,
                query,
                context_id,
                outcome,
            }
        });
    }

    // ------------------------------------------------------------------
    // Slot filling
    // ------------------------------------------------------------------

    pub fn select_capability(&mut self, name: &str) -> Result<ComposerMode, ComposerError> {
        self.state.select_capability(name)
    }

    pub fn current_slot(&self) -> Option<&SlotSchema> {
        self.state.current_slot()
    }

    pub fn slot_widget(&self) -> Option<SlotWidget<'_>> {
        self.state.current_slot().map(SlotWidget::for_slot)
    }

    /// Typed input for a `text`, `number` or `date` slot.
    pub fn submit_input(&mut self, raw: &str) -> Result<ComposerMode, ComposerError> {
        let slot = self.displayed_slot("submit input")?;
        let value = slot_resolution::parse_input(&slot, raw);
        let value = self.inline(value)?;
        self.state.commit_current(value)
    }

    /// Pick an option of an `enum` slot.
    pub fn choose_option(&mut self, option: &str) -> Result<ComposerMode, ComposerError> {
        let slot = self.displayed_slot("choose an option")?;
        let value = slot_resolution::choose_option(&slot, option);
        let value = self.inline(value)?;
        self.state.commit_current(value)
    }

    /// Partial input for an `entity_search` slot.
    pub fn search_slot_entities(&mut self, partial: &str) -> Result<(), ComposerError> {
        let slot = self.state.set_slot_query(partial)?;
        if partial.trim().chars().count() < self.config.min_query_len {
            return Ok(());
        }
        let request = EntitySearchRequest {
            query: partial.trim().to_string(),
            entity_type: slot.entity_type.clone(),
        };
        let directory = self.backend.directory.clone();
        let generation = self.state.generation();
        let query = partial.to_string();
        self.spawn(async move {
            let outcome = directory
                .search_entities(&request)
                .await
                .map_err(|e| e.to_string());
            ComposerEvent::SlotSearchLoaded {
                generation,
                slot: slot.name,
                query,
                outcome,
            }
        });
        Ok(())
    }

    /// Resolve the displayed `entity_search` slot with one of its results.
    pub fn select_slot_entity(&mut self, id: &str) -> Result<ComposerMode, ComposerError> {
        let slot = self.displayed_slot("select an entity")?;
        let entity = self
            .state
            .find_slot_result(id)
            .cloned()
            .ok_or_else(|| ComposerError::UnknownEntity(id.to_string()))?;
        let value = slot_resolution::select_entity(&slot, &entity);
        let value = self.inline(value)?;
        self.state.commit_current(value)
    }

    /// Start the upload pipeline for the displayed `file` slot.
    pub fn attach_file(&mut self, file: FileUpload) -> Result<(), ComposerError> {
        let slot = self.state.begin_upload()?;
        let uploads = self.backend.uploads.clone();
        let folder = self.config.upload_folder.clone();
        let generation = self.state.generation();
        tracing::info!(slot = %slot, filename = %file.filename, "upload started");
        self.spawn(async move {
            let outcome = run_upload(uploads.as_ref(), &folder, &file)
                .await
                .map_err(|e| e.to_string());
            ComposerEvent::UploadFinished {
                generation,
                slot,
                outcome,
            }
        });
        Ok(())
    }

    pub fn next_slot(&mut self) -> Result<ComposerMode, ComposerError> {
        self.state.next_slot()
    }

    pub fn previous_slot(&mut self) -> Result<(), ComposerError> {
        self.state.previous_slot()
    }

    pub fn edit_slot(&mut self, name: &str) -> Result<(), ComposerError> {
        self.state.edit_slot(name)
    }

    // ------------------------------------------------------------------
    // Suggestions
    // ------------------------------------------------------------------

    pub fn visible_suggestions(&self) -> Vec<&PendingSuggestion> {
        self.state.visible_suggestions()
    }

    pub fn apply_suggestion(&mut self, id: u64) -> Result<String, ComposerError> {
        let applied = self.state.apply_suggestion(id);
        self.inline(applied)
    }

    fn request_analysis(&mut self, origin_slot: String, file_key: String) {
        let Some(intent) = self.state.capability().map(|c| c.name.clone()) else {
            return;
        };
        let analyzer = self.backend.analyzer.clone();
        let generation = self.state.generation();
        tracing::debug!(slot = %origin_slot, file_key = %file_key, "analysis requested");
        self.spawn(async move {
            let outcome = run_analysis(analyzer.as_ref(), &file_key, &intent)
                .await
                .map_err(|e| e.to_string());
            ComposerEvent::AnalysisFinished {
                generation,
                origin_slot,
                outcome,
            }
        });
    }

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------

    /// Dry run. Leaves everything but the result untouched.
    pub fn simulate(&mut self) -> Result<(), ComposerError> {
        self.start_execution(ExecutionKind::Simulate)
    }

    pub fn confirm(&mut self) -> Result<(), ComposerError> {
        self.start_execution(ExecutionKind::Confirm)
    }

    /// After a failed confirm, go back to confirmation.
    pub fn retry(&mut self) -> Result<(), ComposerError> {
        self.state.retry()
    }

    fn start_execution(&mut self, kind: ExecutionKind) -> Result<(), ComposerError> {
        let request = self.state.begin_execution(kind)?;
        let gateway = self.backend.gateway.clone();
        let generation = self.state.generation();
        tracing::info!(
            capability = %request.capability_id,
            kind = ?kind,
            "execution requested"
        );
        self.spawn(async move {
            let result = execute(gateway.as_ref(), &request).await;
            ComposerEvent::ExecutionFinished {
                generation,
                kind,
                capability_id: request.capability_id,
                args: request.args,
                result,
            }
        });
        Ok(())
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    /// Wait for the next outstanding response and apply it. `None` when
    /// nothing is outstanding.
    pub async fn next_event(&mut self) -> Option<EventDisposition> {
        if self.in_flight == 0 {
            return None;
        }
        let event = self.events_rx.recv().await?;
        self.in_flight -= 1;
        Some(self.handle_event(event))
    }

    /// Apply every response that has already arrived, without waiting.
    pub fn drain_ready(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.in_flight = self.in_flight.saturating_sub(1);
            self.handle_event(event);
            applied += 1;
        }
        applied
    }

    /// Apply responses until nothing is outstanding, including follow-up
    /// requests spawned along the way (upload → analysis).
    pub async fn settle(&mut self) -> Vec<EventDisposition> {
        let mut dispositions = Vec::new();
        while let Some(d) = self.next_event().await {
            dispositions.push(d);
        }
        dispositions
    }

    /// Apply one event to the state.
    pub fn handle_event(&mut self, event: ComposerEvent) -> EventDisposition {
        if event.generation() != self.state.generation() {
            tracing::debug!(event = event.name(), "discarding response from before reset");
            return EventDisposition::Discarded(DiscardReason::StaleGeneration);
        }

        match event {
            ComposerEvent::AutocompleteLoaded {
                query,
                context_id,
                outcome,
                ..
            } => match outcome {
                Ok(response) => {
                    let applied = self.state.apply_autocomplete(
                        &query,
                        context_id.as_deref(),
                        response.entities,
                        response.actions,
                        self.permissions.as_ref(),
                    );
                    disposition(applied)
                }
                Err(message) => {
                    let current_context = self.state.context().map(|c| c.id.as_str());
                    if !self.state.mode().accepts_query()
                        || query != self.state.query()
                        || context_id.as_deref() != current_context
                    {
                        return EventDisposition::Discarded(DiscardReason::Superseded);
                    }
                    tracing::warn!(query = %query, error = %message, "autocomplete failed");
                    self.state
                        .set_notice(NoticeKind::SearchFailed, format!("Search failed: {message}"));
                    EventDisposition::Applied
                }
            },

            ComposerEvent::SlotSearchLoaded {
                slot,
                query,
                outcome,
                ..
            } => match outcome {
                Ok(results) => disposition(self.state.apply_slot_search(&slot, &query, results)),
                Err(message) => {
                    let relevant = self.state.current_slot().is_some_and(|s| s.name == slot)
                        && self.state.slot_query() == query;
                    if !relevant {
                        return EventDisposition::Discarded(DiscardReason::Superseded);
                    }
                    tracing::warn!(slot = %slot, error = %message, "entity search failed");
                    self.state
                        .set_notice(NoticeKind::SearchFailed, format!("Search failed: {message}"));
                    EventDisposition::Applied
                }
            },

            ComposerEvent::UploadFinished { slot, outcome, .. } => {
                let file_key = outcome.as_ref().ok().map(|stored| stored.key.clone());
                let stored = self.state.finish_upload(&slot, outcome);
                if let (true, Some(key)) = (stored, file_key) {
                    if self.config.analysis_enabled {
                        self.request_analysis(slot, key);
                    }
                }
                EventDisposition::Applied
            }

            ComposerEvent::AnalysisFinished {
                origin_slot,
                outcome,
                ..
            } => {
                match outcome {
                    Ok(batch) => {
                        let kept = self.state.merge_suggestions(
                            &origin_slot,
                            batch,
                            self.config.min_suggestion_confidence,
                        );
                        tracing::info!(slot = %origin_slot, kept, "suggestions merged");
                    }
                    // No suggestions is not an error to the user.
                    Err(message) => {
                        tracing::debug!(slot = %origin_slot, error = %message, "analysis failed");
                    }
                }
                EventDisposition::Applied
            }

            ComposerEvent::ExecutionFinished {
                kind,
                capability_id,
                args,
                result,
                ..
            } => {
                let committed = self.state.finish_execution(kind, result.clone());
                if committed {
                    let receipt = ExecutionReceipt {
                        capability_id,
                        args,
                        result,
                    };
                    for callback in &self.on_executed {
                        callback(&receipt);
                    }
                }
                EventDisposition::Applied
            }
        }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = ComposerEvent> + Send + 'static,
    {
        self.in_flight += 1;
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let event = task.await;
            // The receiver lives as long as the composer.
            let _ = tx.send(event);
        });
    }

    fn displayed_slot(&self, action: &'static str) -> Result<SlotSchema, ComposerError> {
        self.state
            .current_slot()
            .cloned()
            .ok_or(ComposerError::InvalidTransition {
                action,
                mode: self.state.mode(),
            })
    }

    /// Surface inline errors as a validation notice before returning them.
    fn inline<T>(&mut self, result: Result<T, ComposerError>) -> Result<T, ComposerError> {
        if let Err(e) = &result {
            if e.is_inline() {
                self.state.set_notice(NoticeKind::Validation, e.to_string());
            }
        }
        result
    }
}

fn disposition(applied: bool) -> EventDisposition {
    if applied {
        EventDisposition::Applied
    } else {
        EventDisposition::Discarded(DiscardReason::Superseded)
    }
}

impl std::fmt::Debug for Composer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Composer")
            .field("mode", &self.state.mode())
            .field("open", &self.open)
            .field("in_flight", &self.in_flight)
            .finish_non_exhaustive()
    }
}
