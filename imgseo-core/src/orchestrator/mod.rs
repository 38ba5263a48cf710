//! Sequential bulk generate/update runs over a list of image rows.
//!
//! One run at a time: the orchestrator owns a small phase machine
//! (`Idle -> Confirming -> Running`) behind a mutex, and every entry point
//! goes through [`BulkOrchestrator::transition`]. Items are processed strictly
//! in row order with a fixed delay between calls. A failure that means the
//! whole batch cannot succeed (missing key, any 401/403) stops the run and
//! leaves the remaining rows untouched.

mod row;

pub use row::{RowState, WorkRow};

use std::fmt;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{info_span, Instrument};

use crate::client::MetaApi;
use crate::config::DEFAULT_REQUEST_DELAY_MS;
use crate::error::{ApiFailure, ErrorCode};
use crate::types::{GeneratedMeta, UpdateRequest, WorkItem};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkAction {
    Generate,
    Update,
}

impl BulkAction {
    fn confirm_prompt(&self, count: usize) -> String {
        match self {
            BulkAction::Generate => format!(
                "Generate SEO title and alt text for {} images? This may take a while.",
                count
            ),
            BulkAction::Update => format!(
                "Save the generated title and alt text for {} images?",
                count
            ),
        }
    }
}

impl fmt::Display for BulkAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BulkAction::Generate => f.write_str("generate"),
            BulkAction::Update => f.write_str("update"),
        }
    }
}

/// Why a run (or a single action) could not start.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BulkError {
    #[error("A bulk run is already in progress")]
    RunActive,

    #[error("No images are eligible to {0}")]
    NoItems(BulkAction),

    #[error("Bulk {0} cancelled")]
    Declined(BulkAction),

    #[error("Image {image_id} cannot {action} in its current state")]
    NotEligible { image_id: u64, action: BulkAction },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HaltReason {
    MissingCredentials,
    AuthRejected { status: u16 },
}

impl HaltReason {
    fn from_failure(failure: &ApiFailure) -> Option<Self> {
        if !failure.halts_batch() {
            return None;
        }
        Some(if failure.code() == Some(ErrorCode::ApiKeyMissing) {
            HaltReason::MissingCredentials
        } else {
            HaltReason::AuthRejected {
                status: failure.status().unwrap_or(401),
            }
        })
    }
}

impl fmt::Display for HaltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HaltReason::MissingCredentials => f.write_str("the API key is missing"),
            HaltReason::AuthRejected { status } => {
                write!(f, "the server rejected the credentials (HTTP {})", status)
            }
        }
    }
}

/// Outcome of one bulk run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkSummary {
    pub action: BulkAction,
    /// Eligible rows when the run started.
    pub total: usize,
    pub processed: usize,
    pub success_count: usize,
    pub fail_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub halt_reason: Option<HaltReason>,
}

impl BulkSummary {
    pub fn halted(&self) -> bool {
        self.halt_reason.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// The person (or UI) driving a run.
pub trait Operator: Send + Sync {
    /// Ask before starting. `prompt` states the item count.
    fn confirm(&self, prompt: &str, count: usize) -> bool;

    /// Called before each item, 1-based.
    fn progress(&self, index: usize, total: usize);

    /// Called after each processed item with its final state.
    fn item_finished(&self, index: usize, row: &WorkRow);

    fn notify(&self, level: NoticeLevel, message: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Confirming,
    Running { index: usize, total: usize },
}

/// Resets the phase to `Idle` when a run ends, however it ends.
struct PhaseReset<'a>(&'a Mutex<Phase>);

impl Drop for PhaseReset<'_> {
    fn drop(&mut self) {
        *self.0.lock().unwrap_or_else(|e| e.into_inner()) = Phase::Idle;
    }
}

pub struct BulkOrchestrator<A> {
    api: A,
    request_delay: Duration,
    key_configured: bool,
    phase: Mutex<Phase>,
}

impl<A: MetaApi> BulkOrchestrator<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            request_delay: Duration::from_millis(DEFAULT_REQUEST_DELAY_MS),
            key_configured: true,
            phase: Mutex::new(Phase::Idle),
        }
    }

    /// Wait between consecutive items of a run.
    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    /// Whether an API key is configured. Without one, no row can generate.
    pub fn with_key_configured(mut self, configured: bool) -> Self {
        self.key_configured = configured;
        self
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn phase(&self) -> Phase {
        *self.lock_phase()
    }

    pub fn is_running(&self) -> bool {
        self.phase() != Phase::Idle
    }

    fn lock_phase(&self) -> MutexGuard<'_, Phase> {
        self.phase.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The only way the phase changes while a run is live.
    fn transition(&self, to: Phase) -> Result<(), BulkError> {
        let mut phase = self.lock_phase();
        let allowed = matches!(
            (*phase, to),
            (Phase::Idle, Phase::Confirming)
                | (Phase::Confirming, Phase::Running { .. })
                | (Phase::Running { .. }, Phase::Running { .. })
                | (_, Phase::Idle)
        );
        if !allowed {
            return Err(BulkError::RunActive);
        }
        *phase = to;
        Ok(())
    }

    fn eligible(&self, action: BulkAction, row: &WorkRow) -> bool {
        match action {
            BulkAction::Generate => row.can_generate(self.key_configured),
            BulkAction::Update => row.can_update(),
        }
    }

    /// Generate metadata for every eligible row.
    pub async fn run_generate_all(
        &self,
        rows: &mut [WorkRow],
        operator: &dyn Operator,
    ) -> Result<BulkSummary, BulkError> {
        self.run(BulkAction::Generate, rows, operator).await
    }

    /// Write back every row holding generated, not yet saved metadata.
    pub async fn run_update_all(
        &self,
        rows: &mut [WorkRow],
        operator: &dyn Operator,
    ) -> Result<BulkSummary, BulkError> {
        self.run(BulkAction::Update, rows, operator).await
    }

    /// Generate metadata for one row outside a bulk run.
    pub async fn generate_one(&self, row: &mut WorkRow) -> Result<(), BulkError> {
        self.single(BulkAction::Generate, row).await
    }

    /// Save one row's generated metadata outside a bulk run.
    pub async fn update_one(&self, row: &mut WorkRow) -> Result<(), BulkError> {
        self.single(BulkAction::Update, row).await
    }

    async fn single(&self, action: BulkAction, row: &mut WorkRow) -> Result<(), BulkError> {
        if self.is_running() {
            return Err(BulkError::RunActive);
        }
        if !self.eligible(action, row) {
            return Err(BulkError::NotEligible {
                image_id: row.item.image_id,
                action,
            });
        }

        let generated = row.generated().cloned();
        row.state = RowState::Processing;
        row.state = match self.process(action, &row.item, generated).await {
            Ok(state) => state,
            Err(failure) => Self::failed_state(failure),
        };
        Ok(())
    }

    async fn run(
        &self,
        action: BulkAction,
        rows: &mut [WorkRow],
        operator: &dyn Operator,
    ) -> Result<BulkSummary, BulkError> {
        self.transition(Phase::Confirming)?;
        let _reset = PhaseReset(&self.phase);

        let eligible: Vec<usize> = rows
            .iter()
            .enumerate()
            .filter(|(_, row)| self.eligible(action, row))
            .map(|(i, _)| i)
            .collect();

        if eligible.is_empty() {
            operator.notify(
                NoticeLevel::Warning,
                &format!("No images are eligible to {}.", action),
            );
            return Err(BulkError::NoItems(action));
        }

        let total = eligible.len();
        if !operator.confirm(&action.confirm_prompt(total), total) {
            tracing::info!(%action, total, "bulk run declined");
            return Err(BulkError::Declined(action));
        }

        tracing::info!(%action, total, "bulk run started");
        let mut summary = BulkSummary {
            action,
            total,
            processed: 0,
            success_count: 0,
            fail_count: 0,
            halt_reason: None,
        };

        for (n, &row_index) in eligible.iter().enumerate() {
            if n > 0 {
                tokio::time::sleep(self.request_delay).await;
            }

            let index = n + 1;
            self.transition(Phase::Running { index, total })?;
            operator.progress(index, total);

            let row = &mut rows[row_index];
            let image_id = row.item.image_id;
            let generated = row.generated().cloned();
            row.state = RowState::Processing;

            let result = self
                .process(action, &row.item, generated)
                .instrument(info_span!("bulk_item", %action, image_id, index, total))
                .await;
            summary.processed += 1;

            let mut halt = None;
            match result {
                Ok(state) => {
                    row.state = state;
                    summary.success_count += 1;
                }
                Err(failure) => {
                    summary.fail_count += 1;
                    let message = failure.display_message();
                    tracing::error!(%action, image_id, error = %message, "bulk item failed");

                    let level = if matches!(failure, ApiFailure::SoftEmpty { .. }) {
                        NoticeLevel::Warning
                    } else {
                        NoticeLevel::Error
                    };
                    operator.notify(level, &format!("Image {}: {}", image_id, message));

                    halt = HaltReason::from_failure(&failure);
                    row.state = Self::failed_state(failure);
                }
            }
            operator.item_finished(index, row);

            if let Some(reason) = halt {
                let skipped = total - index;
                tracing::warn!(%action, image_id, %reason, skipped, "bulk run halted");
                operator.notify(
                    NoticeLevel::Error,
                    &format!(
                        "Processing stopped because {}. {} remaining images were skipped.",
                        reason, skipped
                    ),
                );
                summary.halt_reason = Some(reason);
                break;
            }
        }

        let level = if summary.fail_count == 0 {
            NoticeLevel::Success
        } else {
            NoticeLevel::Warning
        };
        operator.notify(
            level,
            &format!(
                "Bulk {} finished: {} succeeded, {} failed.",
                action, summary.success_count, summary.fail_count
            ),
        );
        tracing::info!(
            %action,
            success = summary.success_count,
            failed = summary.fail_count,
            halted = summary.halted(),
            "bulk run finished"
        );

        Ok(summary)
    }

    async fn process(
        &self,
        action: BulkAction,
        item: &WorkItem,
        generated: Option<GeneratedMeta>,
    ) -> Result<RowState, ApiFailure> {
        match action {
            BulkAction::Generate => self.api.generate(item).await.map(RowState::Generated),
            BulkAction::Update => {
                let meta = generated.ok_or_else(|| ApiFailure::FatalValidation {
                    code: ErrorCode::NothingToUpdate,
                    message: "No generated data to save.".to_string(),
                    status: 400,
                    detail: None,
                })?;
                let request = UpdateRequest {
                    image_id: item.image_id,
                    new_title: Some(meta.title),
                    new_alt: Some(meta.alt),
                };
                let response = self.api.update(&request).await?;
                Ok(RowState::Updated {
                    title: response.updated_title,
                    alt: response.updated_alt,
                })
            }
        }
    }

    fn failed_state(failure: ApiFailure) -> RowState {
        match failure {
            ApiFailure::SoftEmpty { .. } => RowState::Empty,
            other => RowState::Failed(other),
        }
    }
}
