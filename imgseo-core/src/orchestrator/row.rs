//! Per-image row state shown during and after bulk runs.

use crate::error::ApiFailure;
use crate::types::{GeneratedMeta, WorkItem};

#[derive(Debug, Clone, PartialEq)]
pub enum RowState {
    Pending,
    Processing,
    /// Generated but not yet written back.
    Generated(GeneratedMeta),
    /// The model answered with nothing usable.
    Empty,
    Updated { title: String, alt: String },
    Failed(ApiFailure),
}

impl RowState {
    pub fn label(&self) -> &'static str {
        match self {
            RowState::Pending => "pending",
            RowState::Processing => "processing",
            RowState::Generated(_) => "generated",
            RowState::Empty => "empty",
            RowState::Updated { .. } => "updated",
            RowState::Failed(_) => "error",
        }
    }
}

/// One image row: the work item plus what has happened to it so far.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkRow {
    pub item: WorkItem,
    pub state: RowState,
}

impl WorkRow {
    pub fn new(item: WorkItem) -> Self {
        Self {
            item,
            state: RowState::Pending,
        }
    }

    /// Whether a generate action is available. Error rows stay locked out.
    pub fn can_generate(&self, key_configured: bool) -> bool {
        key_configured && !matches!(self.state, RowState::Failed(_) | RowState::Processing)
    }

    /// Only rows holding generated, not yet written data can be updated.
    pub fn can_update(&self) -> bool {
        matches!(self.state, RowState::Generated(_))
    }

    pub fn generated(&self) -> Option<&GeneratedMeta> {
        match &self.state {
            RowState::Generated(meta) => Some(meta),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(state: RowState) -> WorkRow {
        WorkRow {
            item: WorkItem::new(1),
            state,
        }
    }

    #[test]
    fn affordances() {
        let meta = GeneratedMeta {
            title: "t".into(),
            alt: "a".into(),
        };
        let failed = RowState::Failed(ApiFailure::transport("timeout"));
        let updated = RowState::Updated {
            title: "t".into(),
            alt: "a".into(),
        };

        assert!(row(RowState::Pending).can_generate(true));
        assert!(!row(RowState::Pending).can_generate(false));
        assert!(!row(RowState::Pending).can_update());

        assert!(row(RowState::Generated(meta)).can_update());
        assert!(!row(RowState::Empty).can_update());
        assert!(!row(updated.clone()).can_update());
        assert!(row(updated).can_generate(true));

        assert!(!row(failed.clone()).can_generate(true));
        assert!(!row(failed).can_update());
    }
}
