//! Engine types

use crate::data::SnapshotError;
use crate::execution::ExecutionError;
use crate::feed::FeedError;
use crate::position::PositionError;
use thiserror::Error;

/// Driver loop errors
#[derive(Debug, Error)]
pub enum EngineError {
    /// Credentials rejected by the feed or the exchange; halts the loop
    #[error("Authentication failed: {0}")]
    Authentication(String),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error(transparent)]
    Position(#[from] PositionError),
    #[error(transparent)]
    Feed(#[from] FeedError),
    #[error(transparent)]
    Persistence(#[from] SnapshotError),
}

impl EngineError {
    /// Whether the loop must stop
    pub fn is_fatal(&self) -> bool {
        match self {
            EngineError::Authentication(_) => true,
            EngineError::Execution(e) => e.is_fatal(),
            EngineError::Position(e) => e.is_fatal(),
            EngineError::Feed(e) => matches!(e, FeedError::Authentication(_)),
            EngineError::Persistence(_) => false,
        }
    }

    /// Collapse fatal errors into Authentication
    pub(crate) fn escalate(self) -> Self {
        if self.is_fatal() && !matches!(self, EngineError::Authentication(_)) {
            EngineError::Authentication(self.to_string())
        } else {
            self
        }
    }
}

/// Summary of one driver cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub cycle: u64,
    /// Symbols evaluated this cycle
    pub symbols: usize,
    /// Symbols skipped for missing or stale data
    pub skipped: usize,
    pub approved: usize,
    pub rejected: usize,
    /// Stop or target crossings acted on
    pub closures: usize,
    /// Closed trades reported to strategies
    pub outcomes: usize,
}
