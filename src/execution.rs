//! Traversal of a chain and the records it leaves behind.
//!
//! A traversal walks the arena from the head following `next` links and
//! recomputes every stage from its predecessor's result. How failures are
//! treated depends on the chain's [`ExecutionMode`].

use serde::{Deserialize, Serialize};

use crate::chain::ChainId;
use crate::outcome::{Failure, Outcome};
use crate::stage::{StageKind, StageNode, Value};

/// Get the current Unix timestamp in milliseconds.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

// ============================================================================
// Execution Mode
// ============================================================================

/// How a traversal treats failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExecutionMode {
    /// Every stage runs. A stage receiving a failure consults its recovery
    /// function, which may heal the chain. Successors read deep copies.
    #[default]
    RunAll,
    /// The first failure ends the traversal. Recovery functions are ignored
    /// and values are moved from stage to stage without copying.
    FailFast,
}

impl ExecutionMode {
    /// Returns `true` for [`ExecutionMode::FailFast`].
    pub fn is_fail_fast(&self) -> bool {
        matches!(self, Self::FailFast)
    }
}

// ============================================================================
// Stage Timing
// ============================================================================

/// What happened to a stage during a traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageStatus {
    /// The transform ran and produced a value.
    Transformed,
    /// Recovery healed an incoming failure and the transform then succeeded.
    Recovered,
    /// The transform ran and returned a failure.
    Failed,
    /// Recovery returned a failure; the transform was skipped.
    Propagated,
    /// A fail-fast traversal had already stopped.
    Skipped,
}

impl StageStatus {
    fn settled(recovered: bool, result: &Outcome<Value>) -> Self {
        match (recovered, result.is_ok()) {
            (_, false) => Self::Failed,
            (true, true) => Self::Recovered,
            (false, true) => Self::Transformed,
        }
    }
}

/// Timing information for a single stage of a traversal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTiming {
    /// Index of the stage.
    pub stage_index: usize,
    /// Display name of the stage.
    pub name: String,
    /// What the stage was appended as.
    pub kind: StageKind,
    /// When the stage started (Unix timestamp ms).
    pub started_at: u64,
    /// When the stage completed (Unix timestamp ms), if completed.
    pub completed_at: Option<u64>,
    /// Outcome of the stage, if completed.
    pub status: Option<StageStatus>,
}

impl StageTiming {
    fn new(node: &StageNode) -> Self {
        Self {
            stage_index: node.index,
            name: node.display_name().into_owned(),
            kind: node.kind,
            started_at: now_millis(),
            completed_at: None,
            status: None,
        }
    }

    fn complete(&mut self, status: StageStatus) {
        self.completed_at = Some(now_millis());
        self.status = Some(status);
    }

    /// Get the duration in milliseconds, if completed.
    pub fn duration_ms(&self) -> Option<u64> {
        self.completed_at
            .map(|end| end.saturating_sub(self.started_at))
    }
}

/// Record of the latest traversal of a chain.
///
/// Overwritten by every `stream` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunTrace {
    /// The traversed chain.
    pub chain: ChainId,
    /// When the traversal started (Unix timestamp ms), `None` before the first run.
    pub started_at: Option<u64>,
    /// One record per stage, in execution order.
    pub stages: Vec<StageTiming>,
}

impl RunTrace {
    pub(crate) fn new(chain: ChainId) -> Self {
        Self {
            chain,
            started_at: None,
            stages: Vec::new(),
        }
    }

    /// Get the record of the stage at `stage_index`.
    pub fn stage(&self, stage_index: usize) -> Option<&StageTiming> {
        self.stages.iter().find(|t| t.stage_index == stage_index)
    }

    /// Statuses of all recorded stages, in execution order.
    pub fn statuses(&self) -> Vec<StageStatus> {
        self.stages.iter().filter_map(|t| t.status).collect()
    }

    /// Number of stages whose transform or recovery ran.
    pub fn executed_count(&self) -> usize {
        self.stages
            .iter()
            .filter(|t| !matches!(t.status, Some(StageStatus::Skipped) | None))
            .count()
    }

    fn reset(&mut self) {
        self.started_at = Some(now_millis());
        self.stages.clear();
    }
}

// ============================================================================
// Traversal
// ============================================================================

/// Walk the chain from `head`, recomputing every stage.
///
/// `entry` is the head's incoming value. Each stage stores its result in
/// `last_result`; the caller reads the tail's afterwards.
pub(crate) fn traverse(
    nodes: &mut [StageNode],
    head: usize,
    entry: Outcome<Value>,
    mode: ExecutionMode,
    trace: &mut RunTrace,
) {
    trace.reset();
    let mut entry = Some(entry);
    let mut current = Some(head);

    while let Some(index) = current {
        let incoming = match (nodes[index].parent, mode) {
            (None, _) => entry
                .take()
                .unwrap_or_else(|| Err(Failure::not_executed())),
            (Some(parent), ExecutionMode::RunAll) => nodes[parent].read_result(),
            (Some(parent), ExecutionMode::FailFast) => nodes[parent].take_result(),
        };

        let node = &nodes[index];
        let mut timing = StageTiming::new(node);

        #[cfg(feature = "tracing")]
        tracing::debug!(stage = index, name = %timing.name, "stage.start");

        let (result, status) = match (incoming, mode) {
            (Ok(value), _) => {
                let result = node.transform(value);
                let status = StageStatus::settled(false, &result);
                (result, status)
            }
            (Err(failure), ExecutionMode::FailFast) => (Err(failure), StageStatus::Skipped),
            (Err(failure), ExecutionMode::RunAll) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(stage = index, name = %timing.name, error = %failure, "stage.recover");

                match node.recover(failure) {
                    Ok(value) => {
                        let result = node.transform(value);
                        let status = StageStatus::settled(true, &result);
                        (result, status)
                    }
                    Err(failure) => (Err(failure), StageStatus::Propagated),
                }
            }
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(stage = index, name = %timing.name, status = ?status, "stage.end");

        timing.complete(status);
        trace.stages.push(timing);

        let node = &mut nodes[index];
        node.last_result = result;
        current = node.next;
    }
}
