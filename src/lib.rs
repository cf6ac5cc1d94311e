#![deny(missing_docs)]

//! Relay — staged result pipelines with local recovery.
//!
//! # Design Goals
//!
//! - **Failures are data**: stages return an [`Outcome`] instead of panicking
//! - **Local recovery**: every stage may heal a failure arriving from upstream
//! - **Isolation**: successors and callers always read deep copies of a
//!   stage's value, and embedded branches cannot leak edits back
//!
//! # Core Concepts
//!
//! - [`Pipeline`] / [`ChainBuilder`]: append-only, typed chain construction
//! - [`Chain`]: a built chain; [`Chain::stream`] runs every stage head to tail
//! - [`ExecutionMode`]: run every stage with recovery, or stop at the first failure
//!
//! ```
//! use relay::{Failure, Pipeline};
//!
//! let mut chain = Pipeline::from(|x: String| Ok(x + "start"))
//!     .joint(|x| Ok(x + " 1st"))
//!     .joint(|_: String| Err::<String, _>(Failure::new("cut")))
//!     .joint_recovering(|x| Ok(x + " 3rd"), |_| Ok("recovered".to_string()))
//!     .build();
//!
//! assert_eq!(chain.stream(String::new()), Ok("recovered 3rd".to_string()));
//! ```

// Modules
pub mod chain;
pub mod execution;
pub mod outcome;
pub mod stage;

// Re-exports for convenience
pub use chain::{Chain, ChainBuilder, ChainId, Pipeline};
pub use execution::{ExecutionMode, RunTrace, StageStatus, StageTiming};
pub use outcome::{failure, success, Failure, Outcome, StageError};
pub use stage::{pass_through, Payload, StageKind, StageRef};

#[cfg(test)]
mod tests;
