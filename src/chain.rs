//! Chain construction and execution.
//!
//! A chain is built append-only through [`ChainBuilder`], starting from
//! [`Pipeline::from`]. Each append creates a new stage linked behind the
//! current tail. [`ChainBuilder::build`] freezes the topology into a
//! [`Chain`] that can be streamed any number of times.

use std::fmt;
use std::marker::PhantomData;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::execution::{traverse, ExecutionMode, RunTrace};
use crate::outcome::{Failure, Outcome, StageError};
use crate::stage::{
    copy_outcome, copy_value, erase, pass_through, restore, CopyFn, Payload, StageKind, StageNode,
    StageRef, Value,
};

/// Unique identifier for a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainId(pub Uuid);

impl ChainId {
    /// Create a new random chain ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ChainId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Entry Point
// ============================================================================

/// Entry point for building chains.
#[derive(Debug, Clone, Copy, Default)]
pub struct Pipeline;

impl Pipeline {
    /// Start a chain whose head applies `transform` to the external input.
    ///
    /// A failed input passes through the head unchanged.
    pub fn from<Init, Out, F>(transform: F) -> ChainBuilder<Init, Out>
    where
        Init: Payload,
        Out: Payload,
        F: Fn(Init) -> Outcome<Out> + Send + Sync + 'static,
    {
        Self::from_recovering(transform, pass_through::<Init>)
    }

    /// Start a chain whose head can recover a failed external input.
    pub fn from_recovering<Init, Out, F, R>(transform: F, recover: R) -> ChainBuilder<Init, Out>
    where
        Init: Payload,
        Out: Payload,
        F: Fn(Init) -> Outcome<Out> + Send + Sync + 'static,
        R: Fn(Failure) -> Outcome<Init> + Send + Sync + 'static,
    {
        let head = StageNode::new(
            0,
            None,
            0,
            StageKind::Transform,
            move |input: Init, _: &str| transform(input),
            move |failure: Failure, _: &str| recover(failure),
        );
        ChainBuilder {
            id: ChainId::new(),
            nodes: vec![head],
            mode: ExecutionMode::default(),
            entry_copy: copy_value::<Init>,
            _marker: PhantomData,
        }
    }
}

// ============================================================================
// Builder
// ============================================================================

/// A chain under construction whose current tail produces `Out`.
///
/// Every append consumes the builder and returns one whose tail is the new
/// stage, so the output type always tracks the end of the chain.
pub struct ChainBuilder<Init, Out> {
    id: ChainId,
    nodes: Vec<StageNode>,
    mode: ExecutionMode,
    entry_copy: CopyFn,
    _marker: PhantomData<fn(Init) -> Out>,
}

impl<Init, Out> ChainBuilder<Init, Out>
where
    Init: Payload,
    Out: Payload,
{
    fn append<R, F, C>(mut self, kind: StageKind, transform: F, recover: C) -> ChainBuilder<Init, R>
    where
        R: Payload,
        F: Fn(Out, &str) -> Outcome<R> + Send + Sync + 'static,
        C: Fn(Failure, &str) -> Outcome<Out> + Send + Sync + 'static,
    {
        let parent = self.nodes.len() - 1;
        let index = self.nodes.len();
        let head = self.nodes[parent].head.unwrap_or(0);

        self.nodes[parent].next = Some(index);
        self.nodes.push(StageNode::new(
            index,
            Some(parent),
            head,
            kind,
            transform,
            recover,
        ));

        ChainBuilder {
            id: self.id,
            nodes: self.nodes,
            mode: self.mode,
            entry_copy: self.entry_copy,
            _marker: PhantomData,
        }
    }

    /// Append a stage that applies `transform` to the current output.
    ///
    /// A failure arriving at this stage passes through unchanged.
    pub fn joint<R, F>(self, transform: F) -> ChainBuilder<Init, R>
    where
        R: Payload,
        F: Fn(Out) -> Outcome<R> + Send + Sync + 'static,
    {
        self.joint_recovering(transform, pass_through::<Out>)
    }

    /// Append a stage with its own recovery function.
    ///
    /// When the incoming value is a failure, `recover` runs instead. A success
    /// from `recover` is fed to `transform`; a failure becomes this stage's
    /// result.
    pub fn joint_recovering<R, F, C>(self, transform: F, recover: C) -> ChainBuilder<Init, R>
    where
        R: Payload,
        F: Fn(Out) -> Outcome<R> + Send + Sync + 'static,
        C: Fn(Failure) -> Outcome<Out> + Send + Sync + 'static,
    {
        self.append(
            StageKind::Transform,
            move |input: Out, _: &str| transform(input),
            move |failure: Failure, _: &str| recover(failure),
        )
    }

    /// Append a stage whose transform may produce nothing.
    ///
    /// `None` becomes a [`StageError::EmptyOutput`] failure naming the stage.
    pub fn joint_option<R, F>(self, transform: F) -> ChainBuilder<Init, R>
    where
        R: Payload,
        F: Fn(Out) -> Option<R> + Send + Sync + 'static,
    {
        self.append(
            StageKind::Transform,
            move |input: Out, stage: &str| {
                transform(input).ok_or_else(|| {
                    Failure::from(StageError::EmptyOutput {
                        stage: stage.to_owned(),
                    })
                })
            },
            |failure: Failure, _: &str| Err(failure),
        )
    }

    /// Append a side-effect-only stage.
    ///
    /// `tap` observes the value, which is then re-emitted unchanged. An
    /// incoming failure is logged and re-emitted, never healed.
    pub fn window<F>(self, tap: F) -> ChainBuilder<Init, Out>
    where
        F: Fn(&Out) + Send + Sync + 'static,
    {
        self.append(
            StageKind::Window,
            move |input: Out, _: &str| {
                tap(&input);
                Ok(input)
            },
            |failure: Failure, _stage: &str| {
                #[cfg(feature = "tracing")]
                tracing::error!(stage = _stage, error = %failure, "window.failure");
                Err(failure)
            },
        )
    }

    /// Alias of [`ChainBuilder::window`].
    pub fn tap<F>(self, tap: F) -> ChainBuilder<Init, Out>
    where
        F: Fn(&Out) + Send + Sync + 'static,
    {
        self.window(tap)
    }

    /// Append an independent chain as a single stage.
    ///
    /// The incoming value is streamed through `chain` to completion and its
    /// terminal result, success or failure, becomes this stage's result. The
    /// sub-chain keeps its own execution mode and recovery functions.
    pub fn branch<R>(self, chain: Chain<Out, R>) -> ChainBuilder<Init, R>
    where
        R: Payload,
    {
        let chain = Mutex::new(chain);
        self.append(
            StageKind::Branch,
            move |input: Out, _: &str| chain.lock().stream(input),
            |failure: Failure, _: &str| Err(failure),
        )
    }

    /// Alias of [`ChainBuilder::branch`].
    pub fn inject<R>(self, chain: Chain<Out, R>) -> ChainBuilder<Init, R>
    where
        R: Payload,
    {
        self.branch(chain)
    }

    /// Name the current tail stage.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        if let Some(tail) = self.nodes.last_mut() {
            tail.name = Some(name.into());
        }
        self
    }

    /// Set how the chain treats failures.
    pub fn mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Stop at the first failure, see [`ExecutionMode::FailFast`].
    pub fn fail_fast(self) -> Self {
        self.mode(ExecutionMode::FailFast)
    }

    /// Handle to the current tail stage.
    pub fn tail(&self) -> StageRef<Out> {
        StageRef::new(self.id, self.nodes.len() - 1)
    }

    /// Freeze the chain.
    pub fn build(self) -> Chain<Init, Out> {
        let tail = self.nodes.len() - 1;
        Chain {
            id: self.id,
            nodes: self.nodes,
            head: 0,
            tail,
            mode: self.mode,
            entry_input: Err(Failure::not_executed()),
            entry_copy: self.entry_copy,
            trace: RunTrace::new(self.id),
            _marker: PhantomData,
        }
    }
}

impl<Init, Out> fmt::Debug for ChainBuilder<Init, Out> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainBuilder")
            .field("id", &self.id)
            .field("stages", &self.nodes.len())
            .field("mode", &self.mode)
            .finish()
    }
}

// ============================================================================
// Chain
// ============================================================================

/// A built chain taking `Init` and producing `Out`.
///
/// Streaming overwrites the result held by every stage. A chain is not
/// meant to be streamed concurrently; build independent chains instead.
pub struct Chain<Init, Out> {
    id: ChainId,
    nodes: Vec<StageNode>,
    head: usize,
    tail: usize,
    mode: ExecutionMode,
    entry_input: Outcome<Value>,
    entry_copy: CopyFn,
    trace: RunTrace,
    _marker: PhantomData<fn(Init) -> Out>,
}

impl<Init, Out> Chain<Init, Out>
where
    Init: Payload,
    Out: Payload,
{
    /// Run `input` through every stage and return the tail's result.
    pub fn stream(&mut self, input: Init) -> Outcome<Out> {
        self.stream_outcome(Ok(input))
    }

    /// Run an already wrapped input, which may be a failure.
    pub fn stream_outcome(&mut self, input: Outcome<Init>) -> Outcome<Out> {
        let tail = StageRef::<Out>::new(self.id, self.tail);
        self.stream_at(tail, input)
    }

    /// Run the chain entered through `stage`.
    ///
    /// `stage` must resolve to this chain's head, otherwise a
    /// [`StageError::NotExecutedByHead`] failure is returned and no stage
    /// runs. The result is always the tail's.
    pub fn stream_at<T>(&mut self, stage: StageRef<T>, input: Outcome<Init>) -> Outcome<Out> {
        let Some(head) = self.resolve_head(stage) else {
            #[cfg(feature = "tracing")]
            tracing::warn!(chain = %self.id, stage = stage.index, "chain.not_executed");

            return Err(StageError::NotExecutedByHead.into());
        };

        self.entry_input = input.map(erase);
        let entry = copy_outcome(&self.entry_input, self.entry_copy, "entry");
        traverse(&mut self.nodes, head, entry, self.mode, &mut self.trace);

        let result = self.result();

        #[cfg(feature = "tracing")]
        tracing::info!(
            chain = %self.id,
            stages = self.nodes.len(),
            ok = result.is_ok(),
            "chain.complete"
        );

        result
    }

    fn resolve_head<T>(&self, stage: StageRef<T>) -> Option<usize> {
        if stage.chain != self.id {
            return None;
        }
        self.nodes
            .get(stage.index)
            .and_then(|node| node.head)
            .filter(|head| *head == self.head)
    }

    /// The tail's latest result, deep-copied on success.
    pub fn result(&self) -> Outcome<Out> {
        self.read(self.tail)
    }

    /// The latest result of `stage`, deep-copied on success.
    pub fn result_at<T: Payload>(&self, stage: StageRef<T>) -> Outcome<T> {
        if stage.chain != self.id || stage.index >= self.nodes.len() {
            return Err(StageError::UnknownStage { index: stage.index }.into());
        }
        self.read(stage.index)
    }

    fn read<T: Payload>(&self, index: usize) -> Outcome<T> {
        let node = &self.nodes[index];
        node.read_result()
            .and_then(|value| restore::<T>(value, &node.display_name()))
    }

    /// The raw input of the latest traversal.
    pub fn entry_input(&self) -> Outcome<Init> {
        copy_outcome(&self.entry_input, self.entry_copy, "entry")
            .and_then(|value| restore::<Init>(value, "entry"))
    }

    /// Get the chain ID.
    pub fn id(&self) -> ChainId {
        self.id
    }

    /// How the chain treats failures.
    pub fn execution_mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Number of stages, including the head.
    pub fn stage_count(&self) -> usize {
        self.nodes.len()
    }

    /// Display name of the stage at `index`.
    pub fn stage_name(&self, index: usize) -> Option<String> {
        self.nodes
            .get(index)
            .map(|node| node.display_name().into_owned())
    }

    /// Record of the latest traversal.
    pub fn last_trace(&self) -> &RunTrace {
        &self.trace
    }
}

impl<Init, Out> fmt::Debug for Chain<Init, Out> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("id", &self.id)
            .field("stages", &self.nodes.len())
            .field("mode", &self.mode)
            .finish()
    }
}
