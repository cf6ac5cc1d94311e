//! Stage records stored in a chain's arena.
//!
//! A stage holds a transform, a recovery function and the result it computed
//! in the latest traversal. Values are stored type-erased; the typed builder in
//! [`crate::chain`] guarantees that every stage receives the type it was
//! declared with, and any mismatch is reported as a [`StageError::TypeMismatch`]
//! failure instead of a panic.

use std::any::Any;
use std::borrow::Cow;
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

use crate::chain::ChainId;
use crate::outcome::{Failure, Outcome, StageError};

/// Values that can flow through a chain.
///
/// `Clone` is the deep-copy capability used whenever a stage hands its
/// result to a successor or to a caller.
pub trait Payload: Clone + Send + Sync + 'static {}

impl<T> Payload for T where T: Clone + Send + Sync + 'static {}

pub(crate) type Value = Box<dyn Any + Send + Sync>;

type Transform = Box<dyn Fn(Value, &str) -> Outcome<Value> + Send + Sync>;
type Recover = Box<dyn Fn(Failure, &str) -> Outcome<Value> + Send + Sync>;

/// Deep copy of an erased value, `None` if the value has another type.
pub(crate) type CopyFn = fn(&Value) -> Option<Value>;

pub(crate) fn erase<T: Payload>(value: T) -> Value {
    Box::new(value)
}

pub(crate) fn restore<T: Payload>(value: Value, stage: &str) -> Outcome<T> {
    value.downcast::<T>().map(|value| *value).map_err(|_| {
        Failure::from(StageError::TypeMismatch {
            stage: stage.to_owned(),
        })
    })
}

pub(crate) fn copy_value<T: Payload>(value: &Value) -> Option<Value> {
    (**value)
        .downcast_ref::<T>()
        .map(|value| Box::new(value.clone()) as Value)
}

/// Copy an outcome: Success values are deep-copied, failures are shared.
pub(crate) fn copy_outcome(outcome: &Outcome<Value>, copy: CopyFn, stage: &str) -> Outcome<Value> {
    match outcome {
        Ok(value) => copy(value).ok_or_else(|| {
            Failure::from(StageError::TypeMismatch {
                stage: stage.to_owned(),
            })
        }),
        Err(failure) => Err(failure.clone()),
    }
}

/// Default recovery: the error passes through unchanged.
pub fn pass_through<T>(failure: Failure) -> Outcome<T> {
    Err(failure)
}

/// What a stage was appended as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageKind {
    /// A transform appended with `from`, `joint` or `joint_option`.
    Transform,
    /// A side-effect-only tap.
    Window,
    /// An embedded sub-chain.
    Branch,
}

/// Typed handle to a stage of a chain.
///
/// Obtained from [`crate::ChainBuilder::tail`] while the chain is being
/// built. `T` is the stage's output type.
pub struct StageRef<T> {
    pub(crate) chain: ChainId,
    pub(crate) index: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T> StageRef<T> {
    pub(crate) fn new(chain: ChainId, index: usize) -> Self {
        Self {
            chain,
            index,
            _marker: PhantomData,
        }
    }

    /// The chain this stage belongs to.
    pub fn chain(&self) -> ChainId {
        self.chain
    }

    /// Position of the stage, counted from the head.
    pub fn index(&self) -> usize {
        self.index
    }
}

impl<T> Clone for StageRef<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for StageRef<T> {}

impl<T> std::fmt::Debug for StageRef<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageRef")
            .field("chain", &self.chain)
            .field("index", &self.index)
            .finish()
    }
}

/// One link of a chain.
///
/// Links are indices into the owning chain's arena. For the head `parent` is
/// `None`; every stage's `head` points at index 0 of the same arena.
pub(crate) struct StageNode {
    pub(crate) index: usize,
    pub(crate) name: Option<String>,
    pub(crate) kind: StageKind,
    pub(crate) parent: Option<usize>,
    pub(crate) next: Option<usize>,
    pub(crate) head: Option<usize>,
    pub(crate) last_result: Outcome<Value>,
    transform: Transform,
    recover: Recover,
    copy: CopyFn,
}

impl StageNode {
    pub(crate) fn new<I, O, F, R>(
        index: usize,
        parent: Option<usize>,
        head: usize,
        kind: StageKind,
        transform: F,
        recover: R,
    ) -> Self
    where
        I: Payload,
        O: Payload,
        F: Fn(I, &str) -> Outcome<O> + Send + Sync + 'static,
        R: Fn(Failure, &str) -> Outcome<I> + Send + Sync + 'static,
    {
        Self {
            index,
            name: None,
            kind,
            parent,
            next: None,
            head: Some(head),
            last_result: Err(Failure::not_executed()),
            transform: Box::new(move |value, stage| {
                let input = restore::<I>(value, stage)?;
                transform(input, stage).map(erase)
            }),
            recover: Box::new(move |failure, stage| recover(failure, stage).map(erase)),
            copy: copy_value::<O>,
        }
    }

    pub(crate) fn display_name(&self) -> Cow<'_, str> {
        match &self.name {
            Some(name) => Cow::Borrowed(name),
            None => Cow::Owned(format!("stage#{}", self.index)),
        }
    }

    pub(crate) fn transform(&self, input: Value) -> Outcome<Value> {
        (self.transform)(input, &*self.display_name())
    }

    pub(crate) fn recover(&self, failure: Failure) -> Outcome<Value> {
        (self.recover)(failure, &*self.display_name())
    }

    /// Read the latest result: a deep copy on success, the shared error otherwise.
    pub(crate) fn read_result(&self) -> Outcome<Value> {
        copy_outcome(&self.last_result, self.copy, &*self.display_name())
    }

    /// Move the latest success out, leaving a `Consumed` marker behind.
    pub(crate) fn take_result(&mut self) -> Outcome<Value> {
        if let Err(failure) = &self.last_result {
            return Err(failure.clone());
        }
        let consumed = Failure::from(StageError::Consumed {
            stage: self.display_name().into_owned(),
        });
        std::mem::replace(&mut self.last_result, Err(consumed))
    }
}
