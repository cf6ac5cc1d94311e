//! Common payloads and fixtures for tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{Chain, Failure, Outcome, Pipeline};

/// Payload carried by most multi-type chains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub text: String,
    pub num: u32,
    pub tags: Vec<String>,
}

impl Record {
    pub fn new(text: impl Into<String>, num: u32) -> Self {
        Self {
            text: text.into(),
            num,
            tags: Vec::new(),
        }
    }
}

/// Shared call counter for observing which stages ran.
#[derive(Debug, Clone, Default)]
pub struct Counter(Arc<AtomicU32>);

impl Counter {
    pub fn hit(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn get(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Stage that appends `suffix` to a string.
pub fn append(suffix: &'static str) -> impl Fn(String) -> Outcome<String> + Send + Sync + 'static {
    move |x| Ok(x + suffix)
}

/// Stage that always fails with `message`.
pub fn cut<T: 'static>(message: &'static str) -> impl Fn(T) -> Outcome<T> + Send + Sync + 'static {
    move |_| Err(Failure::new(message))
}

/// The canonical four-stage chain:
/// `start` -> ` 1st` -> failure `cut` -> ` 3rd` recovering to `recovered`.
pub fn recovering_chain() -> Chain<String, String> {
    Pipeline::from(append("start"))
        .joint(append(" 1st"))
        .joint(cut("cut"))
        .joint_recovering(append(" 3rd"), |_| Ok("recovered".to_string()))
        .build()
}
