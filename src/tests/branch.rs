//! Branch embedding tests.
//!
//! A branch is a complete chain run as one stage of its parent.

use crate::{Pipeline, StageKind, StageStatus};

use super::common::{append, cut, Counter, Record};

fn bump(label: &'static str) -> impl Fn(Record) -> crate::Outcome<Record> + Send + Sync + 'static {
    move |r| {
        Ok(Record {
            text: format!("{} {}", r.text, label),
            num: r.num + 2,
            tags: r.tags,
        })
    }
}

/// Test that a branch's terminal value becomes the parent stage's value.
///
/// Verifies:
/// - Every stage of the sub-chain runs in order
/// - Stages after the branch see the sub-chain's output
#[test]
fn branch_result_flows_into_parent() {
    let sub = Pipeline::from(bump("4th(Inject1)"))
        .joint(bump("4th(Inject2)"))
        .joint(bump("4th(Inject3)"))
        .build();

    let mut chain = Pipeline::from(append("start"))
        .joint(|x| Ok(Record::new(x + " 3rd", 1)))
        .branch(sub)
        .joint(bump("5th"))
        .build();

    let record = chain.stream(String::new()).expect("chain should succeed");
    assert_eq!(
        record.text,
        "start 3rd 4th(Inject1) 4th(Inject2) 4th(Inject3) 5th"
    );
    assert_eq!(record.num, 9);
    assert_eq!(
        chain.last_trace().stage(2).map(|t| t.kind),
        Some(StageKind::Branch)
    );
}

/// Test that a branch may change the payload type.
#[test]
fn branch_changes_type() {
    let sub = Pipeline::from(|r: Record| Ok(r.num))
        .joint(|n| Ok(n * 100))
        .build();

    let mut chain = Pipeline::from(|n: u32| Ok(Record::new("r", n)))
        .inject(sub)
        .build();

    assert_eq!(chain.stream(3), Ok(300));
}

/// Test that a failure inside a branch becomes the parent stage's failure,
/// and that the parent can still recover from it.
#[test]
fn branch_failure_reaches_parent() {
    let sub = Pipeline::from(bump("inner"))
        .joint(cut("inner cut"))
        .build();

    let mut chain = Pipeline::from(|n: u32| Ok(Record::new("r", n)))
        .branch(sub)
        .joint_recovering(|r: Record| Ok(r.num), |_| Ok(Record::new("fallback", 0)))
        .build();

    assert_eq!(chain.stream(1), Ok(0));
    assert_eq!(
        chain.last_trace().statuses(),
        vec![
            StageStatus::Transformed,
            StageStatus::Failed,
            StageStatus::Recovered,
        ]
    );
}

/// Test that a branch heals failures with its own recovery functions.
#[test]
fn branch_uses_its_own_recovery() {
    let sub = Pipeline::from(cut::<Record>("inner cut"))
        .joint_recovering(bump("healed"), |_| Ok(Record::new("inner", 0)))
        .build();

    let mut chain = Pipeline::from(|n: u32| Ok(Record::new("outer", n)))
        .branch(sub)
        .build();

    let record = chain.stream(5).expect("branch should heal");
    assert_eq!(record.text, "inner healed");
    assert_eq!(record.num, 2);
}

/// Test that a failure arriving at a branch skips the sub-chain.
#[test]
fn failure_arriving_at_branch_skips_sub_chain() {
    let calls = Counter::default();
    let on_call = calls.clone();

    let sub = Pipeline::from(move |r: Record| {
        on_call.hit();
        Ok(r)
    })
    .build();

    let mut chain = Pipeline::from(cut::<Record>("outer cut"))
        .branch(sub)
        .build();

    let err = chain.stream(Record::new("x", 0)).unwrap_err();
    assert_eq!(err.message(), "outer cut");
    assert_eq!(calls.get(), 0);
}

/// Test that edits made inside a branch never leak into the parent.
///
/// Verifies:
/// - The stage before the branch keeps its value during and after the run
/// - The branch's own result carries the edit
#[test]
fn branch_mutation_is_isolated() {
    let sub = Pipeline::from(|mut r: Record| {
        r.tags.push("touched".into());
        r.text.push_str(" (edited)");
        Ok(r)
    })
    .build();

    let builder = Pipeline::from(|n: u32| Ok(Record::new("origin", n)));
    let before = builder.tail();
    let builder = builder.branch(sub);
    let branched = builder.tail();
    let mut chain = builder
        .window(|r| assert_eq!(r.tags, vec!["touched".to_string()]))
        .build();

    chain.stream(7).expect("chain should succeed");

    assert_eq!(chain.result_at(before), Ok(Record::new("origin", 7)));

    let edited = chain.result_at(branched).expect("branch should succeed");
    assert_eq!(edited.text, "origin (edited)");
    assert_eq!(edited.tags, vec!["touched".to_string()]);
}

/// Test that a fail-fast branch keeps its mode inside a run-all parent.
#[test]
fn branch_keeps_its_execution_mode() {
    let inner_calls = Counter::default();
    let on_inner = inner_calls.clone();

    let sub = Pipeline::from(cut::<u32>("inner cut"))
        .joint_recovering(
            move |n: u32| {
                on_inner.hit();
                Ok(n)
            },
            |_| Ok(0),
        )
        .fail_fast()
        .build();

    let mut chain = Pipeline::from(|n: u32| Ok(n))
        .branch(sub)
        .joint_recovering(|n: u32| Ok(n + 1), |_| Ok(100))
        .build();

    assert_eq!(chain.stream(1), Ok(101));
    assert_eq!(inner_calls.get(), 0);
}
