//! Tests for chain construction and traversal.
//!
//! ## Test Organization
//!
//! - `common`: Shared payloads, counters and chain fixtures
//! - `basic`: Success paths and stage composition
//! - `recovery`: Failure propagation and local recovery
//! - `branch`: Embedded sub-chains
//! - `isolation`: Deep-copy reads and shared failures
//! - `fail_fast`: The stop-on-first-failure mode
//! - `properties`: Property tests over generated chains
//!
//! ## Fixtures
//!
//! Most tests thread a `String` or a `Record { text, num }` through the
//! chain, appending a marker per stage so the order of execution is visible
//! in the terminal value.

mod common;

mod branch;
