//! Consolidated integration tests for cluster-license-core.
//!
//! One test binary instead of one per file keeps link times down and lets
//! the modules share fixtures.

mod controller_loop;
mod reconcile;
mod scenarios;
mod support;
