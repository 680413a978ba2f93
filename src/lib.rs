//! Parallel test runner for libtest binaries.
//!
//! Fixtures marked parallelizable are spread across a pool of worker
//! threads; everything else runs afterwards, one fixture at a time, in
//! discovery order.

pub mod cli;
pub mod config;
pub mod emit;
pub mod isolation;
pub mod logging;
pub mod runner;
