//! # matscout-contracts
//!
//! Shared types, trace events, and error contracts for the matscout agent
//! harness.
//!
//! All crates in the workspace import from here. No business logic lives in
//! this crate, only data definitions and error types.

pub mod conversation;
pub mod error;
pub mod execution;
pub mod tool;
pub mod trace;
