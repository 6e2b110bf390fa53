//! Core contracts for the palantir bridge: the cross-context event model,
//! call outcomes, and the durable session-store contract.
//! This crate is intentionally small to keep dependency surface minimal.

pub mod events;
pub mod messages;
pub mod outcome;
pub mod store;
