//! Shared infrastructure for the HackerNews daily digest engine.
//!
//! This crate holds everything that is not specific to the digest pipeline's
//! business logic: health/liveness reporting, Prometheus metrics wiring, the
//! canonical data model, a budgeted HTTP fetcher, a per-provider concurrency
//! gate, a retry policy, and a chat-completion LLM client.

pub mod concurrency;
pub mod error;
pub mod fetch;
pub mod health;
pub mod llm;
pub mod metrics;
pub mod models;
pub mod retry;
