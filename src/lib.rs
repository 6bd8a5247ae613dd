//! Financial Query Router
//!
//! Turns a free-text financial question into one validated tool call
//! against an external tool server:
//! - Discovers the tool set once and derives capability tags
//! - Classifies with a language model, falling back to keyword rules
//! - Resolves missing parameters (symbol, count, query) in tiers
//! - Executes with an ordered fallback chain over alternate tools
//! - Tags the result with a presentation category
//!
//! PIPELINE:
//! DISCOVER → CLASSIFY → RESOLVE → EXECUTE → FALLBACK? → TAG

pub mod agent;
pub mod api;
pub mod classifier;
pub mod config;
pub mod error;
pub mod execution;
pub mod llm;
pub mod models;
pub mod presentation;
pub mod protocol;
pub mod resolver;
pub mod suggest;
pub mod tools;

#[cfg(test)]
mod test_support;

pub use error::{Result, RouterError};

// Re-export common types
pub use models::*;
