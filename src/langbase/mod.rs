//! Langbase Pipes client and wire types.
//!
//! The search talks to the model through two pipes (thought generation and
//! decision). This module owns the HTTP transport and its retry policy.

mod client;
mod types;

#[cfg(test)]
#[path = "types_tests.rs"]
mod types_tests;

pub use client::LangbaseClient;
pub use types::*;
