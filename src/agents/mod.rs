//! LLM-backed role adapters for the convergence loop.
//!
//! Each adapter owns its system prompt and the parsing of the backend's
//! free-text replies into closed result types.

pub mod analyzer;
pub mod reviewer;

pub use analyzer::{Analyzer, AnalyzerContext};
pub use reviewer::Reviewer;
