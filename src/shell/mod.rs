//! Secure shell boundary: command validation and contained execution.

pub mod executor;
pub mod validator;

pub use executor::{ShellExecutor, truncate_output};
pub use validator::{CommandValidator, Verdict};
