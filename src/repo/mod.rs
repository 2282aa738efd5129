//! Remote repository acquisition.

pub mod cloner;

pub use cloner::{clone_repository, CloneOptions};
