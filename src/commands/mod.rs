//! CLI command implementations.

pub mod categorize;
pub mod command;
pub mod common;
pub mod info;
