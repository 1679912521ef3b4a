//! CLI commands

pub mod plan;
