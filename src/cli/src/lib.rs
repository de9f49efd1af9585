//! A3S Sign CLI - sign OCI artifacts.

pub mod commands;
pub mod output;
