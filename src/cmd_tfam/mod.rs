//! Subcommand modules for the `tfam` binary.

pub mod assign;
pub mod build;
pub mod meta;
pub mod pvalue;
pub mod related;
pub mod remove;
pub mod show;
pub mod split;
