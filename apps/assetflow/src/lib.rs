//! # assetflow
//!
//! Command-line front end for `assetflow-core`: project files, status
//! files and the commands that evaluate ticks against a state database.

pub mod cli;
pub mod config;
pub mod status;
