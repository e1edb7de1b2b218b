//! certcli command-line client library
//!
//! Command handlers and configuration used by the `certcli` binary.

pub mod commands;
pub mod config;
