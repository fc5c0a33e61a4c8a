//! Subagent: run autonomous coding agents as supervised subprocesses.
//!
//! A request becomes an [`agent::task::AgentTask`], which the
//! [`dispatch::Dispatcher`] carries through environment construction
//! ([`env`]), session resolution ([`session`]), command building and process
//! supervision ([`agent`]).

pub mod agent;
pub mod cli;
pub mod commands;
pub mod config;
pub mod dispatch;
pub mod env;
pub mod error;
pub mod exit_codes;
pub mod session;
