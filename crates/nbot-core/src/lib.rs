//! Core domain + application logic for the notification bot.
//!
//! This crate is intentionally framework-agnostic. Telegram lives behind the
//! messaging port implemented in the adapter crate.

pub mod app;
pub mod broadcast;
pub mod commands;
pub mod config;
pub mod domain;
pub mod errors;
pub mod journal;
pub mod logging;
pub mod messaging;
pub mod registry;
pub mod security;

pub use errors::{Error, Result, SendError};
