//! # Command Handlers
//!
//! This module contains the command handlers for the cypressctl CLI
//! application.
//!
//! ## Structure
//!
//! - `fixtures` - One handler per control-channel operation
//! - `errors` - User-facing error messages and hints
//! - `shared` - Argument validation and request execution helpers

pub mod errors;
pub mod fixtures;
pub mod shared;

pub use fixtures::{USAGE, handle_fixture_command};
