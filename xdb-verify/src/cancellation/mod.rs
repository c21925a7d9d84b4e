//! Operator-initiated cancellation.
//!
//! This module provides:
//! - CancellationToken shared by the signal handler and every running tool
//! - Signal wiring that turns SIGINT/SIGTERM into a cancellation

mod signal;
mod token;

pub use signal::{cancel_on_shutdown_signal, shutdown_signal};
pub use token::CancellationToken;
