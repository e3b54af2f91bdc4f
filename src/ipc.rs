//! Daemon control plane: unix-socket JSON ops and the gesture pipeline.

pub mod dispatch;
pub mod pipeline;
pub mod runtime;
pub mod server;

pub use server::{client_request, run_daemon};
