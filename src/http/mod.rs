//! HTTP API server for local control
//!
//! This module provides a REST API for toggling the voice session:
//! - POST /voice/start - Start the session
//! - POST /voice/stop - Stop it and return final stats
//! - GET /voice/status - Query session status
//! - GET /voice/transcript - Get accumulated transcript
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use handlers::shutdown_session;
pub use routes::create_router;
pub use state::{AppState, SessionTemplate};
