//! ============================================================================
//! MNEMO-SERVER: HTTP front end for the memory gateway
//! ============================================================================

pub mod bootstrap;
pub mod config;
pub mod routes;

pub use config::{GatewayConfig, MemoryBackend};
pub use routes::{router, ApiError, AppState};
