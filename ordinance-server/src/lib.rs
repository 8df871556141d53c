//! `ordinance-server` exposes an [`ordinance_rag::OrdinanceRag`] over HTTP and
//! provides the wiring used by the `ordinance` command line.
//! Streamed answers are sent as newline-delimited JSON.

pub mod app;
pub mod config;
pub mod server;
pub mod telemetry;

pub use app::build_rag;
pub use config::ServerConfig;
pub use server::{ApiError, AppState, app_router, run_server};
pub use telemetry::init_telemetry;
