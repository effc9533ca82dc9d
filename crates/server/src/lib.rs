//! HTTP front end for verifyd: CLI flags, logging setup, the response
//! envelope and the axum router.

pub mod cli;
pub mod http;
pub mod logging;
pub mod output;

pub use http::{AppState, router, serve};
