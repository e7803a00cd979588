//! HTTP front end for the `mentor_identity` verification and credential
//! services.
//!
//! The binary in `main.rs` loads [`config::ServerConfig`], wires the stores
//! and providers it names into [`api::AppState`] and serves
//! [`api::create_router`].

pub mod api;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod wiring;
