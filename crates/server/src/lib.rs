//! HTTP API server for the certfolio certificate portfolio.
//!
//! This crate provides:
//! - Login and bearer credential validation (the auth gateway)
//! - Certificate create, update, file replacement and delete
//! - Public listing, lookup and attachment serving
//! - Admin bootstrap, rate limiting and Prometheus metrics

pub mod auth;
pub mod bootstrap;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod ratelimit;
pub mod routes;
pub mod service;
pub mod state;

pub use auth::{AuthGateway, TraceId};
pub use error::ApiError;
pub use ratelimit::RateLimitState;
pub use routes::create_router;
pub use service::CertificateService;
pub use state::AppState;
