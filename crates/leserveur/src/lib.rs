#![warn(missing_docs)]

//! leserveur - HTTP/WebSocket Surface
//!
//! *Le Serveur* (The Server) - Axum-based request/response and live
//! streaming surface for the LeMentor session orchestration engine.

/// Bearer-token identity verification.
pub mod auth;
/// Server configuration from environment variables.
pub mod config;
/// API error types.
pub mod error;
/// HTTP handlers for REST endpoints.
pub mod handlers;
/// API response types.
pub mod responses;
/// Server instance management.
pub mod server;
/// Live event streaming over WebSocket.
pub mod websocket;

pub use auth::{AuthError, IdentityVerifier, StaticTokenVerifier};
pub use config::ServeurConfig;
pub use error::{ApiError, ApiResult};
pub use server::LeMentorServer;
