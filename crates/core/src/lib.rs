//! Core domain types and shared logic for the certfolio backend.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Configuration for every layer
//! - Flexible certificate date parsing
//! - Attachment media kinds and their allow-sets
//! - Field validation for certificate metadata and admin identities

pub mod config;
pub mod date;
pub mod error;
pub mod media;
pub mod validate;

pub use date::{format_timestamp, parse_flexible_date};
pub use error::{Error, Result};
pub use media::AttachmentKind;

/// Maximum attachment size: 10 MiB
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// Default bearer credential lifetime in minutes (12 hours).
pub const DEFAULT_TOKEN_EXPIRE_MINUTES: u64 = 720;

/// Key namespace for certificate attachments inside the object store.
pub const ATTACHMENT_NAMESPACE: &str = "certificates";
