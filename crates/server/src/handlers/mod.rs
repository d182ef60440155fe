//! HTTP request handlers.

pub mod attachments;
pub mod auth;
pub mod certificates;
pub mod health;

pub use attachments::*;
pub use auth::*;
pub use certificates::*;
pub use health::*;
