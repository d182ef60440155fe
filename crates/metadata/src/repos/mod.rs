//! Repository traits for metadata operations.

pub mod admins;
pub mod certificates;

pub use admins::AdminRepo;
pub use certificates::CertificateRepo;
