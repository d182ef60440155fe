//! Attachment media kinds.
//!
//! Certificates are stored as PDFs or raster images. A declared content type
//! and a filename extension are each checked against their own allow-set;
//! the two are not cross-validated against each other.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Allowed attachment content types.
pub const ALLOWED_CONTENT_TYPES: &[&str] =
    &["application/pdf", "image/jpeg", "image/png", "image/webp"];

/// Allowed attachment filename extensions (lowercase, with leading dot).
pub const ALLOWED_EXTENSIONS: &[&str] = &[".pdf", ".jpg", ".jpeg", ".png", ".webp"];

/// A supported attachment format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Pdf,
    Jpeg,
    Png,
    Webp,
}

impl AttachmentKind {
    /// Resolve a declared content type (parameters such as `; charset=` are ignored).
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "application/pdf" => Some(Self::Pdf),
            "image/jpeg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            "image/webp" => Some(Self::Webp),
            _ => None,
        }
    }

    /// Resolve a lowercase extension with its leading dot.
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension {
            ".pdf" => Some(Self::Pdf),
            ".jpg" | ".jpeg" => Some(Self::Jpeg),
            ".png" => Some(Self::Png),
            ".webp" => Some(Self::Webp),
            _ => None,
        }
    }

    /// Canonical MIME type.
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
        }
    }
}

impl fmt::Display for AttachmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.content_type())
    }
}

/// Extract the lowercased extension (with dot) from a client-supplied filename.
///
/// Only the final path component is considered, so `../../x.png` yields `.png`.
/// Returns `None` for names without an extension or dotfiles like `.png`.
pub fn extension_of(filename: &str) -> Option<String> {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let dot = name.rfind('.')?;
    if dot == 0 || dot == name.len() - 1 {
        return None;
    }
    Some(name[dot..].to_ascii_lowercase())
}

/// Best-effort content type for serving a stored key.
pub fn content_type_for_key(key: &str) -> &'static str {
    extension_of(key)
        .and_then(|ext| AttachmentKind::from_extension(&ext))
        .map(|kind| kind.content_type())
        .unwrap_or("application/octet-stream")
}
