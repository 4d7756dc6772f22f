//! Blueprint upload validation: format whitelist, magic-byte sniffing, and
//! content hashing.

use crate::error::{DetectError, Result};
use sha2::{Digest, Sha256};

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";
const JPEG_SIGNATURE: &[u8] = b"\xff\xd8\xff";
const PDF_SIGNATURE: &[u8] = b"%PDF";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlueprintFormat {
    Png,
    Jpg,
    Pdf,
}

impl BlueprintFormat {
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "jpg" | "jpeg" => Ok(Self::Jpg),
            "pdf" => Ok(Self::Pdf),
            other => Err(DetectError::InvalidFileFormat(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpg => "jpg",
            Self::Pdf => "pdf",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpg => "image/jpeg",
            Self::Pdf => "application/pdf",
        }
    }

    pub fn default_filename(&self) -> String {
        format!("blueprint.{}", self.as_str())
    }

    /// Check that the file content actually starts with this format's
    /// signature. Declared formats must match the bytes, not just the name.
    pub fn sniff(&self, content: &[u8]) -> Result<()> {
        let matches = match self {
            Self::Png => content.starts_with(PNG_SIGNATURE),
            Self::Jpg => content.starts_with(JPEG_SIGNATURE),
            Self::Pdf => content.starts_with(PDF_SIGNATURE),
        };
        if matches {
            Ok(())
        } else {
            Err(DetectError::InvalidFileFormat(self.as_str().to_string()))
        }
    }
}

impl std::fmt::Display for BlueprintFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SHA-256 content hash, hex-encoded. Keys the preview cache.
pub fn content_hash(content: &[u8]) -> String {
    use std::fmt::Write as _;
    let digest = Sha256::digest(content);
    let mut out = String::with_capacity(64);
    for byte in digest {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Validate size and signature of an upload, returning its content hash.
pub fn validate_upload(
    content: &[u8],
    format: BlueprintFormat,
    max_bytes: usize,
) -> Result<String> {
    if content.len() > max_bytes {
        return Err(DetectError::FileTooLarge {
            size: content.len(),
            max: max_bytes,
        });
    }
    format.sniff(content)?;
    Ok(content_hash(content))
}
