use crate::error::{AppError, AppResult};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const MAX_ATTACHMENT_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Pdf,
    Jpeg,
    Png,
}

impl MediaType {
    pub fn parse(content_type: &str) -> Option<Self> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "application/pdf" => Some(Self::Pdf),
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            _ => None,
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
        }
    }

    fn extension(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Jpeg => "jpg",
            Self::Png => "png",
        }
    }

    fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "pdf" => Some(Self::Pdf),
            "jpg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            _ => None,
        }
    }

    fn magic(self) -> &'static [u8] {
        match self {
            Self::Pdf => b"%PDF-",
            Self::Jpeg => &[0xFF, 0xD8, 0xFF],
            Self::Png => &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub reference: String,
    pub media_type: MediaType,
    pub size_bytes: usize,
    pub sha256: String,
}

/// Opaque byte storage for attachments. References are never file paths.
pub trait BlobStore {
    fn store(&self, bytes: &[u8], content_type: &str) -> AppResult<StoredBlob>;
    fn fetch(&self, reference: &str) -> AppResult<Vec<u8>>;
    /// Drops a blob whose metadata never made it into the database.
    fn discard(&self, reference: &str) -> AppResult<()>;
}

/// Checks applied at the boundary before any bytes are written.
pub fn admit(bytes: &[u8], content_type: &str) -> AppResult<MediaType> {
    let media_type = MediaType::parse(content_type)
        .ok_or_else(|| AppError::UnsupportedMediaType(content_type.to_string()))?;
    if bytes.len() > MAX_ATTACHMENT_BYTES {
        return Err(AppError::PayloadTooLarge {
            size: bytes.len(),
            limit: MAX_ATTACHMENT_BYTES,
        });
    }
    if !bytes.starts_with(media_type.magic()) {
        return Err(AppError::UnsupportedMediaType(format!(
            "content does not look like {}",
            media_type.content_type()
        )));
    }
    Ok(media_type)
}

/// Accepts only references this store could have produced: `<uuid>.<ext>`.
fn parse_reference(reference: &str) -> Option<MediaType> {
    let (stem, ext) = reference.split_once('.')?;
    let id = Uuid::parse_str(stem).ok()?;
    if id.hyphenated().to_string() != stem {
        return None;
    }
    MediaType::from_extension(ext)
}

pub fn is_valid_reference(reference: &str) -> bool {
    parse_reference(reference).is_some()
}

/// Write-then-rename so a crash never leaves a half-written blob under a real
/// name. The temp file is removed if either step fails.
fn write_atomically(tmp: &Path, dst: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let written = std::fs::write(tmp, bytes).and_then(|()| std::fs::rename(tmp, dst));
    if written.is_err() {
        let _ = std::fs::remove_file(tmp);
    }
    written
}

pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn open(root: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }
}

impl BlobStore for FsBlobStore {
    fn store(&self, bytes: &[u8], content_type: &str) -> AppResult<StoredBlob> {
        let media_type = admit(bytes, content_type)?;
        let reference = format!("{}.{}", Uuid::new_v4(), media_type.extension());
        let tmp = self.root.join(format!("{reference}.partial"));
        write_atomically(&tmp, &self.root.join(&reference), bytes)?;

        Ok(StoredBlob {
            reference,
            media_type,
            size_bytes: bytes.len(),
            sha256: format!("{:x}", Sha256::digest(bytes)),
        })
    }

    fn fetch(&self, reference: &str) -> AppResult<Vec<u8>> {
        if !is_valid_reference(reference) {
            return Err(AppError::NotFound("attachment"));
        }
        match std::fs::read(self.root.join(reference)) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AppError::NotFound("attachment"))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn discard(&self, reference: &str) -> AppResult<()> {
        if !is_valid_reference(reference) {
            return Ok(());
        }
        match std::fs::remove_file(self.root.join(reference)) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}
