use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

/// Upload formats the service accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Jpeg,
    Png,
}

impl MediaType {
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        match content_type.split(';').next().unwrap_or("").trim() {
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            _ => None,
        }
    }

    pub fn from_file_name(file_name: &str) -> Option<Self> {
        let ext = Path::new(file_name).extension()?.to_str()?;
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            _ => None,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
        }
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("failed to write image to storage: {0}")]
    Write(#[from] std::io::Error),
}

/// One image persisted to the upload directory.
#[derive(Debug, Clone)]
pub struct StoredImage {
    pub file_name: String,
    pub path: PathBuf,
}

/// Flat directory holding uploaded and annotated images. Concurrent requests
/// never contend: collision avoidance is by unique naming, not locking.
#[derive(Debug)]
pub struct ImageStore {
    root: PathBuf,
}

impl ImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub async fn store(
        &self,
        original_name: &str,
        prefix: &str,
        media_type: MediaType,
        bytes: &[u8],
    ) -> Result<StoredImage, StorageError> {
        let file_name = unique_name(original_name, prefix, media_type);
        let path = self.root.join(&file_name);
        tokio::fs::write(&path, bytes).await?;
        Ok(StoredImage { file_name, path })
    }

    /// Map a served file name back to its path. Names with separators or
    /// parent references do not resolve, so the flat namespace cannot be
    /// escaped.
    pub fn resolve(&self, file_name: &str) -> Option<PathBuf> {
        if file_name.is_empty() || file_name.contains(['/', '\\']) || file_name.contains("..") {
            return None;
        }
        Some(self.root.join(file_name))
    }
}

/// `{prefix}{stem}_{unix_millis}_{token}.{ext}` from a client-supplied name.
fn unique_name(original_name: &str, prefix: &str, media_type: MediaType) -> String {
    let stem = Path::new(original_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .map(sanitize_stem)
        .unwrap_or_else(|| "upload".to_string());

    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();

    let token = Uuid::new_v4().simple().to_string();

    format!(
        "{}{}_{}_{}.{}",
        prefix,
        stem,
        millis,
        &token[..8],
        media_type.extension()
    )
}

fn sanitize_stem(stem: &str) -> String {
    let cleaned: String = stem
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}
