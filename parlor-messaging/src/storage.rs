use std::path::{Path, PathBuf};

use uuid::Uuid;

use parlor_shared::clients::minio::MinioClient;
use parlor_shared::errors::{AppError, AppResult, ErrorCode};
use parlor_shared::types::RequestContext;

use crate::models::ContentKind;

/// Public prefix local uploads are served under.
pub const UPLOADS_ROUTE: &str = "/uploads";

/// A file accepted by the store: what kind of content it is and where it lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub kind: ContentKind,
    pub path: String,
}

/// Media classification derived from the uploaded file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaType {
    pub kind: ContentKind,
    pub extension: &'static str,
    pub mime: &'static str,
}

/// Only still images and gifs are accepted; the extension decides which.
pub fn classify(original_name: &str) -> AppResult<MediaType> {
    let extension = Path::new(original_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let media = match extension.as_str() {
        "jpg" | "jpeg" => MediaType { kind: ContentKind::Photo, extension: "jpg", mime: "image/jpeg" },
        "png" => MediaType { kind: ContentKind::Photo, extension: "png", mime: "image/png" },
        "gif" => MediaType { kind: ContentKind::Gif, extension: "gif", mime: "image/gif" },
        _ => {
            return Err(AppError::new(
                ErrorCode::UnsupportedMediaType,
                "unsupported file type, accepted: jpg, jpeg, png, gif",
            ))
        }
    };
    Ok(media)
}

pub enum BlobStore {
    Local { root: PathBuf },
    Minio(MinioClient),
}

impl BlobStore {
    pub fn local(root: impl Into<PathBuf>) -> Self {
        Self::Local { root: root.into() }
    }

    /// Directory to serve under [`UPLOADS_ROUTE`], if this backend keeps files locally.
    pub fn local_root(&self) -> Option<&Path> {
        match self {
            Self::Local { root } => Some(root.as_path()),
            Self::Minio(_) => None,
        }
    }

    pub async fn store(
        &self,
        ctx: &RequestContext,
        bytes: Vec<u8>,
        original_name: &str,
        owner_id: &str,
    ) -> AppResult<StoredBlob> {
        let media = classify(original_name)?;
        let file_name = format!("{}_{}.{}", owner_id, Uuid::new_v4().simple(), media.extension);
        let size = bytes.len();

        let path = match self {
            Self::Local { root } => {
                tokio::fs::create_dir_all(root)
                    .await
                    .map_err(|e| AppError::new(ErrorCode::StorageError, format!("failed to prepare upload directory: {e}")))?;
                tokio::fs::write(root.join(&file_name), bytes)
                    .await
                    .map_err(|e| AppError::new(ErrorCode::StorageError, format!("failed to save file: {e}")))?;
                format!("{UPLOADS_ROUTE}/{file_name}")
            }
            Self::Minio(client) => {
                let key = format!("uploads/{file_name}");
                client
                    .upload(&key, bytes, media.mime)
                    .await
                    .map_err(|e| AppError::new(ErrorCode::StorageError, e))?
            }
        };

        tracing::info!(req_id = %ctx.request_id, owner = owner_id, kind = %media.kind, size, path = %path, "file stored");
        Ok(StoredBlob { kind: media.kind, path })
    }
}
