use std::collections::HashMap;

use axum::extract::multipart::MultipartError;
use axum::extract::Multipart;
use axum::http::StatusCode;

use parlor_shared::errors::{AppError, AppResult, ErrorCode};
use parlor_shared::types::RequestContext;

use crate::models::{ContentKind, MessageContent};
use crate::AppState;

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Multipart body split into text fields and named file parts.
#[derive(Debug, Default)]
pub struct FormData {
    fields: HashMap<String, String>,
    files: HashMap<String, UploadedFile>,
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::new(ErrorCode::PayloadTooLarge, "upload exceeds the size limit")
    } else {
        AppError::new(ErrorCode::BadRequest, format!("failed to read multipart: {e}"))
    }
}

impl FormData {
    pub async fn read(mut multipart: Multipart) -> AppResult<Self> {
        let mut form = FormData::default();

        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let bytes = field.bytes().await.map_err(multipart_error)?;
                    // browsers send an empty part when no file was picked
                    if !file_name.is_empty() && !bytes.is_empty() {
                        form.files.insert(name, UploadedFile { file_name, bytes: bytes.to_vec() });
                    }
                }
                None => {
                    let value = field.text().await.map_err(multipart_error)?;
                    form.fields.insert(name, value);
                }
            }
        }

        Ok(form)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn take_file(&mut self, name: &str) -> Option<UploadedFile> {
        self.files.remove(name)
    }

    /// A text field that must be present and non-blank.
    pub fn required(&self, name: &str) -> AppResult<&str> {
        self.text(name)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AppError::new(ErrorCode::ValidationError, format!("{name} is required")))
    }

    /// Message body: an uploaded `file`, or `content` with an optional `content_type`.
    pub async fn message_content(
        &mut self,
        state: &AppState,
        ctx: &RequestContext,
        owner_id: &str,
    ) -> AppResult<MessageContent> {
        if let Some(file) = self.take_file("file") {
            let blob = state.storage.store(ctx, file.bytes, &file.file_name, owner_id).await?;
            return Ok(MessageContent::new(blob.kind, blob.path));
        }

        let kind = match self.text("content_type").map(str::trim).filter(|v| !v.is_empty()) {
            Some(raw) => raw
                .parse::<ContentKind>()
                .map_err(|e| AppError::new(ErrorCode::ValidationError, e))?,
            None => ContentKind::Text,
        };
        if kind.is_media() {
            return Err(AppError::new(ErrorCode::ValidationError, "photo and gif messages require a file"));
        }

        Ok(MessageContent::new(kind, self.required("content")?))
    }

    /// Store the named image part, if one was sent, and return its public path.
    pub async fn store_image(
        &mut self,
        name: &str,
        state: &AppState,
        ctx: &RequestContext,
        owner_id: &str,
    ) -> AppResult<Option<String>> {
        match self.take_file(name) {
            Some(file) => {
                let blob = state.storage.store(ctx, file.bytes, &file.file_name, owner_id).await?;
                Ok(Some(blob.path))
            }
            None => Ok(None),
        }
    }
}
