//! Multipart staging.
//!
//! File fields are streamed to the temp directory as
//! `<field>-<unix-millis>-<8 alphanumerics>.<ext>`. Every staged file is owned by a
//! `StagedFile` guard that deletes it when dropped, so a request leaves nothing
//! behind whether it succeeds or fails.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::multipart::{Field, Multipart, MultipartError};
use rand::Rng;
use tokio::io::AsyncWriteExt;

const IMAGE_EXTENSIONS: &[&str] = &["jpeg", "jpg", "png", "webp", "gif"];
const IMAGE_MIME_TYPES: &[&str] = &["image/jpeg", "image/jpg", "image/png", "image/webp", "image/gif"];

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "mov", "flv", "webm", "avi", "wmv"];
const VIDEO_MIME_TYPES: &[&str] = &[
    "video/mp4",
    "video/x-matroska",
    "video/quicktime",
    "video/x-flv",
    "video/webm",
    "video/x-msvideo",
    "video/avi",
    "video/x-ms-wmv",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Image,
    Video,
}

impl FileKind {
    /// Both the file name's extension and the declared MIME type must match.
    pub fn accepts(self, file_name: &str, content_type: Option<&str>) -> bool {
        let (extensions, mime_types) = match self {
            FileKind::Image => (IMAGE_EXTENSIONS, IMAGE_MIME_TYPES),
            FileKind::Video => (VIDEO_EXTENSIONS, VIDEO_MIME_TYPES),
        };

        let extension = file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase());
        let extension_ok = extension.is_some_and(|ext| extensions.contains(&ext.as_str()));

        let mime_ok = content_type.is_some_and(|mime| {
            let essence = mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
            mime_types.contains(&essence.as_str())
        });

        extension_ok && mime_ok
    }

    fn label(self) -> &'static str {
        match self {
            FileKind::Image => "Only JPEG, PNG, WEBP and GIF images are allowed",
            FileKind::Video => "Only MP4, MKV, MOV, FLV, WEBM, AVI and WMV videos are allowed",
        }
    }
}

/// A file field the form accepts. At most one file per field.
#[derive(Debug, Clone, Copy)]
pub struct FileField {
    pub name: &'static str,
    pub kind: FileKind,
}

impl FileField {
    pub const fn image(name: &'static str) -> Self {
        Self {
            name,
            kind: FileKind::Image,
        }
    }

    pub const fn video(name: &'static str) -> Self {
        Self {
            name,
            kind: FileKind::Video,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Malformed multipart body: {0}")]
    Multipart(#[from] MultipartError),
    #[error("Unexpected file field: {0}")]
    UnexpectedFile(String),
    #[error("Only one file is allowed for field: {0}")]
    TooManyFiles(String),
    #[error("{message} ({field})")]
    UnsupportedType { field: String, message: &'static str },
    #[error("Failed to stage upload: {0}")]
    Io(#[from] std::io::Error),
}

impl UploadError {
    /// Whether the client is at fault.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, UploadError::Io(_))
    }
}

/// A file written to the temp directory. Removed on drop.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove staged upload");
            }
        }
    }
}

/// Text fields and staged files of one multipart request.
#[derive(Debug, Default)]
pub struct UploadForm {
    texts: HashMap<String, String>,
    files: HashMap<String, StagedFile>,
}

impl UploadForm {
    /// Read the whole body. Files are staged under `temp_dir`; file fields not
    /// listed in `accepted` are rejected.
    pub async fn read(
        mut multipart: Multipart,
        temp_dir: &Path,
        accepted: &[FileField],
    ) -> Result<Self, UploadError> {
        let mut form = UploadForm::default();

        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            let Some(file_name) = field.file_name().map(str::to_string) else {
                let value = field.text().await?;
                form.texts.insert(name, value);
                continue;
            };

            let rule = accepted
                .iter()
                .find(|rule| rule.name == name)
                .ok_or_else(|| UploadError::UnexpectedFile(name.clone()))?;

            if form.files.contains_key(&name) {
                return Err(UploadError::TooManyFiles(name));
            }

            if !rule.kind.accepts(&file_name, field.content_type()) {
                return Err(UploadError::UnsupportedType {
                    field: name,
                    message: rule.kind.label(),
                });
            }

            let staged = stage_field(field, temp_dir, &name, &file_name).await?;
            form.files.insert(name, staged);
        }

        Ok(form)
    }

    /// Trimmed text value; empty values read as absent.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.texts
            .get(name)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    pub fn take_file(&mut self, name: &str) -> Option<StagedFile> {
        self.files.remove(name)
    }
}

/// `<field>-<unix-millis>-<8 alphanumerics>`
pub fn staged_file_name(field: &str) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let suffix: String = rand::rng()
        .sample_iter(&rand::distr::Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    format!("{}-{}-{}", field, millis, suffix)
}

async fn stage_field(
    mut field: Field<'_>,
    temp_dir: &Path,
    name: &str,
    original_name: &str,
) -> Result<StagedFile, UploadError> {
    tokio::fs::create_dir_all(temp_dir).await?;

    // Keep the extension so media backends can infer the type
    let mut file_name = staged_file_name(name);
    if let Some((_, ext)) = original_name.rsplit_once('.') {
        file_name = format!("{}.{}", file_name, ext.to_ascii_lowercase());
    }

    // The guard exists before the first byte is written
    let staged = StagedFile {
        path: temp_dir.join(file_name),
    };

    let mut file = tokio::fs::File::create(&staged.path).await?;
    while let Some(chunk) = field.chunk().await? {
        file.write_all(&chunk).await?;
    }
    file.flush().await?;

    Ok(staged)
}
