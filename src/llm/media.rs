use std::io::Cursor;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("Failed to read image {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{} is not an image (detected {mime_type})", path.display())]
    NotAnImage { path: PathBuf, mime_type: String },
}

pub fn detect_mime_type(data: &[u8]) -> Option<String> {
    if data.len() > 12 {
        let ftyp = &data[4..12];
        if ftyp.starts_with(b"ftyp") {
            let brand = &ftyp[4..8];
            if brand == b"heic" || brand == b"heif" || brand == b"hevc" {
                return Some("image/heic".to_string());
            }
        }
    }

    infer::get(data).map(|kind| kind.mime_type().to_string())
}

fn mime_from_extension(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "heic" => Some("image/heic"),
        "heif" => Some("image/heif"),
        "bmp" => Some("image/bmp"),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInput {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub display_name: Option<String>,
}

impl ImageInput {
    pub fn new(bytes: Vec<u8>, mime_type: String, display_name: Option<String>) -> Self {
        Self {
            bytes,
            mime_type,
            display_name,
        }
    }

    pub fn label(&self, index: usize) -> String {
        self.display_name
            .clone()
            .unwrap_or_else(|| format!("image-{}", index + 1))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePreview {
    pub display_name: String,
    pub mime_type: String,
    pub byte_len: usize,
    pub dimensions: Option<(u32, u32)>,
}

impl ImagePreview {
    pub fn from_input(index: usize, input: &ImageInput) -> Self {
        ImagePreview {
            display_name: input.label(index),
            mime_type: input.mime_type.clone(),
            byte_len: input.bytes.len(),
            dimensions: read_dimensions(&input.bytes),
        }
    }

    pub fn describe(&self) -> String {
        let size = match self.dimensions {
            Some((width, height)) => format!("{width}x{height}"),
            None => "unknown size".to_string(),
        };
        format!(
            "{} ({}, {}, {} bytes)",
            self.display_name, self.mime_type, size, self.byte_len
        )
    }
}

fn read_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    let reader = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?;
    match reader.into_dimensions() {
        Ok(dimensions) => Some(dimensions),
        Err(err) => {
            debug!("Could not read image dimensions: {err}");
            None
        }
    }
}

pub async fn load_image_file(path: &Path) -> Result<ImageInput, MediaError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| MediaError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mime_type = detect_mime_type(&bytes)
        .or_else(|| mime_from_extension(path).map(str::to_string))
        .unwrap_or_else(|| "application/octet-stream".to_string());
    if !mime_type.starts_with("image/") {
        warn!("Rejecting {} with mime type {}", path.display(), mime_type);
        return Err(MediaError::NotAnImage {
            path: path.to_path_buf(),
            mime_type,
        });
    }

    let display_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned());
    Ok(ImageInput::new(bytes, mime_type, display_name))
}

pub async fn load_image_files(paths: &[PathBuf]) -> Result<Vec<ImageInput>, MediaError> {
    let mut images = Vec::with_capacity(paths.len());
    for path in paths {
        images.push(load_image_file(path).await?);
    }
    Ok(images)
}

#[cfg(test)]
pub(crate) fn sample_png(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = Cursor::new(Vec::new());
    image::RgbImage::new(width, height)
        .write_to(&mut bytes, image::ImageFormat::Png)
        .expect("encode png");
    bytes.into_inner()
}
