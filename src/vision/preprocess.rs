/// Image preparation for the vision model
///
/// LLaVA works best with 672x672 input (336x1344 and 1344x336 are the other
/// sweet spots). The source is stretched to that square with Lanczos, re-encoded
/// as a mid-quality JPEG to keep requests small, then base64 encoded for the
/// JSON body.

use base64::{engine::general_purpose, Engine as _};
use image::{codecs::jpeg::JpegEncoder, imageops::FilterType, DynamicImage};
use log::{debug, error};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::task;

/// Square edge length the model is fed
pub const MODEL_IMAGE_SIZE: u32 = 672;

/// JPEG quality of the transport copy
pub const TRANSPORT_JPEG_QUALITY: u8 = 75;

/// A resized, re-encoded image ready to be sent to the model
///
/// Lives for the duration of one annotation call and is never written to disk.
pub struct ImagePayload {
    encoded: String,
}

impl ImagePayload {
    /// Base64 (standard alphabet) JPEG bytes
    pub fn as_base64(&self) -> &str {
        &self.encoded
    }

    #[cfg(test)]
    pub fn from_base64(encoded: impl Into<String>) -> Self {
        Self {
            encoded: encoded.into(),
        }
    }
}

// The payload is large; only show its size
impl fmt::Debug for ImagePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImagePayload")
            .field("encoded_len", &self.encoded.len())
            .finish()
    }
}

/// Prepare an image for the model
///
/// Returns `None` if the file does not exist or cannot be decoded.
/// That is an expected outcome the caller has to handle, not an error.
pub async fn prepare(path: PathBuf) -> Option<ImagePayload> {
    let display = path.display().to_string();

    // Spawn blocking because decoding and Lanczos resampling are CPU-intensive
    match task::spawn_blocking(move || prepare_blocking(&path)).await {
        Ok(Ok(payload)) => {
            debug!("Prepared {} ({} bytes base64)", display, payload.encoded.len());
            Some(payload)
        }
        Ok(Err(reason)) => {
            debug!("Cannot prepare {}: {}", display, reason);
            None
        }
        Err(e) => {
            error!("Image preparation task for {} failed: {}", display, e);
            None
        }
    }
}

/// Blocking implementation of image preparation
fn prepare_blocking(path: &Path) -> Result<ImagePayload, String> {
    if !path.exists() {
        return Err(format!("File not found: {}", path.display()));
    }

    let img = image::open(path).map_err(|e| format!("Failed to decode image: {}", e))?;
    let resized = img.resize_exact(MODEL_IMAGE_SIZE, MODEL_IMAGE_SIZE, FilterType::Lanczos3);
    drop(img);

    // JPEG has no alpha channel
    let rgb = DynamicImage::ImageRgb8(resized.to_rgb8());
    drop(resized);

    let mut buffer = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buffer, TRANSPORT_JPEG_QUALITY);
    rgb.write_with_encoder(encoder)
        .map_err(|e| format!("Failed to encode JPEG: {}", e))?;

    Ok(ImagePayload {
        encoded: general_purpose::STANDARD.encode(&buffer),
    })
}
