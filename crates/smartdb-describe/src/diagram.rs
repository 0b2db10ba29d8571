//! ER-diagram upload intake: decode, bound the size, re-encode for the model.

use base64::Engine as _;
use image::{imageops::FilterType, DynamicImage, GenericImageView, ImageOutputFormat};
use std::io::Cursor;

/// Longest edge sent to a vision model.
pub const MAX_EDGE_PX: u32 = 2048;

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("Uploaded file is empty")]
    Empty,
    #[error("Could not decode image: {0}")]
    Decode(String),
    #[error("Could not encode image: {0}")]
    Encode(String),
}

/// A decoded diagram, ready to be attached to a completion request.
#[derive(Debug, Clone)]
pub struct DiagramImage {
    image: DynamicImage,
}

impl DiagramImage {
    /// Decode an uploaded file; any format `image` recognizes is accepted.
    pub fn decode(bytes: &[u8]) -> Result<Self, ImageError> {
        if bytes.is_empty() {
            return Err(ImageError::Empty);
        }
        let image =
            image::load_from_memory(bytes).map_err(|e| ImageError::Decode(e.to_string()))?;
        Ok(Self { image }.downscaled(MAX_EDGE_PX))
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    fn downscaled(self, max_edge: u32) -> Self {
        let (w, h) = self.image.dimensions();
        if w.max(h) <= max_edge {
            return self;
        }
        // resize() keeps the aspect ratio inside the bounding box
        let image = self.image.resize(max_edge, max_edge, FilterType::Triangle);
        tracing::debug!(
            from_w = w,
            from_h = h,
            to_w = image.width(),
            to_h = image.height(),
            "downscaled diagram"
        );
        Self { image }
    }

    pub fn to_png(&self) -> Result<Vec<u8>, ImageError> {
        let mut buf = Cursor::new(Vec::new());
        self.image
            .write_to(&mut buf, ImageOutputFormat::Png)
            .map_err(|e| ImageError::Encode(e.to_string()))?;
        Ok(buf.into_inner())
    }

    pub fn to_base64_png(&self) -> Result<String, ImageError> {
        Ok(base64::engine::general_purpose::STANDARD.encode(self.to_png()?))
    }
}
