use std::path::Path;

use crate::shared::frame::Frame;

/// Domain interface for decoding an image file into RGB pixels.
///
/// Injected wherever pixels are needed so the core never depends on how
/// images are rasterized.
pub trait ImageReader: Send {
    fn read(&self, path: &Path) -> Result<Frame, Box<dyn std::error::Error>>;
}
