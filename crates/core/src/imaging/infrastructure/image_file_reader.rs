use std::path::Path;

use crate::imaging::domain::image_reader::ImageReader;
use crate::shared::frame::Frame;

/// Decodes image files with the `image` crate, converting to RGB8.
pub struct ImageFileReader;

impl ImageFileReader {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ImageFileReader {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageReader for ImageFileReader {
    fn read(&self, path: &Path) -> Result<Frame, Box<dyn std::error::Error>> {
        let img = image::open(path)?;
        let rgb = img.to_rgb8();
        let (width, height) = rgb.dimensions();
        Ok(Frame::new(rgb.into_raw(), width, height, 3))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn write_test_image(dir: &Path, width: u32, height: u32) -> PathBuf {
        let path = dir.join("test.png");
        let mut img = image::RgbImage::new(width, height);
        for pixel in img.pixels_mut() {
            *pixel = image::Rgb([50, 100, 200]);
        }
        img.save(&path).unwrap();
        path
    }

    #[test]
    fn test_read_returns_rgb_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_test_image(dir.path(), 100, 80);
        let frame = ImageFileReader::new().read(&path).unwrap();
        assert_eq!(frame.width(), 100);
        assert_eq!(frame.height(), 80);
        assert_eq!(frame.channels(), 3);
        assert_eq!(frame.data()[0], 50);
        assert_eq!(frame.data()[1], 100);
        assert_eq!(frame.data()[2], 200);
    }

    #[test]
    fn test_read_nonexistent_raises() {
        let reader = ImageFileReader::new();
        assert!(reader.read(Path::new("/nonexistent/test.png")).is_err());
    }

    #[test]
    fn test_read_non_image_file_raises() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not_an_image.jpg");
        std::fs::write(&path, b"plain text").unwrap();
        assert!(ImageFileReader::new().read(&path).is_err());
    }
}
