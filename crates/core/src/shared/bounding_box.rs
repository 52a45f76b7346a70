use serde::Serialize;

/// Axis-aligned face bounding box in image pixel coordinates.
///
/// Stored alongside each detection; coordinates are kept as reals
/// because detectors produce sub-pixel boxes.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Clamp the box to an image of the given dimensions.
    ///
    /// Detectors may emit boxes that extend slightly past the frame edge;
    /// the visible part is what gets cropped and persisted.
    pub fn clamp_to(&self, image_width: u32, image_height: u32) -> BoundingBox {
        let iw = image_width as f64;
        let ih = image_height as f64;
        let x = self.x.clamp(0.0, iw);
        let y = self.y.clamp(0.0, ih);
        BoundingBox {
            x,
            y,
            width: self.width.min(iw - x).max(0.0),
            height: self.height.min(ih - y).max(0.0),
        }
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }
}
