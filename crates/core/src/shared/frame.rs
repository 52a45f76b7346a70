use ndarray::ArrayView3;

/// A decoded image: contiguous RGB bytes in row-major order.
///
/// Format conversion happens at I/O boundaries only; the domain layer
/// treats pixel data as opaque.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("Frame data length must match dimensions")
    }

    /// Copy out a sub-rectangle. Coordinates are clamped to the frame,
    /// so an oversized request returns the overlapping part.
    pub fn crop(&self, x: u32, y: u32, width: u32, height: u32) -> Frame {
        let x0 = x.min(self.width);
        let y0 = y.min(self.height);
        let w = width.min(self.width - x0);
        let h = height.min(self.height - y0);
        let ch = self.channels as usize;

        let mut data = Vec::with_capacity(w as usize * h as usize * ch);
        for row in y0..y0 + h {
            let start = (row as usize * self.width as usize + x0 as usize) * ch;
            data.extend_from_slice(&self.data[start..start + w as usize * ch]);
        }
        Frame::new(data, w, h, self.channels)
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        )
    }
}
