use ndarray::{Array2, ArrayView3, ArrayViewMut3};

/// A single camera frame: contiguous RGB bytes in row-major order.
///
/// Format conversion happens at I/O boundaries only. Within a session the
/// pipeline owns the working frame; collaborators receive clones.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    index: usize,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8, index: usize) -> Self {
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
            index,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
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

    pub fn index(&self) -> usize {
        self.index
    }

    /// True when the frame has pixels and the buffer matches its dimensions.
    pub fn is_well_formed(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.channels > 0
            && self.data.len()
                == (self.width as usize) * (self.height as usize) * (self.channels as usize)
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("Frame data length must match dimensions")
    }

    pub fn as_ndarray_mut(&mut self) -> ArrayViewMut3<'_, u8> {
        ArrayViewMut3::from_shape(self.shape(), &mut self.data)
            .expect("Frame data length must match dimensions")
    }

    /// Returns a horizontally mirrored copy (selfie-style preview).
    pub fn flip_horizontal(&self) -> Frame {
        let w = self.width as usize;
        let c = self.channels as usize;
        let row_len = w * c;
        if row_len == 0 {
            return self.clone();
        }
        let mut out = Vec::with_capacity(self.data.len());
        for row in self.data.chunks_exact(row_len) {
            for px in row.chunks_exact(c).rev() {
                out.extend_from_slice(px);
            }
        }
        Frame::new(out, self.width, self.height, self.channels, self.index)
    }

    /// Single-channel intensity image, shape `(height, width)`.
    ///
    /// RGB frames use BT.601 luma weights; single-channel frames are copied
    /// as-is. Other layouts fall back to the first channel.
    pub fn to_luma(&self) -> Array2<u8> {
        let h = self.height as usize;
        let w = self.width as usize;
        let c = self.channels as usize;
        let mut luma = Array2::<u8>::zeros((h, w));
        if c == 0 {
            return luma;
        }
        for (dst, px) in luma.iter_mut().zip(self.data.chunks_exact(c)) {
            *dst = match c {
                3 | 4 => {
                    let y = 0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32;
                    y.round().clamp(0.0, 255.0) as u8
                }
                _ => px[0],
            };
        }
        luma
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        )
    }
}
