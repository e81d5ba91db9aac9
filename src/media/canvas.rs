//! Canvas surface painted by the compositor

use super::frame::{Dimensions, VideoFrame};

const BACKGROUND: [u8; 4] = [0, 0, 0, 255];

/// An RGBA8 drawing surface
#[derive(Debug, Clone)]
pub struct Canvas {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        let frame = VideoFrame::solid(width, height, BACKGROUND);
        Self {
            width,
            height,
            pixels: frame.data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }

    /// Reallocate the surface; previous contents are discarded
    pub fn resize(&mut self, width: u32, height: u32) {
        *self = Self::new(width, height);
    }

    pub fn clear(&mut self) {
        for px in self.pixels.chunks_exact_mut(4) {
            px.copy_from_slice(&BACKGROUND);
        }
    }

    /// Draw `frame` scaled into the rectangle at (x, y) of size width x height.
    ///
    /// Nearest-neighbour sampling; anything outside the surface is clipped.
    pub fn draw_image(&mut self, frame: &VideoFrame, x: u32, y: u32, width: u32, height: u32) {
        if width == 0 || height == 0 || frame.width == 0 || frame.height == 0 {
            return;
        }
        let x_end = x.saturating_add(width).min(self.width);
        let y_end = y.saturating_add(height).min(self.height);
        let stride = self.width as usize * 4;

        for dy in y..y_end {
            let src_y = ((dy - y) as u64 * frame.height as u64 / height as u64) as usize;
            let src_row = src_y * frame.width as usize * 4;
            let dst_row = dy as usize * stride;
            for dx in x..x_end {
                let src_x = ((dx - x) as u64 * frame.width as u64 / width as u64) as usize;
                let src = src_row + src_x * 4;
                let dst = dst_row + dx as usize * 4;
                if let Some(px) = frame.data.get(src..src + 4) {
                    self.pixels[dst..dst + 4].copy_from_slice(px);
                }
            }
        }
    }

    /// Copy the current contents out as a frame
    pub fn snapshot(&self) -> VideoFrame {
        VideoFrame {
            width: self.width,
            height: self.height,
            data: self.pixels.clone(),
        }
    }
}
