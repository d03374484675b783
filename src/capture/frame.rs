//! Frame data structures for captured camera content

use image::RgbaImage;
use std::time::Instant;

/// A captured camera frame
#[derive(Debug, Clone)]
pub struct Frame {
    /// Raw RGBA pixel data
    pub data: Vec<u8>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Timestamp when frame was captured
    pub timestamp: Instant,
}

impl Frame {
    /// Create a new frame
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
            timestamp: Instant::now(),
        }
    }

    /// Create a zero-filled frame of the given size
    pub fn blank(width: u32, height: u32) -> Self {
        Self::new(vec![0; (width as usize) * (height as usize) * 4], width, height)
    }

    /// Get frame dimensions as (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Crop the region of interest out of the frame.
    ///
    /// Returns `None` when the region is empty, falls outside the frame, or the
    /// pixel buffer does not match the declared dimensions.
    pub fn crop(&self, roi: &RegionOfInterest) -> Option<RgbaImage> {
        if roi.is_empty() || !roi.fits_within(self.width, self.height) {
            return None;
        }

        let stride = self.width as usize * 4;
        if self.data.len() != stride * self.height as usize {
            return None;
        }

        let row_len = roi.width as usize * 4;
        let mut region = Vec::with_capacity(row_len * roi.height as usize);
        for row in roi.y..roi.y + roi.height {
            let start = row as usize * stride + roi.x as usize * 4;
            region.extend_from_slice(&self.data[start..start + row_len]);
        }

        RgbaImage::from_raw(roi.width, roi.height, region)
    }
}

/// Rectangle inside a frame where the card is expected, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegionOfInterest {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl RegionOfInterest {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Region covering a whole frame
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Whether the region lies entirely inside a `width` x `height` frame
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        let right = self.x.checked_add(self.width);
        let bottom = self.y.checked_add(self.height);
        matches!((right, bottom), (Some(r), Some(b)) if r <= width && b <= height)
    }
}

/// Detection box reported by the OCR model, in crop coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roi_bounds() {
        let roi = RegionOfInterest::new(10, 10, 20, 20);
        assert!(roi.fits_within(30, 30));
        assert!(!roi.fits_within(29, 30));
        assert!(!RegionOfInterest::new(u32::MAX, 0, 2, 2).fits_within(u32::MAX, 10));
        assert!(RegionOfInterest::new(0, 0, 0, 5).is_empty());
    }

    #[test]
    fn test_crop_inside_frame() {
        let mut frame = Frame::blank(4, 4);
        // pixel (2, 1) in a 4-wide frame
        let idx = (4 + 2) * 4;
        frame.data[idx] = 255;

        let crop = frame.crop(&RegionOfInterest::new(2, 1, 2, 2)).unwrap();
        assert_eq!(crop.dimensions(), (2, 2));
        assert_eq!(crop.get_pixel(0, 0).0[0], 255);
    }

    #[test]
    fn test_crop_rejects_invalid_regions() {
        let frame = Frame::blank(4, 4);
        assert!(frame.crop(&RegionOfInterest::new(0, 0, 0, 0)).is_none());
        assert!(frame.crop(&RegionOfInterest::new(3, 3, 2, 2)).is_none());

        let truncated = Frame::new(vec![0; 8], 4, 4);
        assert!(truncated.crop(&RegionOfInterest::full(4, 4)).is_none());
    }

    #[test]
    fn test_crop_copies_rows_and_outlives_frame() {
        let width = 5;
        let data: Vec<u8> = (0..width * 3).flat_map(|i| [i as u8, 0, 0, 255]).collect();
        let frame = Frame::new(data, width, 3);

        let crop = frame.crop(&RegionOfInterest::new(1, 1, 3, 2)).unwrap();
        drop(frame);

        assert_eq!(crop.dimensions(), (3, 2));
        assert_eq!(crop.get_pixel(0, 0).0, [6, 0, 0, 255]);
        assert_eq!(crop.get_pixel(2, 0).0, [8, 0, 0, 255]);
        assert_eq!(crop.get_pixel(0, 1).0, [11, 0, 0, 255]);
        assert_eq!(crop.get_pixel(2, 1).0, [13, 0, 0, 255]);
    }
}
