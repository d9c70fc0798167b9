//! Image dimensions and size utilities

use serde::{Deserialize, Serialize};
use std::fmt;

/// Image dimensions structure
///
/// Represents the width and height of an acquisition camera frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageSize {
    /// Image width in pixels
    pub width: usize,
    /// Image height in pixels
    pub height: usize,
}

impl ImageSize {
    /// Create a new ImageSize
    pub fn from_width_height(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    /// Pixel coordinates of the frame centre as (x, y).
    ///
    /// Uses the `width / 2`, `height / 2` convention, so a 1936x1216
    /// frame is centred on (968.0, 608.0).
    pub fn centre(&self) -> (f64, f64) {
        (self.width as f64 / 2.0, self.height as f64 / 2.0)
    }

    /// Get total number of pixels
    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    /// Convert to tuple (width, height)
    pub fn to_tuple(&self) -> (usize, usize) {
        (self.width, self.height)
    }
}

impl From<(usize, usize)> for ImageSize {
    fn from(dimensions: (usize, usize)) -> Self {
        Self::from_width_height(dimensions.0, dimensions.1)
    }
}

impl From<ImageSize> for (usize, usize) {
    fn from(size: ImageSize) -> Self {
        size.to_tuple()
    }
}

impl fmt::Display for ImageSize {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centre_of_manta_frame() {
        let size = ImageSize::from_width_height(1936, 1216);
        assert_eq!(size.centre(), (968.0, 608.0));
        assert_eq!(size.pixel_count(), 1936 * 1216);
    }

    #[test]
    fn test_display_and_tuple() {
        let size: ImageSize = (640, 480).into();
        assert_eq!(size.to_string(), "640x480");
        let (w, h): (usize, usize) = size.into();
        assert_eq!((w, h), (640, 480));
    }
}
