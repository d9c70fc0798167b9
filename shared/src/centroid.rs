//! Star detections from the acquisition cameras.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A detected star position in one guide-camera frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Centroid {
    /// X position in sensor coordinates (pixels)
    pub x: f64,
    /// Y position in sensor coordinates (pixels)
    pub y: f64,
    /// Detection radius in pixels, when the detector reported one
    pub radius: Option<f64>,
}

impl Centroid {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, radius: None }
    }

    pub fn with_radius(x: f64, y: f64, radius: f64) -> Self {
        Self {
            x,
            y,
            radius: Some(radius),
        }
    }
}

impl fmt::Display for Centroid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({:.1}, {:.1})", self.x, self.y)
    }
}

/// The two acquisition cameras.
///
/// The on-axis camera centres the field; the off-axis camera senses rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Camera {
    OnAxis,
    OffAxis,
}

impl Camera {
    /// Display frame the camera's images are loaded into.
    pub fn frame(&self) -> u32 {
        match self {
            Camera::OnAxis => 1,
            Camera::OffAxis => 3,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Camera::OnAxis => "on",
            Camera::OffAxis => "off",
        }
    }
}

impl fmt::Display for Camera {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}-axis", self.label())
    }
}

/// A pair of values, one per acquisition camera.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OnOff<T> {
    pub on: T,
    pub off: T,
}

impl<T> OnOff<T> {
    pub fn new(on: T, off: T) -> Self {
        Self { on, off }
    }

    pub fn get(&self, camera: Camera) -> &T {
        match camera {
            Camera::OnAxis => &self.on,
            Camera::OffAxis => &self.off,
        }
    }

    pub fn get_mut(&mut self, camera: Camera) -> &mut T {
        match camera {
            Camera::OnAxis => &mut self.on,
            Camera::OffAxis => &mut self.off,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_are_distinct() {
        assert_eq!(Camera::OnAxis.frame(), 1);
        assert_eq!(Camera::OffAxis.frame(), 3);
    }

    #[test]
    fn test_on_off_access() {
        let mut pair: OnOff<Option<Centroid>> = OnOff::default();
        assert!(pair.get(Camera::OffAxis).is_none());

        *pair.get_mut(Camera::OffAxis) = Some(Centroid::with_radius(1.0, 2.0, 3.0));
        assert_eq!(pair.off.map(|c| c.radius), Some(Some(3.0)));
        assert!(pair.on.is_none());
    }

    #[test]
    fn test_centroid_serialization() {
        let c = Centroid::new(1752.42, 454.11);
        let json = serde_json::to_string(&c).unwrap();
        let parsed: Centroid = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, c);
        assert_eq!(c.to_string(), "(1752.4, 454.1)");
    }
}
