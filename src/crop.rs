use std::fmt;

use serde::{Deserialize, Serialize};

use crate::v4l_sys::v4l2_rect;

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
/// Rectangle in sensor coordinates
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    /// Returns a rectangle representation
    ///
    /// # Example
    ///
    /// ```
    /// use v4l_capture::crop::Rect;
    /// let rect = Rect::new(0, 0, 640, 480);
    /// ```
    pub fn new(left: i32, top: i32, width: u32, height: u32) -> Self {
        Rect {
            left,
            top,
            width,
            height,
        }
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}) {}x{}",
            self.left, self.top, self.width, self.height
        )
    }
}

impl From<v4l2_rect> for Rect {
    fn from(rect: v4l2_rect) -> Self {
        Rect::new(rect.left, rect.top, rect.width, rect.height)
    }
}

impl From<Rect> for v4l2_rect {
    fn from(rect: Rect) -> Self {
        v4l2_rect {
            left: rect.left,
            top: rect.top,
            width: rect.width,
            height: rect.height,
        }
    }
}

/// Region of interest requested by the application
///
/// A negative origin or a size below one leaves the respective value of the device's current
/// crop rectangle untouched. The default request keeps everything as it is.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CropRequest {
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
}

impl Default for CropRequest {
    fn default() -> Self {
        CropRequest {
            left: -1,
            top: -1,
            width: -1,
            height: -1,
        }
    }
}

impl CropRequest {
    /// Returns a crop request
    ///
    /// # Example
    ///
    /// ```
    /// use v4l_capture::crop::CropRequest;
    /// // only change the width, keep origin and height
    /// let request = CropRequest::new(-1, -1, 320, -1);
    /// assert!(request.is_requested());
    /// ```
    pub fn new(left: i32, top: i32, width: i32, height: i32) -> Self {
        CropRequest {
            left,
            top,
            width,
            height,
        }
    }

    /// Whether any field asks for a change of the device crop rectangle
    pub fn is_requested(&self) -> bool {
        self.left >= 0 || self.top >= 0 || self.width >= 1 || self.height >= 1
    }

    /// Computes the rectangle to apply given the current crop and the device bounds
    ///
    /// Each axis is handled independently: the requested (or current) origin is clamped into
    /// `[bounds.start, bounds.start + bounds.size - 1]` and the size is limited to the span
    /// remaining from that origin.
    ///
    /// # Example
    ///
    /// ```
    /// use v4l_capture::crop::{CropRequest, Rect};
    ///
    /// let bounds = Rect::new(0, 0, 640, 480);
    /// let rect = CropRequest::new(-50, -1, 10000, -1).clamp(bounds, bounds);
    /// assert_eq!(rect, Rect::new(0, 0, 640, 480));
    /// ```
    pub fn clamp(&self, current: Rect, bounds: Rect) -> Rect {
        let (left, width) = limit(
            (current.left, current.width),
            (bounds.left, bounds.width),
            (self.left, self.width),
        );
        let (top, height) = limit(
            (current.top, current.height),
            (bounds.top, bounds.height),
            (self.top, self.height),
        );

        Rect::new(left, top, width, height)
    }
}

fn limit(current: (i32, u32), bounds: (i32, u32), target: (i32, i32)) -> (i32, u32) {
    let (bounds_start, bounds_size) = (i64::from(bounds.0), i64::from(bounds.1));

    let mut start = i64::from(current.0);
    let mut size = i64::from(current.1);
    if target.0 >= 0 {
        start = i64::from(target.0);
    }
    if target.1 >= 1 {
        size = i64::from(target.1);
    }

    let last = bounds_start + (bounds_size - 1).max(0);
    start = start.min(last).max(bounds_start);
    size = size.min(bounds_size - (start - bounds_start)).max(0);

    (start as i32, size as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VGA: Rect = Rect {
        left: 0,
        top: 0,
        width: 640,
        height: 480,
    };

    #[test]
    fn default_request_changes_nothing() {
        let request = CropRequest::default();
        assert!(!request.is_requested());

        let current = Rect::new(16, 8, 320, 240);
        assert_eq!(request.clamp(current, VGA), current);
    }

    #[test]
    fn zero_size_alone_is_not_a_request() {
        assert!(!CropRequest::new(-1, -1, 0, 0).is_requested());
        assert!(CropRequest::new(0, -1, -1, -1).is_requested());
    }

    #[test]
    fn oversized_width_is_limited_to_bounds() {
        let request = CropRequest::new(-50, -1, 10000, -1);
        assert_eq!(request.clamp(VGA, VGA), Rect::new(0, 0, 640, 480));
    }

    #[test]
    fn origin_is_clamped_into_bounds() {
        let request = CropRequest::new(1000, 479, -1, -1);
        let rect = request.clamp(VGA, VGA);
        assert_eq!(rect.left, 639);
        assert_eq!(rect.width, 1);
        assert_eq!(rect.top, 479);
        assert_eq!(rect.height, 1);
    }

    #[test]
    fn size_is_limited_to_span_from_origin() {
        let request = CropRequest::new(600, 100, 200, 100);
        assert_eq!(request.clamp(VGA, VGA), Rect::new(600, 100, 40, 100));
    }

    #[test]
    fn bounds_with_offset_origin() {
        let bounds = Rect::new(8, 4, 100, 50);
        let request = CropRequest::new(0, 0, 500, 500);
        assert_eq!(request.clamp(bounds, bounds), Rect::new(8, 4, 100, 50));
    }
}
