use serde::{Deserialize, Serialize};

/// Region coordinates as returned by the detection provider, relative to the
/// image dimensions: all four values are fractions in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedBox {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl NormalizedBox {
    pub fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Denormalize against the image dimensions, clamping out-of-range
    /// coordinates to the image bounds instead of failing.
    pub fn to_pixel_rect(&self, img_width: u32, img_height: u32) -> PixelRect {
        let max_x = img_width.saturating_sub(1) as f32;
        let max_y = img_height.saturating_sub(1) as f32;

        let x1 = (self.left * img_width as f32).clamp(0.0, max_x).round() as u32;
        let y1 = (self.top * img_height as f32).clamp(0.0, max_y).round() as u32;
        let x2 = ((self.left + self.width) * img_width as f32)
            .clamp(0.0, max_x)
            .round() as u32;
        let y2 = ((self.top + self.height) * img_height as f32)
            .clamp(0.0, max_y)
            .round() as u32;

        PixelRect {
            x1,
            y1,
            x2: x2.max(x1),
            y2: y2.max(y1),
        }
    }
}

/// Inclusive pixel corners of a denormalized box, always inside the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

/// One labeled detection exactly as the provider reported it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedRegion {
    pub label: String,
    /// Score in `[0, 100]`.
    pub confidence: f32,
    pub bounding_box: NormalizedBox,
}

impl DetectedRegion {
    pub fn new(label: impl Into<String>, confidence: f32, bounding_box: NormalizedBox) -> Self {
        Self {
            label: label.into(),
            confidence,
            bounding_box,
        }
    }

    /// Text drawn next to the box, e.g. `cat 92%`.
    pub fn label_text(&self) -> String {
        format!("{} {:.0}%", self.label, self.confidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denormalizes_against_image_dimensions() {
        let bbox = NormalizedBox::new(0.1, 0.2, 0.3, 0.4);
        let rect = bbox.to_pixel_rect(640, 480);

        assert_eq!(
            rect,
            PixelRect {
                x1: 64,
                y1: 96,
                x2: 256,
                y2: 288
            }
        );
    }

    #[test]
    fn clamps_out_of_range_coordinates() {
        let bbox = NormalizedBox::new(-0.5, 0.9, 2.0, 0.5);
        let rect = bbox.to_pixel_rect(100, 100);

        assert_eq!(rect.x1, 0);
        assert_eq!(rect.x2, 99);
        assert_eq!(rect.y1, 90);
        assert_eq!(rect.y2, 99);
    }

    #[test]
    fn degenerate_box_stays_ordered() {
        let bbox = NormalizedBox::new(0.8, 0.8, -0.5, -0.5);
        let rect = bbox.to_pixel_rect(100, 100);

        assert!(rect.x2 >= rect.x1);
        assert!(rect.y2 >= rect.y1);
    }

    #[test]
    fn label_text_rounds_to_whole_percent() {
        let region = DetectedRegion::new("cat", 92.5, NormalizedBox::new(0.1, 0.2, 0.3, 0.4));
        assert_eq!(region.label_text(), "cat 92%");
    }
}
