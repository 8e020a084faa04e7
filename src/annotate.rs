use crate::bounding_box::{DetectedRegion, PixelRect};
use crate::storage::MediaType;
use image::codecs::jpeg::JpegEncoder;
use image::{ImageReader, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;
use std::io::Cursor;
use thiserror::Error;

const BOX_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const PLATE_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const BOX_THICKNESS: u32 = 3;
const GLYPH_ADVANCE: u32 = 6;
const GLYPH_HEIGHT: u32 = 7;
const PLATE_PADDING: u32 = 4;
const JPEG_QUALITY: u8 = 95;

#[derive(Error, Debug)]
pub enum CanvasError {
    #[error("failed to read image header: {0}")]
    Read(std::io::Error),
    #[error("failed to decode image: {0}")]
    Decode(image::ImageError),
    #[error("failed to encode image: {0}")]
    Encode(image::ImageError),
}

/// A decoded upload, normalized to RGB. Annotation never touches the
/// original: `annotate` hands back a drawn-on copy.
pub struct ImageCanvas {
    image: RgbImage,
}

impl ImageCanvas {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CanvasError> {
        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(CanvasError::Read)?;
        let image = reader.decode().map_err(CanvasError::Decode)?.to_rgb8();
        Ok(Self { image })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Draw every region at or above the confidence threshold onto a copy.
    pub fn annotate(&self, regions: &[DetectedRegion], confidence_threshold: f32) -> Self {
        let mut canvas = self.image.clone();
        let (width, height) = canvas.dimensions();

        for region in regions {
            if region.confidence < confidence_threshold {
                continue;
            }
            let rect = region.bounding_box.to_pixel_rect(width, height);
            draw_box_outline(&mut canvas, rect);
            draw_label_plate(&mut canvas, rect, &region.label_text());
        }

        Self { image: canvas }
    }

    pub fn encode(&self, media_type: MediaType) -> Result<Vec<u8>, CanvasError> {
        let mut buffer = Vec::new();
        match media_type {
            MediaType::Jpeg => JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY)
                .encode_image(&self.image)
                .map_err(CanvasError::Encode)?,
            MediaType::Png => self
                .image
                .write_to(&mut Cursor::new(&mut buffer), image::ImageFormat::Png)
                .map_err(CanvasError::Encode)?,
        }
        Ok(buffer)
    }
}

fn draw_box_outline(image: &mut RgbImage, rect: PixelRect) {
    // Thickness grows inward so the outer edge stays at the detected bounds.
    for inset in 0..BOX_THICKNESS {
        let x1 = rect.x1 + inset;
        let y1 = rect.y1 + inset;
        let x2 = rect.x2.saturating_sub(inset);
        let y2 = rect.y2.saturating_sub(inset);
        if x1 > x2 || y1 > y2 {
            break;
        }
        draw_hollow_rect_mut(
            image,
            Rect::at(x1 as i32, y1 as i32).of_size(x2 - x1 + 1, y2 - y1 + 1),
            BOX_COLOR,
        );
    }
}

/// Filled backdrop above the box top so the label stays readable on busy
/// images; clamped to the top edge when the box starts near y = 0.
fn draw_label_plate(image: &mut RgbImage, rect: PixelRect, text: &str) {
    let plate_w = text.chars().count() as u32 * GLYPH_ADVANCE + 2 * PLATE_PADDING;
    let plate_h = GLYPH_HEIGHT + 2 * PLATE_PADDING;
    let plate_x = rect.x1;
    let plate_y = rect.y1.saturating_sub(plate_h + 2);

    draw_filled_rect_mut(
        image,
        Rect::at(plate_x as i32, plate_y as i32).of_size(plate_w, plate_h),
        PLATE_COLOR,
    );
    draw_text(
        image,
        plate_x + PLATE_PADDING,
        plate_y + PLATE_PADDING,
        text,
        BOX_COLOR,
    );
}

fn draw_text(image: &mut RgbImage, x: u32, y: u32, text: &str, color: Rgb<u8>) {
    let (width, height) = image.dimensions();
    let mut pen_x = x;
    for ch in text.chars().flat_map(|c| c.to_uppercase()) {
        if let Some(glyph) = glyph_bits(ch) {
            for (row, pattern) in glyph.iter().enumerate() {
                let py = y + row as u32;
                if py >= height {
                    continue;
                }
                for col in 0..5u32 {
                    if (pattern >> (4 - col)) & 1 == 1 {
                        let px = pen_x + col;
                        if px < width {
                            *image.get_pixel_mut(px, py) = color;
                        }
                    }
                }
            }
        }
        pen_x += GLYPH_ADVANCE;
    }
}

fn glyph_bits(ch: char) -> Option<[u8; 7]> {
    match ch {
        'A' => Some([
            0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001,
        ]),
        'B' => Some([
            0b11110, 0b10001, 0b10001, 0b11110, 0b10001, 0b10001, 0b11110,
        ]),
        'C' => Some([
            0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110,
        ]),
        'D' => Some([
            0b11110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b11110,
        ]),
        'E' => Some([
            0b11111, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000, 0b11111,
        ]),
        'F' => Some([
            0b11111, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000, 0b10000,
        ]),
        'G' => Some([
            0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01111,
        ]),
        'H' => Some([
            0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001,
        ]),
        'I' => Some([
            0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110,
        ]),
        'J' => Some([
            0b00111, 0b00010, 0b00010, 0b00010, 0b00010, 0b10010, 0b01100,
        ]),
        'K' => Some([
            0b10001, 0b10010, 0b10100, 0b11000, 0b10100, 0b10010, 0b10001,
        ]),
        'L' => Some([
            0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111,
        ]),
        'M' => Some([
            0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001,
        ]),
        'N' => Some([
            0b10001, 0b11001, 0b10101, 0b10101, 0b10011, 0b10001, 0b10001,
        ]),
        'O' => Some([
            0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110,
        ]),
        'P' => Some([
            0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000,
        ]),
        'Q' => Some([
            0b01110, 0b10001, 0b10001, 0b10001, 0b10101, 0b10010, 0b01101,
        ]),
        'R' => Some([
            0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001,
        ]),
        'S' => Some([
            0b01111, 0b10000, 0b01110, 0b00001, 0b00001, 0b10001, 0b01110,
        ]),
        'T' => Some([
            0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100,
        ]),
        'U' => Some([
            0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110,
        ]),
        'V' => Some([
            0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01010, 0b00100,
        ]),
        'W' => Some([
            0b10001, 0b10001, 0b10001, 0b10101, 0b10101, 0b11011, 0b10001,
        ]),
        'X' => Some([
            0b10001, 0b10001, 0b01010, 0b00100, 0b01010, 0b10001, 0b10001,
        ]),
        'Y' => Some([
            0b10001, 0b10001, 0b01010, 0b00100, 0b00100, 0b00100, 0b00100,
        ]),
        'Z' => Some([
            0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b10000, 0b11111,
        ]),
        '0' => Some([
            0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110,
        ]),
        '1' => Some([
            0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110,
        ]),
        '2' => Some([
            0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111,
        ]),
        '3' => Some([
            0b11110, 0b00001, 0b00001, 0b01110, 0b00001, 0b00001, 0b11110,
        ]),
        '4' => Some([
            0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010,
        ]),
        '5' => Some([
            0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110,
        ]),
        '6' => Some([
            0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110,
        ]),
        '7' => Some([
            0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000,
        ]),
        '8' => Some([
            0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110,
        ]),
        '9' => Some([
            0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100,
        ]),
        '%' => Some([
            0b10001, 0b10010, 0b00100, 0b01000, 0b10010, 0b10001, 0b00000,
        ]),
        '-' => Some([0, 0, 0, 0b01110, 0, 0, 0]),
        '.' => Some([0, 0, 0, 0, 0, 0b00110, 0b00110]),
        ' ' => Some([0, 0, 0, 0, 0, 0, 0]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounding_box::NormalizedBox;

    const BACKGROUND: Rgb<u8> = Rgb([10, 10, 10]);

    fn canvas(width: u32, height: u32) -> ImageCanvas {
        ImageCanvas {
            image: RgbImage::from_pixel(width, height, BACKGROUND),
        }
    }

    fn region(confidence: f32) -> DetectedRegion {
        DetectedRegion::new(
            "cat",
            confidence,
            NormalizedBox::new(0.2, 0.2, 0.5, 0.5),
        )
    }

    #[test]
    fn no_regions_is_a_pixel_identical_copy() {
        let original = canvas(64, 48);
        let annotated = original.annotate(&[], 50.0);
        assert_eq!(original.image.as_raw(), annotated.image.as_raw());
    }

    #[test]
    fn below_threshold_regions_are_not_drawn() {
        let original = canvas(100, 100);
        let annotated = original.annotate(&[region(49.9)], 50.0);
        assert_eq!(original.image.as_raw(), annotated.image.as_raw());
    }

    #[test]
    fn threshold_boundary_is_included() {
        let original = canvas(100, 100);
        let annotated = original.annotate(&[region(50.0)], 50.0);
        assert_ne!(original.image.as_raw(), annotated.image.as_raw());
        // Box corner at (20, 20).
        assert_eq!(*annotated.image.get_pixel(20, 20), BOX_COLOR);
    }

    #[test]
    fn original_is_never_mutated() {
        let original = canvas(100, 100);
        let _annotated = original.annotate(&[region(90.0)], 50.0);
        assert_eq!(*original.image.get_pixel(20, 20), BACKGROUND);
    }

    #[test]
    fn draws_denormalized_rectangle_with_label() {
        let original = canvas(640, 480);
        let regions = [DetectedRegion::new(
            "cat",
            92.5,
            NormalizedBox::new(0.1, 0.2, 0.3, 0.4),
        )];

        let annotated = original.annotate(&regions, 50.0);
        let image = &annotated.image;

        // Rectangle corners at (64, 96) and (256, 288).
        assert_eq!(*image.get_pixel(64, 96), BOX_COLOR);
        assert_eq!(*image.get_pixel(256, 96), BOX_COLOR);
        assert_eq!(*image.get_pixel(64, 288), BOX_COLOR);
        assert_eq!(*image.get_pixel(256, 288), BOX_COLOR);
        // Interior stays untouched.
        assert_eq!(*image.get_pixel(160, 192), BACKGROUND);
        // Label plate sits above the box top.
        assert_eq!(*image.get_pixel(66, 85), PLATE_COLOR);
    }

    #[test]
    fn boxes_touching_the_top_edge_keep_their_plate_visible() {
        let original = canvas(100, 100);
        let regions = [DetectedRegion::new(
            "cat",
            90.0,
            NormalizedBox::new(0.0, 0.0, 0.5, 0.5),
        )];

        // Must not panic or wrap; the plate is clamped to y = 0.
        let annotated = original.annotate(&regions, 50.0);
        assert_eq!(*annotated.image.get_pixel(1, 0), PLATE_COLOR);
    }

    #[test]
    fn decodes_png_bytes() {
        let source = RgbImage::from_pixel(33, 17, Rgb([1, 2, 3]));
        let mut bytes = Vec::new();
        source
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();

        let decoded = ImageCanvas::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.dimensions(), (33, 17));
    }

    #[test]
    fn rejects_garbage_bytes() {
        assert!(matches!(
            ImageCanvas::from_bytes(b"definitely not an image"),
            Err(CanvasError::Decode(_))
        ));
    }
}
