//! Bounding-box overlay drawn on a transparent canvas above the video.

mod colors;
mod draw;
mod font;

pub use colors::ClassColors;

use crate::detection::Detection;
use draw::{blend, fill_rect, stroke_rect};
use font::BitmapFont;
use image::{Rgba, RgbImage, RgbaImage};

const CAPTION_GAP: i32 = 2;
const CAPTION_PAD: i32 = 3;
const CAPTION_BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 204]);

const LEGEND_SWATCH: i32 = 15;
const LEGEND_TEXT_OFFSET: i32 = 20;
const LEGEND_ITEM_SPACING: i32 = 20;
const LEGEND_BOTTOM_OFFSET: i32 = 30;
const LEGEND_STRIP_HEIGHT: i32 = 20;
const LEGEND_BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 179]);
const LEGEND_TEXT: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// Box coordinates are clamped to this many canvas sizes around the origin
const COORDINATE_REACH: f64 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// Transparent RGBA surface sized to the source frame
#[derive(Debug, Clone)]
pub struct Canvas {
    image: RgbaImage,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::new(width, height),
        }
    }

    /// Match the canvas to the frame size. Resizing discards the contents.
    pub fn resize(&mut self, width: u32, height: u32) -> bool {
        if self.image.dimensions() == (width, height) {
            return false;
        }
        self.image = RgbaImage::new(width, height);
        true
    }

    pub fn clear(&mut self) {
        self.image.pixels_mut().for_each(|p| *p = Rgba([0, 0, 0, 0]));
    }

    #[cfg(test)]
    pub fn is_clear(&self) -> bool {
        self.image.pixels().all(|p| p[3] == 0)
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    #[cfg(test)]
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoxLayout {
    pub rect: Rect,
    pub color: Rgba<u8>,
    pub caption: String,
    pub caption_background: Rect,
    pub caption_origin: (i32, i32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LegendItem {
    pub label: String,
    pub color: Rgba<u8>,
    pub swatch: Rect,
    pub text_origin: (i32, i32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LegendLayout {
    pub strip: Rect,
    pub items: Vec<LegendItem>,
}

/// Everything one render pass draws, in paint order
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayLayout {
    pub boxes: Vec<BoxLayout>,
    pub legend: LegendLayout,
}

/// Draws detections and the class legend. Holds no per-frame state.
#[derive(Debug, Clone)]
pub struct OverlayRenderer {
    colors: ClassColors,
    font: BitmapFont,
    line_width: u32,
}

impl OverlayRenderer {
    pub fn new(colors: ClassColors, font_size: u32, line_width: u32) -> Self {
        Self {
            colors,
            font: BitmapFont::for_size(font_size),
            line_width,
        }
    }

    pub fn layout(&self, width: u32, height: u32, detections: &[Detection]) -> OverlayLayout {
        let boxes = detections
            .iter()
            .map(|d| self.layout_box(d, width, height))
            .collect();
        OverlayLayout {
            boxes,
            legend: self.layout_legend(width as i32, height as i32),
        }
    }

    /// Boxes may be reported with their corners swapped or far outside the
    /// frame. The rect is normalised and clamped so layout stays in range.
    fn layout_box(&self, detection: &Detection, width: u32, height: u32) -> BoxLayout {
        let reach = COORDINATE_REACH * f64::from(width.max(height).max(1));
        let coord = |v: f64| v.clamp(-reach, reach).round() as i32;

        let left = coord(detection.x1.min(detection.x2));
        let right = coord(detection.x1.max(detection.x2));
        let top = coord(detection.y1.min(detection.y2));
        let bottom = coord(detection.y1.max(detection.y2));
        let rect = Rect {
            x: left,
            y: top,
            width: right - left,
            height: bottom - top,
        };
        let caption = detection.caption();
        // Caption sits just below the box
        let caption_background = Rect {
            x: rect.x,
            y: bottom.saturating_add(CAPTION_GAP),
            width: self.font.measure(&caption) + 2 * CAPTION_PAD,
            height: self.font.line_height() + 4,
        };
        BoxLayout {
            rect,
            color: self.colors.color_for(&detection.label),
            caption_origin: (caption_background.x + CAPTION_PAD, caption_background.y + 2),
            caption,
            caption_background,
        }
    }

    fn layout_legend(&self, width: i32, height: i32) -> LegendLayout {
        let item_width =
            |label: &str| LEGEND_TEXT_OFFSET + self.font.measure(label) + LEGEND_ITEM_SPACING;
        let total_width: i32 = self.colors.entries().map(|(label, _)| item_width(label)).sum();

        let top = height - LEGEND_BOTTOM_OFFSET;
        let mut x = (width - total_width) / 2;
        let items = self
            .colors
            .entries()
            .map(|(label, color)| {
                let item = LegendItem {
                    label: label.to_string(),
                    color,
                    swatch: Rect {
                        x,
                        y: top,
                        width: LEGEND_SWATCH,
                        height: LEGEND_SWATCH,
                    },
                    text_origin: (x + LEGEND_TEXT_OFFSET, top),
                };
                x += item_width(label);
                item
            })
            .collect();

        LegendLayout {
            strip: Rect {
                x: 0,
                y: top - 2,
                width,
                height: LEGEND_STRIP_HEIGHT,
            },
            items,
        }
    }

    /// Clear the canvas and draw `detections` plus the legend
    pub fn render(&self, canvas: &mut Canvas, detections: &[Detection]) {
        canvas.clear();
        let (width, height) = canvas.dimensions();
        let layout = self.layout(width, height, detections);
        self.paint(&mut canvas.image, &layout);
    }

    fn paint(&self, image: &mut RgbaImage, layout: &OverlayLayout) {
        for b in &layout.boxes {
            stroke_rect(image, b.rect, b.color, self.line_width);
            fill_rect(image, b.caption_background, CAPTION_BACKGROUND);
            let (x, y) = b.caption_origin;
            self.font.draw(image, x, y, &b.caption, b.color);
        }

        let legend = &layout.legend;
        fill_rect(image, legend.strip, LEGEND_BACKGROUND);
        for item in &legend.items {
            fill_rect(image, item.swatch, item.color);
            let (x, y) = item.text_origin;
            self.font.draw(image, x, y, &item.label, LEGEND_TEXT);
        }
    }
}

/// Blend the overlay onto a video frame. Canvas pixels outside the frame are
/// ignored.
pub fn composite(frame: &RgbImage, canvas: &Canvas) -> RgbImage {
    let mut out = frame.clone();
    let (width, height) = canvas.dimensions();
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        if x >= width || y >= height {
            continue;
        }
        let overlay = *canvas.image.get_pixel(x, y);
        if overlay[3] == 0 {
            continue;
        }
        let mut base = Rgba([pixel[0], pixel[1], pixel[2], 255]);
        blend(&mut base, overlay);
        *pixel = image::Rgb([base[0], base[1], base[2]]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn renderer() -> OverlayRenderer {
        OverlayRenderer::new(ClassColors::default(), 18, 3)
    }

    fn helmet() -> Detection {
        Detection {
            x1: 10.0,
            y1: 10.0,
            x2: 50.0,
            y2: 50.0,
            label: "helmet".to_string(),
            score: 0.93,
        }
    }

    #[test]
    fn empty_render_draws_only_centred_legend() {
        let renderer = renderer();
        let mut canvas = Canvas::new(640, 480);
        renderer.render(&mut canvas, &[]);

        let layout = renderer.layout(640, 480, &[]);
        assert!(layout.boxes.is_empty());

        let labels: Vec<_> = layout.legend.items.iter().map(|i| i.label.as_str()).collect();
        assert_eq!(labels, ["helmet", "no_helmet", "rider", "platenumber"]);

        let left = layout.legend.items[0].swatch.x;
        let last = &layout.legend.items[3];
        let end = last.text_origin.0 + renderer.font.measure(&last.label) + LEGEND_ITEM_SPACING;
        let right = 640 - end;
        assert!((left - right).abs() <= 1, "legend not centred: {left} vs {right}");

        // Nothing above the legend strip
        let strip_top = layout.legend.strip.y as u32;
        for (_, y, pixel) in canvas.image().enumerate_pixels() {
            if y < strip_top {
                assert_eq!(pixel[3], 0);
            }
        }
        assert_eq!(layout.legend.strip, Rect { x: 0, y: 448, width: 640, height: 20 });
        assert_eq!(*canvas.image().get_pixel(2, 449), LEGEND_BACKGROUND);
    }

    #[test]
    fn legend_lists_classes_absent_from_detections() {
        let layout = renderer().layout(640, 480, &[helmet()]);
        assert_eq!(layout.legend.items.len(), 4);
    }

    #[test]
    fn helmet_box_is_red_with_caption_below() {
        let renderer = renderer();
        let mut canvas = Canvas::new(640, 480);
        renderer.render(&mut canvas, &[helmet()]);

        let layout = renderer.layout(640, 480, &[helmet()]);
        assert_eq!(layout.boxes.len(), 1);
        let b = &layout.boxes[0];
        assert_eq!(b.rect, Rect { x: 10, y: 10, width: 40, height: 40 });
        assert_eq!(b.color, Rgba([255, 0, 0, 255]));
        assert_eq!(b.caption, "helmet 0.93");
        assert_eq!(b.caption_background.y, 52);
        assert_eq!(b.caption_background.width, 11 * 12 + 6);

        let image = canvas.image();
        assert_eq!(*image.get_pixel(10, 30), Rgba([255, 0, 0, 255]));
        assert_eq!(*image.get_pixel(50, 30), Rgba([255, 0, 0, 255]));
        assert_eq!(image.get_pixel(30, 30)[3], 0);
        // Caption padding is background only
        assert_eq!(*image.get_pixel(11, 53), CAPTION_BACKGROUND);
    }

    #[test]
    fn unmapped_label_uses_fallback_colour() {
        let mut colors = ClassColors::default();
        colors.apply_override("*=gray").unwrap();
        let renderer = OverlayRenderer::new(colors, 18, 3);
        let unknown = Detection {
            label: "unknown".to_string(),
            ..helmet()
        };

        let mut canvas = Canvas::new(200, 200);
        renderer.render(&mut canvas, &[unknown.clone()]);

        let gray = Rgba([128, 128, 128, 255]);
        assert_eq!(renderer.layout(200, 200, &[unknown]).boxes[0].color, gray);
        assert_eq!(*canvas.image().get_pixel(10, 30), gray);
    }

    #[test]
    fn render_replaces_previous_frame() {
        let renderer = renderer();
        let mut canvas = Canvas::new(320, 240);
        renderer.render(&mut canvas, &[helmet()]);
        renderer.render(&mut canvas, &[]);
        assert_eq!(canvas.image().get_pixel(10, 30)[3], 0);
    }

    #[test]
    fn canvas_resize_is_idempotent() {
        let mut canvas = Canvas::new(0, 0);
        assert!(canvas.resize(640, 480));
        assert!(!canvas.resize(640, 480));
        assert_eq!(canvas.dimensions(), (640, 480));
        assert!(canvas.is_clear());
    }

    #[test]
    fn composite_blends_overlay_onto_frame() {
        let frame = RgbImage::from_pixel(64, 64, image::Rgb([0, 0, 0]));
        let renderer = renderer();
        let mut canvas = Canvas::new(64, 64);
        renderer.render(&mut canvas, &[helmet()]);

        let out = composite(&frame, &canvas);
        assert_eq!(*out.get_pixel(10, 30), image::Rgb([255, 0, 0]));
        assert_eq!(*out.get_pixel(30, 30), image::Rgb([0, 0, 0]));
    }

    fn boxed(x1: f64, y1: f64, x2: f64, y2: f64) -> Detection {
        Detection {
            x1,
            y1,
            x2,
            y2,
            ..helmet()
        }
    }

    #[test]
    fn swapped_corners_draw_the_full_outline() {
        let renderer = renderer();
        let layout = renderer.layout(200, 200, &[boxed(50.0, 50.0, 10.0, 10.0)]);
        let b = &layout.boxes[0];
        assert_eq!(b.rect, Rect { x: 10, y: 10, width: 40, height: 40 });
        assert_eq!(b.caption_background.y, 52);

        let mut canvas = Canvas::new(200, 200);
        renderer.render(&mut canvas, &[boxed(50.0, 10.0, 10.0, 50.0)]);
        let red = Rgba([255, 0, 0, 255]);
        let image = canvas.image();
        assert_eq!(*image.get_pixel(30, 10), red);
        assert_eq!(*image.get_pixel(30, 50), red);
        assert_eq!(*image.get_pixel(10, 30), red);
        assert_eq!(*image.get_pixel(50, 30), red);
        assert_eq!(image.get_pixel(30, 30)[3], 0);
    }

    #[test]
    fn huge_coordinates_are_clamped() {
        let renderer = renderer();
        let mut canvas = Canvas::new(64, 64);
        let far = [
            boxed(10.0, 1e9, 50.0, 3e9),
            boxed(-3e9, -3e9, 3e9, 3e9),
            boxed(f64::MAX, f64::MIN, f64::INFINITY, f64::NEG_INFINITY),
            boxed(f64::NAN, 5.0, 20.0, f64::NAN),
        ];
        renderer.render(&mut canvas, &far);

        let layout = renderer.layout(64, 64, &far);
        assert_eq!(layout.boxes[0].rect, Rect { x: 10, y: 256, width: 40, height: 0 });
        assert_eq!(layout.boxes[1].rect, Rect { x: -256, y: -256, width: 512, height: 512 });
        for b in &layout.boxes {
            assert!(b.rect.width >= 0 && b.rect.height >= 0);
        }
        // The box enclosing the frame has its stroke outside it
        assert_eq!(canvas.image().get_pixel(5, 20)[3], 0);
    }

    #[test]
    fn off_canvas_box_leaves_overlay_untouched() {
        let renderer = renderer();
        let mut canvas = Canvas::new(64, 64);
        let outside = [
            boxed(100.0, 100.0, 140.0, 140.0),
            boxed(-90.0, -90.0, -70.0, -70.0),
        ];
        renderer.render(&mut canvas, &outside);
        let strip_top = renderer.layout(64, 64, &[]).legend.strip.y as u32;
        for (_, y, pixel) in canvas.image().enumerate_pixels() {
            if y < strip_top {
                assert_eq!(pixel[3], 0);
            }
        }
    }

    #[test]
    fn partially_visible_box_is_clipped() {
        let renderer = renderer();
        let mut canvas = Canvas::new(64, 64);
        renderer.render(&mut canvas, &[boxed(-20.0, -20.0, 20.0, 20.0)]);

        let red = Rgba([255, 0, 0, 255]);
        let image = canvas.image();
        // Right and bottom edges are on screen, the other two are not
        assert_eq!(*image.get_pixel(20, 5), red);
        assert_eq!(*image.get_pixel(5, 20), red);
        assert_eq!(image.get_pixel(0, 5)[3], 0);
        assert_eq!(image.get_pixel(5, 5)[3], 0);
    }
}
