use super::draw::fill_rect;
use super::Rect;
use image::{Rgba, RgbaImage};

const GLYPH_WIDTH: u32 = 5;
const GLYPH_HEIGHT: u32 = 7;
/// Glyph cell including one column and one row of spacing
const CELL_WIDTH: u32 = 6;
const CELL_HEIGHT: u32 = 8;

/// Fixed-width 5x7 bitmap font scaled by an integer factor.
///
/// Letters render as capitals; measurement is exact, which is all the overlay
/// layout needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitmapFont {
    scale: u32,
}

impl BitmapFont {
    /// Closest integer scale for a nominal pixel size
    pub fn for_size(px: u32) -> Self {
        Self {
            scale: (px / CELL_HEIGHT).max(1),
        }
    }

    pub fn line_height(&self) -> i32 {
        (CELL_HEIGHT * self.scale) as i32
    }

    pub fn measure(&self, text: &str) -> i32 {
        (text.chars().count() as u32 * CELL_WIDTH * self.scale) as i32
    }

    /// Draw `text` with its top-left corner at `(x, y)`
    pub fn draw(&self, image: &mut RgbaImage, x: i32, y: i32, text: &str, color: Rgba<u8>) {
        let scale = self.scale as i32;
        let mut pen_x = x;
        for ch in text.chars().flat_map(char::to_uppercase) {
            let rows = glyph(ch);
            for (row, bits) in rows.iter().enumerate() {
                for col in 0..GLYPH_WIDTH {
                    if (bits >> (GLYPH_WIDTH - 1 - col)) & 1 == 1 {
                        let dot = Rect {
                            x: pen_x + col as i32 * scale,
                            y: y + row as i32 * scale,
                            width: scale,
                            height: scale,
                        };
                        fill_rect(image, dot, color);
                    }
                }
            }
            pen_x += (CELL_WIDTH * self.scale) as i32;
        }
    }
}

fn glyph(ch: char) -> [u8; GLYPH_HEIGHT as usize] {
    match ch {
        'A' => [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'B' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10001, 0b10001, 0b11110],
        'C' => [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110],
        'D' => [0b11110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b11110],
        'E' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b11111],
        'F' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000],
        'G' => [0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01111],
        'H' => [0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'I' => [0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        'J' => [0b00111, 0b00010, 0b00010, 0b00010, 0b00010, 0b10010, 0b01100],
        'K' => [0b10001, 0b10010, 0b10100, 0b11000, 0b10100, 0b10010, 0b10001],
        'L' => [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111],
        'M' => [0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001],
        'N' => [0b10001, 0b10001, 0b11001, 0b10101, 0b10011, 0b10001, 0b10001],
        'O' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'P' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000],
        'Q' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10101, 0b10010, 0b01101],
        'R' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001],
        'S' => [0b01111, 0b10000, 0b10000, 0b01110, 0b00001, 0b00001, 0b11110],
        'T' => [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100],
        'U' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'V' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01010, 0b00100],
        'W' => [0b10001, 0b10001, 0b10001, 0b10101, 0b10101, 0b10101, 0b01010],
        'X' => [0b10001, 0b10001, 0b01010, 0b00100, 0b01010, 0b10001, 0b10001],
        'Y' => [0b10001, 0b10001, 0b10001, 0b01010, 0b00100, 0b00100, 0b00100],
        'Z' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b10000, 0b11111],
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
        '3' => [0b11110, 0b00001, 0b00001, 0b01110, 0b00001, 0b00001, 0b11110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        '.' => [0, 0, 0, 0, 0, 0b01100, 0b01100],
        ',' => [0, 0, 0, 0, 0b01100, 0b00100, 0b01000],
        ':' => [0, 0b01100, 0b01100, 0, 0b01100, 0b01100, 0],
        '_' => [0, 0, 0, 0, 0, 0, 0b11111],
        '-' => [0, 0, 0, 0b11111, 0, 0, 0],
        '%' => [0b11001, 0b11010, 0b00010, 0b00100, 0b01000, 0b01011, 0b10011],
        ' ' => [0; GLYPH_HEIGHT as usize],
        _ => [0b11111, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b11111],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eighteen_pixel_font_uses_double_scale() {
        let font = BitmapFont::for_size(18);
        assert_eq!(font.line_height(), 16);
        assert_eq!(font.measure("helmet 0.93"), 11 * 12);
    }

    #[test]
    fn tiny_sizes_clamp_to_unit_scale() {
        let font = BitmapFont::for_size(3);
        assert_eq!(font.line_height(), 8);
        assert_eq!(font.measure("ab"), 12);
    }

    #[test]
    fn draws_only_inside_measured_box() {
        let font = BitmapFont::for_size(8);
        let mut image = RgbaImage::new(40, 20);
        let ink = Rgba([0, 0, 0, 255]);
        font.draw(&mut image, 2, 3, "H1", ink);

        let width = font.measure("H1");
        for (x, y, pixel) in image.enumerate_pixels() {
            let inside = (2..2 + width).contains(&(x as i32))
                && (3..3 + font.line_height()).contains(&(y as i32));
            if !inside {
                assert_eq!(pixel[3], 0, "ink outside text box at ({x}, {y})");
            }
        }
        // Top-left dot of 'H'
        assert_eq!(*image.get_pixel(2, 3), ink);
    }
}
