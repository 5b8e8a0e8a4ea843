use super::Rect;
use image::{Rgba, RgbaImage};

/// Source-over compositing of `src` onto `dst`
pub(crate) fn blend(dst: &mut Rgba<u8>, src: Rgba<u8>) {
    let sa = src[3] as f32 / 255.0;
    if sa >= 1.0 {
        *dst = src;
        return;
    }
    if sa <= 0.0 {
        return;
    }

    let da = dst[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    for c in 0..3 {
        let value = (src[c] as f32 * sa + dst[c] as f32 * da * (1.0 - sa)) / out_a;
        dst[c] = value.round().clamp(0.0, 255.0) as u8;
    }
    dst[3] = (out_a * 255.0).round() as u8;
}

/// Fill `rect`, clipped to the image
pub(crate) fn fill_rect(image: &mut RgbaImage, rect: Rect, color: Rgba<u8>) {
    let Some((left, top, right, bottom)) = clip(image, rect) else {
        return;
    };
    for y in top..bottom {
        for x in left..right {
            blend(image.get_pixel_mut(x, y), color);
        }
    }
}

/// Outline `rect` with a stroke of `line_width` centred on its edges
pub(crate) fn stroke_rect(image: &mut RgbaImage, rect: Rect, color: Rgba<u8>, line_width: u32) {
    let lw = line_width.clamp(1, i32::MAX as u32) as i32;
    let inner = lw / 2;
    let (x0, y0) = (rect.x.saturating_sub(inner), rect.y.saturating_sub(inner));
    let x1 = rect.x.saturating_add(rect.width).saturating_sub(inner);
    let y1 = rect.y.saturating_add(rect.height).saturating_sub(inner);
    let span_w = rect.width.saturating_add(lw);

    // Horizontal bands cover the corners, vertical bands only the sides
    // between them, so translucent colours are not applied twice.
    fill_rect(image, Rect { x: x0, y: y0, width: span_w, height: lw }, color);
    fill_rect(image, Rect { x: x0, y: y1, width: span_w, height: lw }, color);
    let side_top = y0.saturating_add(lw);
    let side_h = y1.saturating_sub(side_top).max(0);
    fill_rect(image, Rect { x: x0, y: side_top, width: lw, height: side_h }, color);
    fill_rect(image, Rect { x: x1, y: side_top, width: lw, height: side_h }, color);
}

fn clip(image: &RgbaImage, rect: Rect) -> Option<(u32, u32, u32, u32)> {
    let width = i32::try_from(image.width()).unwrap_or(i32::MAX);
    let height = i32::try_from(image.height()).unwrap_or(i32::MAX);
    let left = rect.x.clamp(0, width);
    let top = rect.y.clamp(0, height);
    let right = rect.x.saturating_add(rect.width).clamp(0, width);
    let bottom = rect.y.saturating_add(rect.height).clamp(0, height);
    if left >= right || top >= bottom {
        return None;
    }
    Some((left as u32, top as u32, right as u32, bottom as u32))
}
