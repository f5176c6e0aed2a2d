use image::{Rgba, RgbaImage};

use crate::core::detection::models::Detection;

/// Same palette the backend draws with.
pub const CLASS_PALETTE: [[u8; 3]; 10] = [
    [255, 0, 0],
    [0, 255, 0],
    [0, 0, 255],
    [255, 255, 0],
    [255, 0, 255],
    [0, 255, 255],
    [128, 0, 128],
    [255, 165, 0],
    [0, 128, 128],
    [128, 128, 0],
];

const OUTLINE_PX: u32 = 2;

pub fn color_for_class(class_id: usize) -> Rgba<u8> {
    let [r, g, b] = CLASS_PALETTE[class_id % CLASS_PALETTE.len()];
    Rgba([r, g, b, 255])
}

/// Position of `label` in the model's class list. Labels the model does not
/// list share the slot right after the known classes.
pub fn class_index(classes: &[&str], label: &str) -> usize {
    classes
        .iter()
        .position(|c| *c == label)
        .unwrap_or(classes.len())
}

/// Outline every detection, coloured by its class position in `classes`.
pub fn draw_detections(img: &mut RgbaImage, detections: &[Detection], classes: &[&str]) {
    for det in detections {
        let color = color_for_class(class_index(classes, &det.class_label));
        draw_box(img, det, color);
    }
}

fn draw_box(img: &mut RgbaImage, det: &Detection, color: Rgba<u8>) {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return;
    }
    let bb = det.bounding_box;
    let clamp_x = |v: f32| (v.max(0.0) as u32).min(w - 1);
    let clamp_y = |v: f32| (v.max(0.0) as u32).min(h - 1);
    let (x0, y0) = (clamp_x(bb.x), clamp_y(bb.y));
    let (x1, y1) = (clamp_x(bb.x + bb.width), clamp_y(bb.y + bb.height));
    if x1 < x0 || y1 < y0 {
        return;
    }

    for t in 0..OUTLINE_PX {
        for x in x0..=x1 {
            img.put_pixel(x, (y0 + t).min(y1), color);
            img.put_pixel(x, y1.saturating_sub(t).max(y0), color);
        }
        for y in y0..=y1 {
            img.put_pixel((x0 + t).min(x1), y, color);
            img.put_pixel(x1.saturating_sub(t).max(x0), y, color);
        }
    }
}
