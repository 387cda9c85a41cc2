// Draws the composite target onto a frame for the display surface: the
// aggregate box as a two-pixel outline and a filled square marker on the
// centroid. Text is left to display back-ends that own a font renderer.

use crate::core_modules::region_aggregator::{BoundingBox, Point, Target};
use image::{Rgb, RgbImage};

pub const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const CENTROID_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

const BOX_THICKNESS: i32 = 2;
const CENTROID_RADIUS: i32 = 4;

/// Draws `target` if there is one. Returns whether anything was drawn.
pub fn annotate(frame: &mut RgbImage, target: Option<&Target>) -> bool {
    let Some(target) = target else {
        return false;
    };
    draw_box(frame, &target.bounding_box, BOX_COLOR);
    draw_marker(frame, target.centroid, CENTROID_COLOR);
    true
}

pub fn draw_box(frame: &mut RgbImage, rect: &BoundingBox, color: Rgb<u8>) {
    let (left, top) = (rect.x, rect.y);
    let (right, bottom) = (rect.right() - 1, rect.bottom() - 1);
    for t in 0..BOX_THICKNESS {
        for x in left..=right {
            put(frame, x, top + t, color);
            put(frame, x, bottom - t, color);
        }
        for y in top..=bottom {
            put(frame, left + t, y, color);
            put(frame, right - t, y, color);
        }
    }
}

pub fn draw_marker(frame: &mut RgbImage, center: Point, color: Rgb<u8>) {
    for dy in -CENTROID_RADIUS..=CENTROID_RADIUS {
        for dx in -CENTROID_RADIUS..=CENTROID_RADIUS {
            if dx * dx + dy * dy <= CENTROID_RADIUS * CENTROID_RADIUS {
                put(frame, center.x + dx, center.y + dy, color);
            }
        }
    }
}

fn put(frame: &mut RgbImage, x: i32, y: i32, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < frame.width() && (y as u32) < frame.height() {
        frame.put_pixel(x as u32, y as u32, color);
    }
}
