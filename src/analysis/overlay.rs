//! Region outlines on calibration frames.

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use crate::region::Area;

const ENABLED_COLOR: Rgb<u8> = Rgb([0, 220, 0]);
const DISABLED_COLOR: Rgb<u8> = Rgb([160, 160, 160]);

/// Outlines each area on `frame`, two pixels wide, inside the area bounds.
///
/// Areas whose corner lies outside the frame are skipped.
pub fn draw_region_outlines<'a>(
    frame: &mut RgbImage,
    areas: impl IntoIterator<Item = (&'a Area, bool)>,
) {
    let (width, height) = frame.dimensions();

    for (area, enabled) in areas {
        // Area x is the row, y the column
        if area.x_min >= height || area.y_min >= width {
            log::warn!("Area {:?} lies outside the {}x{} frame", area, width, height);
            continue;
        }

        let color = if enabled { ENABLED_COLOR } else { DISABLED_COLOR };
        let cols = area.y_max - area.y_min + 1;
        let rows = area.x_max - area.x_min + 1;

        for inset in 0..2u32 {
            if cols <= inset * 2 || rows <= inset * 2 {
                break;
            }
            let rect = Rect::at((area.y_min + inset) as i32, (area.x_min + inset) as i32)
                .of_size(cols - inset * 2, rows - inset * 2);
            draw_hollow_rect_mut(frame, rect, color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outline_is_drawn_on_the_border_only() {
        let mut frame = RgbImage::new(30, 20);
        // rows 2..=8, columns 4..=14
        let area = Area::new(2, 4, 8, 14);

        draw_region_outlines(&mut frame, [(&area, true)]);

        assert_eq!(*frame.get_pixel(4, 2), ENABLED_COLOR);
        assert_eq!(*frame.get_pixel(14, 8), ENABLED_COLOR);
        assert_eq!(*frame.get_pixel(5, 3), ENABLED_COLOR);
        assert_eq!(*frame.get_pixel(9, 5), Rgb([0, 0, 0]));
        assert_eq!(*frame.get_pixel(15, 2), Rgb([0, 0, 0]));
        assert_eq!(*frame.get_pixel(4, 9), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_disabled_and_outside_areas() {
        let mut frame = RgbImage::new(10, 10);
        let disabled = Area::new(0, 0, 5, 5);
        let outside = Area::new(50, 50, 60, 60);

        draw_region_outlines(&mut frame, [(&disabled, false), (&outside, true)]);

        assert_eq!(*frame.get_pixel(0, 0), DISABLED_COLOR);
        assert!(!frame.pixels().any(|p| *p == ENABLED_COLOR));
    }
}
