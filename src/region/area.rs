use image::{imageops, RgbImage};
use serde::{Deserialize, Serialize};

/// Inclusive pixel bounds of a region.
///
/// Axes follow array order: `x` spans image rows (vertical), `y` spans
/// columns (horizontal). Region files store `[x_min, y_min, x_max, y_max]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[u32; 4]", into = "[u32; 4]")]
pub struct Area {
    pub x_min: u32,
    pub y_min: u32,
    pub x_max: u32,
    pub y_max: u32,
}

impl Area {
    /// Creates an area, ordering each pair so that `min <= max`.
    pub fn new(x_min: u32, y_min: u32, x_max: u32, y_max: u32) -> Self {
        Self {
            x_min: x_min.min(x_max),
            y_min: y_min.min(y_max),
            x_max: x_min.max(x_max),
            y_max: y_min.max(y_max),
        }
    }

    /// Slices this area out of `frame`, clamped to the frame bounds.
    ///
    /// Returns `None` when nothing is left (area entirely outside the frame).
    pub fn slice(&self, frame: &RgbImage) -> Option<RgbImage> {
        let (width, height) = frame.dimensions();

        let row_start = self.x_min.min(height);
        let row_end = self.x_max.saturating_add(1).min(height);
        let col_start = self.y_min.min(width);
        let col_end = self.y_max.saturating_add(1).min(width);

        if row_end <= row_start || col_end <= col_start {
            return None;
        }

        Some(
            imageops::crop_imm(
                frame,
                col_start,
                row_start,
                col_end - col_start,
                row_end - row_start,
            )
            .to_image(),
        )
    }
}

impl From<[u32; 4]> for Area {
    fn from(v: [u32; 4]) -> Self {
        Area::new(v[0], v[1], v[2], v[3])
    }
}

impl From<Area> for [u32; 4] {
    fn from(a: Area) -> Self {
        [a.x_min, a.y_min, a.x_max, a.y_max]
    }
}
