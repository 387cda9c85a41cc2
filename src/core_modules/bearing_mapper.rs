// THEORY:
// Maps the horizontal position of the target centroid onto the pan servo's
// angle range. The range is inverted: the left edge of the frame maps to
// `angle_max` and the right edge to `angle_min`, mirroring how the camera sits
// on the pan head. The mapping is linear, clamped and truncated to whole
// degrees; smoothing is left to the dispatcher's gates.

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BearingConfig {
    pub angle_min: i32,
    pub angle_max: i32,
}

impl Default for BearingConfig {
    fn default() -> Self {
        Self {
            angle_min: 30,
            angle_max: 120,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BearingMapper {
    config: BearingConfig,
}

impl BearingMapper {
    pub fn new(config: BearingConfig) -> Self {
        Self { config }
    }

    pub fn map_to_angle(&self, centroid_x: i32, frame_width: u32) -> i32 {
        map_to_angle(centroid_x, frame_width, self.config.angle_min, self.config.angle_max)
    }
}

/// Interpolates `centroid_x` from `[0, frame_width]` onto `[angle_max, angle_min]`.
pub fn map_to_angle(centroid_x: i32, frame_width: u32, angle_min: i32, angle_max: i32) -> i32 {
    if frame_width == 0 {
        return angle_max;
    }
    let t = (centroid_x as f64 / frame_width as f64).clamp(0.0, 1.0);
    let angle = angle_max as f64 + t * (angle_min - angle_max) as f64;
    let (low, high) = (angle_min.min(angle_max), angle_min.max(angle_max));
    (angle.trunc() as i32).clamp(low, high)
}

#[cfg(test)]
mod tests {
    use super::*;

    const WIDTH: u32 = 640;

    fn mapper() -> BearingMapper {
        BearingMapper::new(BearingConfig::default())
    }

    #[test]
    fn edges_map_to_range_ends() {
        assert_eq!(mapper().map_to_angle(0, WIDTH), 120);
        assert_eq!(mapper().map_to_angle(WIDTH as i32, WIDTH), 30);
        assert_eq!(mapper().map_to_angle(320, WIDTH), 75);
    }

    #[test]
    fn fractional_angles_truncate() {
        // 120 - 90 * 100 / 640 = 105.94
        assert_eq!(mapper().map_to_angle(100, WIDTH), 105);
    }

    #[test]
    fn sweep_is_non_increasing_and_bounded() {
        let mapper = mapper();
        let mut previous = i32::MAX;
        for x in 0..=WIDTH as i32 {
            let angle = mapper.map_to_angle(x, WIDTH);
            assert!((30..=120).contains(&angle));
            assert!(angle <= previous, "x={x}");
            previous = angle;
        }
    }

    #[test]
    fn out_of_range_inputs_clamp() {
        assert_eq!(mapper().map_to_angle(-50, WIDTH), 120);
        assert_eq!(mapper().map_to_angle(5000, WIDTH), 30);
        assert_eq!(mapper().map_to_angle(10, 0), 120);
    }

    #[test]
    fn swapped_bounds_flip_the_mapping() {
        let flipped = BearingMapper::new(BearingConfig {
            angle_min: 150,
            angle_max: 10,
        });
        assert_eq!(flipped.map_to_angle(320, WIDTH), 80);
        assert_eq!(flipped.map_to_angle(0, WIDTH), 10);
        assert_eq!(flipped.map_to_angle(640, WIDTH), 150);
    }
}
