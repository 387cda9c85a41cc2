// THEORY:
// The `RegionAggregator` is the spatial layer. It reads the cleaned foreground
// mask and collapses everything that moved into one composite target.
//
// Steps:
// 1.  **Outside marking**: background pixels reachable from the image border
//     through 4-connected background are flagged. A foreground component that
//     touches none of them sits inside another object's hole and is skipped, so
//     only external contours contribute.
// 2.  **Labelling**: 8-connected components are found with an explicit stack.
//     The first pixel of a component in raster order is its top-left boundary
//     pixel and seeds the contour trace.
// 3.  **Contour tracing**: Moore-neighbour tracing walks the outer boundary
//     clockwise and stops with Jacob's criterion. The area is the shoelace area
//     of the boundary polygon through pixel centres, so a filled `n x n` square
//     measures `(n - 1)^2`.
// 4.  **Aggregation**: regions whose area does not exceed `min_area` are
//     dropped. The survivors are merged into a single bounding box whose
//     midpoint is the target centroid. Multiple movers are deliberately treated
//     as one target.
//
// All scratch buffers are owned by the aggregator and reused frame to frame.

use image::GrayImage;

/// Clockwise neighbour offsets starting at west, with y growing downwards.
const DIRECTIONS: [(i32, i32); 8] = [
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
];

/// Scratch capacity kept across a reclamation pass.
const RECLAIM_BASELINE: usize = 4096;
const REGION_BASELINE: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

/// Upright rectangle; `right()` and `bottom()` are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl BoundingBox {
    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        BoundingBox {
            x,
            y,
            width: self.right().max(other.right()) - x,
            height: self.bottom().max(other.bottom()) - y,
        }
    }

    pub fn contains(&self, other: &BoundingBox) -> bool {
        self.x <= other.x && self.y <= other.y && self.right() >= other.right() && self.bottom() >= other.bottom()
    }

    /// Midpoint with truncating integer division.
    pub fn center(&self) -> Point {
        Point {
            x: (self.x + self.right()) / 2,
            y: (self.y + self.bottom()) / 2,
        }
    }
}

/// One external contour: its bounding rectangle and enclosed area.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    pub rect: BoundingBox,
    pub area: f64,
}

/// The composite target of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    pub bounding_box: BoundingBox,
    pub centroid: Point,
    /// Number of regions that survived the area gate.
    pub region_count: usize,
}

/// Merges every region with `area > min_area` into one box.
pub fn union_of_survivors(regions: &[Region], min_area: f64) -> Option<(BoundingBox, usize)> {
    regions
        .iter()
        .filter(|region| region.area > min_area)
        .fold(None, |acc: Option<(BoundingBox, usize)>, region| match acc {
            None => Some((region.rect, 1)),
            Some((merged, count)) => Some((merged.union(&region.rect), count + 1)),
        })
}

#[derive(Default)]
pub struct RegionAggregator {
    labels: Vec<u32>,
    outside: Vec<bool>,
    stack: Vec<usize>,
    boundary: Vec<Point>,
    regions: Vec<Region>,
}

impl RegionAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collapses the external contours of `mask` into a single target.
    pub fn aggregate(&mut self, mask: &GrayImage, min_area: f64) -> Option<Target> {
        self.extract_regions(mask);
        union_of_survivors(&self.regions, min_area).map(|(bounding_box, region_count)| Target {
            bounding_box,
            centroid: bounding_box.center(),
            region_count,
        })
    }

    /// Regions of the last processed mask, before the area gate.
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Finds every external contour of `mask`.
    pub fn extract_regions(&mut self, mask: &GrayImage) -> &[Region] {
        let (width, height) = mask.dimensions();
        let pixels = width as usize * height as usize;
        self.regions.clear();
        if pixels == 0 {
            return &self.regions;
        }

        self.labels.clear();
        self.labels.resize(pixels, 0);
        self.mark_outside(mask);

        let samples = mask.as_raw();
        let (w, h) = (width as i32, height as i32);
        let mut next_label = 0u32;

        for seed in 0..pixels {
            if samples[seed] == 0 || self.labels[seed] != 0 {
                continue;
            }
            next_label += 1;
            let mut external = false;

            self.labels[seed] = next_label;
            self.stack.clear();
            self.stack.push(seed);
            while let Some(index) = self.stack.pop() {
                let (x, y) = ((index % width as usize) as i32, (index / width as usize) as i32);
                if x == 0 || y == 0 || x == w - 1 || y == h - 1 {
                    external = true;
                }
                for (dx, dy) in DIRECTIONS {
                    let (nx, ny) = (x + dx, y + dy);
                    if nx < 0 || ny < 0 || nx >= w || ny >= h {
                        continue;
                    }
                    let neighbour = ny as usize * width as usize + nx as usize;
                    if samples[neighbour] != 0 {
                        if self.labels[neighbour] == 0 {
                            self.labels[neighbour] = next_label;
                            self.stack.push(neighbour);
                        }
                    } else if (dx == 0 || dy == 0) && self.outside[neighbour] {
                        external = true;
                    }
                }
            }

            if external {
                let start = Point {
                    x: (seed % width as usize) as i32,
                    y: (seed / width as usize) as i32,
                };
                trace_boundary(mask, start, &mut self.boundary);
                self.regions.push(Region {
                    rect: bounding_rect(&self.boundary),
                    area: polygon_area(&self.boundary),
                });
            }
        }

        &self.regions
    }

    /// Trims scratch capacity that grew beyond its baseline. Returns the number
    /// of bytes handed back to the allocator.
    pub fn reclaim(&mut self) -> usize {
        let before = self.scratch_bytes();
        self.stack.shrink_to(RECLAIM_BASELINE);
        self.boundary.shrink_to(RECLAIM_BASELINE);
        self.regions.shrink_to(REGION_BASELINE);
        before.saturating_sub(self.scratch_bytes())
    }

    fn scratch_bytes(&self) -> usize {
        self.stack.capacity() * std::mem::size_of::<usize>()
            + self.boundary.capacity() * std::mem::size_of::<Point>()
            + self.regions.capacity() * std::mem::size_of::<Region>()
    }

    fn mark_outside(&mut self, mask: &GrayImage) {
        let (width, height) = mask.dimensions();
        let (w, h) = (width as usize, height as usize);
        let samples = mask.as_raw();

        self.outside.clear();
        self.outside.resize(w * h, false);
        self.stack.clear();

        let seed = |index: usize, outside: &mut Vec<bool>, stack: &mut Vec<usize>| {
            if samples[index] == 0 && !outside[index] {
                outside[index] = true;
                stack.push(index);
            }
        };
        for x in 0..w {
            seed(x, &mut self.outside, &mut self.stack);
            seed((h - 1) * w + x, &mut self.outside, &mut self.stack);
        }
        for y in 0..h {
            seed(y * w, &mut self.outside, &mut self.stack);
            seed(y * w + w - 1, &mut self.outside, &mut self.stack);
        }

        while let Some(index) = self.stack.pop() {
            let (x, y) = (index % w, index / w);
            let neighbours = [
                (x > 0).then(|| index - 1),
                (x + 1 < w).then(|| index + 1),
                (y > 0).then(|| index - w),
                (y + 1 < h).then(|| index + w),
            ];
            for neighbour in neighbours.into_iter().flatten() {
                if samples[neighbour] == 0 && !self.outside[neighbour] {
                    self.outside[neighbour] = true;
                    self.stack.push(neighbour);
                }
            }
        }
    }
}

fn is_foreground(mask: &GrayImage, x: i32, y: i32) -> bool {
    let (width, height) = mask.dimensions();
    x >= 0 && y >= 0 && (x as u32) < width && (y as u32) < height && mask.get_pixel(x as u32, y as u32).0[0] != 0
}

fn direction_index(dx: i32, dy: i32) -> usize {
    DIRECTIONS.iter().position(|&d| d == (dx, dy)).unwrap_or(0)
}

/// Moore-neighbour tracing of the outer boundary starting at the component's
/// first raster pixel, whose west neighbour is background.
fn trace_boundary(mask: &GrayImage, start: Point, boundary: &mut Vec<Point>) {
    boundary.clear();
    boundary.push(start);

    let (width, height) = mask.dimensions();
    let max_steps = 4 * width as usize * height as usize + 8;
    let mut current = start;
    let mut backtrack = 0usize;
    let mut first_move: Option<usize> = None;

    loop {
        let step = (1..=8).map(|i| (backtrack + i) % 8).find(|&d| {
            let (dx, dy) = DIRECTIONS[d];
            is_foreground(mask, current.x + dx, current.y + dy)
        });
        let Some(direction) = step else {
            break;
        };

        if current == start {
            match first_move {
                Some(first) if first == direction => break,
                None => first_move = Some(direction),
                _ => {}
            }
        }

        let (mx, my) = DIRECTIONS[direction];
        let (bx, by) = DIRECTIONS[(direction + 7) % 8];
        backtrack = direction_index(bx - mx, by - my);
        current = Point {
            x: current.x + mx,
            y: current.y + my,
        };
        boundary.push(current);

        if boundary.len() > max_steps {
            break;
        }
    }

    if boundary.len() > 1 && boundary.last() == Some(&start) {
        boundary.pop();
    }
}

fn bounding_rect(points: &[Point]) -> BoundingBox {
    let Some(first) = points.first() else {
        return BoundingBox::default();
    };
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for p in points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    BoundingBox {
        x: min_x,
        y: min_y,
        width: max_x - min_x + 1,
        height: max_y - min_y + 1,
    }
}

fn polygon_area(points: &[Point]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let twice: i64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64)
        .sum();
    twice.abs() as f64 / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn fill(mask: &mut GrayImage, x0: u32, y0: u32, x1: u32, y1: u32) {
        for y in y0..y1 {
            for x in x0..x1 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
    }

    fn rect(x: i32, y: i32, width: i32, height: i32) -> BoundingBox {
        BoundingBox { x, y, width, height }
    }

    #[test]
    fn empty_mask_yields_no_target() {
        let mut aggregator = RegionAggregator::new();
        assert!(aggregator.aggregate(&GrayImage::new(32, 24), 0.0).is_none());
        assert!(aggregator.regions().is_empty());
    }

    #[test]
    fn filled_square_measures_through_pixel_centres() {
        let mut mask = GrayImage::new(100, 100);
        fill(&mut mask, 10, 20, 60, 70);
        let mut aggregator = RegionAggregator::new();
        let regions = aggregator.extract_regions(&mask);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].rect, rect(10, 20, 50, 50));
        assert_eq!(regions[0].area, 2401.0);
    }

    #[test]
    fn thin_shapes_have_zero_area() {
        let mut mask = GrayImage::new(10, 10);
        fill(&mut mask, 2, 4, 7, 5);
        mask.put_pixel(9, 9, Luma([255]));
        let mut aggregator = RegionAggregator::new();
        let regions = aggregator.extract_regions(&mask).to_vec();
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].rect, rect(2, 4, 5, 1));
        assert_eq!(regions[0].area, 0.0);
        assert_eq!(regions[1].rect, rect(9, 9, 1, 1));
    }

    #[test]
    fn diagonal_pixels_form_one_component() {
        let mut mask = GrayImage::new(8, 8);
        for i in 1..6 {
            mask.put_pixel(i, i, Luma([255]));
        }
        let mut aggregator = RegionAggregator::new();
        let regions = aggregator.extract_regions(&mask);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].rect, rect(1, 1, 5, 5));
    }

    #[test]
    fn contours_inside_holes_are_ignored() {
        let mut mask = GrayImage::new(40, 40);
        fill(&mut mask, 5, 5, 35, 35);
        fill(&mut mask, 8, 8, 32, 32);
        for y in 8..32 {
            for x in 8..32 {
                mask.put_pixel(x, y, Luma([0]));
            }
        }
        fill(&mut mask, 15, 15, 25, 25);
        let mut aggregator = RegionAggregator::new();
        let regions = aggregator.extract_regions(&mask);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].rect, rect(5, 5, 30, 30));
        assert_eq!(regions[0].area, 29.0 * 29.0);
    }

    #[test]
    fn area_gate_is_strict() {
        let mut mask = GrayImage::new(60, 60);
        fill(&mut mask, 0, 0, 11, 11);
        let mut aggregator = RegionAggregator::new();
        assert!(aggregator.aggregate(&mask, 100.0).is_none());
        assert!(aggregator.aggregate(&mask, 99.0).is_some());
    }

    #[test]
    fn survivors_are_merged_into_one_box() {
        let mut mask = GrayImage::new(200, 100);
        fill(&mut mask, 10, 10, 50, 50);
        fill(&mut mask, 120, 40, 170, 90);
        fill(&mut mask, 90, 5, 93, 8);
        let mut aggregator = RegionAggregator::new();
        let target = aggregator.aggregate(&mask, 1000.0).expect("target");
        assert_eq!(target.region_count, 2);
        assert_eq!(target.bounding_box, rect(10, 10, 160, 80));
        assert_eq!(target.centroid, Point { x: 90, y: 50 });
        for region in aggregator.regions().iter().filter(|r| r.area > 1000.0) {
            assert!(target.bounding_box.contains(&region.rect));
        }
    }

    #[test]
    fn adding_a_region_never_shrinks_the_union() {
        let mut regions = vec![
            Region { rect: rect(40, 40, 30, 30), area: 1500.0 },
            Region { rect: rect(10, 60, 45, 45), area: 2000.0 },
        ];
        let (before, _) = union_of_survivors(&regions, 1000.0).expect("union");
        for extra in [rect(0, 0, 40, 40), rect(50, 50, 5, 5), rect(100, 10, 40, 80)] {
            regions.push(Region { rect: extra, area: 1600.0 });
            let (after, _) = union_of_survivors(&regions, 1000.0).expect("union");
            assert!(after.contains(&before));
        }
    }

    #[test]
    fn centroid_truncates() {
        assert_eq!(rect(0, 0, 5, 3).center(), Point { x: 2, y: 1 });
        assert_eq!(rect(3, 4, 4, 4).center(), Point { x: 5, y: 6 });
    }

    #[test]
    fn reclaim_trims_grown_scratch() {
        let mut aggregator = RegionAggregator::new();
        aggregator.boundary.reserve(RECLAIM_BASELINE * 4);
        assert!(aggregator.reclaim() > 0);
        assert_eq!(aggregator.reclaim(), 0);
    }
}
