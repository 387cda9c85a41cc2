// THEORY:
// The `ForegroundRefiner` turns the raw, speckled mask from the background model
// into a few solid blobs. It runs three binary morphology passes:
//   1. opening (erode, dilate) with an elliptical element removes isolated specks,
//   2. closing (dilate, erode) with the same element fills pin-holes,
//   3. `dilate_iterations` extra 3x3 dilations fuse nearby fragments of one object.
//
// A structuring element is stored as one horizontal span per row. Each pass
// builds per-row prefix counts of the source mask, so testing a span is two
// lookups regardless of its width. Out-of-image samples count as foreground for
// erosion and as background for dilation, so blobs touching the border are not
// eaten away.

use image::GrayImage;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RefinerConfig {
    /// Diameter of the elliptical element used for opening and closing.
    pub kernel_size: u32,
    /// Number of 3x3 dilations applied after closing.
    pub dilate_iterations: u32,
}

impl Default for RefinerConfig {
    fn default() -> Self {
        Self {
            kernel_size: 7,
            dilate_iterations: 2,
        }
    }
}

/// One row of a structuring element: `dy` relative to the anchor and the
/// half-open column range `[start, end)` relative to the anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    dy: i32,
    start: i32,
    end: i32,
}

/// A binary structuring element anchored at its centre.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuringElement {
    spans: Vec<Span>,
}

impl StructuringElement {
    /// Ellipse inscribed in a `size x size` box.
    pub fn ellipse(size: u32) -> Self {
        let size = size.max(1) as i32;
        let r = size / 2;
        let c = size / 2;
        let inv_r2 = if r > 0 { 1.0 / (r * r) as f64 } else { 0.0 };

        let spans = (0..size)
            .filter_map(|i| {
                let dy = i - r;
                if dy.abs() > r {
                    return None;
                }
                let dx = (c as f64 * (((r * r - dy * dy) as f64) * inv_r2).sqrt()).round() as i32;
                let j1 = (c - dx).max(0);
                let j2 = (c + dx + 1).min(size);
                Some(Span {
                    dy,
                    start: j1 - c,
                    end: j2 - c,
                })
            })
            .collect();
        Self { spans }
    }

    /// Full `width x height` rectangle.
    pub fn rect(width: u32, height: u32) -> Self {
        let (width, height) = (width.max(1) as i32, height.max(1) as i32);
        let (cx, cy) = (width / 2, height / 2);
        let spans = (0..height)
            .map(|i| Span {
                dy: i - cy,
                start: -cx,
                end: width - cx,
            })
            .collect();
        Self { spans }
    }

    /// Number of active cells.
    pub fn area(&self) -> usize {
        self.spans.iter().map(|s| (s.end - s.start) as usize).sum()
    }

    pub fn contains(&self, dx: i32, dy: i32) -> bool {
        self.spans
            .iter()
            .any(|s| s.dy == dy && dx >= s.start && dx < s.end)
    }
}

#[derive(Debug, Clone, Copy)]
enum Operation {
    Erode,
    Dilate,
}

/// Runs the open/close/dilate chain over reusable buffers.
pub struct ForegroundRefiner {
    config: RefinerConfig,
    element: StructuringElement,
    merge_element: StructuringElement,
    prefix: Vec<u32>,
    scratch: GrayImage,
    output: GrayImage,
}

impl ForegroundRefiner {
    pub fn new(config: RefinerConfig) -> Self {
        Self {
            element: StructuringElement::ellipse(config.kernel_size),
            merge_element: StructuringElement::rect(3, 3),
            config,
            prefix: Vec::new(),
            scratch: GrayImage::new(0, 0),
            output: GrayImage::new(0, 0),
        }
    }

    pub fn config(&self) -> &RefinerConfig {
        &self.config
    }

    /// Returns the cleaned mask. It has the same dimensions as `mask`.
    pub fn refine(&mut self, mask: &GrayImage) -> &GrayImage {
        if self.output.dimensions() != mask.dimensions() {
            let (width, height) = mask.dimensions();
            self.scratch = GrayImage::new(width, height);
            self.output = GrayImage::new(width, height);
        }

        // Opening.
        apply(Operation::Erode, mask, &mut self.scratch, &self.element, &mut self.prefix);
        apply(Operation::Dilate, &self.scratch, &mut self.output, &self.element, &mut self.prefix);

        // Closing.
        apply(Operation::Dilate, &self.output, &mut self.scratch, &self.element, &mut self.prefix);
        apply(Operation::Erode, &self.scratch, &mut self.output, &self.element, &mut self.prefix);

        for _ in 0..self.config.dilate_iterations {
            apply(Operation::Dilate, &self.output, &mut self.scratch, &self.merge_element, &mut self.prefix);
            std::mem::swap(&mut self.output, &mut self.scratch);
        }

        &self.output
    }

    pub fn output(&self) -> &GrayImage {
        &self.output
    }
}

fn apply(op: Operation, src: &GrayImage, dst: &mut GrayImage, element: &StructuringElement, prefix: &mut Vec<u32>) {
    let (width, height) = src.dimensions();
    let (w, h) = (width as i32, height as i32);
    let row_len = width as usize + 1;
    let samples = src.as_raw();

    prefix.clear();
    prefix.resize(row_len * height as usize, 0);
    for y in 0..height as usize {
        let row = &samples[y * width as usize..(y + 1) * width as usize];
        let counts = &mut prefix[y * row_len..(y + 1) * row_len];
        for (x, &value) in row.iter().enumerate() {
            counts[x + 1] = counts[x] + u32::from(value != 0);
        }
    }

    let out: &mut [u8] = dst;
    for y in 0..h {
        for x in 0..w {
            let hit = match op {
                Operation::Erode => element.spans.iter().all(|span| {
                    let ry = y + span.dy;
                    if ry < 0 || ry >= h {
                        return true;
                    }
                    let (x0, x1) = (x + span.start, x + span.end);
                    let (cx0, cx1) = (x0.max(0), x1.min(w));
                    let outside = (cx0 - x0) + (x1 - cx1);
                    let count = if cx1 > cx0 {
                        let base = ry as usize * row_len;
                        (prefix[base + cx1 as usize] - prefix[base + cx0 as usize]) as i32
                    } else {
                        0
                    };
                    count + outside >= x1 - x0
                }),
                Operation::Dilate => element.spans.iter().any(|span| {
                    let ry = y + span.dy;
                    if ry < 0 || ry >= h {
                        return false;
                    }
                    let (cx0, cx1) = ((x + span.start).max(0), (x + span.end).min(w));
                    if cx1 <= cx0 {
                        return false;
                    }
                    let base = ry as usize * row_len;
                    prefix[base + cx1 as usize] > prefix[base + cx0 as usize]
                }),
            };
            out[y as usize * width as usize + x as usize] = if hit { 255 } else { 0 };
        }
    }
}
