// THEORY:
// The `BackgroundModel` is the temporal layer of the tracker. It learns what the
// static scene looks like, one pixel at a time, and classifies every incoming
// frame into foreground (255) and background (0).
//
// Each pixel owns a small mixture of Gaussians (weight, mean per channel, one
// shared variance). Components are kept sorted by weight so the first few,
// whose weights add up to `background_ratio`, describe the background. A sample
// that lands close to one of those is background; anything else is foreground
// and seeds a new component that will be absorbed into the background if it
// stays long enough.
//
// Memory layout:
// - One flat arena of `pixels * max_modes` components plus a per-pixel count of
//   the components in use. Both are sized once per frame geometry and updated
//   in place, so the footprint does not grow with runtime.
// - The foreground mask and a zeroed "blank" frame are owned by the model and
//   reused across calls.
//
// Shadow detection is not modelled; the mask is strictly binary.

use image::{GrayImage, ImageBuffer, Pixel};
use serde::Deserialize;
use tracing::debug;

/// Widest pixel the arena stores (RGBA).
const MAX_CHANNELS: usize = 4;

/// Tunables of the adaptive mixture model.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BackgroundConfig {
    /// Number of frames that make up the learning horizon.
    pub history: u32,
    /// Squared Mahalanobis distance under which a sample counts as background.
    pub var_threshold: f32,
    /// Squared Mahalanobis distance under which a sample updates a component.
    pub var_threshold_gen: f32,
    /// Cumulative weight that the background components must reach.
    pub background_ratio: f32,
    /// Complexity-reduction prior; weak components are pruned by `alpha * ct`.
    pub complexity_reduction: f32,
    /// Maximum components per pixel.
    pub max_modes: usize,
    pub var_init: f32,
    pub var_min: f32,
    pub var_max: f32,
    /// Fixed learning rate. `None` follows `1 / min(2 * frames, history)`
    /// capped at `max_learning_rate`.
    pub learning_rate: Option<f32>,
    /// Upper bound of the adaptive rate. A pixel covered for `k` frames is
    /// absorbed once `k * rate` passes `1 - background_ratio`, so this bounds
    /// how slowly an object may cross a pixel and still be seen.
    pub max_learning_rate: f32,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            history: 1000,
            var_threshold: 10.0,
            var_threshold_gen: 9.0,
            background_ratio: 0.9,
            complexity_reduction: 0.05,
            max_modes: 5,
            var_init: 15.0,
            var_min: 4.0,
            var_max: 75.0,
            learning_rate: None,
            max_learning_rate: 0.005,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Component {
    weight: f32,
    mean: [f32; MAX_CHANNELS],
    variance: f32,
}

/// Per-pixel adaptive Gaussian-mixture background model.
pub struct BackgroundModel {
    config: BackgroundConfig,
    width: u32,
    height: u32,
    channels: usize,
    components: Vec<Component>,
    modes_used: Vec<u8>,
    frames_seen: u64,
    mask: GrayImage,
    blank: Vec<u8>,
}

impl BackgroundModel {
    pub fn new(config: BackgroundConfig) -> Self {
        let config = BackgroundConfig {
            max_modes: config.max_modes.clamp(1, u8::MAX as usize),
            ..config
        };
        Self {
            config,
            width: 0,
            height: 0,
            channels: 0,
            components: Vec::new(),
            modes_used: Vec::new(),
            frames_seen: 0,
            mask: GrayImage::new(0, 0),
            blank: Vec::new(),
        }
    }

    /// Classifies `frame` against the learned scene and folds it into the model.
    /// The returned mask always has the frame's dimensions.
    pub fn apply<P>(&mut self, frame: &ImageBuffer<P, Vec<u8>>) -> &GrayImage
    where
        P: Pixel<Subpixel = u8>,
    {
        let channels = (P::CHANNEL_COUNT as usize).min(MAX_CHANNELS);
        self.update(frame.as_raw(), frame.width(), frame.height(), P::CHANNEL_COUNT as usize, channels, true);
        &self.mask
    }

    /// Feeds one all-zero frame of the current geometry. The caller-visible mask
    /// is left untouched. Returns `false` when no frame has been seen yet.
    pub fn apply_blank(&mut self) -> bool {
        if self.components.is_empty() {
            return false;
        }
        let blank = std::mem::take(&mut self.blank);
        let (width, height, channels) = (self.width, self.height, self.channels);
        self.update(&blank, width, height, channels, channels, false);
        self.blank = blank;
        true
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }

    /// True when the last frame seeded a fresh arena. Its mask is all
    /// foreground and says nothing about motion.
    pub fn bootstrapping(&self) -> bool {
        self.frames_seen == 1
    }

    pub fn config(&self) -> &BackgroundConfig {
        &self.config
    }

    /// Bytes held by the model's arena and buffers.
    pub fn footprint_bytes(&self) -> usize {
        self.components.capacity() * std::mem::size_of::<Component>()
            + self.modes_used.capacity()
            + self.mask.as_raw().capacity()
            + self.blank.capacity()
    }

    fn learning_rate(&self) -> f32 {
        match self.config.learning_rate {
            Some(rate) if rate >= 0.0 && self.frames_seen > 1 => rate,
            _ => {
                let horizon = (2 * self.frames_seen).min(self.config.history.max(1) as u64);
                let rate = 1.0 / horizon.max(1) as f32;
                if self.frames_seen > 1 {
                    rate.min(self.config.max_learning_rate)
                } else {
                    rate
                }
            }
        }
    }

    fn ensure_geometry(&mut self, width: u32, height: u32, channels: usize) {
        if self.width == width
            && self.height == height
            && self.channels == channels
            && !self.components.is_empty()
        {
            return;
        }
        let pixels = width as usize * height as usize;
        debug!(width, height, channels, "allocating background model arena");
        self.width = width;
        self.height = height;
        self.channels = channels;
        self.components = vec![Component::default(); pixels * self.config.max_modes];
        self.modes_used = vec![0; pixels];
        self.mask = GrayImage::new(width, height);
        self.blank = vec![0; pixels * channels];
        self.frames_seen = 0;
    }

    fn update(
        &mut self,
        samples: &[u8],
        width: u32,
        height: u32,
        stride: usize,
        channels: usize,
        write_mask: bool,
    ) {
        self.ensure_geometry(width, height, stride);
        self.frames_seen += 1;
        let alpha = self.learning_rate();
        let modes = self.config.max_modes;
        let config = &self.config;
        let mask: &mut [u8] = &mut self.mask;

        for (index, pixel) in samples.chunks_exact(stride).enumerate() {
            let slots = &mut self.components[index * modes..(index + 1) * modes];
            let background = update_pixel(config, slots, &mut self.modes_used[index], &pixel[..channels], alpha);
            if write_mask {
                mask[index] = if background { 0 } else { 255 };
            }
        }
    }
}

/// Updates one pixel's mixture with `sample` and reports whether it is background.
fn update_pixel(
    config: &BackgroundConfig,
    slots: &mut [Component],
    used: &mut u8,
    sample: &[u8],
    alpha: f32,
) -> bool {
    let alpha1 = 1.0 - alpha;
    let prune = -alpha * config.complexity_reduction;
    let mut background = false;
    let mut matched = false;
    let mut total_weight = 0.0f32;
    let mut active = *used as usize;

    for component in slots[..active].iter_mut() {
        component.weight = alpha1 * component.weight + prune;

        if !matched {
            let dist2 = distance_sq(&component.mean, sample);
            let variance = component.variance;

            if total_weight < config.background_ratio && dist2 < config.var_threshold * variance {
                background = true;
            }

            if dist2 < config.var_threshold_gen * variance {
                matched = true;
                component.weight += alpha;
                let k = alpha / component.weight;
                for (mean, &value) in component.mean.iter_mut().zip(sample) {
                    *mean -= k * (*mean - value as f32);
                }
                component.variance = (variance + k * (dist2 - variance)).clamp(config.var_min, config.var_max);
            }
        }

        if component.weight < -prune {
            component.weight = 0.0;
        }
        total_weight += component.weight;
    }

    // Drop pruned components, keep the rest ordered by weight and normalised.
    let mut kept = 0;
    for index in 0..active {
        if slots[index].weight > 0.0 {
            slots[kept] = slots[index];
            kept += 1;
        }
    }
    active = kept;
    sort_by_weight(&mut slots[..active]);
    if total_weight > 0.0 {
        let inverse = 1.0 / total_weight;
        for component in slots[..active].iter_mut() {
            component.weight *= inverse;
        }
    }

    if !matched {
        let slot = if active == slots.len() {
            active - 1
        } else {
            active += 1;
            active - 1
        };
        if active == 1 {
            slots[slot].weight = 1.0;
        } else {
            for component in slots[..active - 1].iter_mut() {
                component.weight *= alpha1;
            }
            slots[slot].weight = alpha;
        }
        let mut mean = [0.0; MAX_CHANNELS];
        for (target, &value) in mean.iter_mut().zip(sample) {
            *target = value as f32;
        }
        slots[slot].mean = mean;
        slots[slot].variance = config.var_init;
        sort_by_weight(&mut slots[..active]);
    }

    *used = active as u8;
    background
}

fn distance_sq(mean: &[f32; MAX_CHANNELS], sample: &[u8]) -> f32 {
    mean.iter()
        .zip(sample)
        .map(|(&m, &v)| {
            let diff = m - v as f32;
            diff * diff
        })
        .sum()
}

/// Stable insertion sort, heaviest first. Mixtures hold a handful of entries.
fn sort_by_weight(slots: &mut [Component]) {
    for i in 1..slots.len() {
        let mut j = i;
        while j > 0 && slots[j].weight > slots[j - 1].weight {
            slots.swap(j, j - 1);
            j -= 1;
        }
    }
}
