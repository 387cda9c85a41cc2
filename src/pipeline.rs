// THEORY:
// The `pipeline` module is the top-level API of the tracker. `TrackingPipeline`
// is the session object: it owns every piece of mutable state the control loop
// needs (background model, morphology and contour workspaces, dispatcher state,
// governor cadence, frame counter) so that independent pipelines never share
// anything.
//
// One call to `generate_report` is one pass of the perception-to-actuation
// chain for one frame:
//   frame -> (luma) -> BackgroundModel -> ForegroundRefiner -> RegionAggregator
//         -> BearingMapper -> ActuatorDispatcher
// followed by a governor tick. The returned `Report` says what happened; the
// refined mask stays available through `last_mask` for the display surface.
//
// The frame that seeds the background model is learning-only: its mask is all
// foreground, so aggregation and dispatch are skipped for it.

use crate::core_modules::actuator_dispatcher::{ActuatorDispatcher, DispatchConfig};
use crate::core_modules::background_model::{BackgroundConfig, BackgroundModel};
use crate::core_modules::bearing_mapper::{BearingConfig, BearingMapper};
use crate::core_modules::foreground_refiner::{ForegroundRefiner, RefinerConfig};
use crate::core_modules::region_aggregator::RegionAggregator;
use crate::core_modules::resource_governor::{GovernorConfig, ResourceGovernor};
use image::{GrayImage, RgbImage};
use serde::Deserialize;
use std::io::Write;
use std::time::Instant;
use tracing::debug;

// Re-export key data structures for the public API.
pub use crate::core_modules::actuator_dispatcher::DispatchStats;
pub use crate::core_modules::region_aggregator::{BoundingBox, Point, Target};

/// Configuration for the TrackingPipeline. Every stage's tunables live here.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Convert frames to luma before background subtraction.
    pub grayscale: bool,
    pub background: BackgroundConfig,
    pub refiner: RefinerConfig,
    /// Contours with an area at or below this are ignored.
    pub min_area: f64,
    /// Run contour extraction on even frames only.
    pub analyze_every_other_frame: bool,
    pub bearing: BearingConfig,
    pub dispatch: DispatchConfig,
    pub governor: GovernorConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            grayscale: false,
            background: BackgroundConfig::default(),
            refiner: RefinerConfig::default(),
            min_area: 1000.0,
            analyze_every_other_frame: false,
            bearing: BearingConfig::default(),
            dispatch: DispatchConfig::default(),
            governor: GovernorConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Lighter variant for slow boards: luma input, smaller kernel, a single
    /// merge dilation, a stricter area gate and contour work on every other frame.
    pub fn responsive() -> Self {
        Self {
            grayscale: true,
            background: BackgroundConfig {
                history: 500,
                var_threshold: 16.0,
                ..BackgroundConfig::default()
            },
            refiner: RefinerConfig {
                kernel_size: 5,
                dilate_iterations: 1,
            },
            min_area: 1500.0,
            analyze_every_other_frame: true,
            dispatch: DispatchConfig {
                send_interval_ms: 100,
                angle_threshold: 3,
            },
            ..Self::default()
        }
    }
}

/// The outcome of one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    /// Zero-based index of the frame within this session.
    pub frame_index: u64,
    /// `false` on the model's seeding frame and on frames skipped by the
    /// alternate-frame cadence.
    pub analyzed: bool,
    pub target: Option<Target>,
    pub angle: Option<i32>,
    pub dispatched: bool,
    /// A governor cleanup pass ran after this frame.
    pub cleanup: bool,
}

/// The main, top-level struct for the tracker.
pub struct TrackingPipeline<W: Write> {
    config: PipelineConfig,
    background: BackgroundModel,
    refiner: ForegroundRefiner,
    aggregator: RegionAggregator,
    mapper: BearingMapper,
    dispatcher: ActuatorDispatcher<W>,
    governor: ResourceGovernor,
    luma: GrayImage,
    frames_processed: u64,
}

impl<W: Write> TrackingPipeline<W> {
    pub fn new(config: PipelineConfig, channel: Option<W>) -> Self {
        Self {
            background: BackgroundModel::new(config.background.clone()),
            refiner: ForegroundRefiner::new(config.refiner.clone()),
            aggregator: RegionAggregator::new(),
            mapper: BearingMapper::new(config.bearing.clone()),
            dispatcher: ActuatorDispatcher::new(config.dispatch.clone(), channel),
            governor: ResourceGovernor::new(config.governor.cleanup_interval),
            luma: GrayImage::new(0, 0),
            frames_processed: 0,
            config,
        }
    }

    pub fn generate_report(&mut self, frame: &RgbImage, now: Instant) -> Report {
        let frame_index = self.frames_processed;
        self.frames_processed += 1;

        // Stage 1: Background subtraction
        let raw_mask = if self.config.grayscale {
            luma_into(frame, &mut self.luma);
            self.background.apply(&self.luma)
        } else {
            self.background.apply(frame)
        };

        // Stage 2: Morphological clean-up
        let mask = self.refiner.refine(raw_mask);

        // Stage 3: Aggregation, mapping and dispatch
        let skipped = self.config.analyze_every_other_frame && frame_index % 2 == 1;
        let analyzed = !skipped && !self.background.bootstrapping();
        let mut target = None;
        let mut angle = None;
        let mut dispatched = false;
        if analyzed {
            target = self.aggregator.aggregate(mask, self.config.min_area);
            if let Some(found) = &target {
                let bearing = self.mapper.map_to_angle(found.centroid.x, frame.width());
                dispatched = self.dispatcher.maybe_send(bearing, now);
                angle = Some(bearing);
            }
        }

        // Stage 4: Periodic clean-up
        let cleanup = self.governor.tick();
        if cleanup {
            self.run_cleanup();
        }

        Report {
            frame_index,
            analyzed,
            target,
            angle,
            dispatched,
            cleanup,
        }
    }

    /// Trims scratch buffers back to their baseline. Returns the bytes released.
    pub fn reclaim(&mut self) -> usize {
        self.aggregator.reclaim()
    }

    fn run_cleanup(&mut self) {
        let injected = self.config.governor.inject_blank_frame && self.background.apply_blank();
        let released = self.reclaim();
        debug!(
            frame = self.frames_processed,
            injected,
            released,
            model_bytes = self.background.footprint_bytes(),
            "resource governor pass"
        );
    }

    /// The refined foreground mask of the last frame.
    pub fn last_mask(&self) -> &GrayImage {
        self.refiner.output()
    }

    pub fn dispatcher(&self) -> &ActuatorDispatcher<W> {
        &self.dispatcher
    }

    /// Detaches the actuator channel; later frames dispatch nothing.
    pub fn close_channel(&mut self) -> Option<W> {
        self.dispatcher.close()
    }

    pub fn background(&self) -> &BackgroundModel {
        &self.background
    }

    pub fn governor(&self) -> &ResourceGovernor {
        &self.governor
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }
}

/// Rec. 601 luma into a reusable buffer.
fn luma_into(frame: &RgbImage, out: &mut GrayImage) {
    if out.dimensions() != frame.dimensions() {
        *out = GrayImage::new(frame.width(), frame.height());
    }
    let target: &mut [u8] = out;
    for (luma, rgb) in target.iter_mut().zip(frame.as_raw().chunks_exact(3)) {
        let value = 0.299 * rgb[0] as f32 + 0.587 * rgb[1] as f32 + 0.114 * rgb[2] as f32;
        *luma = value.round().min(255.0) as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use std::time::Duration;

    fn scene(width: u32, height: u32, square: Option<(u32, u32, u32)>) -> RgbImage {
        let mut frame = RgbImage::new(width, height);
        if let Some((x0, y0, side)) = square {
            for y in y0..(y0 + side).min(height) {
                for x in x0..(x0 + side).min(width) {
                    frame.put_pixel(x, y, Rgb([255, 255, 255]));
                }
            }
        }
        frame
    }

    fn pipeline(config: PipelineConfig) -> TrackingPipeline<Vec<u8>> {
        TrackingPipeline::new(config, Some(Vec::new()))
    }

    #[test]
    fn static_scene_never_dispatches() {
        let mut pipeline = pipeline(PipelineConfig::default());
        let t0 = Instant::now();
        for i in 0..20u64 {
            let report = pipeline.generate_report(&scene(64, 48, None), t0 + Duration::from_millis(i * 66));
            assert!(report.target.is_none());
            assert!(!report.dispatched);
        }
        assert_eq!(pipeline.dispatcher().stats().sent, 0);
    }

    #[test]
    fn seeding_frame_is_learning_only() {
        let mut pipeline = pipeline(PipelineConfig::default());
        let report = pipeline.generate_report(&scene(64, 48, Some((10, 10, 30))), Instant::now());
        assert!(!report.analyzed);
        assert_eq!(report.target, None);
        assert_eq!(report.angle, None);
        assert!(!report.dispatched);
        assert_eq!(pipeline.dispatcher().last_angle(), None);
        assert!(pipeline.last_mask().pixels().all(|p| p.0[0] == 255));
    }

    #[test]
    fn moving_square_is_found_and_dispatched() {
        let config = PipelineConfig {
            min_area: 100.0,
            ..PipelineConfig::default()
        };
        let mut pipeline = pipeline(config);
        let t0 = Instant::now();
        pipeline.generate_report(&scene(160, 80, None), t0);
        pipeline.generate_report(&scene(160, 80, None), t0);

        let report = pipeline.generate_report(&scene(160, 80, Some((10, 20, 30))), t0 + Duration::from_millis(100));
        let target = report.target.expect("target");
        assert!(target.bounding_box.x <= 10 && target.bounding_box.right() >= 40);
        let expected = crate::core_modules::bearing_mapper::map_to_angle(target.centroid.x, 160, 30, 120);
        assert_eq!(report.angle, Some(expected));
        assert!(report.dispatched);
        assert_eq!(pipeline.last_mask().dimensions(), (160, 80));
    }

    #[test]
    fn alternate_frames_skip_aggregation() {
        let config = PipelineConfig {
            analyze_every_other_frame: true,
            min_area: 50.0,
            ..PipelineConfig::default()
        };
        let mut pipeline = pipeline(config);
        let t0 = Instant::now();
        pipeline.generate_report(&scene(64, 48, None), t0);
        let odd = pipeline.generate_report(&scene(64, 48, Some((10, 10, 20))), t0 + Duration::from_secs(1));
        assert!(!odd.analyzed);
        assert!(odd.target.is_none());
        assert!(!odd.dispatched);
        assert!(pipeline.last_mask().pixels().any(|p| p.0[0] == 255));

        let even = pipeline.generate_report(&scene(64, 48, Some((30, 10, 20))), t0 + Duration::from_secs(2));
        assert!(even.analyzed);
        assert!(even.target.is_some());
        assert!(even.dispatched);
    }

    #[test]
    fn governor_runs_on_cadence_and_keeps_real_mask() {
        let mut pipeline = pipeline(PipelineConfig {
            min_area: 50.0,
            ..PipelineConfig::default()
        });
        let t0 = Instant::now();
        for _ in 0..29 {
            let report = pipeline.generate_report(&scene(40, 30, None), t0);
            assert!(!report.cleanup);
        }
        let report = pipeline.generate_report(&scene(40, 30, Some((5, 5, 15))), t0);
        assert!(report.cleanup);
        assert!(report.target.is_some());
        assert!(pipeline.last_mask().pixels().any(|p| p.0[0] == 255));
        assert_eq!(pipeline.governor().passes(), 1);
        // 30 frames plus one injected blank frame.
        assert_eq!(pipeline.background().frames_seen(), 31);
    }

    #[test]
    fn grayscale_mode_matches_frame_geometry() {
        let mut pipeline = pipeline(PipelineConfig::responsive());
        let report = pipeline.generate_report(&scene(33, 21, None), Instant::now());
        assert_eq!(report.frame_index, 0);
        assert_eq!(pipeline.last_mask().dimensions(), (33, 21));
    }

    #[test]
    fn luma_uses_rec601_weights() {
        let mut frame = RgbImage::new(3, 1);
        frame.put_pixel(0, 0, Rgb([255, 0, 0]));
        frame.put_pixel(1, 0, Rgb([0, 255, 0]));
        frame.put_pixel(2, 0, Rgb([255, 255, 255]));
        let mut out = GrayImage::new(0, 0);
        luma_into(&frame, &mut out);
        assert_eq!(out.as_raw(), &vec![76, 150, 255]);
    }
}
