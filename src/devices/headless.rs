use crate::config::DisplayConfig;
use crate::core_modules::utils::image_helper;
use crate::error::{Error, Result};
use crate::pipeline::Report;
use crate::stream::{Control, DisplaySurface};
use image::{GrayImage, RgbImage};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

/// A display that never opens a window. It logs each report and can dump the
/// annotated frame and the mask as PNG files. Each `show` waits out the
/// configured poll interval so replay runs at roughly the same pace as a
/// windowed session.
pub struct HeadlessDisplay {
    poll_wait: Duration,
    dump_dir: Option<PathBuf>,
    dump_every: u64,
    shown: u64,
    dumped: u64,
}

impl HeadlessDisplay {
    pub fn new(config: &DisplayConfig) -> Result<Self> {
        if let Some(dir) = &config.dump_dir {
            std::fs::create_dir_all(dir)?;
            info!(dir = %dir.display(), every = config.dump_every, "dumping frames");
        }
        Ok(Self {
            poll_wait: config.poll_wait(),
            dump_dir: config.dump_dir.clone(),
            dump_every: config.dump_every,
            shown: 0,
            dumped: 0,
        })
    }

    pub fn dumped(&self) -> u64 {
        self.dumped
    }
}

impl DisplaySurface for HeadlessDisplay {
    fn show(&mut self, frame: &RgbImage, mask: &GrayImage, report: &Report) -> Result<Control> {
        self.shown += 1;
        if let Some(target) = &report.target {
            debug!(
                frame = report.frame_index,
                x = target.centroid.x,
                y = target.centroid.y,
                regions = target.region_count,
                angle = ?report.angle,
                sent = report.dispatched,
                "target"
            );
        }

        if let Some(dir) = &self.dump_dir {
            if self.dump_every > 0 && report.frame_index % self.dump_every == 0 {
                let stem = format!("{:06}", report.frame_index);
                image_helper::save_frame(&dir.join(format!("{stem}_frame.png")), frame)
                    .and_then(|()| image_helper::save_mask(&dir.join(format!("{stem}_mask.png")), mask))
                    .map_err(|err| Error::Display(err.to_string()))?;
                self.dumped += 1;
            }
        }

        if !self.poll_wait.is_zero() {
            std::thread::sleep(self.poll_wait);
        }
        Ok(Control::Continue)
    }

    fn close(&mut self) {
        info!(shown = self.shown, dumped = self.dumped, "headless display closed");
    }
}
