use crate::core_modules::utils::image_helper;
use crate::error::{Error, Result};
use crate::stream::FrameSource;
use image::RgbImage;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Plays a directory of still images back as a frame stream, in file-name order.
pub struct ReplaySource {
    frames: Vec<PathBuf>,
    next: usize,
}

impl ReplaySource {
    pub fn open(dir: &Path) -> Result<Self> {
        let frames = image_helper::list_frames(dir)?;
        if frames.is_empty() {
            return Err(Error::DeviceUnavailable(format!("no frames in {}", dir.display())));
        }
        info!(dir = %dir.display(), frames = frames.len(), "replay source open");
        Ok(Self { frames, next: 0 })
    }
}

impl FrameSource for ReplaySource {
    fn read_frame(&mut self) -> Result<Option<RgbImage>> {
        let Some(path) = self.frames.get(self.next) else {
            return Ok(None);
        };
        self.next += 1;
        debug!(path = %path.display(), "replaying frame");
        image_helper::load_frame(path)
            .map(Some)
            .map_err(|err| Error::Capture(format!("{}: {err}", path.display())))
    }

    fn release(&mut self) {
        self.next = self.frames.len();
    }
}
