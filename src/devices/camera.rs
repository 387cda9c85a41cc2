// OpenCV-backed capture and HighGUI windows. Only built with the `camera`
// feature so the default build needs no native OpenCV install.

use crate::config::{CaptureConfig, DisplayConfig};
use crate::error::{Error, Result};
use crate::pipeline::Report;
use crate::stream::{Control, DisplaySurface, FrameSource};
use image::{GrayImage, RgbImage};
use opencv::{
    core::{self, Mat, Scalar},
    highgui, imgproc,
    prelude::*,
    videoio::{self, VideoCapture},
};
use tracing::{info, warn};

const FRAME_WINDOW: &str = "pan_sentry";
const MASK_WINDOW: &str = "pan_sentry mask";

fn capture_error(err: opencv::Error) -> Error {
    Error::Capture(err.to_string())
}

fn display_error(err: opencv::Error) -> Error {
    Error::Display(err.to_string())
}

pub struct CameraSource {
    capture: VideoCapture,
    bgr: Mat,
    rgb: Mat,
}

impl CameraSource {
    pub fn open(config: &CaptureConfig) -> Result<Self> {
        let mut capture = VideoCapture::new(config.camera_index, videoio::CAP_ANY)
            .map_err(|err| Error::DeviceUnavailable(format!("camera {}: {err}", config.camera_index)))?;
        let opened = capture
            .is_opened()
            .map_err(|err| Error::DeviceUnavailable(err.to_string()))?;
        if !opened {
            return Err(Error::DeviceUnavailable(format!("camera {} did not open", config.camera_index)));
        }

        // Hints only; drivers are free to ignore them.
        for (property, value) in [
            (videoio::CAP_PROP_FRAME_WIDTH, config.width as f64),
            (videoio::CAP_PROP_FRAME_HEIGHT, config.height as f64),
            (videoio::CAP_PROP_FPS, config.fps),
        ] {
            if !capture.set(property, value).unwrap_or(false) {
                warn!(property, value, "camera ignored capture hint");
            }
        }
        info!(index = config.camera_index, width = config.width, height = config.height, fps = config.fps, "camera open");

        Ok(Self {
            capture,
            bgr: Mat::default(),
            rgb: Mat::default(),
        })
    }
}

impl FrameSource for CameraSource {
    fn read_frame(&mut self) -> Result<Option<RgbImage>> {
        let grabbed = self.capture.read(&mut self.bgr).map_err(capture_error)?;
        if !grabbed || self.bgr.empty() {
            return Ok(None);
        }
        imgproc::cvt_color(&self.bgr, &mut self.rgb, imgproc::COLOR_BGR2RGB, 0).map_err(capture_error)?;
        let (width, height) = (self.rgb.cols() as u32, self.rgb.rows() as u32);
        let data = self.rgb.data_bytes().map_err(capture_error)?.to_vec();
        RgbImage::from_raw(width, height, data)
            .map(Some)
            .ok_or_else(|| Error::Capture("frame buffer does not match its dimensions".into()))
    }

    fn release(&mut self) {
        if let Err(err) = self.capture.release() {
            warn!(%err, "releasing camera");
        }
    }
}

/// Two HighGUI windows: the annotated frame with the angle text, and the mask.
pub struct HighGuiDisplay {
    poll_wait_ms: i32,
    quit_key: i32,
}

impl HighGuiDisplay {
    pub fn new(config: &DisplayConfig) -> Result<Self> {
        highgui::named_window(FRAME_WINDOW, highgui::WINDOW_AUTOSIZE).map_err(display_error)?;
        highgui::named_window(MASK_WINDOW, highgui::WINDOW_AUTOSIZE).map_err(display_error)?;
        Ok(Self {
            poll_wait_ms: config.poll_wait().as_millis().clamp(1, i32::MAX as u128) as i32,
            quit_key: config.quit_key as i32,
        })
    }
}

fn to_mat(buffer: &[u8], width: u32, height: u32, kind: i32) -> opencv::Result<Mat> {
    let mut mat = Mat::new_size_with_default(core::Size::new(width as i32, height as i32), kind, Scalar::all(0.0))?;
    mat.data_bytes_mut()?.copy_from_slice(buffer);
    Ok(mat)
}

impl DisplaySurface for HighGuiDisplay {
    fn show(&mut self, frame: &RgbImage, mask: &GrayImage, report: &Report) -> Result<Control> {
        let rgb = to_mat(frame.as_raw(), frame.width(), frame.height(), core::CV_8UC3).map_err(display_error)?;
        let mut bgr = Mat::default();
        imgproc::cvt_color(&rgb, &mut bgr, imgproc::COLOR_RGB2BGR, 0).map_err(display_error)?;

        if let (Some(target), Some(angle)) = (&report.target, report.angle) {
            let origin = core::Point::new(target.bounding_box.x, (target.bounding_box.y - 10).max(12));
            imgproc::put_text(
                &mut bgr,
                &format!("Angle: {angle}"),
                origin,
                imgproc::FONT_HERSHEY_SIMPLEX,
                0.6,
                Scalar::new(255.0, 255.0, 0.0, 0.0),
                2,
                imgproc::LINE_8,
                false,
            )
            .map_err(display_error)?;
        }

        let mask_mat = to_mat(mask.as_raw(), mask.width(), mask.height(), core::CV_8UC1).map_err(display_error)?;
        highgui::imshow(FRAME_WINDOW, &bgr).map_err(display_error)?;
        highgui::imshow(MASK_WINDOW, &mask_mat).map_err(display_error)?;

        let key = highgui::wait_key(self.poll_wait_ms).map_err(display_error)?;
        if key & 0xff == self.quit_key {
            Ok(Control::Quit)
        } else {
            Ok(Control::Continue)
        }
    }

    fn close(&mut self) {
        if let Err(err) = highgui::destroy_all_windows() {
            warn!(%err, "closing windows");
        }
    }
}
