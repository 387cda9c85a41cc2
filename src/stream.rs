// THEORY:
// The stream driver owns the process lifecycle:
//
//   Starting -> Streaming -> Stopping -> Terminated
//
// `Starting` happens in the caller: the frame source must open (fatal when it
// cannot) and the actuator channel is acquired best-effort through
// `acquire_channel`. `run_stream` then loops one frame at a time: read, run the
// pipeline, draw the overlay, hand frame and mask to the display surface. The
// loop ends when the source runs dry, a read fails or the display asks to quit.
//
// `StreamGuard` performs the `Stopping` work (release the source, close the
// display, close the channel, final reclamation) either explicitly or from its
// `Drop`, so every exit path cleans up exactly once.

use crate::core_modules::overlay;
use crate::error::Result;
use crate::pipeline::{Report, TrackingPipeline};
use image::{GrayImage, RgbImage};
use std::fmt;
use std::io::Write;
use std::time::Instant;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Starting,
    Streaming,
    Stopping,
    Terminated,
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StreamState::Starting => "starting",
            StreamState::Streaming => "streaming",
            StreamState::Stopping => "stopping",
            StreamState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// What the display surface wants after showing a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamEnd {
    #[default]
    Exhausted,
    Quit,
}

/// A producer of frames. `Ok(None)` means the stream is over.
pub trait FrameSource {
    fn read_frame(&mut self) -> Result<Option<RgbImage>>;

    fn release(&mut self) {}
}

/// Where annotated frames go.
pub trait DisplaySurface {
    fn show(&mut self, frame: &RgbImage, mask: &GrayImage, report: &Report) -> Result<Control>;

    fn close(&mut self) {}
}

pub trait Clock {
    fn now(&mut self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&mut self) -> Instant {
        Instant::now()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamSummary {
    pub frames: u64,
    pub frames_with_target: u64,
    pub commands_sent: u64,
    pub cleanup_passes: u64,
    pub end: StreamEnd,
}

impl StreamSummary {
    fn record(&mut self, report: &Report) {
        self.frames += 1;
        self.frames_with_target += report.target.is_some() as u64;
        self.commands_sent += report.dispatched as u64;
        self.cleanup_passes += report.cleanup as u64;
    }
}

/// Runs the opener and logs instead of failing. The process keeps running
/// without an actuator when the channel cannot be opened.
pub fn acquire_channel<W, F>(open: F) -> Option<W>
where
    F: FnOnce() -> Result<W>,
{
    match open() {
        Ok(channel) => Some(channel),
        Err(err) => {
            warn!(%err, "continuing without actuator channel");
            None
        }
    }
}

pub struct StreamGuard<'a, S, D, W>
where
    S: FrameSource + ?Sized,
    D: DisplaySurface + ?Sized,
    W: Write,
{
    source: &'a mut S,
    display: &'a mut D,
    pipeline: &'a mut TrackingPipeline<W>,
    state: StreamState,
}

impl<'a, S, D, W> StreamGuard<'a, S, D, W>
where
    S: FrameSource + ?Sized,
    D: DisplaySurface + ?Sized,
    W: Write,
{
    pub fn new(source: &'a mut S, display: &'a mut D, pipeline: &'a mut TrackingPipeline<W>) -> Self {
        Self {
            source,
            display,
            pipeline,
            state: StreamState::Starting,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    fn transition(&mut self, next: StreamState) {
        info!(from = %self.state, to = %next, "stream state");
        self.state = next;
    }

    /// Releases everything the stream holds. Safe to call more than once.
    pub fn stop(&mut self) {
        if matches!(self.state, StreamState::Stopping | StreamState::Terminated) {
            return;
        }
        self.transition(StreamState::Stopping);
        self.source.release();
        self.display.close();
        if let Some(mut channel) = self.pipeline.close_channel() {
            if let Err(err) = channel.flush() {
                warn!(%err, "flushing actuator channel on close");
            }
            info!("actuator channel closed");
        }
        let released = self.pipeline.reclaim();
        info!(released, frames = self.pipeline.frames_processed(), "final reclamation");
        self.transition(StreamState::Terminated);
    }
}

impl<S, D, W> Drop for StreamGuard<'_, S, D, W>
where
    S: FrameSource + ?Sized,
    D: DisplaySurface + ?Sized,
    W: Write,
{
    fn drop(&mut self) {
        self.stop();
    }
}

/// Drives frames from `source` through `pipeline` to `display` until the
/// source is exhausted, a read fails or the display quits. Cleanup runs on
/// every path; a read or display error is returned after it.
pub fn run_stream<S, D, W, C>(
    source: &mut S,
    display: &mut D,
    pipeline: &mut TrackingPipeline<W>,
    clock: &mut C,
) -> Result<StreamSummary>
where
    S: FrameSource + ?Sized,
    D: DisplaySurface + ?Sized,
    W: Write,
    C: Clock + ?Sized,
{
    let mut guard = StreamGuard::new(source, display, pipeline);
    guard.transition(StreamState::Streaming);
    let mut summary = StreamSummary::default();

    let outcome = loop {
        let mut frame = match guard.source.read_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => break Ok(StreamEnd::Exhausted),
            Err(err) => {
                error!(%err, frame = summary.frames, "capture read failed");
                break Err(err);
            }
        };

        let report = guard.pipeline.generate_report(&frame, clock.now());
        summary.record(&report);
        overlay::annotate(&mut frame, report.target.as_ref());

        match guard.display.show(&frame, guard.pipeline.last_mask(), &report) {
            Ok(Control::Continue) => {}
            Ok(Control::Quit) => {
                info!(frame = report.frame_index, "quit requested");
                break Ok(StreamEnd::Quit);
            }
            Err(err) => {
                error!(%err, "display failed");
                break Err(err);
            }
        }
    };

    guard.stop();
    summary.end = outcome?;
    info!(
        frames = summary.frames,
        with_target = summary.frames_with_target,
        sent = summary.commands_sent,
        end = ?summary.end,
        "stream finished"
    );
    Ok(summary)
}
