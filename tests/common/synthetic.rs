use image::{Rgb, RgbImage};
use pan_sentry::stream::Clock;
use std::io::{self, Write};
use std::time::{Duration, Instant};

pub const WIDTH: u32 = 640;
pub const HEIGHT: u32 = 120;
pub const SIDE: u32 = 50;
pub const FRAMES: u32 = 100;

pub fn blank() -> RgbImage {
    RgbImage::new(WIDTH, HEIGHT)
}

/// A white `SIDE x SIDE` square on black with its left edge at `x0`.
pub fn square_at(x0: u32) -> RgbImage {
    let mut frame = blank();
    let y0 = (HEIGHT - SIDE) / 2;
    for y in y0..y0 + SIDE {
        for x in x0..(x0 + SIDE).min(WIDTH) {
            frame.put_pixel(x, y, Rgb([255, 255, 255]));
        }
    }
    frame
}

/// Left edges of the square sweeping from the left border to the right border.
pub fn sweep() -> impl Iterator<Item = u32> {
    sweep_from(0)
}

/// Left edges of the square sweeping from `start` to the right border.
pub fn sweep_from(start: u32) -> impl Iterator<Item = u32> {
    (0..FRAMES).map(move |i| start + i * (WIDTH - SIDE - start) / (FRAMES - 1))
}

/// Advances by a fixed frame period on every call.
pub struct StepClock {
    now: Instant,
    step: Duration,
}

impl StepClock {
    pub fn at_fps(fps: u64) -> Self {
        Self {
            now: Instant::now(),
            step: Duration::from_nanos(1_000_000_000 / fps),
        }
    }
}

impl Clock for StepClock {
    fn now(&mut self) -> Instant {
        self.now += self.step;
        self.now
    }
}

/// Accepts `budget` writes, then behaves like an unplugged cable.
pub struct FlakyLink {
    pub written: Vec<u8>,
    budget: usize,
}

impl FlakyLink {
    pub fn new(budget: usize) -> Self {
        Self {
            written: Vec::new(),
            budget,
        }
    }
}

impl Write for FlakyLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.budget == 0 {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "link lost"));
        }
        self.budget -= 1;
        self.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
