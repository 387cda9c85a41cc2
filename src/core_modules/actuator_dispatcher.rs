// THEORY:
// The `ActuatorDispatcher` decides, once per analysed frame, whether the new
// bearing is worth sending to the servo controller. A command goes out only if
// all of these hold:
//   - the channel is present,
//   - at least `send_interval_ms` passed since the last successful send,
//   - the angle moved by at least `angle_threshold` degrees.
// Before the first send both gates are open.
//
// The channel is an optional `Write` handle. When it is absent every call is a
// cheap `false`. A failed write or flush drops the handle, so a broken link
// degrades to the same steady "no channel" state instead of erroring every frame.
//
// Wire format: the angle as decimal ASCII followed by `\n`, flushed immediately.

use serde::Deserialize;
use std::io::{self, Write};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Minimum spacing between two commands.
    pub send_interval_ms: u64,
    /// Minimum angle change, in degrees, worth a command.
    pub angle_threshold: i32,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            send_interval_ms: 50,
            angle_threshold: 3,
        }
    }
}

impl DispatchConfig {
    pub fn send_interval(&self) -> Duration {
        Duration::from_millis(self.send_interval_ms)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub sent: u64,
    pub suppressed: u64,
    pub failures: u64,
}

/// Encodes one servo command.
pub fn encode_command(angle: i32) -> String {
    format!("{angle}\n")
}

pub struct ActuatorDispatcher<W: Write> {
    config: DispatchConfig,
    channel: Option<W>,
    last_angle: Option<i32>,
    last_sent_at: Option<Instant>,
    stats: DispatchStats,
}

impl<W: Write> ActuatorDispatcher<W> {
    pub fn new(config: DispatchConfig, channel: Option<W>) -> Self {
        Self {
            config,
            channel,
            last_angle: None,
            last_sent_at: None,
            stats: DispatchStats::default(),
        }
    }

    /// Sends `angle` if the channel is open and both gates pass. Returns whether
    /// a command was written.
    pub fn maybe_send(&mut self, angle: i32, now: Instant) -> bool {
        let Some(channel) = self.channel.as_mut() else {
            return false;
        };

        if let Some(sent_at) = self.last_sent_at {
            if now.saturating_duration_since(sent_at) < self.config.send_interval() {
                self.stats.suppressed += 1;
                return false;
            }
        }
        if let Some(last) = self.last_angle {
            if angle.abs_diff(last) < self.config.angle_threshold.max(0).unsigned_abs() {
                self.stats.suppressed += 1;
                return false;
            }
        }

        match write_command(channel, angle) {
            Ok(()) => {
                debug!(angle, previous = ?self.last_angle, "servo command sent");
                self.last_angle = Some(angle);
                self.last_sent_at = Some(now);
                self.stats.sent += 1;
                true
            }
            Err(err) => {
                warn!(%err, angle, "actuator write failed, disabling channel");
                self.channel = None;
                self.stats.failures += 1;
                false
            }
        }
    }

    pub fn has_channel(&self) -> bool {
        self.channel.is_some()
    }

    pub fn channel(&self) -> Option<&W> {
        self.channel.as_ref()
    }

    /// Detaches the channel, leaving the dispatcher in the no-channel state.
    pub fn close(&mut self) -> Option<W> {
        self.channel.take()
    }

    pub fn last_angle(&self) -> Option<i32> {
        self.last_angle
    }

    pub fn last_sent_at(&self) -> Option<Instant> {
        self.last_sent_at
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }
}

fn write_command<W: Write>(channel: &mut W, angle: i32) -> io::Result<()> {
    channel.write_all(encode_command(angle).as_bytes())?;
    channel.flush()
}
