use crate::config::SerialConfig;
use crate::error::{Error, Result};
use serialport::SerialPort;
use tracing::info;

/// Opens the servo controller's serial port and waits for it to settle.
/// Opening the port resets most boards, so commands sent before the settle
/// delay are lost.
pub fn open_actuator_channel(config: &SerialConfig) -> Result<Box<dyn SerialPort>> {
    let Some(path) = config.port.as_deref() else {
        return Err(Error::ChannelUnavailable {
            path: "<unset>".into(),
            reason: "no serial port configured".into(),
        });
    };

    let port = serialport::new(path, config.baud_rate)
        .timeout(config.timeout())
        .open()
        .map_err(|err| Error::ChannelUnavailable {
            path: path.to_string(),
            reason: err.to_string(),
        })?;

    info!(path, baud = config.baud_rate, settle_ms = config.settle_ms, "actuator channel open");
    std::thread::sleep(config.settle());
    Ok(port)
}
