//! GRBL G-code motion controller driver.
//!
//! Reference: GRBL v1.1 interface documentation.
//!
//! Protocol overview:
//! - Format: ASCII lines over USB serial, 115200 baud, 8N1
//! - Line commands (`G91 G0 X0.500000`, `$110=10.000`, `$X`, `$H`) are
//!   acknowledged with `ok` or `error:N`
//! - Real-time commands are single bytes with no acknowledgement:
//!   `?` status report, `!` feed hold, `~` cycle start
//! - Axes: X = grating screw, Y = slit selector, Z = cuvette mirror
//!
//! # Usage
//!
//! ```rust,ignore
//! use spectro_driver_grbl::{GrblConfig, GrblController};
//!
//! let grbl = GrblController::connect(&GrblConfig::from_motion(&config.motion)).await?;
//! grbl.move_axis(Axis::X, 9.0, MoveMode::Absolute).await?;
//! ```

use crate::status::{is_status_line, parse_status, GrblStatus};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use spectro_core::capabilities::{DigitalInput, MotionController};
use spectro_core::config::MotionConfig;
use spectro_core::error::{DriverError, DriverErrorKind};
use spectro_core::serial::{drain_serial_buffer, open_serial_async, wrap_shared, DynSerial, SharedPort};
use spectro_core::{Axis, MachinePosition, MoveMode, SensorPin};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::instrument;

const DRIVER: &str = "grbl";

/// Connection settings for a GRBL controller.
#[derive(Debug, Clone, PartialEq)]
pub struct GrblConfig {
    /// Serial port path (e.g. "/dev/ttyUSB0", "COM5")
    pub port: String,
    /// Baud rate (GRBL 1.1 default: 115200)
    pub baud_rate: u32,
    /// Time allowed for an `ok` or a status report
    pub timeout: Duration,
    /// Delay after the wake sequence while GRBL resets and prints its banner
    pub wake_delay: Duration,
    /// Time allowed for a `$H` homing cycle
    pub homing_timeout: Duration,
}

impl GrblConfig {
    /// Settings from the `[motion]` configuration section.
    pub fn from_motion(motion: &MotionConfig) -> Self {
        Self {
            port: motion.port.clone(),
            baud_rate: motion.baud_rate,
            timeout: Duration::from_secs_f64(motion.timeout_secs.max(0.0)),
            wake_delay: Duration::from_millis(motion.wake_delay_ms),
            homing_timeout: Duration::from_secs(60),
        }
    }
}

/// List serial ports visible to the OS.
pub fn available_ports() -> Result<Vec<String>> {
    let ports = serialport::available_ports().context("Failed to enumerate serial ports")?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}

/// Driver for a GRBL controller moving the screw, slit and mirror axes.
///
/// One command is in flight at a time: the shared port lock is held from
/// the write until the acknowledgement (or status report) has been read.
pub struct GrblController {
    /// Serial port protected by Mutex for exclusive access
    port: SharedPort,
    /// Acknowledgement timeout
    timeout: Duration,
    /// Homing cycle timeout
    homing_timeout: Duration,
}

impl GrblController {
    /// Open the port, wake the controller and discard its start-up output.
    ///
    /// # Errors
    /// Returns error if the serial port cannot be opened or the controller
    /// does not answer a status query after waking up.
    #[instrument(skip(config), fields(port = %config.port), err)]
    pub async fn connect(config: &GrblConfig) -> Result<Self> {
        let stream: tokio_serial::SerialStream =
            open_serial_async(&config.port, config.baud_rate, "GRBL").await?;
        let driver = Self::from_port(wrap_shared(Box::new(stream)), config.timeout)
            .with_homing_timeout(config.homing_timeout);

        driver.wake(config.wake_delay).await?;

        let status = driver
            .status()
            .await
            .context("GRBL validation failed: no status report after wake-up")?;
        tracing::info!(state = %status.state, position = ?status.position, "GRBL connected");
        Ok(driver)
    }

    /// Driver over an already-open link.
    pub fn from_port(port: SharedPort, timeout: Duration) -> Self {
        Self {
            port,
            timeout,
            homing_timeout: Duration::from_secs(60),
        }
    }

    /// Override the homing timeout.
    pub fn with_homing_timeout(mut self, timeout: Duration) -> Self {
        self.homing_timeout = timeout;
        self
    }

    /// Send the wake sequence, wait for the reset and drop the banner.
    async fn wake(&self, delay: Duration) -> Result<()> {
        let mut port = self.port.lock().await;
        let writer = port.get_mut();
        writer
            .write_all(b"\r\n\r\n")
            .await
            .context("GRBL wake write failed")?;
        writer.flush().await.context("GRBL flush failed")?;
        tokio::time::sleep(delay).await;
        let discarded = drain_serial_buffer(&mut *port, 100).await;
        tracing::debug!(discarded, "GRBL start-up output drained");
        Ok(())
    }

    /// Run the `$H` homing cycle.
    #[instrument(skip(self), err)]
    pub async fn home(&self) -> Result<()> {
        self.command_with_timeout("$H", self.homing_timeout).await
    }

    /// Query a status report.
    #[instrument(skip(self), err)]
    pub async fn status(&self) -> Result<GrblStatus> {
        let mut port = self.port.lock().await;
        let writer = port.get_mut();
        writer.write_all(b"?").await.context("GRBL write failed")?;
        writer.flush().await.context("GRBL flush failed")?;

        let deadline = tokio::time::Instant::now() + self.timeout;
        loop {
            let line = read_line_until(&mut port, deadline, "status report").await?;
            if is_status_line(&line) {
                return parse_status(&line);
            }
            tracing::trace!(%line, "GRBL output skipped while waiting for status");
        }
    }

    /// Send a line command and wait for `ok`.
    async fn command(&self, command: &str) -> Result<()> {
        self.command_with_timeout(command, self.timeout).await
    }

    async fn command_with_timeout(&self, command: &str, timeout: Duration) -> Result<()> {
        let mut port = self.port.lock().await;
        let writer = port.get_mut();
        writer
            .write_all(format!("{}\n", command).as_bytes())
            .await
            .context("GRBL write failed")?;
        writer.flush().await.context("GRBL flush failed")?;

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let line = read_line_until(&mut port, deadline, command).await?;
            if line == "ok" {
                return Ok(());
            }
            if line.starts_with("error") || line.starts_with("ALARM") {
                return Err(DriverError::new(
                    DRIVER,
                    DriverErrorKind::Hardware,
                    format!("'{}' rejected: {}", command, line),
                )
                .into());
            }
            tracing::trace!(%line, "GRBL output skipped while waiting for ok");
        }
    }

    /// Send a real-time byte (no acknowledgement).
    async fn realtime(&self, byte: u8) -> Result<()> {
        let mut port = self.port.lock().await;
        let writer = port.get_mut();
        writer.write_all(&[byte]).await.context("GRBL write failed")?;
        writer.flush().await.context("GRBL flush failed")?;
        Ok(())
    }
}

/// Read one non-empty trimmed line before `deadline`.
async fn read_line_until(
    port: &mut BufReader<DynSerial>,
    deadline: tokio::time::Instant,
    waiting_for: &str,
) -> Result<String> {
    loop {
        let mut line = String::new();
        let n = tokio::time::timeout_at(deadline, port.read_line(&mut line))
            .await
            .map_err(|_| {
                anyhow::Error::from(DriverError::new(
                    DRIVER,
                    DriverErrorKind::Timeout,
                    format!("no reply to '{}'", waiting_for),
                ))
            })?
            .context("GRBL read error")?;
        if n == 0 {
            return Err(anyhow!("GRBL link closed while waiting for '{}'", waiting_for));
        }
        let line = line.trim();
        if !line.is_empty() {
            return Ok(line.to_string());
        }
    }
}

/// G-code line for a rapid move.
fn move_command(axis: Axis, distance: f64, mode: MoveMode) -> String {
    let modal = match mode {
        MoveMode::Relative => "G91",
        MoveMode::Absolute => "G90",
    };
    format!("{} G0 {}{:.6}", modal, axis.letter(), distance)
}

/// `$11x` maximum-rate setting for an axis.
fn speed_command(axis: Axis, mm_per_min: f64) -> String {
    format!("${}={:.3}", 110 + axis.index(), mm_per_min)
}

#[async_trait]
impl MotionController for GrblController {
    #[instrument(skip(self), err)]
    async fn move_axis(&self, axis: Axis, distance: f64, mode: MoveMode) -> Result<()> {
        if !distance.is_finite() {
            return Err(anyhow!("GRBL refuses non-finite move on {}", axis));
        }
        self.command(&move_command(axis, distance, mode)).await
    }

    async fn is_idle(&self) -> Result<bool> {
        Ok(self.status().await?.is_idle())
    }

    #[instrument(skip(self), err)]
    async fn position(&self) -> Result<MachinePosition> {
        Ok(self.status().await?.position)
    }

    #[instrument(skip(self), err)]
    async fn set_speed(&self, axis: Axis, mm_per_min: f64) -> Result<()> {
        if !(mm_per_min > 0.0) {
            return Err(anyhow!("GRBL speed must be positive, got {}", mm_per_min));
        }
        self.command(&speed_command(axis, mm_per_min)).await
    }

    #[instrument(skip(self), err)]
    async fn stop(&self) -> Result<()> {
        self.realtime(b'!').await
    }

    #[instrument(skip(self), err)]
    async fn resume(&self) -> Result<()> {
        self.realtime(b'~').await
    }

    #[instrument(skip(self), err)]
    async fn unlock(&self) -> Result<()> {
        self.command("$X").await
    }
}

#[async_trait]
impl DigitalInput for GrblController {
    async fn read_sensor(&self, pin: SensorPin) -> Result<bool> {
        Ok(self.status().await?.pin(pin))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, DuplexStream};

    fn rig() -> (DuplexStream, GrblController) {
        let (host, device) = tokio::io::duplex(512);
        let driver = GrblController::from_port(wrap_shared(Box::new(device)), Duration::from_secs(1));
        (host, driver)
    }

    async fn sent(host: &mut DuplexStream) -> String {
        let mut buf = vec![0u8; 512];
        let n = host.read(&mut buf).await.unwrap();
        String::from_utf8_lossy(&buf[..n]).into_owned()
    }

    #[test]
    fn formats_moves_and_speeds() {
        assert_eq!(move_command(Axis::X, 0.5, MoveMode::Relative), "G91 G0 X0.500000");
        assert_eq!(move_command(Axis::Y, 0.135, MoveMode::Absolute), "G90 G0 Y0.135000");
        assert_eq!(speed_command(Axis::Z, 20.0), "$112=20.000");
        assert_eq!(speed_command(Axis::X, 10.0), "$110=10.000");
    }

    #[tokio::test]
    async fn move_waits_for_ok() {
        let (mut host, driver) = rig();
        host.write_all(b"ok\r\n").await.unwrap();
        driver.move_axis(Axis::X, -0.16077, MoveMode::Relative).await.unwrap();
        assert_eq!(sent(&mut host).await, "G91 G0 X-0.160770\n");
    }

    #[tokio::test]
    async fn error_reply_is_hardware_error() {
        let (mut host, driver) = rig();
        host.write_all(b"error:9\r\n").await.unwrap();
        let err = driver.move_axis(Axis::X, 1.0, MoveMode::Absolute).await.unwrap_err();
        let driver_err = err.downcast_ref::<DriverError>().unwrap();
        assert_eq!(driver_err.kind, DriverErrorKind::Hardware);
        assert!(driver_err.message.contains("error:9"));
    }

    #[tokio::test]
    async fn unrelated_lines_are_skipped() {
        let (mut host, driver) = rig();
        host.write_all(b"[MSG:Caution: Unlocked]\r\n\r\nok\r\n").await.unwrap();
        driver.unlock().await.unwrap();
        assert_eq!(sent(&mut host).await, "$X\n");
    }

    #[tokio::test(start_paused = true)]
    async fn missing_ok_times_out() {
        let (_host, driver) = rig();
        let err = driver.set_speed(Axis::X, 10.0).await.unwrap_err();
        let driver_err = err.downcast_ref::<DriverError>().unwrap();
        assert_eq!(driver_err.kind, DriverErrorKind::Timeout);
    }

    #[tokio::test]
    async fn status_query_parses_position_and_idle() {
        let (mut host, driver) = rig();
        host.write_all(b"ok\r\n<Run|MPos:1.000,0.065,0.333|FS:10,0>\r\n")
            .await
            .unwrap();
        assert!(!driver.is_idle().await.unwrap());
        assert_eq!(sent(&mut host).await, "?");

        host.write_all(b"<Idle|MPos:1.500,0.065,0.333|FS:0,0|Pn:Z>\r\n")
            .await
            .unwrap();
        let position = driver.position().await.unwrap();
        assert_eq!(position.x, 1.5);

        host.write_all(b"<Idle|MPos:1.500,0.065,0.333|FS:0,0|Pn:Z>\r\n")
            .await
            .unwrap();
        assert!(driver.read_sensor(SensorPin::LimitZ).await.unwrap());
    }

    #[tokio::test]
    async fn feed_hold_and_resume_are_single_bytes() {
        let (mut host, driver) = rig();
        driver.stop().await.unwrap();
        assert_eq!(sent(&mut host).await, "!");
        driver.resume().await.unwrap();
        assert_eq!(sent(&mut host).await, "~");
    }

    #[tokio::test(start_paused = true)]
    async fn wake_discards_banner() {
        let (mut host, driver) = rig();
        host.write_all(b"\r\nGrbl 1.1h ['$' for help]\r\n").await.unwrap();
        driver.wake(Duration::from_millis(10)).await.unwrap();
        assert_eq!(sent(&mut host).await, "\r\n\r\n");

        host.write_all(b"ok\r\n").await.unwrap();
        driver.home().await.unwrap();
    }

    #[test]
    fn config_from_motion_section() {
        let cfg = GrblConfig::from_motion(&MotionConfig::default());
        assert_eq!(cfg.baud_rate, 115_200);
        assert_eq!(cfg.wake_delay, Duration::from_millis(2000));
        assert_eq!(cfg.timeout, Duration::from_secs(5));
    }
}
