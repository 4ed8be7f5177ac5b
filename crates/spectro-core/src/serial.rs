//! Serial port plumbing for the motion controller.
//!
//! Requires the `serial` feature:
//!
//! ```toml
//! [dependencies]
//! spectro-core = { path = "../spectro-core", features = ["serial"] }
//! ```
//!
//! The G-code adapter reads line-delimited replies (`ok`, `error:N`, status
//! reports), so the shared port is wrapped in a `BufReader`. Tests substitute a
//! `tokio::io::DuplexStream` for the real port.

use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, BufReader};
use tokio::sync::Mutex;

/// Anything usable as a serial link.
pub trait SerialPortIO: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> SerialPortIO for T {}

/// Type-erased serial link.
pub type DynSerial = Box<dyn SerialPortIO>;

/// Serial link shared between tasks, with buffered line reads.
pub type SharedPort = Arc<Mutex<BufReader<DynSerial>>>;

/// Wrap a link for shared, buffered use.
pub fn wrap_shared(port: DynSerial) -> SharedPort {
    Arc::new(Mutex::new(BufReader::new(port)))
}

/// Open a serial port (8N1, no flow control) without blocking the runtime.
pub async fn open_serial_async(
    port_path: &str,
    baud_rate: u32,
    device_name: &str,
) -> anyhow::Result<tokio_serial::SerialStream> {
    use anyhow::Context;
    use tokio::task::spawn_blocking;
    use tokio_serial::SerialPortBuilderExt;

    let port_path_owned = port_path.to_string();
    let device_name_owned = device_name.to_string();

    spawn_blocking(move || {
        tokio_serial::new(&port_path_owned, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .context(format!(
                "Failed to open {} serial port: {}",
                device_name_owned, port_path_owned
            ))
    })
    .await
    .context("spawn_blocking for serial port opening failed")?
}

/// Read and discard whatever arrives within `timeout_ms`.
///
/// GRBL prints a banner and may echo status after the wake sequence; this
/// clears it so the next read is the reply to our own command. Returns the
/// number of bytes discarded.
pub async fn drain_serial_buffer<R: AsyncRead + Unpin>(port: &mut R, timeout_ms: u64) -> usize {
    let mut discard = [0u8; 256];
    let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
    let mut total_discarded = 0usize;

    loop {
        let now = tokio::time::Instant::now();
        if now >= deadline {
            break;
        }
        match tokio::time::timeout(deadline - now, port.read(&mut discard)).await {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => total_discarded += n,
            Ok(Err(_)) => break,
            Err(_) => break,
        }
    }

    total_discarded
}
