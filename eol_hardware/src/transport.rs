//! Byte-stream seam under the serial drivers.
//!
//! Anything that is `AsyncRead + AsyncWrite` can be wrapped in
//! [`StreamTransport`]: a `tokio_serial::SerialStream` on the rig, a
//! `tokio::io::DuplexStream` in tests.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{HwError, Result};

/// How long `clear_input` keeps reading before it decides the line is quiet.
pub const DEFAULT_DRAIN_WINDOW: Duration = Duration::from_millis(10);

#[async_trait]
pub trait Transport: Send {
    async fn write_all(&mut self, bytes: &[u8]) -> Result<()>;
    /// Suspend until at least one byte is available. `Ok(0)` means the peer closed.
    ///
    /// Must be cancel-safe: dropping the future loses no bytes.
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize>;
    /// Drop whatever input is already pending. Returns the number of bytes dropped.
    async fn clear_input(&mut self) -> Result<usize>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    async fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).write_all(bytes).await
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read(buf).await
    }

    async fn clear_input(&mut self) -> Result<usize> {
        (**self).clear_input().await
    }
}

/// Adapts any async byte stream.
pub struct StreamTransport<S> {
    stream: S,
    drain_window: Duration,
}

impl<S> StreamTransport<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            drain_window: DEFAULT_DRAIN_WINDOW,
        }
    }

    pub fn with_drain_window(mut self, window: Duration) -> Self {
        self.drain_window = window;
        self
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

#[async_trait]
impl<S> Transport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.stream.read(buf).await?)
    }

    async fn clear_input(&mut self) -> Result<usize> {
        let mut scratch = [0u8; 256];
        let mut dropped = 0usize;
        loop {
            match tokio::time::timeout(self.drain_window, self.stream.read(&mut scratch)).await {
                Ok(Ok(0)) | Err(_) => break,
                Ok(Ok(n)) => dropped += n,
                Ok(Err(e)) => return Err(HwError::Io(e)),
            }
        }
        if dropped > 0 {
            tracing::debug!(bytes = dropped, "cleared stale input");
        }
        Ok(dropped)
    }
}

/// Opens a fresh transport on `connect`.
#[async_trait]
pub trait TransportOpener: Send + Sync {
    async fn open(&self) -> Result<Box<dyn Transport>>;
    /// Human-readable endpoint for logs ("/dev/ttyUSB0 @ 115200").
    fn describe(&self) -> String;
}

/// Serial port endpoint; 8N1, no flow control.
#[derive(Debug, Clone)]
pub struct SerialOpener {
    pub port: String,
    pub baud_rate: u32,
}

#[cfg(feature = "serial")]
#[async_trait]
impl TransportOpener for SerialOpener {
    async fn open(&self) -> Result<Box<dyn Transport>> {
        use tokio_serial::SerialPortBuilderExt;

        let port = self.port.clone();
        let baud = self.baud_rate;
        let stream = tokio::task::spawn_blocking(move || {
            tokio_serial::new(&port, baud)
                .data_bits(tokio_serial::DataBits::Eight)
                .parity(tokio_serial::Parity::None)
                .stop_bits(tokio_serial::StopBits::One)
                .flow_control(tokio_serial::FlowControl::None)
                .open_native_async()
        })
        .await
        .map_err(|e| HwError::Io(std::io::Error::other(e)))?
        .map_err(|e| HwError::Io(std::io::Error::other(e)))?;
        tracing::info!(port = %self.port, baud = self.baud_rate, "serial port opened");
        Ok(Box::new(StreamTransport::new(stream)))
    }

    fn describe(&self) -> String {
        format!("{} @ {}", self.port, self.baud_rate)
    }
}

#[cfg(not(feature = "serial"))]
#[async_trait]
impl TransportOpener for SerialOpener {
    async fn open(&self) -> Result<Box<dyn Transport>> {
        Err(HwError::operation(
            "serial",
            "open",
            format!(
                "{} requested but this build has no serial support (enable the `serial` feature)",
                self.port
            ),
        ))
    }

    fn describe(&self) -> String {
        format!("{} @ {}", self.port, self.baud_rate)
    }
}
