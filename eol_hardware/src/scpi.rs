//! Line-oriented SCPI over TCP.
//!
//! Reader and writer halves are locked separately so a write-only command
//! (output off) can go out while a query is waiting for its answer. Queries
//! hold an exchange lock for the write+read pair.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;

use crate::error::{HwError, Result};

const STALE_DRAIN: Duration = Duration::from_millis(20);

pub struct ScpiClient {
    device: &'static str,
    reader: Mutex<BufReader<OwnedReadHalf>>,
    writer: Mutex<OwnedWriteHalf>,
    exchange: Mutex<()>,
    timeout: Duration,
    /// A query went out without its answer being read (timed out or the
    /// caller dropped it); the late answer may still be in flight.
    stale: AtomicBool,
}

impl ScpiClient {
    pub async fn connect(device: &'static str, host: &str, port: u16, timeout: Duration) -> Result<Self> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| HwError::operation(device, "connect", format!("{host}:{port} timed out")))??;
        stream.set_nodelay(true)?;
        let (read, write) = stream.into_split();
        tracing::info!(device, host, port, "scpi connected");
        Ok(Self {
            device,
            reader: Mutex::new(BufReader::new(read)),
            writer: Mutex::new(write),
            exchange: Mutex::new(()),
            timeout,
            stale: AtomicBool::new(false),
        })
    }

    /// Write one command, no answer expected.
    pub async fn send(&self, command: &str) -> Result<()> {
        let mut w = self.writer.lock().await;
        tracing::trace!(device = self.device, command, "-> scpi");
        w.write_all(command.as_bytes()).await?;
        w.write_all(b"\n").await?;
        w.flush().await?;
        Ok(())
    }

    pub async fn query(&self, command: &str) -> Result<String> {
        let _exchange = self.exchange.lock().await;
        let mut r = self.reader.lock().await;
        if self.stale.load(Ordering::Acquire) {
            Self::drain(&mut r).await;
        }
        // Cleared only once the answer is in hand.
        self.stale.store(true, Ordering::Release);
        self.send(command).await?;

        let mut line = String::new();
        match tokio::time::timeout(self.timeout, r.read_line(&mut line)).await {
            Ok(Ok(0)) => Err(HwError::Closed),
            Ok(Ok(_)) => {
                self.stale.store(false, Ordering::Release);
                let answer = line.trim().to_string();
                tracing::trace!(device = self.device, command, answer = %answer, "<- scpi");
                Ok(answer)
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(HwError::ResponseTimeout {
                device: self.device,
                command: command.to_string(),
            }),
        }
    }

    /// Query and parse a comma-separated list of numbers.
    pub async fn query_numbers(&self, command: &str) -> Result<Vec<f64>> {
        let answer = self.query(command).await?;
        parse_numbers(&answer).map_err(|reason| HwError::Operation {
            device: self.device,
            operation: "parse",
            reason: format!("`{command}` -> {answer:?}: {reason}"),
        })
    }

    async fn drain(reader: &mut BufReader<OwnedReadHalf>) {
        let mut junk = String::new();
        while let Ok(Ok(n)) = tokio::time::timeout(STALE_DRAIN, reader.read_line(&mut junk)).await {
            if n == 0 {
                break;
            }
            tracing::debug!(answer = %junk.trim(), "dropping late scpi answer");
            junk.clear();
        }
    }
}

/// `"1.0E+01,2.5,NAN"` style answers. `NAN`/`INF` and instrument error
/// markers (`9.91E+37`) are rejected.
pub fn parse_numbers(answer: &str) -> std::result::Result<Vec<f64>, String> {
    answer
        .split(',')
        .map(|field| {
            let field = field.trim();
            let v: f64 = field.parse().map_err(|_| format!("{field:?} is not a number"))?;
            if !v.is_finite() || v.abs() >= 9.9e37 {
                return Err(format!("{field:?} is not a valid reading"));
            }
            Ok(v)
        })
        .collect()
}
