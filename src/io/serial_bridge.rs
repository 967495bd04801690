//! Serial bridge from the shelf sensor microcontroller
//!
//! Protocol:
//! - 9600 baud 8N1 by default
//! - One ASCII line per sample: `D1:120,F1:500,D2:80,F2:300\r\n`
//! - Lines may arrive split across reads; a partial line is kept until its
//!   terminator shows up
//!
//! A port that fails to open or errors mid-stream is reopened after a
//! delay until shutdown.

use crate::domain::types::parse_reading_line;
use crate::infra::config::Config;
use crate::services::engine::{IngestReport, ShelfEngine};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::sync::watch;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, error, info, warn};

/// Longest line accepted before the buffer is discarded as garbage
const MAX_LINE_LEN: usize = 1024;

const RECONNECT_DELAY: Duration = Duration::from_secs(2);

pub struct SerialBridge {
    device: String,
    baud: u32,
    reconnect_delay: Duration,
    engine: Arc<ShelfEngine>,
    /// Bytes of the current, not yet terminated line
    line_buffer: Vec<u8>,
    /// Set after an overflow; bytes are dropped until the next terminator
    discarding: bool,
}

impl SerialBridge {
    pub fn new(config: &Config, engine: Arc<ShelfEngine>) -> Self {
        Self {
            device: config.serial_device().to_string(),
            baud: config.serial_baud(),
            reconnect_delay: RECONNECT_DELAY,
            engine,
            line_buffer: Vec::with_capacity(128),
            discarding: false,
        }
    }

    /// Feed raw bytes from the port, ingesting every completed line
    ///
    /// Returns the combined report of all lines completed by this chunk.
    pub fn feed(&mut self, data: &[u8]) -> IngestReport {
        let mut report = IngestReport::default();

        for &byte in data {
            if byte == b'\n' {
                if self.discarding {
                    self.discarding = false;
                    continue;
                }
                let line = std::mem::take(&mut self.line_buffer);
                let r = self.ingest_line(&line);
                report.accepted += r.accepted;
                report.ignored += r.ignored;
                continue;
            }

            if self.discarding {
                continue;
            }

            if self.line_buffer.len() >= MAX_LINE_LEN {
                warn!(len = self.line_buffer.len(), "serial_line_overflow");
                self.engine.metrics().record_frame_rejected();
                self.line_buffer.clear();
                self.discarding = true;
                continue;
            }
            self.line_buffer.push(byte);
        }

        report
    }

    fn ingest_line(&self, raw: &[u8]) -> IngestReport {
        let Ok(line) = std::str::from_utf8(raw) else {
            debug!(len = raw.len(), "serial_line_not_utf8");
            self.engine.metrics().record_frame_rejected();
            return IngestReport::default();
        };

        let line = line.trim();
        if line.is_empty() {
            return IngestReport::default();
        }

        match parse_reading_line(line) {
            Ok(batch) => self.engine.ingest_batch(&batch),
            Err(e) => {
                debug!(line = %line, error = %e, "serial_line_rejected");
                self.engine.metrics().record_frame_rejected();
                IngestReport::default()
            }
        }
    }

    /// Sleep for the reconnect delay. Returns false if shutdown fired first.
    async fn wait_reconnect(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(self.reconnect_delay) => true,
            _ = shutdown.changed() => !*shutdown.borrow(),
        }
    }

    /// Read from the serial port until shutdown, reopening it on failure
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(device = %self.device, baud = %self.baud, "serial_bridge_started");

        loop {
            if *shutdown.borrow() {
                info!("serial_bridge_shutdown");
                return;
            }

            let mut port = match tokio_serial::new(&self.device, self.baud).open_native_async() {
                Ok(p) => {
                    info!(device = %self.device, "serial_port_opened");
                    p
                }
                Err(e) => {
                    error!(device = %self.device, error = %e, "serial_port_open_failed");
                    if !self.wait_reconnect(&mut shutdown).await {
                        info!("serial_bridge_shutdown");
                        return;
                    }
                    continue;
                }
            };

            // Drop anything half-read from a previous connection
            self.line_buffer.clear();
            self.discarding = false;
            let mut buf = [0u8; 256];

            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            info!("serial_bridge_shutdown");
                            return;
                        }
                    }
                    result = port.read(&mut buf) => {
                        match result {
                            Ok(0) => {
                                warn!(device = %self.device, "serial_port_closed");
                                break;
                            }
                            Ok(n) => {
                                let report = self.feed(&buf[..n]);
                                if report.ignored > 0 {
                                    debug!(ignored = %report.ignored, "serial_unknown_sensors");
                                }
                            }
                            Err(e) => {
                                warn!(device = %self.device, error = %e, "serial_read_error");
                                break;
                            }
                        }
                    }
                }
            }

            if !self.wait_reconnect(&mut shutdown).await {
                info!("serial_bridge_shutdown");
                return;
            }
        }
    }
}
