//! Liveview frame streaming.
//!
//! Vendors deliver preview frames by repeated polling: each fetch
//! answers with the newest JPEG, a busy code while no frame is ready,
//! or a not-ready vendor code right after starting. Frames arrive with
//! a vendor header in front of the JPEG; the loop returns the JPEG
//! bytes only.

use tracing::{debug, trace, warn};

use crate::capture::backoff::Backoff;
use crate::capture::strategy::LiveviewStrategy;
use crate::error::{PtpError, Result};
use crate::proto::DataTypeCode;
use crate::session::PtpSession;
use crate::transport::Transport;

const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];

/// A running liveview stream over one session.
#[derive(Debug)]
pub struct Liveview {
    strategy: LiveviewStrategy,
    running: bool,
}

impl Liveview {
    /// A stream driver for a selected strategy. Nothing is sent to the
    /// device until [`start`](Self::start).
    #[must_use]
    pub fn new(strategy: LiveviewStrategy) -> Self {
        Self {
            strategy,
            running: false,
        }
    }

    /// True between a successful start and stop.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Begins streaming. Devices refuse while the prohibition mask is
    /// non-zero (mirror in the way, exposure running); the start is
    /// retried on the shared backoff until the device accepts or the
    /// capture budget runs out.
    pub async fn start<T: Transport>(&mut self, session: &mut PtpSession<T>) -> Result<()> {
        if self.running {
            return Ok(());
        }
        if let Some(property) = self.strategy.prohibit_property {
            let mask = session
                .prop_value(property, DataTypeCode::UINT32)
                .await?
                .as_u32()
                .unwrap_or(0);
            if mask != 0 {
                debug!(mask, "liveview prohibited by the device");
                return Err(PtpError::InvalidState {
                    message: format!("liveview prohibited, mask {mask:#x}"),
                });
            }
        }
        let Some(op) = self.strategy.start_op else {
            self.running = true;
            return Ok(());
        };

        let budget = session.config().capture_timeout;
        let mut backoff = Backoff::for_budget(session.config(), budget);
        loop {
            match session.command(op, &[]).await {
                Ok(_) => {
                    self.running = true;
                    debug!(family = self.strategy.name, "liveview started");
                    return Ok(());
                }
                Err(PtpError::DeviceBusy) => {
                    if !backoff.wait().await {
                        return Err(PtpError::Timeout {
                            duration: backoff.elapsed(),
                        });
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Fetches the next frame, waiting out busy polls on the shared
    /// backoff. Returns the JPEG bytes with any vendor header stripped.
    pub async fn frame<T: Transport>(&mut self, session: &mut PtpSession<T>) -> Result<Vec<u8>> {
        if !self.running {
            return Err(PtpError::InvalidState {
                message: "liveview is not running".into(),
            });
        }
        let params = self.strategy.frame_params.clone();
        let mut backoff = Backoff::for_budget(session.config(), session.config().normal_timeout);
        loop {
            match session.read_data(self.strategy.frame_op, &params).await {
                Ok(bytes) => match jpeg_payload(&bytes) {
                    Some(frame) => return Ok(frame.to_vec()),
                    None => {
                        trace!(len = bytes.len(), "frame without JPEG marker, repolling");
                    }
                },
                Err(err) if err.is_retryable() => {
                    trace!(%err, "no frame ready yet");
                }
                Err(err) => return Err(err),
            }
            if !backoff.wait().await {
                return Err(PtpError::Timeout {
                    duration: backoff.elapsed(),
                });
            }
        }
    }

    /// Ends streaming. Best-effort on the device side.
    pub async fn stop<T: Transport>(&mut self, session: &mut PtpSession<T>) -> Result<()> {
        if !self.running {
            return Ok(());
        }
        self.running = false;
        if let Some(op) = self.strategy.stop_op {
            if let Err(err) = session.command(op, &[]).await {
                warn!(%err, "device refused liveview stop");
                return Err(err);
            }
        }
        debug!(family = self.strategy.name, "liveview stopped");
        Ok(())
    }
}

/// The JPEG portion of a frame buffer: everything from the first SOI
/// marker on. Vendors prepend differently sized status headers.
fn jpeg_payload(bytes: &[u8]) -> Option<&[u8]> {
    let start = bytes.windows(2).position(|w| w == JPEG_SOI)?;
    Some(&bytes[start..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jpeg_payload_strips_vendor_header() {
        let mut frame = vec![0u8; 64];
        frame.extend_from_slice(&[0xFF, 0xD8, 0xFF, 0xE0, 0x01, 0x02]);
        assert_eq!(
            jpeg_payload(&frame).unwrap(),
            &[0xFF, 0xD8, 0xFF, 0xE0, 0x01, 0x02]
        );
    }

    #[test]
    fn test_frame_without_marker_is_rejected() {
        assert!(jpeg_payload(&[0u8; 128]).is_none());
        assert!(jpeg_payload(&[]).is_none());
    }
}
