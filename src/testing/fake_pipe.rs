//! Scripted endpoint double for USB framing tests.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{PtpError, Result};
use crate::transport::UsbPipe;

/// A [`UsbPipe`] that replays queued reads and records writes.
///
/// Each queued bulk-in entry is one transfer: a call returns the whole
/// entry (or its error), never merging entries, which models how real
/// transfers end at short packets. An exhausted queue times out, the
/// way a silent device would.
#[derive(Debug, Default)]
pub struct FakePipe {
    /// Script for the bulk-in endpoint, consumed front to back.
    pub reads: VecDeque<Result<Vec<u8>>>,
    /// Script for the interrupt endpoint.
    pub interrupts: VecDeque<Result<Vec<u8>>>,
    /// Replies for control-in requests.
    pub control_replies: VecDeque<Vec<u8>>,
    /// Every bulk-out transfer, in order (zero-length packets included).
    pub writes: Vec<Vec<u8>>,
    /// Injected bulk-out failures, consumed before accepting a write.
    pub write_errors: VecDeque<PtpError>,
    /// Control-out requests seen: (request, value, index, data).
    pub control_out_log: Vec<(u8, u16, u16, Vec<u8>)>,
    /// Control-in requests seen: (request, value, index).
    pub control_in_log: Vec<(u8, u16, u16)>,
    /// Bulk-in halt clears issued by the framing layer.
    pub cleared_in: usize,
    /// Bulk-out halt clears issued by the framing layer.
    pub cleared_out: usize,
    /// Reported wMaxPacketSize; zero disables ZLP logic.
    pub max_packet: usize,
}

impl FakePipe {
    /// An empty pipe with a high-speed bulk packet size.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_packet: 512,
            ..Self::default()
        }
    }

    /// Queues a successful bulk-in transfer.
    pub fn push_read(&mut self, bytes: Vec<u8>) -> &mut Self {
        self.reads.push_back(Ok(bytes));
        self
    }

    /// Queues a failed bulk-in transfer.
    pub fn push_read_err(&mut self, err: PtpError) -> &mut Self {
        self.reads.push_back(Err(err));
        self
    }

    /// Queues a successful interrupt transfer.
    pub fn push_interrupt(&mut self, bytes: Vec<u8>) -> &mut Self {
        self.interrupts.push_back(Ok(bytes));
        self
    }

    /// Queues a failed interrupt transfer.
    pub fn push_interrupt_err(&mut self, err: PtpError) -> &mut Self {
        self.interrupts.push_back(Err(err));
        self
    }

    /// All bulk-out bytes concatenated, ignoring transfer boundaries.
    #[must_use]
    pub fn written(&self) -> Vec<u8> {
        self.writes.concat()
    }
}

#[async_trait]
impl UsbPipe for FakePipe {
    async fn bulk_out(&mut self, data: &[u8], _timeout: Duration) -> Result<usize> {
        if let Some(err) = self.write_errors.pop_front() {
            return Err(err);
        }
        self.writes.push(data.to_vec());
        Ok(data.len())
    }

    async fn bulk_in(&mut self, max_len: usize, timeout: Duration) -> Result<Vec<u8>> {
        match self.reads.pop_front() {
            Some(Ok(bytes)) => {
                debug_assert!(bytes.len() <= max_len, "scripted read exceeds request");
                Ok(bytes)
            }
            Some(Err(err)) => Err(err),
            None => Err(PtpError::Timeout { duration: timeout }),
        }
    }

    async fn interrupt_in(&mut self, _max_len: usize, timeout: Duration) -> Result<Vec<u8>> {
        match self.interrupts.pop_front() {
            Some(entry) => entry,
            None => Err(PtpError::Timeout { duration: timeout }),
        }
    }

    async fn control_out(
        &mut self,
        request: u8,
        value: u16,
        index: u16,
        data: &[u8],
        _timeout: Duration,
    ) -> Result<()> {
        self.control_out_log.push((request, value, index, data.to_vec()));
        Ok(())
    }

    async fn control_in(
        &mut self,
        request: u8,
        value: u16,
        index: u16,
        max_len: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>> {
        self.control_in_log.push((request, value, index));
        match self.control_replies.pop_front() {
            Some(mut bytes) => {
                bytes.truncate(max_len);
                Ok(bytes)
            }
            None => Err(PtpError::Timeout { duration: timeout }),
        }
    }

    async fn clear_halt_in(&mut self) -> Result<()> {
        self.cleared_in += 1;
        Ok(())
    }

    async fn clear_halt_out(&mut self) -> Result<()> {
        self.cleared_out += 1;
        Ok(())
    }

    fn max_packet_size(&self) -> usize {
        self.max_packet
    }
}
