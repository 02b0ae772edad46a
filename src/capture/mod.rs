//! Capture orchestration.
//!
//! One state machine drives every vendor family:
//! `Idle → Triggering → AwaitingFocus → AwaitingCapture →
//! AwaitingObject → Downloading → Idle`. The vendor differences live
//! entirely in the [`CaptureStrategy`] handed to the sequencer; the
//! machine itself never branches on a vendor id.
//!
//! Every wait runs on the shared additive [`Backoff`], pumps the
//! session's event queue so unrelated events are not lost, and
//! re-checks the caller's cancellation token.

pub mod backoff;
pub mod liveview;
pub mod strategy;

#[cfg(test)]
mod tests;

use std::collections::HashSet;
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use crate::codec::{decode_changes, ChangeRecord, ObjectInfo, PropertyValue, WireReader, WireWriter};
use crate::error::{PtpError, Result};
use crate::proto::{DataTypeCode, DevicePropCode, EventCode, ObjectHandle, OpCode, StorageId};
use crate::session::PtpSession;
use crate::transport::{Event, TransferContext, Transport};

pub use backoff::Backoff;
pub use liveview::Liveview;
pub use strategy::{
    CaptureFault, CaptureStrategy, CaptureTuning, CompletionSignal, EventSource, LiveviewStrategy,
    ObjectLocation, TriggerMethod, PRESS_DOWN, PRESS_UP,
};

/// Where the capture state machine currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CapturePhase {
    /// Nothing in progress.
    #[default]
    Idle,
    /// Firing the trigger.
    Triggering,
    /// Half-press issued, waiting for focus confirmation.
    AwaitingFocus,
    /// Trigger accepted, waiting for the completion signal.
    AwaitingCapture,
    /// Completion seen, resolving the object handle.
    AwaitingObject,
    /// Fetching the object.
    Downloading,
}

/// A finished capture.
#[derive(Debug, Clone)]
pub struct CaptureOutcome {
    /// Handle the object was fetched from. For SDRAM families this is
    /// the staging pseudo-handle and is no longer valid once cleanup
    /// ran.
    pub handle: ObjectHandle,
    /// Object descriptor, where the device could provide one.
    pub info: Option<ObjectInfo>,
    /// The object bytes.
    pub data: Vec<u8>,
}

/// Drives one capture at a time through a session.
#[derive(Debug)]
pub struct CaptureSequencer {
    strategy: CaptureStrategy,
    phase: CapturePhase,
}

impl CaptureSequencer {
    /// A sequencer for a known strategy.
    #[must_use]
    pub fn new(strategy: CaptureStrategy) -> Self {
        Self {
            strategy,
            phase: CapturePhase::Idle,
        }
    }

    /// Selects the strategy from the session's device descriptor. The
    /// session must be open.
    pub fn for_session<T: Transport>(session: &PtpSession<T>) -> Result<Self> {
        let info = session.device_info().ok_or_else(|| PtpError::InvalidState {
            message: "capture needs an open session".into(),
        })?;
        Ok(Self::new(CaptureStrategy::select(info, session.config())))
    }

    /// The strategy in use.
    #[must_use]
    pub fn strategy(&self) -> &CaptureStrategy {
        &self.strategy
    }

    /// Current machine phase.
    #[must_use]
    pub fn phase(&self) -> CapturePhase {
        self.phase
    }

    /// Runs one complete capture: trigger, wait for completion, fetch
    /// the object, clean up. The machine returns to `Idle` on every
    /// exit path.
    pub async fn capture<T: Transport>(
        &mut self,
        session: &mut PtpSession<T>,
        ctx: &mut TransferContext,
    ) -> Result<CaptureOutcome> {
        let result = self.run(session, ctx).await;
        self.phase = CapturePhase::Idle;
        result
    }

    async fn run<T: Transport>(
        &mut self,
        session: &mut PtpSession<T>,
        ctx: &mut TransferContext,
    ) -> Result<CaptureOutcome> {
        // Anything still queued belongs to an earlier operation.
        session.drain_events().await?;

        let budget = session.config().capture_timeout
            + self.strategy.tuning.extra_wait
            + self.exposure_budget(session).await;
        let mut backoff = Backoff::for_budget(session.config(), budget);

        let baseline = match self.strategy.completion {
            CompletionSignal::ListingDiff => Some(self.listing(session).await?),
            _ => None,
        };

        self.phase = CapturePhase::Triggering;
        if session.config().autofocus {
            if let Some(op) = self.strategy.autofocus_op {
                self.drive_autofocus(session, op, &mut backoff).await?;
            }
        }
        self.trigger(session, ctx, &mut backoff).await?;

        self.phase = CapturePhase::AwaitingCapture;
        let announced = self
            .await_completion(session, ctx, &mut backoff, baseline.as_ref())
            .await?;

        self.phase = CapturePhase::AwaitingObject;
        let handle = self.resolve_handle(announced, &backoff)?;
        info!(%handle, family = self.strategy.name, "capture produced an object");

        self.phase = CapturePhase::Downloading;
        let outcome = self.download(session, ctx, &mut backoff, handle).await?;
        self.cleanup(session, handle).await;
        Ok(outcome)
    }

    /// A long exposure holds the shutter past the configured wait.
    /// Where the family carries an exposure table and the device
    /// reports its exposure time, the table widens the completion
    /// budget; an unreadable property keeps the configured wait.
    async fn exposure_budget<T: Transport>(&self, session: &mut PtpSession<T>) -> Duration {
        if self.strategy.tuning.exposure_wait.is_empty() {
            return Duration::ZERO;
        }
        let advertised = session
            .device_info()
            .is_some_and(|info| info.supports_property(DevicePropCode::EXPOSURE_TIME));
        if !advertised {
            return Duration::ZERO;
        }
        match session
            .prop_value(DevicePropCode::EXPOSURE_TIME, DataTypeCode::UINT32)
            .await
        {
            Ok(value) => {
                let exposure = value.as_u32().unwrap_or(0);
                let wait = self.strategy.tuning.exposure_budget(exposure);
                if !wait.is_zero() {
                    debug!(exposure, ?wait, "long exposure widens the completion wait");
                }
                wait
            }
            Err(err) => {
                debug!(%err, "exposure time unreadable, keeping the configured wait");
                Duration::ZERO
            }
        }
    }

    /// Vendor response codes refine into the capture fault taxonomy
    /// before any retry decision.
    fn refine(&self, err: PtpError) -> PtpError {
        match err {
            PtpError::GeneralFailure { code } => match self.strategy.classify(code) {
                Some(CaptureFault::Focus) => PtpError::NoFocus,
                Some(CaptureFault::MirrorUp) => PtpError::MirrorUp,
                Some(CaptureFault::Memory) => PtpError::NoMoreMemory,
                Some(CaptureFault::Busy) => PtpError::DeviceBusy,
                None => PtpError::GeneralFailure { code },
            },
            PtpError::StoreFull => PtpError::StorageFull,
            PtpError::WriteProtected => PtpError::StorageProtected,
            other => other,
        }
    }

    async fn drive_autofocus<T: Transport>(
        &mut self,
        session: &mut PtpSession<T>,
        op: OpCode,
        backoff: &mut Backoff,
    ) -> Result<()> {
        self.phase = CapturePhase::AwaitingFocus;
        loop {
            match session.command(op, &[]).await {
                Ok(_) => return Ok(()),
                Err(err) => match self.refine(err) {
                    PtpError::DeviceBusy => {
                        if !backoff.wait().await {
                            return Err(PtpError::Timeout {
                                duration: backoff.elapsed(),
                            });
                        }
                    }
                    other => return Err(other),
                },
            }
        }
    }

    async fn trigger<T: Transport>(
        &mut self,
        session: &mut PtpSession<T>,
        ctx: &mut TransferContext,
        backoff: &mut Backoff,
    ) -> Result<()> {
        match self.strategy.trigger.clone() {
            TriggerMethod::Opcode { op, params } => loop {
                if ctx.is_cancelled() {
                    return Err(PtpError::Cancelled);
                }
                match session.command(op, &params).await {
                    Ok(_) => return Ok(()),
                    Err(err) => match self.refine(err) {
                        PtpError::DeviceBusy => {
                            trace!(op = %op, "trigger busy, backing off");
                            if !backoff.wait().await {
                                return Err(PtpError::Timeout {
                                    duration: backoff.elapsed(),
                                });
                            }
                        }
                        other => return Err(other),
                    },
                }
            },
            TriggerMethod::PropertyPress { op, half, full } => {
                self.press(session, op, half, PRESS_DOWN).await?;
                if session.config().autofocus {
                    self.phase = CapturePhase::AwaitingFocus;
                    // Give the focus drive one backoff tick to settle.
                    backoff.wait().await;
                }
                self.phase = CapturePhase::Triggering;
                let fired = self.press(session, op, full, PRESS_DOWN).await;
                // Both buttons come back up whatever the shutter did.
                let _ = self.press(session, op, full, PRESS_UP).await;
                let _ = self.press(session, op, half, PRESS_UP).await;
                fired
            }
        }
    }

    async fn press<T: Transport>(
        &self,
        session: &mut PtpSession<T>,
        op: OpCode,
        property: DevicePropCode,
        value: u16,
    ) -> Result<()> {
        let endian = session.transport_mut().endian();
        let mut writer = WireWriter::new(endian);
        PropertyValue::U16(value).encode(&mut writer)?;
        session
            .write_data(op, &[u32::from(property.0)], &writer.into_bytes())
            .await
            .map(|_| ())
            .map_err(|err| self.refine(err))
    }

    async fn listing<T: Transport>(
        &self,
        session: &mut PtpSession<T>,
    ) -> Result<HashSet<ObjectHandle>> {
        Ok(session
            .object_handles(StorageId::ALL, None)
            .await?
            .into_iter()
            .collect())
    }

    /// Waits for the strategy's completion signal, pumping events on
    /// every poll. Returns the object handle if the signal carried one.
    async fn await_completion<T: Transport>(
        &mut self,
        session: &mut PtpSession<T>,
        ctx: &mut TransferContext,
        backoff: &mut Backoff,
        baseline: Option<&HashSet<ObjectHandle>>,
    ) -> Result<Option<ObjectHandle>> {
        let need_complete = match &self.strategy.completion {
            CompletionSignal::Events => {
                let advertised = session.device_info().is_some_and(|info| {
                    self.strategy
                        .complete_events
                        .iter()
                        .any(|&code| info.supports_event(code))
                });
                !self.strategy.complete_events.is_empty() && advertised
            }
            _ => false,
        };

        let mut announced: Option<ObjectHandle> = None;
        let mut object_seen = false;
        let mut complete_seen = false;

        loop {
            if ctx.is_cancelled() {
                let _ = session.cancel_in_flight().await;
                return Err(PtpError::Cancelled);
            }

            self.pump_events(session).await?;

            if !object_seen {
                if let Some(event) = session.events().take_matching(|e| {
                    self.strategy.object_added_events.contains(&e.code)
                }) {
                    object_seen = true;
                    announced = event.param(0).map(ObjectHandle);
                    debug!(code = %event.code, handle = ?announced, "object announced");
                }
            }
            if need_complete && !complete_seen {
                if let Some(event) = session
                    .events()
                    .take_matching(|e| self.strategy.complete_events.contains(&e.code))
                {
                    complete_seen = true;
                    debug!(code = %event.code, "capture complete");
                }
            }

            let done = match &self.strategy.completion {
                CompletionSignal::Events => {
                    let have_object = match self.strategy.location {
                        // A fixed staging handle needs no announcement;
                        // either event proves the image landed.
                        ObjectLocation::SdramHandle { .. } => object_seen || complete_seen,
                        _ => object_seen,
                    };
                    have_object && (!need_complete || complete_seen)
                }
                CompletionSignal::PropertyThreshold { property, base } => {
                    object_seen || self.threshold_crossed(session, *property, *base).await?
                }
                CompletionSignal::ListingDiff => {
                    if let Some(baseline) = baseline {
                        let fresh = self.listing(session).await?;
                        announced = fresh.difference(baseline).next().copied();
                        announced.is_some()
                    } else {
                        false
                    }
                }
            };
            if done {
                return Ok(announced);
            }

            if !backoff.wait().await {
                return Err(PtpError::NoObjectProduced {
                    waited: backoff.elapsed(),
                });
            }
        }
    }

    async fn threshold_crossed<T: Transport>(
        &self,
        session: &mut PtpSession<T>,
        property: DevicePropCode,
        base: u16,
    ) -> Result<bool> {
        match session.prop_value(property, DataTypeCode::UINT16).await {
            Ok(value) => Ok(value.as_u32().unwrap_or(0) > u32::from(base)),
            Err(PtpError::DeviceBusy) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Moves pending device events into the session queue, polling the
    /// vendor channel where the family has no usable interrupt pipe.
    async fn pump_events<T: Transport>(&self, session: &mut PtpSession<T>) -> Result<()> {
        session.poll_events().await?;
        match self.strategy.event_source {
            EventSource::Interrupt => Ok(()),
            EventSource::PolledStack { op } => {
                let bytes = match session.read_data(op, &[]).await {
                    Ok(bytes) => bytes,
                    Err(PtpError::DeviceBusy) => return Ok(()),
                    Err(err) => return Err(err),
                };
                let endian = session.transport_mut().endian();
                let mut reader = WireReader::new(&bytes, endian);
                let count = reader.u16("event count").unwrap_or(0);
                for _ in 0..count {
                    let Ok(code) = reader.u16("event code") else { break };
                    let Ok(param) = reader.u32("event param") else { break };
                    session.events().push(Event {
                        code: EventCode(code),
                        transaction_id: 0,
                        params: vec![param],
                    });
                }
                Ok(())
            }
            EventSource::PolledChanges { op } => {
                let bytes = match session.read_data(op, &[]).await {
                    Ok(bytes) => bytes,
                    Err(PtpError::DeviceBusy) => return Ok(()),
                    Err(err) => return Err(err),
                };
                let endian = session.transport_mut().endian();
                for record in decode_changes(&bytes, endian) {
                    match record {
                        ChangeRecord::ObjectAdded { handle, .. }
                        | ChangeRecord::RequestObjectTransfer { handle } => {
                            session.events().push(Event {
                                code: EventCode::OBJECT_ADDED,
                                transaction_id: 0,
                                params: vec![handle.0],
                            });
                        }
                        ChangeRecord::ObjectRemoved { handle } => {
                            session.object_cache().remove(handle);
                        }
                        ChangeRecord::FocusResult(result) if result != 0 => {
                            debug!(result, "autofocus reported failure");
                        }
                        other => trace!(?other, "change record ignored"),
                    }
                }
                Ok(())
            }
        }
    }

    fn resolve_handle(
        &self,
        announced: Option<ObjectHandle>,
        backoff: &Backoff,
    ) -> Result<ObjectHandle> {
        match self.strategy.location {
            ObjectLocation::EventParam => announced.ok_or(PtpError::NoObjectProduced {
                waited: backoff.elapsed(),
            }),
            ObjectLocation::SdramHandle { handle, .. } => Ok(announced.unwrap_or(handle)),
            ObjectLocation::PendingFetch { handle } => Ok(announced.unwrap_or(handle)),
        }
    }

    async fn download<T: Transport>(
        &mut self,
        session: &mut PtpSession<T>,
        ctx: &mut TransferContext,
        backoff: &mut Backoff,
        handle: ObjectHandle,
    ) -> Result<CaptureOutcome> {
        let retry_not_ready = matches!(self.strategy.location, ObjectLocation::PendingFetch { .. });
        let info = session.object_info(handle).await.ok();
        loop {
            match session.get_object_with(handle, ctx).await {
                Ok(data) => {
                    return Ok(CaptureOutcome { handle, info, data });
                }
                // Not staged yet: AccessDenied means not ready,
                // InvalidObjectHandle means not created. Both clear up.
                Err(PtpError::AccessDenied | PtpError::InvalidObjectHandle)
                    if retry_not_ready =>
                {
                    if !backoff.wait().await {
                        return Err(PtpError::NoObjectProduced {
                            waited: backoff.elapsed(),
                        });
                    }
                }
                Err(err) => return Err(self.refine(err)),
            }
        }
    }

    /// Best-effort staging cleanup; failure is logged, never surfaced,
    /// since the object is already downloaded.
    async fn cleanup<T: Transport>(&self, session: &mut PtpSession<T>, handle: ObjectHandle) {
        let ObjectLocation::SdramHandle {
            delete_after: true, ..
        } = self.strategy.location
        else {
            return;
        };
        let result = match self.strategy.cleanup_op {
            Some(op) => session.command(op, &[]).await.map(|_| ()),
            None => session.delete_object(handle).await,
        };
        if let Err(err) = result {
            warn!(%handle, %err, "failed to discard the staged capture");
        }
    }
}
