//! Per-vendor capture and liveview capability objects.
//!
//! The sequencer runs one state machine; everything vendor-specific is
//! data on the strategy it is handed: how to trigger, where completion
//! is announced, where the object lands, and which vendor response
//! codes mean which capture fault. Strategies are selected once at
//! session open from the vendor-extension id and the advertised
//! operation set, never consulted again.

use std::time::Duration;

use tracing::debug;

use crate::codec::DeviceInfo;
use crate::proto::vendor::{canon, nikon, sony};
use crate::proto::{DevicePropCode, EventCode, ObjectHandle, OpCode, ResponseCode, VendorExtensionId};
use crate::types::{CaptureTarget, PtpConfig, Quirk};

/// Button-style property value for "pressed".
pub const PRESS_DOWN: u16 = 2;
/// Button-style property value for "released".
pub const PRESS_UP: u16 = 1;

/// Extra completion-wait budget granted to bodies that report events
/// long after the exposure ends.
const SLOW_TURNAROUND_WAIT: Duration = Duration::from_secs(10);

/// Long exposures hold the shutter well past the configured capture
/// wait; these bodies report `EXPOSURE_TIME` in 0.1 ms units, so a
/// 30 s exposure reads 300 000 and earns half a minute of extra budget.
const NIKON_EXPOSURE_WAITS: &[(u32, Duration)] = &[
    (10_000, Duration::from_secs(2)),
    (50_000, Duration::from_secs(8)),
    (100_000, Duration::from_secs(15)),
    (300_000, Duration::from_secs(35)),
];

/// How a capture is triggered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerMethod {
    /// A single operation fires the shutter.
    Opcode {
        /// The trigger operation.
        op: OpCode,
        /// Its parameters.
        params: Vec<u32>,
    },
    /// Half-press then full-press property writes, with a focus wait in
    /// between, each released afterwards.
    PropertyPress {
        /// The vendor property-write operation to use.
        op: OpCode,
        /// Half-press (focus) control property.
        half: DevicePropCode,
        /// Full-press (shutter) control property.
        full: DevicePropCode,
    },
}

/// How the device announces that the shot finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionSignal {
    /// Object-added and capture-complete events, in either order.
    Events,
    /// No reliable events: diff the object-handle listing taken before
    /// the trigger against fresh listings until a new handle appears.
    ListingDiff,
    /// A counter property crosses its base value while objects are
    /// staged in memory.
    PropertyThreshold {
        /// The counter property.
        property: DevicePropCode,
        /// Values of `base + n` report n staged objects.
        base: u16,
    },
}

/// Where the captured object can be fetched from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectLocation {
    /// Handle arrives as the first object-added event parameter.
    EventParam,
    /// Fixed staging handle in device volatile memory.
    SdramHandle {
        /// The staging handle.
        handle: ObjectHandle,
        /// Delete the staged image after downloading it.
        delete_after: bool,
    },
    /// Fixed pseudo-handle that only resolves once the object is ready;
    /// fetches retry on not-ready response codes.
    PendingFetch {
        /// The pseudo-handle.
        handle: ObjectHandle,
    },
}

/// Where device events come from while a capture settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSource {
    /// The transport's own event channel.
    Interrupt,
    /// Poll an opcode whose data phase is a u16 count followed by
    /// `(u16 event code, u32 param)` records.
    PolledStack {
        /// The poll operation.
        op: OpCode,
    },
    /// Poll an opcode whose data phase is a sized change-record blob.
    PolledChanges {
        /// The poll operation.
        op: OpCode,
    },
}

/// Capture fault classes the error table maps vendor codes onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureFault {
    /// Autofocus failed to lock.
    Focus,
    /// Mirror-up sequence blocks the shutter.
    MirrorUp,
    /// Device buffers exhausted.
    Memory,
    /// Transient refusal; retry after backoff.
    Busy,
}

/// Vendor timing constants; quirk data, not protocol law.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CaptureTuning {
    /// Exposure-time thresholds (in the `EXPOSURE_TIME` encoding,
    /// 0.1 ms units) paired with the extra completion budget a shot at
    /// least that long needs. Ascending; empty means exposure time
    /// never widens the wait.
    pub exposure_wait: &'static [(u32, Duration)],
    /// Added to the completion-wait budget on top of the configured
    /// capture timeout.
    pub extra_wait: Duration,
}

impl CaptureTuning {
    /// The extra budget `exposure_time` earns: the wait of the largest
    /// threshold it reaches, zero below the first entry.
    #[must_use]
    pub fn exposure_budget(&self, exposure_time: u32) -> Duration {
        self.exposure_wait
            .iter()
            .take_while(|&&(threshold, _)| exposure_time >= threshold)
            .last()
            .map_or(Duration::ZERO, |&(_, wait)| wait)
    }
}

/// Everything the sequencer needs to drive one vendor family.
#[derive(Debug, Clone)]
pub struct CaptureStrategy {
    /// Family name, for logs.
    pub name: &'static str,
    /// How to fire the shutter.
    pub trigger: TriggerMethod,
    /// How completion is announced.
    pub completion: CompletionSignal,
    /// Where the object lands.
    pub location: ObjectLocation,
    /// Where events come from.
    pub event_source: EventSource,
    /// Event codes that carry the new object (standard or vendor).
    pub object_added_events: Vec<EventCode>,
    /// Event codes that mark the sequence finished; empty means the
    /// object-added event alone completes the shot.
    pub complete_events: Vec<EventCode>,
    /// Standalone autofocus operation, run before the trigger when the
    /// configuration asks for it.
    pub autofocus_op: Option<OpCode>,
    /// Readiness poll answered with `DeviceBusy` until the device can
    /// take the next command.
    pub ready_op: Option<OpCode>,
    /// Operation that discards the staged object after download, where
    /// plain `DeleteObject` does not apply.
    pub cleanup_op: Option<OpCode>,
    /// Vendor response codes and the faults they mean.
    pub error_table: &'static [(ResponseCode, CaptureFault)],
    /// Timing constants.
    pub tuning: CaptureTuning,
}

const STANDARD_ERRORS: &[(ResponseCode, CaptureFault)] = &[];

const NIKON_ERRORS: &[(ResponseCode, CaptureFault)] = &[
    (nikon::RC_OUT_OF_FOCUS, CaptureFault::Focus),
    (nikon::RC_MIRROR_UP_SEQUENCE, CaptureFault::MirrorUp),
    (nikon::RC_SHUTTER_SPEED_BULB, CaptureFault::Busy),
    (nikon::RC_BULB_RELEASE_BUSY, CaptureFault::Busy),
];

const CANON_EOS_ERRORS: &[(ResponseCode, CaptureFault)] = &[
    (canon::eos::RC_OPERATION_REFUSED, CaptureFault::Busy),
    (canon::eos::RC_LENS_COVER_CLOSED, CaptureFault::Focus),
    (canon::eos::RC_OBJECT_NOT_READY, CaptureFault::Busy),
    (canon::eos::RC_MEMORY_STATUS_NOT_READY, CaptureFault::Memory),
];

impl CaptureStrategy {
    /// Picks the family for a connected device.
    #[must_use]
    pub fn select(info: &DeviceInfo, config: &PtpConfig) -> Self {
        let strategy = match info.vendor_extension_id {
            VendorExtensionId::NIKON => Self::nikon(info, config),
            VendorExtensionId::CANON => Self::canon_eos(info),
            VendorExtensionId::SONY => Self::sony(info),
            _ => None,
        }
        .unwrap_or_else(|| Self::standard(info));
        debug!(family = strategy.name, "capture strategy selected");
        strategy
    }

    /// The fault a vendor response code maps onto, if the family lists it.
    #[must_use]
    pub fn classify(&self, code: ResponseCode) -> Option<CaptureFault> {
        self.error_table
            .iter()
            .find(|(rc, _)| *rc == code)
            .map(|(_, fault)| *fault)
    }

    fn standard(info: &DeviceInfo) -> Self {
        let completion = if info.supports_event(EventCode::OBJECT_ADDED)
            || info.supports_event(EventCode::CAPTURE_COMPLETE)
        {
            CompletionSignal::Events
        } else {
            // No usable events advertised: fall back to listing diffs.
            CompletionSignal::ListingDiff
        };
        Self {
            name: "standard",
            trigger: TriggerMethod::Opcode {
                op: OpCode::INITIATE_CAPTURE,
                params: vec![0, 0],
            },
            completion,
            location: ObjectLocation::EventParam,
            event_source: EventSource::Interrupt,
            object_added_events: vec![EventCode::OBJECT_ADDED],
            complete_events: vec![EventCode::CAPTURE_COMPLETE],
            autofocus_op: None,
            ready_op: None,
            cleanup_op: None,
            error_table: STANDARD_ERRORS,
            tuning: CaptureTuning::default(),
        }
    }

    fn nikon(info: &DeviceInfo, config: &PtpConfig) -> Option<Self> {
        if config.capture_target != CaptureTarget::Sdram {
            return None;
        }
        let trigger_op = if config.autofocus && info.supports_operation(nikon::AF_CAPTURE_SDRAM) {
            nikon::AF_CAPTURE_SDRAM
        } else if info.supports_operation(nikon::CAPTURE) {
            nikon::CAPTURE
        } else {
            return None;
        };
        let extra_wait = if config.quirks.contains(Quirk::SlowEventTurnaround) {
            SLOW_TURNAROUND_WAIT
        } else {
            Duration::ZERO
        };
        let event_source = if config.quirks.contains(Quirk::NoEventInterrupt)
            && info.supports_operation(nikon::CHECK_EVENT)
        {
            EventSource::PolledStack {
                op: nikon::CHECK_EVENT,
            }
        } else {
            EventSource::Interrupt
        };
        Some(Self {
            name: "nikon-sdram",
            trigger: TriggerMethod::Opcode {
                op: trigger_op,
                // The wildcard asks for SDRAM staging.
                params: vec![0xFFFF_FFFF, 0],
            },
            completion: CompletionSignal::Events,
            location: ObjectLocation::SdramHandle {
                handle: nikon::SDRAM_HANDLE,
                delete_after: config.quirks.contains(Quirk::DeleteSdramAfterDownload)
                    && info.supports_operation(nikon::DEL_IMAGE_SDRAM),
            },
            event_source,
            object_added_events: vec![
                nikon::EC_OBJECT_ADDED_IN_SDRAM,
                EventCode::OBJECT_ADDED,
            ],
            complete_events: vec![
                nikon::EC_CAPTURE_COMPLETE_REC_IN_SDRAM,
                EventCode::CAPTURE_COMPLETE,
            ],
            autofocus_op: None,
            ready_op: info
                .supports_operation(nikon::DEVICE_READY)
                .then_some(nikon::DEVICE_READY),
            cleanup_op: info
                .supports_operation(nikon::DEL_IMAGE_SDRAM)
                .then_some(nikon::DEL_IMAGE_SDRAM),
            error_table: NIKON_ERRORS,
            tuning: CaptureTuning {
                exposure_wait: NIKON_EXPOSURE_WAITS,
                extra_wait,
            },
        })
    }

    fn canon_eos(info: &DeviceInfo) -> Option<Self> {
        if !info.supports_operation(canon::eos::REMOTE_RELEASE) {
            return None;
        }
        Some(Self {
            name: "canon-eos",
            trigger: TriggerMethod::Opcode {
                op: canon::eos::REMOTE_RELEASE,
                params: vec![],
            },
            // The change blob only ever reports the object; there is no
            // separate capture-complete record.
            completion: CompletionSignal::Events,
            location: ObjectLocation::EventParam,
            event_source: EventSource::PolledChanges {
                op: canon::eos::GET_EVENT,
            },
            object_added_events: vec![EventCode::OBJECT_ADDED],
            complete_events: vec![],
            autofocus_op: info
                .supports_operation(canon::eos::DO_AF)
                .then_some(canon::eos::DO_AF),
            ready_op: None,
            cleanup_op: None,
            error_table: CANON_EOS_ERRORS,
            tuning: CaptureTuning::default(),
        })
    }

    fn sony(info: &DeviceInfo) -> Option<Self> {
        if !info.supports_operation(sony::SET_CONTROL_DEVICE_B) {
            return None;
        }
        Some(Self {
            name: "sony",
            trigger: TriggerMethod::PropertyPress {
                op: sony::SET_CONTROL_DEVICE_B,
                half: sony::DPC_AUTO_FOCUS,
                full: sony::DPC_CAPTURE,
            },
            completion: CompletionSignal::PropertyThreshold {
                property: sony::DPC_OBJECT_IN_MEMORY,
                base: sony::OBJECT_IN_MEMORY_BASE,
            },
            location: ObjectLocation::PendingFetch {
                handle: ObjectHandle(sony::PENDING_OBJECT_HANDLE),
            },
            event_source: EventSource::Interrupt,
            object_added_events: vec![sony::EC_OBJECT_ADDED, EventCode::OBJECT_ADDED],
            complete_events: vec![],
            autofocus_op: None,
            ready_op: None,
            cleanup_op: None,
            error_table: STANDARD_ERRORS,
            tuning: CaptureTuning::default(),
        })
    }
}

/// Liveview capability object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveviewStrategy {
    /// Family name, for logs.
    pub name: &'static str,
    /// Begin streaming; some families stream implicitly.
    pub start_op: Option<OpCode>,
    /// Fetch one frame.
    pub frame_op: OpCode,
    /// Parameters of the frame fetch.
    pub frame_params: Vec<u32>,
    /// End streaming.
    pub stop_op: Option<OpCode>,
    /// Prohibition bitmask property; non-zero means liveview must not
    /// start yet.
    pub prohibit_property: Option<DevicePropCode>,
}

impl LiveviewStrategy {
    /// Picks the liveview family, or `None` when the device cannot
    /// stream frames.
    #[must_use]
    pub fn select(info: &DeviceInfo) -> Option<Self> {
        match info.vendor_extension_id {
            VendorExtensionId::NIKON if info.supports_operation(nikon::START_LIVE_VIEW) => {
                Some(Self {
                    name: "nikon",
                    start_op: Some(nikon::START_LIVE_VIEW),
                    frame_op: nikon::GET_LIVE_VIEW_IMG,
                    frame_params: vec![],
                    stop_op: Some(nikon::END_LIVE_VIEW),
                    prohibit_property: info
                        .supports_property(nikon::DPC_LIVE_VIEW_PROHIBIT)
                        .then_some(nikon::DPC_LIVE_VIEW_PROHIBIT),
                })
            }
            VendorExtensionId::CANON
                if info.supports_operation(canon::eos::GET_VIEW_FINDER_DATA) =>
            {
                Some(Self {
                    name: "canon-eos",
                    start_op: None,
                    frame_op: canon::eos::GET_VIEW_FINDER_DATA,
                    frame_params: vec![0x0010_0000],
                    stop_op: None,
                    prohibit_property: None,
                })
            }
            VendorExtensionId::CANON if info.supports_operation(canon::VIEWFINDER_ON) => {
                Some(Self {
                    name: "canon",
                    start_op: Some(canon::VIEWFINDER_ON),
                    frame_op: canon::GET_VIEWFINDER_IMAGE,
                    frame_params: vec![],
                    stop_op: Some(canon::VIEWFINDER_OFF),
                    prohibit_property: None,
                })
            }
            _ => None,
        }
    }
}
