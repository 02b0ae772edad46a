//! Vendor-allocated protocol codes.
//!
//! Only the codes the capture and liveview strategies actually drive are
//! listed; the vendor spaces are far larger. Values are taken from
//! observed device traffic and change between camera generations, so
//! treat additions here as quirk data rather than protocol law.

/// Nikon extension codes.
pub mod nikon {
    use crate::proto::{DevicePropCode, EventCode, ObjectHandle, OpCode, ResponseCode};

    /// Capture to SDRAM without autofocus.
    pub const CAPTURE: OpCode = OpCode(0x90C0);
    /// Drive the autofocus once.
    pub const AF_DRIVE: OpCode = OpCode(0x90C1);
    /// Delete the image staged in SDRAM.
    pub const DEL_IMAGE_SDRAM: OpCode = OpCode(0x90C3);
    /// Poll the vendor event stack.
    pub const CHECK_EVENT: OpCode = OpCode(0x90C7);
    /// Returns OK once the device can accept the next operation.
    pub const DEVICE_READY: OpCode = OpCode(0x90C8);
    /// Autofocus then capture to SDRAM.
    pub const AF_CAPTURE_SDRAM: OpCode = OpCode(0x90CB);
    /// Begin liveview streaming.
    pub const START_LIVE_VIEW: OpCode = OpCode(0x9201);
    /// End liveview streaming.
    pub const END_LIVE_VIEW: OpCode = OpCode(0x9202);
    /// Fetch the current liveview frame.
    pub const GET_LIVE_VIEW_IMG: OpCode = OpCode(0x9203);

    /// An object landed in SDRAM; param 1 is the staging handle.
    pub const EC_OBJECT_ADDED_IN_SDRAM: EventCode = EventCode(0xC101);
    /// SDRAM capture sequence finished.
    pub const EC_CAPTURE_COMPLETE_REC_IN_SDRAM: EventCode = EventCode(0xC102);

    /// Liveview prohibition bitmask; zero means liveview may start.
    pub const DPC_LIVE_VIEW_PROHIBIT: DevicePropCode = DevicePropCode(0xD1A4);
    /// Liveview drive status.
    pub const DPC_LIVE_VIEW_STATUS: DevicePropCode = DevicePropCode(0xD1A2);

    /// Well-known staging handle for the image captured to SDRAM.
    pub const SDRAM_HANDLE: ObjectHandle = ObjectHandle(0xFFFF_0001);

    /// Autofocus could not lock before the shutter fired.
    pub const RC_OUT_OF_FOCUS: ResponseCode = ResponseCode(0xA002);
    /// Shutter is in bulb mode; timed capture refused.
    pub const RC_SHUTTER_SPEED_BULB: ResponseCode = ResponseCode(0xA008);
    /// Mirror-up sequence in progress; capture refused.
    pub const RC_MIRROR_UP_SEQUENCE: ResponseCode = ResponseCode(0xA009);
    /// Bulb release already held down.
    pub const RC_BULB_RELEASE_BUSY: ResponseCode = ResponseCode(0xA200);
}

/// Canon extension codes (PowerShot generation).
pub mod canon {
    use crate::proto::{EventCode, OpCode};

    /// Size of a named object.
    pub const GET_OBJECT_SIZE: OpCode = OpCode(0x9001);
    /// Enter remote shooting mode.
    pub const START_SHOOTING_MODE: OpCode = OpCode(0x9008);
    /// Leave remote shooting mode.
    pub const END_SHOOTING_MODE: OpCode = OpCode(0x9009);
    /// Turn the viewfinder stream on.
    pub const VIEWFINDER_ON: OpCode = OpCode(0x900B);
    /// Turn the viewfinder stream off.
    pub const VIEWFINDER_OFF: OpCode = OpCode(0x900C);
    /// Commit property changes made while shooting.
    pub const REFLECT_CHANGES: OpCode = OpCode(0x900D);
    /// Pop one event from the device FIFO via a data phase.
    pub const CHECK_EVENT: OpCode = OpCode(0x9013);
    /// Half-press: lock focus and exposure.
    pub const FOCUS_LOCK: OpCode = OpCode(0x9014);
    /// Release the half-press lock.
    pub const FOCUS_UNLOCK: OpCode = OpCode(0x9015);
    /// Capture to camera memory; the object is announced by event.
    pub const INITIATE_CAPTURE_IN_MEMORY: OpCode = OpCode(0x901A);
    /// Ranged read of a named object.
    pub const GET_PARTIAL_OBJECT: OpCode = OpCode(0x901B);
    /// Fetch the current 320x240 JPEG viewfinder frame.
    pub const GET_VIEWFINDER_IMAGE: OpCode = OpCode(0x901D);
    /// List property codes changed since the last call.
    pub const GET_CHANGES: OpCode = OpCode(0x9020);
    /// List folder entries (fixed 28-byte records).
    pub const GET_FOLDER_ENTRIES: OpCode = OpCode(0x9021);

    /// Device info changed.
    pub const EC_DEVICE_INFO_CHANGED: EventCode = EventCode(0xC008);
    /// Capture finished; param 1 names the staged object.
    pub const EC_REQUEST_OBJECT_TRANSFER: EventCode = EventCode(0xC009);
    /// Mode dial moved.
    pub const EC_CAMERA_MODE_CHANGED: EventCode = EventCode(0xC00C);

    /// Canon EOS generation.
    pub mod eos {
        use crate::proto::{OpCode, ResponseCode};

        /// Put the device into PC remote mode.
        pub const SET_REMOTE_MODE: OpCode = OpCode(0x9114);
        /// Select which events the device reports.
        pub const SET_EVENT_MODE: OpCode = OpCode(0x9115);
        /// Fetch the accumulated change-record blob.
        pub const GET_EVENT: OpCode = OpCode(0x9116);
        /// Trigger the shutter.
        pub const REMOTE_RELEASE: OpCode = OpCode(0x910F);
        /// Press the shutter button to the given depth.
        pub const REMOTE_RELEASE_ON: OpCode = OpCode(0x9128);
        /// Release the shutter button.
        pub const REMOTE_RELEASE_OFF: OpCode = OpCode(0x9129);
        /// Fetch a liveview frame.
        pub const GET_VIEW_FINDER_DATA: OpCode = OpCode(0x9153);
        /// Drive autofocus.
        pub const DO_AF: OpCode = OpCode(0x9154);
        /// Cancel a running autofocus.
        pub const AF_CANCEL: OpCode = OpCode(0x9160);

        /// Device refused the operation in its current mode.
        pub const RC_OPERATION_REFUSED: ResponseCode = ResponseCode(0xA005);
        /// Lens cover closed; capture impossible.
        pub const RC_LENS_COVER_CLOSED: ResponseCode = ResponseCode(0xA006);
        /// The staged object is not ready to transfer yet.
        pub const RC_OBJECT_NOT_READY: ResponseCode = ResponseCode(0xA102);
        /// Internal buffers exhausted.
        pub const RC_MEMORY_STATUS_NOT_READY: ResponseCode = ResponseCode(0xA106);

        /// Change-record kinds inside the `GET_EVENT` blob.
        pub mod changes {
            /// A new object exists (extended record with object info).
            pub const OBJECT_ADDED: u32 = 0xC181;
            /// An object disappeared.
            pub const OBJECT_REMOVED: u32 = 0xC182;
            /// Device asks the host to fetch an object.
            pub const REQUEST_OBJECT_TRANSFER: u32 = 0xC186;
            /// Object metadata changed.
            pub const OBJECT_INFO_CHANGED: u32 = 0xC187;
            /// A property changed value.
            pub const PROP_VALUE_CHANGED: u32 = 0xC189;
            /// Overall camera status (busy/idle) changed.
            pub const CAMERA_STATUS_CHANGED: u32 = 0xC18B;
            /// Autofocus result report.
            pub const AF_RESULT: u32 = 0xC1B3;
        }
    }
}

/// Sony extension codes.
pub mod sony {
    use crate::proto::{DevicePropCode, EventCode, OpCode};

    /// Vendor handshake, stage given in param 1.
    pub const SDIO_CONNECT: OpCode = OpCode(0x9201);
    /// Vendor device descriptor.
    pub const GET_SDIO_EXT_DEVICE_INFO: OpCode = OpCode(0x9202);
    /// Set a control property (absolute value).
    pub const SET_CONTROL_DEVICE_A: OpCode = OpCode(0x9205);
    /// Set a control property (button-style up/down).
    pub const SET_CONTROL_DEVICE_B: OpCode = OpCode(0x9207);
    /// Snapshot of all property descriptors.
    pub const GET_ALL_DEVICE_PROP_DATA: OpCode = OpCode(0x9209);

    /// A new object is retrievable; param 1 is the handle.
    pub const EC_OBJECT_ADDED: EventCode = EventCode(0xC201);
    /// An object disappeared.
    pub const EC_OBJECT_REMOVED: EventCode = EventCode(0xC202);
    /// A property changed value.
    pub const EC_PROPERTY_CHANGED: EventCode = EventCode(0xC203);

    /// Count of capture objects still staged in camera memory.
    /// Values of `0x8000 + n` report n pending objects.
    pub const DPC_OBJECT_IN_MEMORY: DevicePropCode = DevicePropCode(0xD215);
    /// Half-press control: 1 = up, 2 = down.
    pub const DPC_AUTO_FOCUS: DevicePropCode = DevicePropCode(0xD2C1);
    /// Full-press control: 1 = up, 2 = down.
    pub const DPC_CAPTURE: DevicePropCode = DevicePropCode(0xD2C2);

    /// Threshold of [`DPC_OBJECT_IN_MEMORY`] above which objects are pending.
    pub const OBJECT_IN_MEMORY_BASE: u16 = 0x8000;

    /// Pseudo-handle used to fetch the most recent in-memory capture.
    pub const PENDING_OBJECT_HANDLE: u32 = 0xFFFF_C001;
}
