//! Vendor fixups for the device descriptor.
//!
//! Plenty of firmware supports operations and properties it does not
//! advertise in `GetDeviceInfo`, usually the vendor remote-control
//! surface. The session merges the known-hidden codes into its cached
//! descriptor right after fetching it, so the advertised-set check in
//! the transaction path lets them through. Merges only ever append;
//! nothing a device did advertise is touched.

use tracing::debug;

use crate::codec::DeviceInfo;
use crate::proto::vendor::{canon, nikon, sony};
use crate::proto::VendorExtensionId;

/// Appends the vendor codes the firmware hides from `GetDeviceInfo`.
pub(crate) fn apply_device_fixups(info: &mut DeviceInfo) {
    let before = (info.operations.len(), info.device_properties.len());

    match info.vendor_extension_id {
        VendorExtensionId::NIKON => fixup_nikon(info),
        VendorExtensionId::CANON => fixup_canon(info),
        VendorExtensionId::SONY => fixup_sony(info),
        _ => {}
    }

    let added_ops = info.operations.len() - before.0;
    let added_props = info.device_properties.len() - before.1;
    if added_ops > 0 || added_props > 0 {
        debug!(
            vendor = %info.vendor_extension_id,
            added_ops,
            added_props,
            "merged vendor-hidden codes into device info"
        );
    }
}

/// Nikon bodies that answer the SDRAM capture opcodes rarely list the
/// event-poll and readiness helpers that make them usable.
fn fixup_nikon(info: &mut DeviceInfo) {
    if info.supports_operation(nikon::CAPTURE) || info.supports_operation(nikon::AF_CAPTURE_SDRAM)
    {
        info.add_operations(&[
            nikon::CHECK_EVENT,
            nikon::DEVICE_READY,
            nikon::DEL_IMAGE_SDRAM,
        ]);
    }
    if info.supports_operation(nikon::START_LIVE_VIEW) {
        info.add_properties(&[nikon::DPC_LIVE_VIEW_PROHIBIT, nikon::DPC_LIVE_VIEW_STATUS]);
    }
}

/// EOS bodies advertise the remote-mode entry point but hide the
/// shutter-depth and autofocus opcodes behind it.
fn fixup_canon(info: &mut DeviceInfo) {
    if info.supports_operation(canon::eos::SET_REMOTE_MODE) {
        info.add_operations(&[
            canon::eos::SET_EVENT_MODE,
            canon::eos::GET_EVENT,
            canon::eos::REMOTE_RELEASE,
            canon::eos::REMOTE_RELEASE_ON,
            canon::eos::REMOTE_RELEASE_OFF,
            canon::eos::DO_AF,
            canon::eos::AF_CANCEL,
        ]);
    }
}

/// The Sony control properties only show up in the vendor descriptor
/// fetched over `GetSDIOExtDeviceInfo`, never in the standard one.
fn fixup_sony(info: &mut DeviceInfo) {
    if info.supports_operation(sony::SDIO_CONNECT) {
        info.add_operations(&[
            sony::GET_SDIO_EXT_DEVICE_INFO,
            sony::SET_CONTROL_DEVICE_A,
            sony::SET_CONTROL_DEVICE_B,
            sony::GET_ALL_DEVICE_PROP_DATA,
        ]);
        info.add_properties(&[
            sony::DPC_OBJECT_IN_MEMORY,
            sony::DPC_AUTO_FOCUS,
            sony::DPC_CAPTURE,
        ]);
    }
}
