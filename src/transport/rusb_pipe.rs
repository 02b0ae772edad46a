//! rusb-backed [`UsbPipe`].
//!
//! libusb transfers are blocking, so every call hops onto the blocking
//! pool. The handle itself is `Sync`; interface claiming is the only
//! operation needing exclusive access and happens before the handle is
//! shared.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rusb::{Context, Device, DeviceHandle, Direction, TransferType, UsbContext};
use tokio::task;
use tracing::{debug, warn};

use crate::error::{PtpError, Result};
use crate::types::{Quirk, QuirkSet};

use super::usb::UsbPipe;

/// USB still-image class triple (PIMA 15740).
const CLASS_STILL_IMAGE: u8 = 6;

fn map_usb_err(err: rusb::Error, timeout: Duration) -> PtpError {
    match err {
        rusb::Error::Timeout => PtpError::Timeout { duration: timeout },
        rusb::Error::Pipe => PtpError::EndpointStalled,
        rusb::Error::NoDevice => PtpError::Disconnected,
        other => PtpError::Io(io::Error::other(other)),
    }
}

#[derive(Debug, Clone, Copy)]
struct Endpoints {
    interface: u8,
    bulk_in: u8,
    bulk_out: u8,
    interrupt_in: u8,
    max_packet: usize,
}

/// A still-image interface found on the bus, not yet claimed.
pub struct PtpDeviceCandidate {
    device: Device<Context>,
    /// USB vendor id.
    pub vendor_id: u16,
    /// USB product id.
    pub product_id: u16,
    /// Bus the device sits on.
    pub bus_number: u8,
    /// Device address on that bus.
    pub address: u8,
    endpoints: Endpoints,
}

impl std::fmt::Debug for PtpDeviceCandidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PtpDeviceCandidate")
            .field("vendor_id", &format_args!("{:#06x}", self.vendor_id))
            .field("product_id", &format_args!("{:#06x}", self.product_id))
            .field("bus_number", &self.bus_number)
            .field("address", &self.address)
            .finish()
    }
}

/// Scans the bus for devices exposing a still-image interface.
///
/// # Errors
///
/// Fails when the USB context cannot be created or the bus cannot be
/// enumerated. Devices whose descriptors cannot be read are skipped.
pub fn list_devices() -> Result<Vec<PtpDeviceCandidate>> {
    let context = Context::new().map_err(|e| PtpError::Io(io::Error::other(e)))?;
    let devices = context
        .devices()
        .map_err(|e| PtpError::Io(io::Error::other(e)))?;

    let mut found = Vec::new();
    for device in devices.iter() {
        let descriptor = match device.device_descriptor() {
            Ok(descriptor) => descriptor,
            Err(err) => {
                debug!("skipping device with unreadable descriptor: {err}");
                continue;
            }
        };
        let Some(endpoints) = find_still_image_interface(&device) else {
            continue;
        };
        found.push(PtpDeviceCandidate {
            vendor_id: descriptor.vendor_id(),
            product_id: descriptor.product_id(),
            bus_number: device.bus_number(),
            address: device.address(),
            device,
            endpoints,
        });
    }
    Ok(found)
}

fn find_still_image_interface(device: &Device<Context>) -> Option<Endpoints> {
    let config = device.config_descriptor(0).ok()?;
    for interface in config.interfaces() {
        for desc in interface.descriptors() {
            if desc.class_code() != CLASS_STILL_IMAGE {
                continue;
            }
            let mut bulk_in = None;
            let mut bulk_out = None;
            let mut interrupt_in = None;
            let mut max_packet = 0usize;
            for endpoint in desc.endpoint_descriptors() {
                match (endpoint.transfer_type(), endpoint.direction()) {
                    (TransferType::Bulk, Direction::In) => {
                        bulk_in = Some(endpoint.address());
                        max_packet = usize::from(endpoint.max_packet_size());
                    }
                    (TransferType::Bulk, Direction::Out) => {
                        bulk_out = Some(endpoint.address());
                    }
                    (TransferType::Interrupt, Direction::In) => {
                        interrupt_in = Some(endpoint.address());
                    }
                    _ => {}
                }
            }
            if let (Some(bulk_in), Some(bulk_out), Some(interrupt_in)) =
                (bulk_in, bulk_out, interrupt_in)
            {
                return Some(Endpoints {
                    interface: desc.interface_number(),
                    bulk_in,
                    bulk_out,
                    interrupt_in,
                    max_packet,
                });
            }
        }
    }
    None
}

impl PtpDeviceCandidate {
    /// Opens the device and claims its still-image interface.
    ///
    /// # Errors
    ///
    /// Fails when the device cannot be opened (permissions, unplugged)
    /// or the interface cannot be claimed.
    pub fn open(self, quirks: QuirkSet) -> Result<RusbPipe> {
        let mut handle = self
            .device
            .open()
            .map_err(|e| map_usb_err(e, Duration::ZERO))?;
        if let Err(err) = handle.set_auto_detach_kernel_driver(true) {
            debug!("set_auto_detach_kernel_driver failed: {err}");
        }
        handle
            .claim_interface(self.endpoints.interface)
            .map_err(|e| map_usb_err(e, Duration::ZERO))?;
        debug!(
            "claimed interface {} on {:04x}:{:04x}",
            self.endpoints.interface, self.vendor_id, self.product_id
        );
        Ok(RusbPipe {
            handle: Arc::new(handle),
            endpoints: self.endpoints,
            release_on_drop: !quirks.contains(Quirk::NoReleaseInterface),
        })
    }
}

/// Claimed still-image interface speaking through libusb.
pub struct RusbPipe {
    handle: Arc<DeviceHandle<Context>>,
    endpoints: Endpoints,
    release_on_drop: bool,
}

impl RusbPipe {
    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&DeviceHandle<Context>) -> Result<T> + Send + 'static,
    {
        let handle = Arc::clone(&self.handle);
        task::spawn_blocking(move || op(&handle))
            .await
            .map_err(|e| PtpError::Io(io::Error::other(e)))?
    }
}

#[async_trait]
impl UsbPipe for RusbPipe {
    async fn bulk_out(&mut self, data: &[u8], timeout: Duration) -> Result<usize> {
        let endpoint = self.endpoints.bulk_out;
        let data = data.to_vec();
        self.blocking(move |handle| {
            handle
                .write_bulk(endpoint, &data, timeout)
                .map_err(|e| map_usb_err(e, timeout))
        })
        .await
    }

    async fn bulk_in(&mut self, max_len: usize, timeout: Duration) -> Result<Vec<u8>> {
        let endpoint = self.endpoints.bulk_in;
        self.blocking(move |handle| {
            let mut buf = vec![0u8; max_len];
            let n = handle
                .read_bulk(endpoint, &mut buf, timeout)
                .map_err(|e| map_usb_err(e, timeout))?;
            buf.truncate(n);
            Ok(buf)
        })
        .await
    }

    async fn interrupt_in(&mut self, max_len: usize, timeout: Duration) -> Result<Vec<u8>> {
        let endpoint = self.endpoints.interrupt_in;
        self.blocking(move |handle| {
            let mut buf = vec![0u8; max_len];
            let n = handle
                .read_interrupt(endpoint, &mut buf, timeout)
                .map_err(|e| map_usb_err(e, timeout))?;
            buf.truncate(n);
            Ok(buf)
        })
        .await
    }

    async fn control_out(
        &mut self,
        request: u8,
        value: u16,
        index: u16,
        data: &[u8],
        timeout: Duration,
    ) -> Result<()> {
        let request_type =
            rusb::request_type(Direction::Out, rusb::RequestType::Class, rusb::Recipient::Interface);
        let data = data.to_vec();
        self.blocking(move |handle| {
            handle
                .write_control(request_type, request, value, index, &data, timeout)
                .map_err(|e| map_usb_err(e, timeout))?;
            Ok(())
        })
        .await
    }

    async fn control_in(
        &mut self,
        request: u8,
        value: u16,
        index: u16,
        max_len: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>> {
        let request_type =
            rusb::request_type(Direction::In, rusb::RequestType::Class, rusb::Recipient::Interface);
        self.blocking(move |handle| {
            let mut buf = vec![0u8; max_len];
            let n = handle
                .read_control(request_type, request, value, index, &mut buf, timeout)
                .map_err(|e| map_usb_err(e, timeout))?;
            buf.truncate(n);
            Ok(buf)
        })
        .await
    }

    async fn clear_halt_in(&mut self) -> Result<()> {
        let endpoint = self.endpoints.bulk_in;
        self.blocking(move |handle| {
            handle
                .clear_halt(endpoint)
                .map_err(|e| map_usb_err(e, Duration::ZERO))
        })
        .await
    }

    async fn clear_halt_out(&mut self) -> Result<()> {
        let endpoint = self.endpoints.bulk_out;
        self.blocking(move |handle| {
            handle
                .clear_halt(endpoint)
                .map_err(|e| map_usb_err(e, Duration::ZERO))
        })
        .await
    }

    fn max_packet_size(&self) -> usize {
        self.endpoints.max_packet
    }
}

impl Drop for RusbPipe {
    fn drop(&mut self) {
        if !self.release_on_drop {
            return;
        }
        match Arc::get_mut(&mut self.handle) {
            Some(handle) => {
                if let Err(err) = handle.release_interface(self.endpoints.interface) {
                    debug!("release_interface failed: {err}");
                }
            }
            None => warn!("interface not released: handle still shared"),
        }
    }
}
