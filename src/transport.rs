// USB transport layer
//
// The dispatcher only needs two things from the wire: a way to push a raw
// frame with the device's configured spacing, and a reset hook for the
// retry harness. Everything about frame layout belongs to the device
// operations, not here.

use std::ffi::CString;
use std::thread;
use std::time::Duration;

use hidapi::{HidApi, HidDevice};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors from transport operations.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Device disconnected")]
    Disconnected,

    #[error("Communication timeout")]
    Timeout,

    #[error("HID error: {0}")]
    Hid(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<hidapi::HidError> for TransportError {
    fn from(e: hidapi::HidError) -> Self {
        TransportError::Hid(e.to_string())
    }
}

/// Raw USB access for one device.
pub trait UsbTransport: Send {
    /// Push one raw output frame, then hold off for `delay_ms` so the
    /// device's controller is not overwhelmed.
    fn send_frame(&mut self, frame: &[u8], delay_ms: u8) -> Result<(), TransportError>;

    /// Attempt to recover the device after a failed transaction.
    ///
    /// A successful return means the device is usable again and the failed
    /// operation may be retried. Failure here is fatal to the device.
    fn try_reset(&mut self) -> Result<(), TransportError>;
}

/// hidapi-backed transport for a real device node.
pub struct HidTransport {
    api: HidApi,
    path: CString,
    device: HidDevice,
}

impl HidTransport {
    pub fn open(path: &str) -> Result<Self, TransportError> {
        let api = HidApi::new()?;
        let path = CString::new(path)
            .map_err(|_| TransportError::DeviceNotFound(path.to_string()))?;
        let device = api.open_path(&path)?;
        Ok(Self { api, path, device })
    }
}

impl UsbTransport for HidTransport {
    fn send_frame(&mut self, frame: &[u8], delay_ms: u8) -> Result<(), TransportError> {
        self.device.write(frame)?;
        thread::sleep(Duration::from_millis(delay_ms as u64));
        Ok(())
    }

    fn try_reset(&mut self) -> Result<(), TransportError> {
        // hidraw offers no port-level reset; closing and reopening the node
        // re-initializes the interface, which is what the hardware needs
        // after a stalled transaction.
        warn!("resetting device at {:?}", self.path);
        self.api.refresh_devices()?;
        match self.api.open_path(&self.path) {
            Ok(device) => {
                self.device = device;
                debug!("reopened {:?}", self.path);
                Ok(())
            }
            Err(e) => {
                warn!("reopen failed: {e}");
                Err(TransportError::Disconnected)
            }
        }
    }
}

/// Transport for the virtual device: frames go nowhere, resets always
/// succeed.
#[derive(Debug, Default)]
pub struct NullTransport {
    pub frames_sent: usize,
    pub resets: usize,
}

impl UsbTransport for NullTransport {
    fn send_frame(&mut self, _frame: &[u8], _delay_ms: u8) -> Result<(), TransportError> {
        self.frames_sent += 1;
        Ok(())
    }

    fn try_reset(&mut self) -> Result<(), TransportError> {
        self.resets += 1;
        Ok(())
    }
}
