// rgbkbd - Control daemon for programmable RGB keyboards and mice
// Command dispatcher, device model, and devnode plumbing

pub mod command;
pub mod config;
pub mod device;
pub mod devnode;
pub mod dispatch;
pub mod keymap;
pub mod notify;
pub mod ops;
pub mod profile;
pub mod testdev;
pub mod transport;

pub use command::Command;
pub use config::DaemonConfig;
pub use device::{Device, DeviceKind, DeviceState, Features, PollRate};
pub use devnode::{control_loop, spawn_control_thread, DevNode};
pub use dispatch::{process_line, LineError, HERTZ_LIM_NS};
pub use keymap::Keymap;
pub use notify::NotifyTable;
pub use ops::{DeviceOps, OpResult};
pub use profile::{Binding, MacroEntry, Mode, Profile};
pub use transport::{HidTransport, NullTransport, TransportError, UsbTransport};
