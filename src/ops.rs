// Device operations vtable
//
// One implementation per supported model family. The dispatcher routes
// every admitted verb through this trait and inspects nothing but the
// return codes; what a call puts on the wire is the implementation's
// business entirely.

use crate::command::Command;
use crate::device::{DeviceState, PollRate};
use crate::transport::TransportError;

/// Result of one device operation. `Err` means a transient USB failure;
/// the dispatcher decides whether to retry, reset, or drop the device.
pub type OpResult = Result<(), TransportError>;

/// The operations a model implementation supplies.
///
/// Common argument shape: the device state, the mode index the command is
/// addressed to, and the notification channel responses should go to. A
/// channel of `-1` means "no channel" and suppresses duplicate-LED debug
/// warnings during broadcast.
pub trait DeviceOps: Send {
    /// Bring the device out of hardware-controlled idle mode.
    fn active(&mut self, dev: &mut DeviceState, mode: usize, channel: i32) -> OpResult;

    /// Return the device to hardware-controlled idle mode.
    fn idle(&mut self, dev: &mut DeviceState, mode: usize, channel: i32) -> OpResult;

    fn reset(&mut self, dev: &mut DeviceState, mode: usize, channel: i32, word: &str) -> OpResult;

    /// Answer a query on the given notification channel.
    fn get(&mut self, dev: &mut DeviceState, mode: usize, channel: i32, word: &str) -> OpResult;

    /// Flash new firmware. Never retried; failure drops the device.
    fn fwupdate(&mut self, dev: &mut DeviceState, mode: usize, channel: i32, path: &str)
        -> OpResult;

    /// Discard the whole profile. May replace `dev.profile` wholesale; the
    /// dispatcher re-reads profile and mode through the device afterwards.
    fn erase_profile(&mut self, dev: &mut DeviceState, mode: usize, channel: i32) -> OpResult;

    /// Drop all macros of the addressed mode.
    fn macro_clear(&mut self, dev: &mut DeviceState, mode: usize, channel: i32) -> OpResult;

    /// Set one key's color from a six-digit hex word.
    fn rgb(
        &mut self,
        dev: &mut DeviceState,
        mode: usize,
        channel: i32,
        key: usize,
        word: &str,
    ) -> OpResult;

    /// Whole-word and per-key command family, keyed by verb.
    ///
    /// For the whole-word family `key` is 0 and `arg` is the entire word;
    /// for the per-key family `key` is a resolved scancode and `arg` the
    /// right half of the colon split.
    fn do_cmd(
        &mut self,
        verb: Command,
        dev: &mut DeviceState,
        mode: usize,
        channel: i32,
        key: usize,
        arg: &str,
    ) -> OpResult;

    /// Hardware profile I/O, keyed by `HwLoad`/`HwSave`.
    fn do_io(&mut self, verb: Command, dev: &mut DeviceState, mode: usize, channel: i32)
        -> OpResult;

    /// Two-sided macro/DPI family, keyed by `Macro`/`Dpi`. Receives both
    /// halves of the colon split.
    fn do_macro(
        &mut self,
        verb: Command,
        dev: &mut DeviceState,
        mode: usize,
        channel: i32,
        left: &str,
        right: &str,
    ) -> OpResult;

    fn pollrate(&mut self, dev: &mut DeviceState, rate: PollRate) -> OpResult;

    /// Flush pending RGB state. `force` pushes even unchanged state.
    fn update_rgb(&mut self, dev: &mut DeviceState, force: bool) -> OpResult;

    /// Flush pending DPI state. `force` pushes even unchanged state.
    fn update_dpi(&mut self, dev: &mut DeviceState, force: bool) -> OpResult;

    /// Tell the hardware which mode index is current (mode-indicator LEDs).
    fn set_mode_index(&mut self, dev: &mut DeviceState, index: usize) -> OpResult;
}
