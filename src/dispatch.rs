// Command dispatcher
//
// One text line in, zero or more device operations out. Words are
// whitespace-separated; a word is either a verb, a `@N` channel switch, or
// an argument to the most recent verb. Gates (capability, firmware brick,
// active/idle) decide admissibility; admitted commands route through the
// device's operations vtable. After the last word the visual state is
// flushed, with RGB updates capped at 60.5 Hz.

use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, error, warn};

use crate::command::Command;
use crate::device::{
    clamp_scroll_rate, Device, DeviceState, Features, PollRate, MODE_COUNT, N_KEYS_EXTENDED,
    OUTFIFO_MAX, USB_DELAY_MAX, USB_DELAY_MIN,
};
use crate::keymap::KEY_NAME_MAX;
use crate::transport::TransportError;

/// Minimum spacing between RGB flushes: 16,528,925 ns, i.e. 60.5 Hz.
pub const HERTZ_LIM_NS: u64 = 16_528_925;

/// Fatal line outcomes. The caller must drop the device on any of these.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LineError {
    #[error("device reset failed")]
    ResetFailed,
    #[error("firmware update failed")]
    FwUpdateFailed,
}

/// Run a mutating operation, resetting the device between attempts.
///
/// Loops until the operation succeeds. Every retry requires a successful
/// reset first; a failed reset aborts the line and loses the device.
fn with_reset<A, R>(index: usize, mut action: A, mut reset: R) -> Result<(), LineError>
where
    A: FnMut() -> Result<(), TransportError>,
    R: FnMut() -> Result<(), TransportError>,
{
    loop {
        let Err(err) = action() else { return Ok(()) };
        warn!("dev{index}: command failed ({err}), resetting device");
        if let Err(err) = reset() {
            error!("dev{index}: reset failed ({err})");
            return Err(LineError::ResetFailed);
        }
    }
}

/// `@N` channel-switch token, only recognized on words that are not verbs.
fn channel_token(word: &str) -> Option<i32> {
    word.strip_prefix('@')?.parse::<i32>().ok()
}

/// Exactly six lowercase hex digits, nothing else.
fn is_rgb_hex(word: &str) -> bool {
    word.len() == 6
        && word
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Throttle consecutive RGB flushes to the rate window, then stamp the
/// flush instant.
fn throttle_rgb(state: &mut DeviceState) {
    let now = Instant::now();
    // Saturates both at zero and at the u64 ceiling, so a clock diff beyond
    // the window can never wrap into it.
    let diff = now.duration_since(state.last_rgb);
    let diff_ns = u64::try_from(diff.as_nanos()).unwrap_or(u64::MAX);

    let mut flushed_at = now;
    if diff_ns > 0 && diff_ns < HERTZ_LIM_NS {
        #[cfg(debug_assertions)]
        warn!(
            "dev{}: RGB command called too quickly ({diff_ns} ns), throttling",
            state.index
        );
        let pause = Duration::from_nanos(HERTZ_LIM_NS - diff_ns);
        thread::sleep(pause);
        flushed_at = now + pause;
    }

    #[cfg(feature = "fps-counter")]
    {
        let spacing_ns = diff_ns.max(HERTZ_LIM_NS);
        tracing::info!(
            "dev{}: rgb flush rate {:.1} Hz",
            state.index,
            1e9 / spacing_ns as f64
        );
    }

    state.last_rgb = flushed_at;
}

/// Process one command line against a device.
///
/// Returns `Ok` when the line was consumed (malformed words included; the
/// protocol absorbs them silently) and `Err` when the device is lost.
pub fn process_line(device: &mut Device, line: &str) -> Result<(), LineError> {
    let Device {
        state,
        ops,
        transport,
        imutex,
    } = device;
    let ops = ops.as_mut();
    let transport = transport.as_mut();

    // Channel selection and mode selection are line-local.
    let mut channel: i32 = 0;
    let mut mode = state.profile.current;
    let mut command: Option<Command> = None;

    for word in line.split(' ') {
        if word.is_empty() {
            continue;
        }

        if let Some(verb) = Command::parse(word) {
            if verb.platform_demoted() {
                command = None;
                continue;
            }
            command = Some(verb);
            if !verb.is_action() {
                // The next word is this verb's argument.
                continue;
            }
            // Action verbs dispatch on the verb word itself.
        } else if let Some(requested) = channel_token(word) {
            if (0..OUTFIFO_MAX as i32).contains(&requested) {
                channel = requested;
            }
            continue;
        }

        let Some(cmd) = command else { continue };
        if !state.has_features(cmd.required_features()) {
            continue;
        }
        if state.needs_fw_update && !cmd.allowed_when_bricked() {
            continue;
        }

        // Commands honoured even while the device is idle.
        match cmd {
            Command::NotifyOn => {
                if let Ok(n) = word.parse::<usize>() {
                    if let Err(e) = state.notify.open_node(n) {
                        warn!("dev{}: notify node {n}: {e}", state.index);
                    }
                }
                continue;
            }
            Command::NotifyOff => {
                if let Ok(n) = word.parse::<usize>() {
                    // notify0 can't be removed
                    if n != 0 {
                        state.notify.remove_node(n);
                    }
                }
                continue;
            }
            Command::Get => {
                if let Err(e) = ops.get(state, mode, channel, word) {
                    debug!("dev{}: get failed: {e}", state.index);
                }
                continue;
            }
            Command::Layout => {
                match word {
                    "ansi" => state.set_layout(Features::ANSI),
                    "iso" => state.set_layout(Features::ISO),
                    _ => {}
                }
                continue;
            }
            Command::Accel => {
                match word {
                    "on" => state.features |= Features::MOUSEACCEL,
                    "off" => state.features -= Features::MOUSEACCEL,
                    _ => {}
                }
                continue;
            }
            Command::ScrollSpeed => {
                if let Ok(requested) = word.parse::<i32>() {
                    state.scroll_rate = clamp_scroll_rate(requested);
                }
                continue;
            }
            Command::Mode => {
                if let Ok(n) = word.parse::<usize>() {
                    if (1..=MODE_COUNT).contains(&n) {
                        mode = n - 1;
                    }
                }
                continue;
            }
            Command::Fps => {
                if let Ok(framerate) = word.parse::<u32>() {
                    state.set_framerate(framerate);
                }
                continue;
            }
            Command::Dither => {
                if let Ok(dither) = word.parse::<u32>() {
                    if dither <= 1 {
                        state.dither = dither as u8;
                        state.profile.current_mode_mut().light.force_update = true;
                        state.profile.mode_mut(mode).light.force_update = true;
                    }
                }
                continue;
            }
            Command::Delay => {
                // Reserved verb: parsed, no effect.
                continue;
            }
            Command::Reset => {
                if let Err(e) = ops.reset(state, mode, channel, word) {
                    debug!("dev{}: reset command failed: {e}", state.index);
                }
                continue;
            }
            _ => {}
        }

        // An inactive device accepts nothing but activation.
        if !state.active {
            if cmd == Command::Active {
                with_reset(
                    state.index,
                    || ops.active(state, mode, channel),
                    || transport.try_reset(),
                )?;
            }
            continue;
        }

        match cmd {
            Command::Idle => {
                with_reset(
                    state.index,
                    || ops.idle(state, mode, channel),
                    || transport.try_reset(),
                )?;
                continue;
            }
            Command::Switch => {
                if state.profile.current != mode {
                    {
                        let _guard = imutex.lock();
                        for entry in &mut state.profile.current_mode_mut().binding.macros {
                            entry.triggered = false;
                        }
                        state.profile.current = mode;
                    }
                    // Mode indicator for devices with per-mode lights
                    if let Err(e) = ops.set_mode_index(state, mode) {
                        debug!("dev{}: set_mode_index failed: {e}", state.index);
                    }
                }
                continue;
            }
            Command::HwLoad | Command::HwSave => {
                let saved_delay = state.usb_delay;
                // The device gets overwhelmed below 10ms during profile I/O
                if state.usb_delay < 10 {
                    state.usb_delay = 10;
                }
                with_reset(
                    state.index,
                    || ops.do_io(cmd, state, mode, channel),
                    || transport.try_reset(),
                )?;
                // Profile I/O sometimes scrambles the LED state; re-send it
                with_reset(
                    state.index,
                    || ops.update_rgb(state, true),
                    || transport.try_reset(),
                )?;
                state.usb_delay = saved_delay;
                continue;
            }
            Command::FwUpdate => {
                // Whole word, no retry: a failed flash loses the device.
                if let Err(e) = ops.fwupdate(state, mode, channel, word) {
                    error!("dev{}: firmware update failed: {e}", state.index);
                    return Err(LineError::FwUpdateFailed);
                }
                continue;
            }
            Command::PollRate => {
                if state.has_features(Features::ADJRATE) {
                    let Some(rate) = PollRate::parse(word) else {
                        continue;
                    };
                    if rate > state.max_pollrate {
                        error!(
                            "dev{}: poll rate {} ms is not supported by this device",
                            state.index, word
                        );
                        continue;
                    }
                    with_reset(
                        state.index,
                        || ops.pollrate(state, rate),
                        || transport.try_reset(),
                    )?;
                }
                continue;
            }
            Command::EraseProfile => {
                if let Err(e) = ops.erase_profile(state, mode, channel) {
                    debug!("dev{}: eraseprofile failed: {e}", state.index);
                }
                // The handler may have replaced the profile wholesale;
                // re-read the mode selection through the device.
                mode = state.profile.current;
                continue;
            }
            Command::Erase
            | Command::Name
            | Command::IOff
            | Command::IOn
            | Command::IAuto
            | Command::INotify
            | Command::ProfileName
            | Command::Id
            | Command::ProfileId
            | Command::DpiSel
            | Command::Lift
            | Command::Snap => {
                // Whole-word family: the entire word is the parameter.
                if let Err(e) = ops.do_cmd(cmd, state, mode, channel, 0, word) {
                    debug!("dev{}: {cmd} failed: {e}", state.index);
                }
                continue;
            }
            Command::Rgb if is_rgb_hex(word) => {
                // Single hex constant: broadcast to every key. Channel -1
                // keeps the duplicate-LED debug warnings quiet.
                for key in 0..N_KEYS_EXTENDED {
                    if let Err(e) = ops.rgb(state, mode, -1, key, word) {
                        debug!("dev{}: rgb failed: {e}", state.index);
                    }
                }
                continue;
            }
            Command::Macro if word == "clear" => {
                if let Err(e) = ops.macro_clear(state, mode, channel) {
                    debug!("dev{}: macro clear failed: {e}", state.index);
                }
                continue;
            }
            _ => {}
        }

        // Everything else splits at the first colon.
        let (left, right) = match word.find(':') {
            Some(pos) => (&word[..pos], &word[pos + 1..]),
            None => (word, ""),
        };
        if left.is_empty() {
            continue;
        }

        // Macros and DPI take both halves whole.
        if cmd == Command::Macro || cmd == Command::Dpi {
            if let Err(e) = ops.do_macro(cmd, state, mode, channel, left, right) {
                debug!("dev{}: {cmd} failed: {e}", state.index);
            }
            continue;
        }

        // The left half is a key list; run the command on each key.
        for selector in left.split(',') {
            if selector == "all" {
                for key in 0..N_KEYS_EXTENDED {
                    if let Err(e) = ops.do_cmd(cmd, state, mode, channel, key, right) {
                        debug!("dev{}: {cmd} failed: {e}", state.index);
                    }
                }
            } else if let Some(hex) = selector.strip_prefix("#x") {
                if let Ok(key) = usize::from_str_radix(hex, 16) {
                    if key < N_KEYS_EXTENDED {
                        if let Err(e) = ops.do_cmd(cmd, state, mode, channel, key, right) {
                            debug!("dev{}: {cmd} failed: {e}", state.index);
                        }
                    }
                }
            } else if let Some(dec) = selector.strip_prefix('#') {
                if let Ok(key) = dec.parse::<usize>() {
                    if key < N_KEYS_EXTENDED {
                        if let Err(e) = ops.do_cmd(cmd, state, mode, channel, key, right) {
                            debug!("dev{}: {cmd} failed: {e}", state.index);
                        }
                    }
                }
            } else if selector.len() <= KEY_NAME_MAX {
                if let Some(key) = state.keymap.index_of(selector) {
                    if let Err(e) = ops.do_cmd(cmd, state, mode, channel, key, right) {
                        debug!("dev{}: {cmd} failed: {e}", state.index);
                    }
                }
            }
        }
    }

    // End of line: flush visual state.
    if !state.needs_fw_update {
        if command == Some(Command::Rgb) {
            throttle_rgb(state);
        }
        with_reset(
            state.index,
            || ops.update_rgb(state, false),
            || transport.try_reset(),
        )?;
        with_reset(
            state.index,
            || ops.update_dpi(state, false),
            || transport.try_reset(),
        )?;
    }

    #[cfg(debug_assertions)]
    if command == Some(Command::Rgb) {
        state.encountered_leds = [false; N_KEYS_EXTENDED];
    }

    debug_assert!((USB_DELAY_MIN..=USB_DELAY_MAX).contains(&state.usb_delay));
    debug_assert!(state.profile.current < MODE_COUNT);
    debug_assert_eq!((state.features & Features::LMASK).bits().count_ones(), 1);

    Ok(())
}
