// Per-device context: capability flags, lifecycle state, frame pacing

use std::sync::Arc;
use std::time::Instant;

use bitflags::bitflags;
use parking_lot::Mutex;

use crate::keymap::Keymap;
use crate::notify::NotifyTable;
use crate::ops::DeviceOps;
use crate::profile::Profile;
use crate::transport::UsbTransport;

/// Modes per profile.
pub const MODE_COUNT: usize = 6;

/// Notification channels per device (channel 0 is permanent).
pub const OUTFIFO_MAX: usize = 10;

/// Key scancode space, including the extended (mouse/media) range.
pub const N_KEYS_EXTENDED: usize = 184;

/// Scroll speed sentinel meaning "use OS acceleration".
pub const SCROLL_ACCELERATED: i32 = 0;
pub const SCROLL_MIN: i32 = 1;
pub const SCROLL_MAX: i32 = 10;

/// Outgoing USB frame spacing bounds, in milliseconds.
pub const USB_DELAY_MIN: u8 = 2;
pub const USB_DELAY_MAX: u8 = 10;
pub const USB_DELAY_DEFAULT: u8 = 5;

bitflags! {
    /// Device capability flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Features: u32 {
        /// Key rebinding and macros.
        const BIND = 1 << 0;
        /// Key event notifications.
        const NOTIFY = 1 << 1;
        /// Adjustable poll rate.
        const ADJRATE = 1 << 2;
        /// ANSI physical layout.
        const ANSI = 1 << 3;
        /// ISO physical layout.
        const ISO = 1 << 4;
        /// OS mouse acceleration enabled (legacy host only).
        const MOUSEACCEL = 1 << 5;

        /// Layout mask: exactly one of ANSI/ISO is set.
        const LMASK = Self::ANSI.bits() | Self::ISO.bits();
    }
}

/// What kind of peripheral this is. Determines how many USB messages one
/// visual frame costs, which feeds the `fps` → frame delay calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Mouse,
    Keyboard,
    /// Keyboards with the full extended LED range.
    FullRangeKeyboard,
}

impl DeviceKind {
    pub fn msgs_per_frame(self) -> u32 {
        match self {
            DeviceKind::Mouse => 2,
            DeviceKind::FullRangeKeyboard => 14,
            DeviceKind::Keyboard => 5,
        }
    }

    pub fn is_mouse(self) -> bool {
        matches!(self, DeviceKind::Mouse)
    }
}

/// Poll rate, slowest first. The derived order makes "faster than the
/// device's maximum" a plain `>` comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PollRate {
    Ms8,
    Ms4,
    Ms2,
    Ms1,
    Ms05,
    Ms025,
    Ms01,
}

impl PollRate {
    /// Parse the wire literal (`8`, `4`, `2`, `1`, `0.5`, `0.25`, `0.1`).
    pub fn parse(word: &str) -> Option<PollRate> {
        match word {
            "8" => Some(PollRate::Ms8),
            "4" => Some(PollRate::Ms4),
            "2" => Some(PollRate::Ms2),
            "1" => Some(PollRate::Ms1),
            "0.5" => Some(PollRate::Ms05),
            "0.25" => Some(PollRate::Ms025),
            "0.1" => Some(PollRate::Ms01),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PollRate::Ms8 => "8",
            PollRate::Ms4 => "4",
            PollRate::Ms2 => "2",
            PollRate::Ms1 => "1",
            PollRate::Ms05 => "0.5",
            PollRate::Ms025 => "0.25",
            PollRate::Ms01 => "0.1",
        }
    }
}

/// Clamp a requested scroll speed. Values below `SCROLL_MIN` request OS
/// acceleration instead of a fixed line count.
pub fn clamp_scroll_rate(requested: i32) -> i32 {
    if requested < SCROLL_MIN {
        SCROLL_ACCELERATED
    } else if requested > SCROLL_MAX {
        SCROLL_MAX
    } else {
        requested
    }
}

/// Mutable per-device state shared with the device operations.
pub struct DeviceState {
    /// Devnode index, used as the log prefix (`dev3: ...`).
    pub index: usize,
    pub kind: DeviceKind,
    pub features: Features,
    /// Lifecycle flag, driven solely by the `active`/`idle` verbs.
    pub active: bool,
    /// Firmware is bricked; almost everything is gated off until `fwupdate`.
    pub needs_fw_update: bool,
    /// Outgoing USB frame spacing in ms, always within
    /// [`USB_DELAY_MIN`, `USB_DELAY_MAX`].
    pub usb_delay: u8,
    /// 0: no dither, 1: ordered dither.
    pub dither: u8,
    /// Scroll wheel speed (legacy host only; `SCROLL_ACCELERATED` = OS).
    pub scroll_rate: i32,
    pub max_pollrate: PollRate,
    pub keymap: Keymap,
    pub profile: Profile,
    /// Monotonic timestamp of the last RGB flush.
    pub last_rgb: Instant,
    /// Per-key "already set on this line" scratch, for duplicate warnings.
    #[cfg(debug_assertions)]
    pub encountered_leds: [bool; N_KEYS_EXTENDED],
    pub notify: NotifyTable,
}

impl DeviceState {
    pub fn new(index: usize, kind: DeviceKind, features: Features, notify: NotifyTable) -> Self {
        debug_assert_eq!((features & Features::LMASK).bits().count_ones(), 1);
        Self {
            index,
            kind,
            features,
            active: false,
            needs_fw_update: false,
            usb_delay: USB_DELAY_DEFAULT,
            dither: 0,
            scroll_rate: SCROLL_ACCELERATED,
            max_pollrate: PollRate::Ms1,
            keymap: Keymap::default(),
            profile: Profile::new(),
            last_rgb: Instant::now(),
            #[cfg(debug_assertions)]
            encountered_leds: [false; N_KEYS_EXTENDED],
            notify,
        }
    }

    pub fn has_features(&self, features: Features) -> bool {
        self.features.contains(features)
    }

    /// Derive the USB frame delay from a requested frame rate.
    ///
    /// Devices differ in how many messages one frame costs, so the same FPS
    /// maps to different delays per device kind. The result is clamped to
    /// [`USB_DELAY_MIN`, `USB_DELAY_MAX`].
    pub fn set_framerate(&mut self, fps: u32) {
        if fps == 0 {
            return;
        }
        let delay = 1000 / fps / self.kind.msgs_per_frame();
        self.usb_delay = delay.clamp(USB_DELAY_MIN as u32, USB_DELAY_MAX as u32) as u8;
    }

    /// Replace the layout half of the feature flags.
    pub fn set_layout(&mut self, layout: Features) {
        debug_assert!(layout == Features::ANSI || layout == Features::ISO);
        self.features = (self.features - Features::LMASK) | layout;
    }
}

/// A connected device: its state, its operations vtable, and its transport.
///
/// The operations object is the only thing that knows how to talk to this
/// particular model; the dispatcher routes verbs through it and never
/// inspects what the calls do on the wire.
pub struct Device {
    pub state: DeviceState,
    pub ops: Box<dyn DeviceOps>,
    pub transport: Box<dyn UsbTransport>,
    /// Guards mode switching against the input-processing thread.
    pub imutex: Arc<Mutex<()>>,
}

impl Device {
    pub fn new(state: DeviceState, ops: Box<dyn DeviceOps>, transport: Box<dyn UsbTransport>) -> Self {
        Self {
            state,
            ops,
            transport,
            imutex: Arc::new(Mutex::new(())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotifyTable;

    fn state(kind: DeviceKind) -> DeviceState {
        DeviceState::new(0, kind, Features::ANSI, NotifyTable::detached())
    }

    #[test]
    fn framerate_stays_in_delay_bounds() {
        for kind in [
            DeviceKind::Mouse,
            DeviceKind::Keyboard,
            DeviceKind::FullRangeKeyboard,
        ] {
            let mut st = state(kind);
            for fps in [1, 24, 30, 60, 500, 100_000] {
                st.set_framerate(fps);
                assert!(
                    (USB_DELAY_MIN..=USB_DELAY_MAX).contains(&st.usb_delay),
                    "{kind:?} fps={fps} delay={}",
                    st.usb_delay
                );
            }
        }
    }

    #[test]
    fn framerate_zero_is_ignored() {
        let mut st = state(DeviceKind::Keyboard);
        st.usb_delay = 7;
        st.set_framerate(0);
        assert_eq!(st.usb_delay, 7);
    }

    #[test]
    fn framerate_uses_per_kind_message_count() {
        // 1000 / 30 / 2 = 16 -> clamped to 10; 1000 / 30 / 14 = 2
        let mut mouse = state(DeviceKind::Mouse);
        mouse.set_framerate(30);
        assert_eq!(mouse.usb_delay, 10);

        let mut full = state(DeviceKind::FullRangeKeyboard);
        full.set_framerate(30);
        assert_eq!(full.usb_delay, 2);
    }

    #[test]
    fn scroll_clamping() {
        assert_eq!(clamp_scroll_rate(-3), SCROLL_ACCELERATED);
        assert_eq!(clamp_scroll_rate(0), SCROLL_ACCELERATED);
        assert_eq!(clamp_scroll_rate(1), 1);
        assert_eq!(clamp_scroll_rate(10), 10);
        assert_eq!(clamp_scroll_rate(99), SCROLL_MAX);
    }

    #[test]
    fn pollrate_literals() {
        assert_eq!(PollRate::parse("8"), Some(PollRate::Ms8));
        assert_eq!(PollRate::parse("0.5"), Some(PollRate::Ms05));
        assert_eq!(PollRate::parse("0.1"), Some(PollRate::Ms01));
        assert_eq!(PollRate::parse("3"), None);
        assert_eq!(PollRate::parse(""), None);
        for rate in [
            PollRate::Ms8,
            PollRate::Ms4,
            PollRate::Ms2,
            PollRate::Ms1,
            PollRate::Ms05,
            PollRate::Ms025,
            PollRate::Ms01,
        ] {
            assert_eq!(PollRate::parse(rate.as_str()), Some(rate));
        }
    }

    #[test]
    fn pollrate_order_is_slowest_first() {
        assert!(PollRate::Ms01 > PollRate::Ms1);
        assert!(PollRate::Ms8 < PollRate::Ms4);
    }

    #[test]
    fn layout_switch_keeps_exactly_one_layout_bit() {
        let mut st = state(DeviceKind::Keyboard);
        st.set_layout(Features::ISO);
        assert_eq!(st.features & Features::LMASK, Features::ISO);
        st.set_layout(Features::ANSI);
        assert_eq!(st.features & Features::LMASK, Features::ANSI);
    }
}
