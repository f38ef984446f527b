// Control protocol vocabulary
// Verb strings, arity kinds, and gate classes for the command dispatcher

use crate::device::Features;

/// A verb of the control protocol.
///
/// Variants are declared in wire order; the order is stable and forms the
/// protocol's numeric command identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Delay,
    Mode,
    Switch,
    Layout,
    Accel,
    ScrollSpeed,
    NotifyOn,
    NotifyOff,
    Fps,
    Dither,

    HwLoad,
    HwSave,
    FwUpdate,
    PollRate,

    Active,
    Idle,

    Erase,
    EraseProfile,
    Name,
    ProfileName,
    Id,
    ProfileId,

    Rgb,
    HwAnim,
    IOff,
    IOn,
    IAuto,

    Bind,
    Unbind,
    Rebind,
    Macro,

    Dpi,
    DpiSel,
    Lift,
    Snap,

    Notify,
    INotify,
    Get,

    Reset,
}

/// Wire strings in command-id order.
const COMMAND_STRINGS: &[(&str, Command)] = &[
    ("delay", Command::Delay),
    ("mode", Command::Mode),
    ("switch", Command::Switch),
    ("layout", Command::Layout),
    ("accel", Command::Accel),
    ("scrollspeed", Command::ScrollSpeed),
    ("notifyon", Command::NotifyOn),
    ("notifyoff", Command::NotifyOff),
    ("fps", Command::Fps),
    ("dither", Command::Dither),
    ("hwload", Command::HwLoad),
    ("hwsave", Command::HwSave),
    ("fwupdate", Command::FwUpdate),
    ("pollrate", Command::PollRate),
    ("active", Command::Active),
    ("idle", Command::Idle),
    ("erase", Command::Erase),
    ("eraseprofile", Command::EraseProfile),
    ("name", Command::Name),
    ("profilename", Command::ProfileName),
    ("id", Command::Id),
    ("profileid", Command::ProfileId),
    ("rgb", Command::Rgb),
    ("hwanim", Command::HwAnim),
    ("ioff", Command::IOff),
    ("ion", Command::IOn),
    ("iauto", Command::IAuto),
    ("bind", Command::Bind),
    ("unbind", Command::Unbind),
    ("rebind", Command::Rebind),
    ("macro", Command::Macro),
    ("dpi", Command::Dpi),
    ("dpisel", Command::DpiSel),
    ("lift", Command::Lift),
    ("snap", Command::Snap),
    ("notify", Command::Notify),
    ("inotify", Command::INotify),
    ("get", Command::Get),
    ("reset", Command::Reset),
];

impl Command {
    /// Look up a word as a command verb.
    pub fn parse(word: &str) -> Option<Command> {
        COMMAND_STRINGS
            .iter()
            .find(|(s, _)| *s == word)
            .map(|&(_, c)| c)
    }

    /// The wire string for this verb.
    pub fn as_str(self) -> &'static str {
        COMMAND_STRINGS
            .iter()
            .find(|&&(_, c)| c == self)
            .map(|&(s, _)| s)
            .unwrap_or("?")
    }

    /// Layout and mouse acceleration only exist on the macOS host; on every
    /// other platform these verbs are dropped at recognition time (and drop
    /// any pending verb with them, matching the wire protocol).
    pub fn platform_demoted(self) -> bool {
        !cfg!(target_os = "macos")
            && matches!(self, Command::Layout | Command::Accel | Command::ScrollSpeed)
    }

    /// Action verbs carry no argument; recognizing the verb itself triggers
    /// dispatch. Every other verb consumes the following word.
    pub fn is_action(self) -> bool {
        matches!(
            self,
            Command::Switch
                | Command::HwLoad
                | Command::HwSave
                | Command::Active
                | Command::Idle
                | Command::Erase
                | Command::EraseProfile
        )
    }

    /// Capability flags the device must have for this verb to be admitted.
    pub fn required_features(self) -> Features {
        match self {
            Command::Bind | Command::Unbind | Command::Rebind | Command::Macro | Command::Delay => {
                Features::BIND
            }
            Command::Notify => Features::NOTIFY,
            _ => Features::empty(),
        }
    }

    /// Verbs that stay admissible while the device firmware is bricked.
    pub fn allowed_when_bricked(self) -> bool {
        matches!(
            self,
            Command::FwUpdate | Command::NotifyOn | Command::NotifyOff | Command::Reset
        )
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
