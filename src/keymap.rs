// Scancode -> key name table
//
// Index is the key's scancode within the extended range; entries without a
// name are reserved positions on the wire that no physical key maps to.

use crate::device::N_KEYS_EXTENDED;

/// Longest key name accepted in a key-list selector.
pub const KEY_NAME_MAX: usize = 10;

/// Names of the standard key block, assigned from scancode 0 upward.
#[rustfmt::skip]
const STANDARD_NAMES: &[&str] = &[
    "esc", "f1", "f2", "f3", "f4", "f5", "f6", "f7", "f8", "f9", "f10", "f11", "f12",
    "prtscn", "scroll", "pause",
    "grave", "1", "2", "3", "4", "5", "6", "7", "8", "9", "0", "minus", "equal", "bspace",
    "ins", "home", "pgup",
    "tab", "q", "w", "e", "r", "t", "y", "u", "i", "o", "p", "lbrace", "rbrace", "bslash",
    "del", "end", "pgdn",
    "caps", "a", "s", "d", "f", "g", "h", "j", "k", "l", "colon", "quote", "hash", "enter",
    "lshift", "bslash_iso", "z", "x", "c", "v", "b", "n", "m", "comma", "dot", "slash", "rshift",
    "lctrl", "lwin", "lalt", "space", "ralt", "rwin", "rmenu", "rctrl",
    "up", "down", "left", "right",
    "numlock", "numslash", "numstar", "numminus",
    "num7", "num8", "num9", "numplus",
    "num4", "num5", "num6",
    "num1", "num2", "num3", "numenter",
    "num0", "numdot",
    "mute", "volup", "voldn", "stop", "prev", "play", "next",
    "light", "lock", "fn",
    "g1", "g2", "g3", "g4", "g5", "g6", "g7", "g8", "g9",
    "g10", "g11", "g12", "g13", "g14", "g15", "g16", "g17", "g18",
    "mr", "m1", "m2", "m3",
];

/// First scancode of the extended (mouse) block.
const EXTENDED_BASE: usize = 160;

/// Names of the extended block, assigned from `EXTENDED_BASE` upward.
#[rustfmt::skip]
const EXTENDED_NAMES: &[&str] = &[
    "mouse1", "mouse2", "mouse3", "mouse4", "mouse5", "mouse6", "mouse7", "mouse8",
    "wheelup", "wheeldn", "dpiup", "dpidn", "sniper", "thumb1", "thumb2", "thumb3",
];

/// Per-device scancode -> name map.
#[derive(Debug, Clone)]
pub struct Keymap {
    entries: Vec<Option<&'static str>>,
}

impl Default for Keymap {
    fn default() -> Self {
        let mut entries = vec![None; N_KEYS_EXTENDED];
        for (i, &name) in STANDARD_NAMES.iter().enumerate() {
            entries[i] = Some(name);
        }
        for (i, &name) in EXTENDED_NAMES.iter().enumerate() {
            entries[EXTENDED_BASE + i] = Some(name);
        }
        Self { entries }
    }
}

impl Keymap {
    pub fn name(&self, scancode: usize) -> Option<&'static str> {
        self.entries.get(scancode).copied().flatten()
    }

    /// Scancode of the first key with this name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| *e == Some(name))
    }
}
