// Profile / mode / binding model
//
// A profile owns a fixed set of modes; the dispatcher addresses modes by
// index only, so replacing the whole profile (eraseprofile) never leaves a
// dangling reference behind.

use crate::device::MODE_COUNT;

/// Per-mode lighting record.
#[derive(Debug, Clone, Default)]
pub struct LightState {
    /// Push the full RGB state on the next flush even if unchanged.
    pub force_update: bool,
}

/// One stored macro: a trigger combo and its replay sequence.
#[derive(Debug, Clone)]
pub struct MacroEntry {
    pub combo: String,
    pub actions: String,
    /// Set while the combo is held; cleared when the owning mode is left.
    pub triggered: bool,
}

impl MacroEntry {
    pub fn new(combo: &str, actions: &str) -> Self {
        Self {
            combo: combo.to_string(),
            actions: actions.to_string(),
            triggered: false,
        }
    }
}

/// Key bindings and macros of one mode.
#[derive(Debug, Clone, Default)]
pub struct Binding {
    pub macros: Vec<MacroEntry>,
}

/// One of the `MODE_COUNT` configurations inside a profile.
#[derive(Debug, Clone, Default)]
pub struct Mode {
    pub name: String,
    pub binding: Binding,
    pub light: LightState,
}

/// A device profile: `MODE_COUNT` modes plus the current-mode index.
#[derive(Debug, Clone)]
pub struct Profile {
    pub name: String,
    modes: Vec<Mode>,
    /// Index of the current mode, always `< MODE_COUNT`.
    pub current: usize,
}

impl Profile {
    pub fn new() -> Self {
        Self {
            name: String::new(),
            modes: vec![Mode::default(); MODE_COUNT],
            current: 0,
        }
    }

    pub fn mode(&self, index: usize) -> &Mode {
        &self.modes[index]
    }

    pub fn mode_mut(&mut self, index: usize) -> &mut Mode {
        &mut self.modes[index]
    }

    pub fn current_mode(&self) -> &Mode {
        &self.modes[self.current]
    }

    pub fn current_mode_mut(&mut self) -> &mut Mode {
        &mut self.modes[self.current]
    }
}

impl Default for Profile {
    fn default() -> Self {
        Self::new()
    }
}
