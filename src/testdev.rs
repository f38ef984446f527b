// Virtual device
//
// A synthetic device with no hardware behind it: operations mutate the
// in-memory state and answer queries on the notification channel. Attached
// with `--virtual-device`, it lets clients exercise the whole control
// protocol end to end (and gives the integration tests a device that always
// exists).

use std::io;
use std::path::Path;

use tracing::{debug, info};

use crate::command::Command;
use crate::config::DaemonConfig;
use crate::device::{Device, DeviceKind, DeviceState, Features, PollRate};
use crate::notify::NotifyTable;
use crate::ops::{DeviceOps, OpResult};
use crate::profile::{MacroEntry, Profile};
use crate::transport::NullTransport;

/// Operations of the virtual device.
#[derive(Debug, Default)]
pub struct VirtualOps {
    pollrate: Option<PollRate>,
    dpi: String,
}

impl VirtualOps {
    /// Query words are `:`-prefixed so they never collide with verbs.
    fn answer(&self, dev: &mut DeviceState, channel: i32, word: &str) -> io::Result<()> {
        let response = match word {
            ":mode" => format!("mode {}", dev.profile.current + 1),
            ":dither" => format!("dither {}", dev.dither),
            ":fps" => format!("fps delay {}", dev.usb_delay),
            ":pollrate" => match self.pollrate {
                Some(rate) => format!("pollrate {}", rate.as_str()),
                None => "pollrate default".to_string(),
            },
            ":dpi" => format!("dpi {}", self.dpi),
            ":name" => format!("name {}", dev.profile.current_mode().name),
            ":profilename" => format!("profilename {}", dev.profile.name),
            _ => format!("{word} ?"),
        };
        dev.notify.write_line(channel, &response)
    }
}

impl DeviceOps for VirtualOps {
    fn active(&mut self, dev: &mut DeviceState, _mode: usize, _channel: i32) -> OpResult {
        dev.active = true;
        info!("dev{}: active", dev.index);
        Ok(())
    }

    fn idle(&mut self, dev: &mut DeviceState, _mode: usize, _channel: i32) -> OpResult {
        dev.active = false;
        info!("dev{}: idle", dev.index);
        Ok(())
    }

    fn reset(&mut self, dev: &mut DeviceState, _mode: usize, _channel: i32, word: &str) -> OpResult {
        info!("dev{}: reset {word}", dev.index);
        Ok(())
    }

    fn get(&mut self, dev: &mut DeviceState, _mode: usize, channel: i32, word: &str) -> OpResult {
        self.answer(dev, channel, word)?;
        Ok(())
    }

    fn fwupdate(&mut self, dev: &mut DeviceState, _mode: usize, _channel: i32, path: &str) -> OpResult {
        info!("dev{}: pretending to flash {path}", dev.index);
        dev.needs_fw_update = false;
        Ok(())
    }

    fn erase_profile(&mut self, dev: &mut DeviceState, _mode: usize, _channel: i32) -> OpResult {
        dev.profile = Profile::new();
        Ok(())
    }

    fn macro_clear(&mut self, dev: &mut DeviceState, mode: usize, _channel: i32) -> OpResult {
        dev.profile.mode_mut(mode).binding.macros.clear();
        Ok(())
    }

    fn rgb(
        &mut self,
        dev: &mut DeviceState,
        _mode: usize,
        channel: i32,
        key: usize,
        word: &str,
    ) -> OpResult {
        #[cfg(debug_assertions)]
        {
            if channel != -1 && dev.encountered_leds[key] {
                tracing::warn!("dev{}: key {key} set twice on one line", dev.index);
            }
            dev.encountered_leds[key] = true;
        }
        let _ = (channel, word);
        Ok(())
    }

    fn do_cmd(
        &mut self,
        verb: Command,
        dev: &mut DeviceState,
        mode: usize,
        channel: i32,
        key: usize,
        arg: &str,
    ) -> OpResult {
        match verb {
            Command::Name => dev.profile.mode_mut(mode).name = arg.to_string(),
            Command::ProfileName => dev.profile.name = arg.to_string(),
            Command::Rgb => return self.rgb(dev, mode, channel, key, arg),
            _ => debug!("dev{}: {verb} key={key} arg={arg}", dev.index),
        }
        Ok(())
    }

    fn do_io(&mut self, verb: Command, dev: &mut DeviceState, _mode: usize, _channel: i32) -> OpResult {
        info!("dev{}: hardware {verb} (delay {}ms)", dev.index, dev.usb_delay);
        Ok(())
    }

    fn do_macro(
        &mut self,
        verb: Command,
        dev: &mut DeviceState,
        mode: usize,
        _channel: i32,
        left: &str,
        right: &str,
    ) -> OpResult {
        match verb {
            Command::Macro => dev
                .profile
                .mode_mut(mode)
                .binding
                .macros
                .push(MacroEntry::new(left, right)),
            _ => self.dpi = format!("{left}:{right}"),
        }
        Ok(())
    }

    fn pollrate(&mut self, _dev: &mut DeviceState, rate: PollRate) -> OpResult {
        self.pollrate = Some(rate);
        Ok(())
    }

    fn update_rgb(&mut self, dev: &mut DeviceState, force: bool) -> OpResult {
        debug!("dev{}: rgb flush force={force}", dev.index);
        Ok(())
    }

    fn update_dpi(&mut self, dev: &mut DeviceState, force: bool) -> OpResult {
        debug!("dev{}: dpi flush force={force}", dev.index);
        Ok(())
    }

    fn set_mode_index(&mut self, dev: &mut DeviceState, index: usize) -> OpResult {
        debug!("dev{}: mode indicator {index}", dev.index);
        Ok(())
    }
}

/// Build a virtual device whose notification nodes live under `dir`.
pub fn virtual_device(index: usize, dir: &Path, config: &DaemonConfig) -> io::Result<Device> {
    let notify = NotifyTable::create(dir)?;
    let mut state = DeviceState::new(
        index,
        DeviceKind::Keyboard,
        Features::BIND | Features::NOTIFY | Features::ADJRATE | Features::ANSI,
        notify,
    );
    state.usb_delay = config.usb_delay;
    state.dither = config.dither;
    Ok(Device::new(
        state,
        Box::new(VirtualOps::default()),
        Box::new(NullTransport::default()),
    ))
}

/// Same, without filesystem-backed notification nodes.
pub fn detached_virtual_device(index: usize) -> Device {
    let state = DeviceState::new(
        index,
        DeviceKind::Keyboard,
        Features::BIND | Features::NOTIFY | Features::ADJRATE | Features::ANSI,
        NotifyTable::detached(),
    );
    Device::new(
        state,
        Box::new(VirtualOps::default()),
        Box::new(NullTransport::default()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::{BufRead, BufReader};

    use crate::dispatch::process_line;

    #[test]
    fn get_answers_on_the_notification_channel() {
        let dir = tempfile::tempdir().unwrap();
        let mut device = virtual_device(0, dir.path(), &DaemonConfig::default()).unwrap();
        device.state.active = true;

        process_line(&mut device, "get :mode").unwrap();

        let reader = File::open(dir.path().join("notify0")).unwrap();
        let mut line = String::new();
        BufReader::new(reader).read_line(&mut line).unwrap();
        assert_eq!(line, "mode 1\n");
    }

    #[test]
    fn macros_accumulate_and_clear() {
        let mut device = detached_virtual_device(0);
        device.state.active = true;

        process_line(&mut device, "macro lctrl+f1:hello").unwrap();
        process_line(&mut device, "macro lctrl+f2:world").unwrap();
        assert_eq!(device.state.profile.mode(0).binding.macros.len(), 2);

        process_line(&mut device, "macro clear").unwrap();
        assert!(device.state.profile.mode(0).binding.macros.is_empty());
    }

    #[test]
    fn name_commands_update_the_model() {
        let mut device = detached_virtual_device(0);
        device.state.active = true;

        process_line(&mut device, "name Gaming profilename Default").unwrap();
        assert_eq!(device.state.profile.mode(0).name, "Gaming");
        assert_eq!(device.state.profile.name, "Default");
    }

    #[cfg(debug_assertions)]
    #[test]
    fn broadcast_clears_the_duplicate_scratch() {
        let mut device = detached_virtual_device(0);
        device.state.active = true;
        process_line(&mut device, "rgb ff0000").unwrap();
        assert!(device.state.encountered_leds.iter().all(|&seen| !seen));
    }
}
