// Per-device filesystem surface
//
// Each attached device gets a directory under the devnode root with a
// `cmd` FIFO clients write command lines to, the `notify*` response nodes,
// and a `features` file describing the device's capabilities. One control
// thread per device drains the FIFO and feeds lines to the dispatcher
// serially.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

use nix::sys::stat::Mode;
use nix::unistd::mkfifo;
use tracing::{error, info, warn};

use crate::device::Device;
use crate::dispatch::{self, LineError};

/// Filesystem nodes of one attached device.
pub struct DevNode {
    dir: PathBuf,
    cmd_path: PathBuf,
}

impl DevNode {
    /// Create `<root>/dev<index>/` with its command FIFO.
    pub fn create(root: &Path, index: usize) -> io::Result<Self> {
        let dir = root.join(format!("dev{index}"));
        fs::create_dir_all(&dir)?;

        let cmd_path = dir.join("cmd");
        match mkfifo(
            &cmd_path,
            Mode::S_IRUSR | Mode::S_IWUSR | Mode::S_IWGRP | Mode::S_IWOTH,
        ) {
            Ok(()) => {}
            Err(nix::errno::Errno::EEXIST) => {}
            Err(e) => return Err(io::Error::from(e)),
        }

        Ok(Self { dir, cmd_path })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn cmd_path(&self) -> &Path {
        &self.cmd_path
    }

    /// Publish the device's capability words for clients to read.
    pub fn write_features(&self, device: &Device) -> io::Result<()> {
        let words: Vec<String> = device
            .state
            .features
            .iter_names()
            .filter(|(name, _)| *name != "LMASK")
            .map(|(name, _)| name.to_ascii_lowercase())
            .collect();
        fs::write(self.dir.join("features"), words.join(" ") + "\n")
    }

    /// Open the command FIFO for reading.
    ///
    /// Opened read-write so the FIFO stays alive across client disconnects
    /// instead of delivering EOF after every writer.
    pub fn open_cmd(&self) -> io::Result<File> {
        OpenOptions::new().read(true).write(true).open(&self.cmd_path)
    }

    /// Tear the nodes down. The notification FIFOs are unlinked by the
    /// device's notify table; this removes the rest.
    pub fn remove(&self) {
        let _ = fs::remove_file(&self.cmd_path);
        let _ = fs::remove_file(self.dir.join("features"));
        let _ = fs::remove_dir(&self.dir);
    }
}

/// Feed command lines to a device until the reader ends or the device is
/// lost.
pub fn control_loop<R: BufRead>(device: &mut Device, reader: R) -> Result<(), LineError> {
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("dev{}: command node read failed: {e}", device.state.index);
                break;
            }
        };
        dispatch::process_line(device, &line)?;
    }
    Ok(())
}

/// Spawn the dedicated control thread for one device.
///
/// The thread owns the device; when the loop ends (device lost or node
/// unreadable) it tears the devnode down.
pub fn spawn_control_thread(mut device: Device, node: DevNode) -> io::Result<JoinHandle<()>> {
    let index = device.state.index;
    node.write_features(&device)?;
    let cmd = node.open_cmd()?;

    thread::Builder::new()
        .name(format!("dev{index}-ctl"))
        .spawn(move || {
            info!("dev{index}: control thread ready at {}", node.cmd_path().display());
            match control_loop(&mut device, BufReader::new(cmd)) {
                Ok(()) => info!("dev{index}: command node closed"),
                Err(e) => error!("dev{index}: dropping device: {e}"),
            }
            drop(device);
            node.remove();
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    use crate::config::DaemonConfig;
    use crate::testdev;

    #[test]
    fn devnode_layout() {
        let root = tempfile::tempdir().unwrap();
        let node = DevNode::create(root.path(), 2).unwrap();
        assert_eq!(node.dir(), root.path().join("dev2"));
        assert!(node.cmd_path().exists());

        node.remove();
        assert!(!node.cmd_path().exists());
        assert!(!node.dir().exists());
    }

    #[test]
    fn features_file_lists_capability_words() {
        let root = tempfile::tempdir().unwrap();
        let node = DevNode::create(root.path(), 0).unwrap();
        let device = testdev::virtual_device(0, node.dir(), &DaemonConfig::default()).unwrap();
        node.write_features(&device).unwrap();

        let words = fs::read_to_string(node.dir().join("features")).unwrap();
        for expected in ["bind", "notify", "adjrate", "ansi"] {
            assert!(words.contains(expected), "{words}");
        }
        assert!(!words.contains("lmask"), "{words}");
    }

    #[test]
    fn control_loop_processes_lines_in_order() {
        let mut device = testdev::detached_virtual_device(0);
        let input = "active\nmode 2 switch\nname Gaming\n";
        control_loop(&mut device, Cursor::new(input)).unwrap();

        assert!(device.state.active);
        assert_eq!(device.state.profile.current, 1);
        assert_eq!(device.state.profile.mode(1).name, "Gaming");
    }

    #[test]
    fn control_loop_survives_garbage() {
        let mut device = testdev::detached_virtual_device(0);
        let input = "nonsense words here\n\nactive\n";
        control_loop(&mut device, Cursor::new(input)).unwrap();
        assert!(device.state.active);
    }
}
