// Notification channels
//
// Each device exposes up to OUTFIFO_MAX named pipes (`notify0` ..
// `notify9`) under its devnode directory. Observer commands write their
// responses there. Channel 0 is created with the device and never goes
// away; the rest come and go with `notifyon`/`notifyoff`.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use nix::sys::stat::Mode;
use nix::unistd::mkfifo;
use tracing::{debug, warn};

use crate::device::OUTFIFO_MAX;

/// One open channel. `file` is `None` on a detached table.
struct NotifyNode {
    file: Option<File>,
}

/// The per-device notification channel table.
///
/// A detached table (no filesystem backing) tracks which channels exist but
/// drops all output; the virtual device and unit tests run on one.
pub struct NotifyTable {
    dir: Option<PathBuf>,
    nodes: Vec<Option<NotifyNode>>,
}

impl NotifyTable {
    /// Create the table under `dir`, with channel 0 already open.
    pub fn create(dir: &Path) -> io::Result<Self> {
        let mut table = Self {
            dir: Some(dir.to_path_buf()),
            nodes: (0..OUTFIFO_MAX).map(|_| None).collect(),
        };
        table.open_node(0)?;
        Ok(table)
    }

    /// A table with no filesystem backing.
    pub fn detached() -> Self {
        let mut nodes: Vec<Option<NotifyNode>> = (0..OUTFIFO_MAX).map(|_| None).collect();
        nodes[0] = Some(NotifyNode { file: None });
        Self { dir: None, nodes }
    }

    fn node_path(&self, number: usize) -> Option<PathBuf> {
        self.dir.as_ref().map(|d| d.join(format!("notify{number}")))
    }

    /// Create and open notification node `number`. Out-of-range numbers and
    /// already-open nodes are ignored.
    pub fn open_node(&mut self, number: usize) -> io::Result<()> {
        if number >= OUTFIFO_MAX {
            debug!("ignoring notify node {number} (max {OUTFIFO_MAX})");
            return Ok(());
        }
        if self.nodes[number].is_some() {
            return Ok(());
        }
        let Some(path) = self.node_path(number) else {
            self.nodes[number] = Some(NotifyNode { file: None });
            return Ok(());
        };
        match mkfifo(&path, Mode::S_IRUSR | Mode::S_IWUSR | Mode::S_IRGRP) {
            Ok(()) => {}
            Err(nix::errno::Errno::EEXIST) => {}
            Err(e) => return Err(io::Error::from(e)),
        }
        // O_RDWR keeps the FIFO alive with no external reader attached, so
        // writes never block the control thread.
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        self.nodes[number] = Some(NotifyNode { file: Some(file) });
        debug!("created notify node {}", path.display());
        Ok(())
    }

    /// Remove notification node `number`. Node 0 is permanent; removing it
    /// (or an out-of-range node) is ignored.
    pub fn remove_node(&mut self, number: usize) {
        if number == 0 || number >= OUTFIFO_MAX {
            return;
        }
        if self.nodes[number].take().is_some() {
            if let Some(path) = self.node_path(number) {
                if let Err(e) = std::fs::remove_file(&path) {
                    warn!("removing {} failed: {e}", path.display());
                }
            }
        }
    }

    pub fn is_open(&self, number: usize) -> bool {
        number < OUTFIFO_MAX && self.nodes[number].is_some()
    }

    /// Write one response line to a channel. Closed channels and the `-1`
    /// broadcast sentinel swallow the output.
    pub fn write_line(&mut self, channel: i32, msg: &str) -> io::Result<()> {
        let Ok(number) = usize::try_from(channel) else {
            return Ok(());
        };
        if number >= OUTFIFO_MAX {
            return Ok(());
        }
        if let Some(NotifyNode { file: Some(file) }) = self.nodes[number].as_mut() {
            writeln!(file, "{msg}")?;
        }
        Ok(())
    }
}

impl Drop for NotifyTable {
    fn drop(&mut self) {
        for number in 0..OUTFIFO_MAX {
            if self.nodes[number].take().is_some() {
                if let Some(path) = self.node_path(number) {
                    let _ = std::fs::remove_file(&path);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader};

    #[test]
    fn node_zero_exists_and_is_permanent() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = NotifyTable::create(dir.path()).unwrap();
        assert!(table.is_open(0));
        assert!(dir.path().join("notify0").exists());

        table.remove_node(0);
        assert!(table.is_open(0));
        assert!(dir.path().join("notify0").exists());
    }

    #[test]
    fn nodes_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = NotifyTable::create(dir.path()).unwrap();

        table.open_node(3).unwrap();
        assert!(table.is_open(3));
        assert!(dir.path().join("notify3").exists());

        table.remove_node(3);
        assert!(!table.is_open(3));
        assert!(!dir.path().join("notify3").exists());
    }

    #[test]
    fn out_of_range_nodes_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = NotifyTable::create(dir.path()).unwrap();
        table.open_node(OUTFIFO_MAX).unwrap();
        table.open_node(99).unwrap();
        table.remove_node(99);
        for n in 1..OUTFIFO_MAX {
            assert!(!table.is_open(n));
        }
    }

    #[test]
    fn written_lines_reach_a_reader() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = NotifyTable::create(dir.path()).unwrap();
        table.write_line(0, "mode 2").unwrap();

        let reader = File::open(dir.path().join("notify0")).unwrap();
        let mut line = String::new();
        BufReader::new(reader).read_line(&mut line).unwrap();
        assert_eq!(line, "mode 2\n");
    }

    #[test]
    fn closed_channels_swallow_output() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = NotifyTable::create(dir.path()).unwrap();
        table.write_line(5, "nobody listening").unwrap();
        table.write_line(-1, "broadcast sentinel").unwrap();
    }

    #[test]
    fn detached_table_tracks_state_without_files() {
        let mut table = NotifyTable::detached();
        assert!(table.is_open(0));
        table.open_node(2).unwrap();
        assert!(table.is_open(2));
        table.write_line(2, "dropped").unwrap();
        table.remove_node(2);
        assert!(!table.is_open(2));
    }

    #[test]
    fn drop_unlinks_fifos() {
        let dir = tempfile::tempdir().unwrap();
        let path0 = dir.path().join("notify0");
        {
            let mut table = NotifyTable::create(dir.path()).unwrap();
            table.open_node(1).unwrap();
        }
        assert!(!path0.exists());
        assert!(!dir.path().join("notify1").exists());
    }
}
