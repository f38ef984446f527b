//! Integration tests for the control protocol surface.
//!
//! These exercise the public API end to end: devnode creation, the
//! per-device control thread, line dispatch, and notification output —
//! the same path a real client takes through the daemon.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::sync::mpsc;
use std::time::Duration;

use rgbkbd::config::DaemonConfig;
use rgbkbd::device::{Features, MODE_COUNT, USB_DELAY_MAX, USB_DELAY_MIN};
use rgbkbd::devnode::{self, DevNode};
use rgbkbd::dispatch::{process_line, HERTZ_LIM_NS};
use rgbkbd::testdev;

/// Read one line from a notification node, with a deadline so a broken
/// daemon fails the test instead of hanging it.
fn read_notify_line(reader: File, timeout: Duration) -> String {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let mut line = String::new();
        if BufReader::new(reader).read_line(&mut line).is_ok() {
            let _ = tx.send(line);
        }
    });
    rx.recv_timeout(timeout).expect("no notification output")
}

#[test]
fn client_round_trip_through_the_devnode() {
    let root = tempfile::tempdir().unwrap();
    let node = DevNode::create(root.path(), 0).unwrap();
    let device = testdev::virtual_device(0, node.dir(), &DaemonConfig::default()).unwrap();

    let dir = node.dir().to_path_buf();
    let cmd_path = node.cmd_path().to_path_buf();
    let _control = devnode::spawn_control_thread(device, node).unwrap();

    let mut cmd = OpenOptions::new().write(true).open(&cmd_path).unwrap();

    // Devices come up idle; everything before activation is dropped.
    cmd.write_all(b"active\n").unwrap();

    let notify0 = File::open(dir.join("notify0")).unwrap();
    cmd.write_all(b"get :mode\n").unwrap();
    let line = read_notify_line(notify0, Duration::from_secs(5));
    assert_eq!(line, "mode 1\n");

    let notify0 = File::open(dir.join("notify0")).unwrap();
    cmd.write_all(b"mode 2 switch\nget :mode\n").unwrap();
    let line = read_notify_line(notify0, Duration::from_secs(5));
    assert_eq!(line, "mode 2\n");
}

#[test]
fn state_invariants_hold_after_every_line() {
    let lines = [
        "active",
        "fps 100000",
        "fps 0",
        "mode 0",
        "mode 7 switch",
        "@10 rgb ff0080",
        "dither 1",
        "bind a,b,#5:macro1",
        "macro lctrl+f1:hello",
        "pollrate 0.1",
        "notifyon 3",
        "notifyoff 3",
        "eraseprofile",
        "garbage words that mean nothing",
    ];

    let mut device = testdev::detached_virtual_device(0);
    for line in lines {
        process_line(&mut device, line).unwrap();

        let state = &device.state;
        assert!(
            (USB_DELAY_MIN..=USB_DELAY_MAX).contains(&state.usb_delay),
            "{line}: usb_delay {}",
            state.usb_delay
        );
        assert!(
            state.profile.current < MODE_COUNT,
            "{line}: mode {}",
            state.profile.current
        );
        assert_eq!(
            (state.features & Features::LMASK).bits().count_ones(),
            1,
            "{line}: layout bits"
        );
    }
}

#[test]
fn consecutive_rgb_lines_respect_the_rate_window() {
    let mut device = testdev::detached_virtual_device(0);
    device.state.active = true;

    process_line(&mut device, "rgb ff0000").unwrap();
    let first_flush = device.state.last_rgb;
    process_line(&mut device, "rgb 00ff00").unwrap();

    let spacing = device.state.last_rgb.duration_since(first_flush);
    assert!(
        spacing.as_nanos() >= HERTZ_LIM_NS as u128,
        "flushes {spacing:?} apart"
    );
}

#[test]
fn notify_channels_route_observer_output() {
    let root = tempfile::tempdir().unwrap();
    let mut device = testdev::virtual_device(0, root.path(), &DaemonConfig::default()).unwrap();
    device.state.active = true;

    process_line(&mut device, "notifyon 2").unwrap();
    let notify2 = File::open(root.path().join("notify2")).unwrap();

    process_line(&mut device, "@2 get :dither").unwrap();
    let line = read_notify_line(notify2, Duration::from_secs(5));
    assert_eq!(line, "dither 0\n");

    // Channel selection was line-local; this goes back to notify0.
    let notify0 = File::open(root.path().join("notify0")).unwrap();
    process_line(&mut device, "get :dither").unwrap();
    let line = read_notify_line(notify0, Duration::from_secs(5));
    assert_eq!(line, "dither 0\n");
}
