use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use rgbkbd::config::DaemonConfig;
use rgbkbd::devnode::{self, DevNode};
use rgbkbd::testdev;

mod cli;
use cli::Cli;

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .init();

    let mut config = match &cli.config {
        Some(path) => DaemonConfig::load(path)
            .map_err(anyhow::Error::msg)
            .context("loading configuration")?,
        None => DaemonConfig::default(),
    };
    if let Some(root) = cli.devnode_root {
        config.devnode_root = root;
    }

    fs::create_dir_all(&config.devnode_root)
        .with_context(|| format!("creating {}", config.devnode_root.display()))?;
    info!("devnode root: {}", config.devnode_root.display());

    let running = Arc::new(AtomicBool::new(true));
    let running_flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        running_flag.store(false, Ordering::SeqCst);
    })
    .context("installing signal handler")?;

    if cli.virtual_device {
        let node = DevNode::create(&config.devnode_root, 0)?;
        let device = testdev::virtual_device(0, node.dir(), &config)?;
        let cmd_path = node.cmd_path().to_path_buf();
        let _control = devnode::spawn_control_thread(device, node)?;
        info!("virtual device attached; echo commands into {}", cmd_path.display());
    } else {
        // Physical device discovery and attachment live in the platform
        // layer, which hands connected devices to spawn_control_thread.
        info!("no devices attached at startup");
    }

    while running.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(200));
    }

    info!("shutting down");
    Ok(())
}
