// CLI definitions using clap

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rgbkbd")]
#[command(author, version, about = "RGB keyboard/mouse control daemon")]
pub struct Cli {
    /// Daemon configuration file (TOML)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Override the devnode root directory
    #[arg(long, value_name = "DIR")]
    pub devnode_root: Option<PathBuf>,

    /// Attach a virtual device (dev0) for protocol testing
    #[arg(long)]
    pub virtual_device: bool,

    /// Log filter when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    pub log_level: String,
}
