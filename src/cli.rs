// CLI definitions using clap

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "hidhost")]
#[command(author, version, about = "HID device lifecycle manager for gamepads and the Speed Editor")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file path (default: ~/.config/hidhost/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Watch for connect/disconnect events until Ctrl-C (default)
    #[command(visible_aliases = ["w"])]
    Watch {
        /// Only watch one family
        #[arg(long, value_enum)]
        family: Option<Family>,
    },

    /// List currently connected devices
    #[command(visible_aliases = ["ls", "l"])]
    List {
        /// Only list one family
        #[arg(long, value_enum)]
        family: Option<Family>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration
    Config {
        /// Write the effective configuration to the config path
        #[arg(long)]
        save: bool,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Family {
    Gamepad,
    SpeedEditor,
}

impl Family {
    /// Whether `filter` selects this family
    pub fn selected(self, filter: Option<Family>) -> bool {
        filter.map_or(true, |f| f == self)
    }
}
