//! Command line arguments
//!
//! Only process-level concerns live on the command line; everything the
//! communication manager needs comes from the TOML configuration file.

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(name = "storcomm")]
#[command(about = "Storage node communication manager")]
#[command(version)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long = "config-file", value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Log level (overrides the configuration file)
    #[arg(short = 'l', long = "log-level", value_name = "LEVEL", value_parser = ["trace", "debug", "info", "warn", "error", "off"])]
    pub log_level: Option<String>,

    /// Log output format
    #[arg(short = 'o', long = "log-format", value_name = "FORMAT", value_parser = ["text", "ext", "json"])]
    pub log_format: Option<String>,

    /// Log file path
    #[arg(short = 'f', long = "log-file", value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Disable colored log output
    #[arg(long = "no-color")]
    pub no_color: bool,

    /// Validate the configuration and exit
    #[arg(long = "check-config")]
    pub check_config: bool,
}

impl Args {
    /// Log file as a string, if one was given and is valid UTF-8
    pub fn log_file_str(&self) -> Option<&str> {
        self.log_file.as_deref().and_then(|path| path.to_str())
    }
}
