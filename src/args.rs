//! Arguments.
//!
//! This module contains the definition for the available command-line parameter.

use clap::Parser;
use std::time::Duration;

#[derive(Debug, Parser)]
#[clap(author)]
pub(crate) struct Args {
    /// Sets a custom config file
    #[clap(short, long, value_name = "file")]
    pub(crate) config: Option<String>,
    /// The directory the release gets unpacked into [default: current directory]
    #[clap(short, long, value_name = "dir", env = "NVIM_INSTALLER_SOURCE")]
    pub(crate) source: Option<String>,
    /// The installation prefix the executable gets linked into [default: /usr/local]
    #[clap(short, long, value_name = "dir", env = "NVIM_INSTALLER_DESTINATION")]
    pub(crate) destination: Option<String>,
    /// The release to install (nightly, stable, v0.10.0, etc.) [default: nightly]
    #[clap(short, long, value_name = "release")]
    pub(crate) release: Option<String>,
    /// The flavor to install (macos, linux64, etc.) [default: macos]
    #[clap(short, long, value_name = "flavor")]
    pub(crate) flavor: Option<String>,
    /// The base URL to download releases from [default: https://github.com]
    #[clap(long, value_name = "url")]
    pub(crate) url: Option<String>,
    /// Gives up fetching after the given duration (e.g. 30s, 2m)
    #[clap(short, long, value_name = "duration", value_parser = humantime::parse_duration)]
    pub(crate) timeout: Option<Duration>,
    /// Whether to really execute the command
    #[clap(short = 'n', long, action)]
    pub(crate) dry_run: bool,
    /// Suppress unnecessary information
    #[clap(short = 'q', long, action)]
    pub(crate) quiet: bool,
    /// Change level of verbosity (apply multiple times to increase level)
    #[clap(short, long, action = clap::ArgAction::Count)]
    pub(crate) verbose: u8,
    /// Print version information
    #[clap(short = 'V', long, action)]
    pub(crate) version: bool,
}
