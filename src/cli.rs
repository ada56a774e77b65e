// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use clap::Parser;

/// `sessiond` — multi-session agent daemon.
///
/// Hosts long-lived conversational agent sessions, mediates between client
/// applications and the upstream agent SDK, and broadcasts state via the
/// Hub. Has no HTTP/CLI surface of its own beyond process control — those
/// are external collaborators that connect to the Hub over whatever
/// transport they implement.
#[derive(Parser, Debug)]
#[command(name = "sessiond", about = "Multi-session agent daemon", version, long_about = None)]
pub struct Cli {
    /// Path to an explicit YAML config file, applied after the layered
    /// system/user/workspace defaults.
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace). Default is warn.
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Run against an in-memory store instead of the configured database
    /// path. Useful for smoke-testing a build without touching disk.
    #[arg(long)]
    pub ephemeral: bool,
}
