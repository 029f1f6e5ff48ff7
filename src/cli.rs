//! CLI definitions for tokensync.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// tokensync CLI.
#[derive(Parser)]
#[command(name = "tokensync")]
#[command(about = "Register device push tokens with a notification server")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config/tokensync.toml", global = true)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Register a push token now (Ctrl-C interrupts, leaving it pending)
    Register {
        /// Token platform (ios, android, web, ...)
        #[arg(long = "type")]
        token_type: String,

        /// Token value
        #[arg(long)]
        data: String,
    },

    /// Handle a newly issued token; registers only when auto registration is on
    Token {
        /// Token platform (ios, android, web, ...)
        #[arg(long = "type")]
        token_type: String,

        /// Token value
        #[arg(long)]
        data: String,
    },

    /// Retry the registration of a token left pending by an earlier run
    Resume,

    /// Store the registration server URL and base request body
    Init {
        /// Registration endpoint
        #[arg(long)]
        url: String,

        /// Base request body as a JSON object
        #[arg(long, default_value = "{}")]
        body: String,
    },

    /// Switch automatic registration of new tokens on or off
    Auto {
        #[arg(value_enum)]
        state: Switch,
    },

    /// Print the persisted registration info
    Status,

    /// Validate the configuration file
    Validate,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum Switch {
    On,
    Off,
}

impl Switch {
    pub fn enabled(self) -> bool {
        self == Switch::On
    }
}
