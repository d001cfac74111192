//! CLI argument parsing using clap 4.x derive macros

pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Conversational assistant over a therapy practice's records
///
/// Answers questions about patients, goals, budgets, strategies and sessions
/// from a clinic data snapshot. General questions go to an OpenAI-compatible
/// endpoint when one is configured.
#[derive(Parser, Debug)]
#[command(name = "clinic-assistant")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: <config dir>/clinic-assistant/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Clinic data snapshot (JSON), overrides `data.fixture_path`
    #[arg(short, long, global = true)]
    pub data: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the WebSocket server
    Serve {
        /// Address to bind, overrides `server.host`
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on, overrides `server.port`
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Ask one question and print the answer
    Ask {
        /// The question, e.g. "How many patients do we have?"
        #[arg(num_args = 1.., required = true)]
        query: Vec<String>,

        /// Print the intent and tools used
        #[arg(long)]
        trace: bool,
    },

    /// Interactive chat on one conversation
    Chat {
        /// Print the intent and tools used after each reply
        #[arg(long)]
        trace: bool,
    },

    /// Run one tool directly
    Tool {
        /// Tool name, see `tools`
        name: String,

        /// Tool input as JSON, e.g. '{"patient_reference":{"kind":"identifier","value":"456789"}}'
        #[arg(short, long)]
        input: Option<String>,
    },

    /// List available tools
    Tools,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        cmd: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,
}
