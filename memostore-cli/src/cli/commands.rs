// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Command-line argument definitions

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Inspect and maintain memostore result and metadata stores
#[derive(Parser, Debug)]
#[command(name = "memostore", version, about = "memostore cache maintenance")]
pub struct Cli {
    /// Enable debug-level logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    pub log_level: Option<log::Level>,

    /// JSON configuration file supplying lock timings and key options
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print version information
    Version,

    /// Print the dependency graph
    Deps {
        /// Metadata store directory
        #[arg(long)]
        metadata: PathBuf,

        /// Only show the dependencies of this function
        #[arg(long)]
        function: Option<String>,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// List entries whose function has a dependency newer than the entry
    Stale {
        /// Metadata store directory
        #[arg(long)]
        metadata: PathBuf,

        /// Result store directory
        #[arg(long)]
        results: PathBuf,

        /// Evict every stale entry after listing it
        #[arg(long)]
        evict: bool,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// List lock markers and their age
    Locks {
        /// Metadata store directory
        #[arg(long)]
        metadata: PathBuf,

        /// Remove markers older than the orphan threshold
        #[arg(long)]
        clean: bool,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Remove the result, uid and error records of one entry
    Evict {
        /// Result store directory
        #[arg(long)]
        results: PathBuf,

        /// Metadata store directory
        #[arg(long)]
        metadata: PathBuf,

        /// Entry identifier, with or without the `.cache` extension
        id: String,
    },

    /// Show everything stored for one entry
    Inspect {
        /// Result store directory
        #[arg(long)]
        results: PathBuf,

        /// Metadata store directory (defaults to `metadata` next to the results)
        #[arg(long)]
        metadata: Option<PathBuf>,

        /// Entry identifier, with or without the `.cache` extension
        id: String,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Write or print a configuration file
    Config {
        /// Write the configuration to this file instead of printing it
        #[arg(long)]
        init: Option<PathBuf>,

        /// Cache root the store paths point into
        #[arg(long, default_value = "cache")]
        root: PathBuf,

        /// Use timings suited to a shared network filesystem
        #[arg(long)]
        shared: bool,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}
