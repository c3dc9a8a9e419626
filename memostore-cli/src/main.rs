// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! memostore CLI entry point

use clap::Parser;
use colored::Colorize;

mod cli;
use cli::{Cli, Commands};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // -v wins over --log-level; RUST_LOG still overrides both
    let log_level = if cli.verbose {
        log::LevelFilter::Debug
    } else if let Some(level) = cli.log_level {
        level.to_level_filter()
    } else {
        log::LevelFilter::Warn
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Version => {
            println!("{} {}", "memostore".bold().green(), memostore::VERSION);
            println!("Durable, dependency-aware memoization");
            Ok(())
        }

        Commands::Deps {
            metadata,
            function,
            format,
        } => cli::handle_deps(config, metadata, function, format),

        Commands::Stale {
            metadata,
            results,
            evict,
            format,
        } => cli::handle_stale(config, metadata, results, evict, format),

        Commands::Locks {
            metadata,
            clean,
            format,
        } => cli::handle_locks(config, metadata, clean, format),

        Commands::Evict {
            results,
            metadata,
            id,
        } => cli::handle_evict(config, results, metadata, id),

        Commands::Inspect {
            results,
            metadata,
            id,
            format,
        } => cli::handle_inspect(config, results, metadata, id, format),

        Commands::Config {
            init,
            root,
            shared,
            force,
        } => cli::handle_config(init, root, shared, force),
    }
}
