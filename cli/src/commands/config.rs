// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};

use memex_cortex::domain::CortexConfig;

use crate::wiring::load_config;

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration as YAML
    Show {
        /// Show where configuration and state are read from
        #[arg(long)]
        paths: bool,
    },

    /// Validate a configuration file
    Validate {
        /// Path to config file (default: --config)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Write the default configuration
    Generate {
        #[arg(short, long, default_value = "./memex-config.yaml")]
        output: PathBuf,
    },
}

pub fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>, state_path: &Path) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override.as_deref(), state_path, paths),
        ConfigCommand::Validate { file } => validate(file.or(config_override)),
        ConfigCommand::Generate { output } => generate(&output),
    }
}

fn show(config_path: Option<&Path>, state_path: &Path, show_paths: bool) -> Result<()> {
    let config = load_config(config_path)?;

    if show_paths {
        println!("{}", "Paths:".bold());
        match config_path {
            Some(path) => println!("  config: {}", path.display()),
            None => println!("  config: {}", "(defaults)".dimmed()),
        }
        println!("  state:  {}", state_path.display());
        println!();
    }

    println!("{}", "Current configuration:".bold());
    println!("{}", config.to_yaml()?);
    Ok(())
}

fn validate(config_path: Option<PathBuf>) -> Result<()> {
    let Some(path) = config_path else {
        anyhow::bail!("No configuration file given; pass FILE or --config");
    };
    println!("Validating {}...", path.display());
    load_config(Some(&path)).context("Configuration validation failed")?;
    println!("{}", "✓ Configuration is valid".green());
    Ok(())
}

fn generate(output: &Path) -> Result<()> {
    let yaml = CortexConfig::default().to_yaml()?;
    std::fs::write(output, yaml).with_context(|| format!("Failed to write config to {}", output.display()))?;
    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );
    Ok(())
}
