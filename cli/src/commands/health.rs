// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Health command

use anyhow::Result;
use colored::Colorize;

use memex_cortex::domain::HealthStatus;

use super::print_json;
use crate::wiring::Runtime;

pub async fn health(runtime: &Runtime, json: bool) -> Result<()> {
    let report = runtime.service.health().await;
    if json {
        return print_json(&report);
    }

    let status = match report.status {
        HealthStatus::Healthy => "healthy".green(),
        HealthStatus::Degraded => "degraded".yellow(),
        HealthStatus::Unhealthy => "unhealthy".red(),
    };
    println!("Status: {}", status.bold());
    for component in &report.components {
        let mark = if component.healthy { "✓".green() } else { "✗".red() };
        let latency = component
            .latency_ms
            .map(|ms| format!("{} ms", ms))
            .unwrap_or_default();
        println!("  {} {:?} {}", mark, component.component, latency.dimmed());
        if let Some(error) = &component.error {
            println!("      {}", error.red());
        }
    }
    Ok(())
}
