// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Ingestion commands
//!
//! Commands: ingest, ingest-batch

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

use memex_cortex::application::IngestRequest;
use memex_cortex::domain::{ArbitrationResult, Decision};

use super::{print_json, TypeArg};
use crate::wiring::Runtime;

#[derive(Debug, Args)]
pub struct IngestArgs {
    /// Memory content
    #[arg(value_name = "CONTENT")]
    pub content: String,

    #[arg(short = 't', long = "type", value_enum, default_value = "pattern")]
    pub memory_type: TypeArg,

    #[arg(short, long)]
    pub workspace: Option<String>,

    /// Tag (repeatable)
    #[arg(long = "tag", value_name = "TAG")]
    pub tags: Vec<String>,

    /// Where the knowledge came from
    #[arg(long)]
    pub source: Option<String>,

    /// Caller confidence in [0, 1]
    #[arg(long)]
    pub confidence: Option<f64>,

    /// Print the full result as JSON
    #[arg(long)]
    pub json: bool,
}

impl IngestArgs {
    pub fn into_request(self) -> IngestRequest {
        let mut request = IngestRequest::new(self.content, self.memory_type.into()).with_tags(self.tags);
        request.workspace = self.workspace;
        request.context.source = self.source;
        request.context.confidence = self.confidence;
        request
    }
}

#[derive(Debug, Args)]
pub struct IngestBatchArgs {
    /// JSON file holding an array of ingest requests
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    #[arg(long)]
    pub json: bool,
}

pub async fn ingest(runtime: &Runtime, args: IngestArgs) -> Result<()> {
    let json = args.json;
    let result = runtime
        .service
        .ingest(args.into_request())
        .await
        .context("Ingestion failed")?;
    runtime.persist().await?;

    if json {
        return print_json(&result);
    }
    print_result(&result);
    Ok(())
}

pub async fn ingest_batch(runtime: &Runtime, args: IngestBatchArgs) -> Result<()> {
    let raw = std::fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let requests: Vec<IngestRequest> = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a JSON array of ingest requests", args.file.display()))?;

    let results = runtime.service.ingest_batch(requests).await;
    runtime.persist().await?;

    if args.json {
        return print_json(&results);
    }
    for result in &results {
        print_result(result);
    }
    let stored = results.iter().filter(|r| r.memory_id.is_some()).count();
    println!();
    println!("{} of {} candidates stored", stored, results.len());
    Ok(())
}

fn print_result(result: &ArbitrationResult) {
    let decision = match result.decision {
        Decision::Add => result.decision.to_string().green(),
        Decision::Update | Decision::Merge => result.decision.to_string().cyan(),
        Decision::Deprecate => result.decision.to_string().yellow(),
        Decision::Reject => result.decision.to_string().red(),
    };
    println!("{} ({:.2}) {}", decision.bold(), result.confidence, result.reasoning);
    if let Some(id) = result.memory_id {
        println!("  memory: {}", id);
    }
    if result.review_required() {
        println!("  {}", "review required".yellow());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memex_cortex::domain::MemoryType;

    #[test]
    fn test_args_map_onto_request() {
        let args = IngestArgs {
            content: "Two-space indent".to_string(),
            memory_type: TypeArg::Workspace,
            workspace: Some("svc".to_string()),
            tags: vec!["style".to_string()],
            source: Some("review".to_string()),
            confidence: Some(0.7),
            json: false,
        };

        let request = args.into_request();

        assert_eq!(request.memory_type, MemoryType::Workspace);
        assert_eq!(request.workspace.as_deref(), Some("svc"));
        assert!(request.context.tags.contains("style"));
        assert_eq!(request.context.source.as_deref(), Some("review"));
        assert_eq!(request.context.confidence, Some(0.7));
    }
}
