use anyhow::{Context, Result};
use serde::Serialize;

use transplant_core::analysis::{load_snapshot, plan_translation, OrderKind};

use crate::canonicalize_or_current;

#[derive(Debug, Serialize)]
struct OrderEntry {
    name: String,
    file: String,
    span: String,
}

/// Print the functions reachable from `entry`, callees first.
pub fn order_command(functions: &str, entry: &str, json: bool) -> Result<()> {
    let path = canonicalize_or_current(functions)?;
    let records = load_snapshot(&path)?;
    let plan = plan_translation(records, entry)
        .with_context(|| format!("Failed to order functions from {}", path.display()))?;
    let kind = plan.kind();

    let entries: Vec<OrderEntry> = plan
        .map(|f| OrderEntry {
            name: f.name,
            file: f.file.display().to_string(),
            span: f.span.to_string(),
        })
        .collect();

    if json {
        let serialized =
            serde_json::to_string_pretty(&entries).context("Failed to serialize order to JSON")?;
        println!("{}", serialized);
        return Ok(());
    }

    println!("Translation order ({}):", entries.len());
    if kind == OrderKind::PostOrderFallback {
        println!("  (call graph has a cycle; order within the cycle is arbitrary)");
    }
    for (idx, entry) in entries.iter().enumerate() {
        println!("  {:>3}. {} ({}:{})", idx + 1, entry.name, entry.file, entry.span);
    }
    Ok(())
}
