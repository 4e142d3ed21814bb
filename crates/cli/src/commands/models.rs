use anyhow::{Context, Result};

use transplant_core::services::models::default_model_registry;

/// List the model backends `--model` accepts.
pub fn list_models_command(json: bool) -> Result<()> {
    let names = default_model_registry().names();
    if json {
        let serialized =
            serde_json::to_string_pretty(&names).context("Failed to serialize models to JSON")?;
        println!("{}", serialized);
        return Ok(());
    }

    println!("Models ({}):", names.len());
    for name in names {
        println!("  - {}", name);
    }
    Ok(())
}
