use serde_json::json;

use crate::cli::OutputFormat;
use crate::store::DataDir;

/// List collections on disk with their record counts
pub async fn handle(data_dir: &DataDir, output_format: OutputFormat) -> anyhow::Result<()> {
    let mut rows = Vec::new();
    for name in data_dir.collections().await? {
        let count = data_dir.collection(&name).await?.count().await?;
        rows.push((name, count));
    }

    match output_format {
        OutputFormat::Json => {
            let collections: Vec<_> = rows
                .iter()
                .map(|(name, count)| json!({ "name": name, "records": count }))
                .collect();
            println!("{}", serde_json::to_string_pretty(&json!({
                "data_dir": data_dir.root().display().to_string(),
                "collections": collections
            }))?);
        }
        OutputFormat::Text => {
            println!("Data directory: {}", data_dir.root().display());
            if rows.is_empty() {
                println!("No collections");
            }
            for (name, count) in rows {
                println!("  {:<24} {:>6} records", name, count);
            }
        }
    }
    Ok(())
}
