use std::path::PathBuf;

use anyhow::Context;
use clap::Subcommand;
use serde_json::Value;

use crate::cli::utils::{output_error, output_record, output_records, output_success, read_json_input};
use crate::cli::{OutputFormat, Reported};
use crate::store::{DataDir, Fields, RecordId, RecordStore};

#[derive(Subcommand)]
pub enum DataCommands {
    #[command(about = "List all records in a collection")]
    List {
        #[arg(help = "Collection name")]
        collection: String,
    },

    #[command(about = "Show one record")]
    Get {
        #[arg(help = "Collection name")]
        collection: String,
        #[arg(help = "Record ID")]
        id: RecordId,
    },

    #[command(about = "Create a record from a JSON object (argument or stdin)")]
    Create {
        #[arg(help = "Collection name")]
        collection: String,
        #[arg(help = "JSON object; read from stdin when omitted")]
        json: Option<String>,
    },

    #[command(about = "Shallow-merge a JSON object into a record (argument or stdin)")]
    Update {
        #[arg(help = "Collection name")]
        collection: String,
        #[arg(help = "Record ID")]
        id: RecordId,
        #[arg(help = "JSON object; read from stdin when omitted")]
        json: Option<String>,
    },

    #[command(about = "Delete a record")]
    Delete {
        #[arg(help = "Collection name")]
        collection: String,
        #[arg(help = "Record ID")]
        id: RecordId,
    },

    #[command(about = "Export a collection to a JSON file")]
    Export {
        #[arg(help = "Collection name")]
        collection: String,
        #[arg(help = "Output file path")]
        output: PathBuf,
    },

    #[command(about = "Import a JSON array of objects; ids and timestamps are reassigned")]
    Import {
        #[arg(help = "Collection name")]
        collection: String,
        #[arg(help = "Input file path")]
        input: PathBuf,
    },
}

pub async fn handle(
    cmd: DataCommands,
    data_dir: &DataDir,
    output_format: OutputFormat,
) -> anyhow::Result<()> {
    match cmd {
        DataCommands::List { collection } => {
            let store = data_dir.collection(&collection).await?;
            let records = store.find_all().await?;
            output_records(&output_format, &collection, &records)
        }
        DataCommands::Get { collection, id } => {
            let store = data_dir.collection(&collection).await?;
            match store.find_by_id(id).await? {
                Some(record) => output_record(&output_format, &record),
                None => Err(not_found(&output_format, &collection, id)),
            }
        }
        DataCommands::Create { collection, json } => {
            let store = data_dir.collection(&collection).await?;
            let fields = Fields::from_json(read_json_input(json)?)?;
            let record = store.create(fields).await?;
            output_success(
                &output_format,
                &format!("Created record {} in '{}'", record.id(), collection),
                Some(record.into_value()),
            )
        }
        DataCommands::Update { collection, id, json } => {
            let store = data_dir.collection(&collection).await?;
            let fields = Fields::from_json(read_json_input(json)?)?;
            match store.update(id, fields).await? {
                Some(record) => output_success(
                    &output_format,
                    &format!("Updated record {} in '{}'", id, collection),
                    Some(record.into_value()),
                ),
                None => Err(not_found(&output_format, &collection, id)),
            }
        }
        DataCommands::Delete { collection, id } => {
            let store = data_dir.collection(&collection).await?;
            if !store.delete(id).await? {
                return Err(not_found(&output_format, &collection, id));
            }
            output_success(
                &output_format,
                &format!("Deleted record {} from '{}'", id, collection),
                None,
            )
        }
        DataCommands::Export { collection, output } => {
            let store = data_dir.collection(&collection).await?;
            let records = store.find_all().await?;
            let text = serde_json::to_string_pretty(&records)?;
            tokio::fs::write(&output, text)
                .await
                .with_context(|| format!("failed to write {}", output.display()))?;
            output_success(
                &output_format,
                &format!("Exported {} records to {}", records.len(), output.display()),
                None,
            )
        }
        DataCommands::Import { collection, input } => {
            let store = data_dir.collection(&collection).await?;
            let text = tokio::fs::read_to_string(&input)
                .await
                .with_context(|| format!("failed to read {}", input.display()))?;
            let count = import_records(&store, serde_json::from_str(&text)?).await?;
            output_success(
                &output_format,
                &format!("Imported {} records into '{}'", count, collection),
                None,
            )
        }
    }
}

/// Print the not-found error once and hand back an already-reported error
fn not_found(output_format: &OutputFormat, collection: &str, id: RecordId) -> anyhow::Error {
    let message = format!("record {} not found in '{}'", id, collection);
    if let Err(e) = output_error(output_format, &message, Some("NOT_FOUND")) {
        return e;
    }
    Reported(message).into()
}

/// Validate every element first, then create them all in one write.
/// Store-owned fields in the input are dropped and reassigned.
async fn import_records(store: &RecordStore, input: Value) -> anyhow::Result<usize> {
    let Value::Array(items) = input else {
        anyhow::bail!("import file must contain a JSON array");
    };

    let batch = items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(map) => {
                let mut fields = Fields::new();
                for (key, value) in map {
                    fields.insert(key, value);
                }
                Ok(fields)
            }
            _ => Err(anyhow::anyhow!("element {} is not a JSON object, nothing imported", i)),
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(store.create_many(batch).await?.len())
}
