use std::io::Read;

use serde_json::{json, Value};

use crate::cli::OutputFormat;
use crate::store::Record;

/// Output a success message in the appropriate format
pub fn output_success(
    output_format: &OutputFormat,
    message: &str,
    data: Option<Value>,
) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let mut response = json!({
                "success": true,
                "message": message
            });

            if let Some(data_value) = data {
                response["data"] = data_value;
            }

            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            println!("✓ {}", message);
        }
    }
    Ok(())
}

/// Output an error message in the appropriate format
pub fn output_error(
    output_format: &OutputFormat,
    message: &str,
    error_code: Option<&str>,
) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let mut response = json!({
                "success": false,
                "error": message
            });

            if let Some(code) = error_code {
                response["error_code"] = json!(code);
            }

            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            eprintln!("Error: {}", message);
        }
    }
    Ok(())
}

/// Output records: one compact line per record in text mode
pub fn output_records(
    output_format: &OutputFormat,
    collection: &str,
    records: &[Record],
) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&json!({
                "success": true,
                "collection": collection,
                "data": records
            }))?);
        }
        OutputFormat::Text => {
            if records.is_empty() {
                println!("No records in '{}'", collection);
            }
            for record in records {
                println!("{:>6}  {}", record.id(), serde_json::to_string(record)?);
            }
        }
    }
    Ok(())
}

/// Output a single record, pretty-printed in both formats
pub fn output_record(output_format: &OutputFormat, record: &Record) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&json!({
                "success": true,
                "data": record
            }))?);
        }
        OutputFormat::Text => {
            println!("{}", serde_json::to_string_pretty(record)?);
        }
    }
    Ok(())
}

/// JSON from the argument if given, otherwise from stdin
pub fn read_json_input(arg: Option<String>) -> anyhow::Result<Value> {
    let text = match arg {
        Some(text) => text,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    if text.trim().is_empty() {
        anyhow::bail!("no JSON input provided (pass it as an argument or on stdin)");
    }
    serde_json::from_str(&text).map_err(|e| anyhow::anyhow!("invalid JSON input: {}", e))
}
