//! Get command - read keys from a scope

use crate::cli::args::{GetArgs, OutputFormat};
use crate::error::ContextResult;
use crate::store::ContextStore;
use console::style;
use serde_json::{Map, Value};

/// Execute the get command
pub async fn execute(args: GetArgs, store: &ContextStore) -> ContextResult<()> {
    let values = store.get(&args.scope, args.keys.clone()).await?.into_many();

    match args.format {
        OutputFormat::Table => {
            let width = args.keys.iter().map(String::len).max().unwrap_or(0);
            for (key, value) in args.keys.iter().zip(&values) {
                let shown = match value {
                    Some(v) => v.to_string(),
                    None => style("(none)").dim().to_string(),
                };
                println!("{:<width$}  {}", style(key).bold(), shown, width = width);
            }
        }
        OutputFormat::Json => {
            let object: Map<String, Value> = args
                .keys
                .into_iter()
                .zip(values)
                .map(|(key, value)| (key, value.unwrap_or(Value::Null)))
                .collect();
            println!("{}", serde_json::to_string_pretty(&Value::Object(object))?);
        }
        OutputFormat::Plain => {
            for value in values {
                println!("{}", value.map(|v| v.to_string()).unwrap_or_default());
            }
        }
    }

    Ok(())
}
