//! `spqf config` and `spqf defaults`: inspect and edit config documents.

use serde_json::Value;
use spqf::chat::{ConfigStore, JsonDocStore};
use spqf::config::{ConfigDoc, DefaultConfig, VOTE_CONFIG_KEY};
use std::path::Path;

/// What `spqf config <doc> ...` was asked to do.
#[derive(Debug, Clone, PartialEq)]
pub enum DocEdit {
    Show,
    Get(String),
    Set(String, Value),
    Delete(String),
}

/// Parse the arguments after the document name:
/// `[]`, `[key]`, `[key, "="]` or `[key, "=", value...]`.
pub fn parse_edit(args: &[String]) -> Result<DocEdit, String> {
    match args {
        [] => Ok(DocEdit::Show),
        [key] => Ok(DocEdit::Get(key.clone())),
        [key, eq] if eq == "=" => Ok(DocEdit::Delete(key.clone())),
        [key, eq, value @ ..] if eq == "=" => {
            Ok(DocEdit::Set(key.clone(), parse_value(&value.join(" "))))
        }
        _ => Err("usage: spqf config <doc> [key] [= [value]]".to_string()),
    }
}

/// Numbers and booleans keep their type; anything else is a string.
pub fn parse_value(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(v @ (Value::Number(_) | Value::Bool(_))) => v,
        _ => Value::String(raw.to_string()),
    }
}

/// Apply `edit` to document `name` and return what to print.
pub async fn apply(
    store: &dyn ConfigStore,
    name: &str,
    edit: DocEdit,
) -> Result<String, Box<dyn std::error::Error>> {
    let mut doc = store.load(name).await?;
    match edit {
        DocEdit::Show => Ok(doc.to_string()),
        DocEdit::Get(key) => match doc.get(&key) {
            Some(value) => Ok(render(value)),
            None => Err(format!("'{}' has no key '{}'", name, key).into()),
        },
        DocEdit::Set(key, value) => {
            doc.put(&key, value.clone());
            store.save(name, &doc).await?;
            tracing::info!(doc = %name, key = %key, "config document updated");
            Ok(format!("{} = {}", key, render(&value)))
        }
        DocEdit::Delete(key) => {
            if !doc.remove(&key) {
                return Err(format!("'{}' has no key '{}'", name, key).into());
            }
            store.save(name, &doc).await?;
            tracing::info!(doc = %name, key = %key, "config document key removed");
            Ok(format!("{} deleted", key))
        }
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(_) => ConfigDoc::from_value(value.clone()).to_string(),
        other => other.to_string(),
    }
}

pub async fn execute_config(
    db_dir: &Path,
    name: String,
    args: Vec<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let edit = parse_edit(&args)?;
    let store = JsonDocStore::open(db_dir);
    println!("{}", apply(&store, &name, edit).await?);
    Ok(())
}

pub async fn execute_defaults(db_dir: &Path, name: String) -> Result<(), Box<dyn std::error::Error>> {
    let store = JsonDocStore::open(db_dir);
    let mut doc = store.load(&name).await?;
    let mut cfg = doc.get_child(VOTE_CONFIG_KEY).unwrap_or_default();

    let inserted = DefaultConfig::configure(&mut cfg);
    if inserted > 0 {
        doc.put_child(VOTE_CONFIG_KEY, cfg);
        store.save(&name, &doc).await?;
    }
    println!("{}: {} default vote settings added", name, inserted);
    Ok(())
}
