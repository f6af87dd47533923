//! Command handlers module.
//!
//! - `core.rs`: setup, record, show, list, filter, count
//!
//! Shared here: `--where` parsing and entry output.

mod core;

pub use core::{RecordArgs, cmd_count, cmd_filter, cmd_list, cmd_record, cmd_setup, cmd_show};

use anyhow::{Context, Result, bail};
use auditlog::{BoundDefinition, Filter, FilterName};
use serde_json::Value;

/// Options shared by the entry-printing commands.
#[derive(Debug, Clone, Copy)]
pub struct Output {
    /// Print one JSON object per line instead of text.
    pub json: bool,
}

impl Output {
    /// Prints one entry.
    pub fn entry(self, bound: &BoundDefinition) -> Result<()> {
        let entry = bound.entry();
        if self.json {
            println!("{}", serde_json::to_string(entry).context("encode entry")?);
        } else {
            println!(
                "{}  {:<8}  {}  {}",
                entry.timestamp().to_rfc3339(),
                entry.level(),
                entry.id(),
                bound.label()
            );
            let message = bound.message();
            if !message.is_empty() {
                println!("    {message}");
            }
        }
        Ok(())
    }
}

/// Parses `--where name=v1,v2` clauses into a filter set.
///
/// `data`, `user_id`, and `object_id` values that parse as JSON are kept
/// whole, so objects are not split on their commas. A JSON array given to
/// `user_id` or `object_id` lists its candidates.
pub fn parse_where(clauses: &[String]) -> Result<Vec<Filter>> {
    clauses
        .iter()
        .map(|clause| {
            let Some((name, raw)) = clause.split_once('=') else {
                bail!("expected name=value in --where '{clause}'");
            };
            let Some(name) = FilterName::parse(name) else {
                let known: Vec<_> = FilterName::ALL.iter().map(|n| n.as_str()).collect();
                bail!("unknown filter '{name}' (expected one of: {})", known.join(", "));
            };
            match name {
                FilterName::Data => return parse_values(name, &[raw], clause),
                FilterName::UserId | FilterName::ObjectId => {
                    if let Ok(json) = serde_json::from_str::<Value>(raw) {
                        let candidates = match json {
                            Value::Array(items) => items,
                            other => vec![other],
                        };
                        return Ok(match name {
                            FilterName::UserId => Filter::UserId(candidates),
                            _ => Filter::ObjectId(candidates),
                        });
                    }
                },
                _ => {},
            }
            let values: Vec<&str> = raw.split(',').map(str::trim).collect();
            parse_values(name, &values, clause)
        })
        .collect()
}

fn parse_values(name: FilterName, values: &[&str], clause: &str) -> Result<Filter> {
    Filter::parse_values(name, values).with_context(|| format!("--where '{clause}'"))
}
