//! Core command handlers.
//!
//! Each handler works against the registry's active backend.

use super::{Output, parse_where};
use anyhow::{Context, Result, bail};
use auditlog::models::loose_json;
use auditlog::{ContentType, Entry, EntryId, Level, Registry, RequestContext};
use chrono::{DateTime, Utc};

/// Setup command: creates the schema.
pub fn cmd_setup(registry: &Registry) -> Result<()> {
    let backend = registry.backend();
    backend.setup().context("create schema")?;
    println!("Storage ready ({})", backend.name());
    Ok(())
}

/// Fields of a new entry as given on the command line.
#[derive(Debug, Default)]
pub struct RecordArgs {
    /// Entry type.
    pub entry_type: String,
    /// Level name or integer.
    pub level: String,
    /// Explicit identifier.
    pub id: Option<String>,
    /// RFC 3339 timestamp; now when absent.
    pub timestamp: Option<String>,
    /// Acting subject (JSON or plain string).
    pub user: Option<String>,
    /// Affected object (JSON or plain string).
    pub object: Option<String>,
    /// Content type key.
    pub content_type: Option<String>,
    /// JSON object payload.
    pub data: Option<String>,
    /// Extra `key=value` payload fields.
    pub fields: Vec<String>,
}

/// Record command: stores one entry through the registry.
pub fn cmd_record(registry: &Registry, args: RecordArgs) -> Result<()> {
    let entry = build_entry(registry, args)?;
    match registry.log(entry).context("record entry")? {
        Some(id) => println!("{id}"),
        None => println!("Entry rejected by filter"),
    }
    Ok(())
}

fn build_entry(registry: &Registry, args: RecordArgs) -> Result<Entry> {
    let Some(level) = Level::parse(&args.level) else {
        bail!("invalid level '{}'", args.level);
    };
    let mut entry = Entry::new(args.entry_type, level);

    if let Some(id) = args.id {
        entry = entry.with_id(id.parse::<EntryId>()?);
    }
    if let Some(ts) = args.timestamp {
        let ts = DateTime::parse_from_rfc3339(&ts)
            .with_context(|| format!("invalid timestamp '{ts}'"))?;
        entry = entry.with_timestamp(ts.with_timezone(&Utc));
    }
    if let Some(user) = args.user {
        entry = entry.with_user_id(loose_json(&user));
    }
    if let Some(object) = args.object {
        entry = entry.with_object_id(loose_json(&object));
    }
    if let Some(key) = args.content_type {
        if !registry.content_types().contains(&key) {
            bail!("content type '{key}' is not registered (add it to content_types)");
        }
        let Some(content_type) = ContentType::parse(&key) else {
            bail!("invalid content type '{key}'");
        };
        entry = entry.with_content_type(content_type);
    }
    if let Some(data) = args.data {
        let data = serde_json::from_str(&data).context("--data must be a JSON object")?;
        entry = entry.with_data(data);
    }
    for field in args.fields {
        let Some((key, value)) = field.split_once('=') else {
            bail!("expected key=value in --field '{field}'");
        };
        entry = entry.with_field(key, loose_json(value));
    }

    Ok(entry)
}

/// Show command: prints one entry.
pub fn cmd_show(registry: &Registry, id: &str, output: Output) -> Result<()> {
    let id: EntryId = id.parse()?;
    let entry = registry.backend().retrieve(id)?;
    output.entry(&registry.define(&RequestContext::new(), entry))
}

/// List command: prints a page, optionally of one type.
pub fn cmd_list(
    registry: &Registry,
    entry_type: Option<&str>,
    limit: usize,
    offset: usize,
    output: Output,
) -> Result<()> {
    let backend = registry.backend();
    let entries = match entry_type {
        Some(t) => backend.retrieve_typed(t, limit, offset)?,
        None => backend.retrieve_many(limit, offset)?,
    };
    print_all(registry, entries, output)
}

/// Filter command: prints the matching page.
pub fn cmd_filter(
    registry: &Registry,
    clauses: &[String],
    limit: usize,
    offset: usize,
    output: Output,
) -> Result<()> {
    let filters = parse_where(clauses)?;
    let entries = registry.backend().entry_filter(&filters, limit, offset)?;
    print_all(registry, entries, output)
}

/// Count command: prints the number of matching entries.
pub fn cmd_count(registry: &Registry, clauses: &[String]) -> Result<()> {
    let filters = parse_where(clauses)?;
    println!("{}", registry.backend().count_filter(&filters)?);
    Ok(())
}

fn print_all(registry: &Registry, entries: Vec<Entry>, output: Output) -> Result<()> {
    let ctx = RequestContext::new();
    for bound in registry.define_many(&ctx, entries) {
        output.entry(&bound)?;
    }
    Ok(())
}
