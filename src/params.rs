//! Raw parameters from a params file plus `--set` overrides.
//!
//! Both sources merge into one TOML table, later sources winning, before a
//! single typed deserialization into [`RawParameters`]. Keys may use dashes
//! or underscores.

use anyhow::{Context, Result, bail};
use decorator::RawParameters;
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;
use toml::{Table, Value};

static KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("parameter key pattern is valid"));

/// Flags that map straight onto parameters.
#[derive(Debug, Default)]
pub struct Overrides<'a> {
    pub resource_group: &'a str,
    pub name: &'a str,
    pub yes: bool,
    pub no_wait: bool,
}

fn normalize_key(key: &str) -> String {
    key.trim().replace('-', "_")
}

/// Read a params file, TOML or JSON by extension.
pub fn load_params_file(path: &Path) -> Result<Table> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Could not read params file: {}", path.display()))?;

    let table: Table = if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json")) {
        let mut value: serde_json::Value = serde_json::from_str(&content)
            .with_context(|| format!("Invalid JSON in {}", path.display()))?;
        if !value.is_object() {
            bail!("{} must contain a JSON object", path.display());
        }
        drop_nulls(&mut value);
        serde_json::from_value(value)
            .with_context(|| format!("Unsupported value in {}", path.display()))?
    } else {
        toml::from_str(&content).with_context(|| format!("Invalid TOML in {}", path.display()))?
    };

    Ok(table
        .into_iter()
        .map(|(key, value)| (normalize_key(&key), value))
        .collect())
}

/// JSON `null` means "not given", which TOML has no value for.
fn drop_nulls(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            map.retain(|_, v| !v.is_null());
            map.values_mut().for_each(drop_nulls);
        }
        serde_json::Value::Array(items) => items.iter_mut().for_each(drop_nulls),
        _ => {}
    }
}

/// Parse one `key=value` override.
///
/// The value is read as a TOML literal (`true`, `3`, `["1", "2"]`,
/// `{ env = "prod" }`, `"quoted"`); anything else, including bare decimals
/// such as `1.29`, is taken as a plain string.
pub fn parse_set(expr: &str) -> Result<(String, Value)> {
    let Some((key, raw)) = expr.split_once('=') else {
        bail!("Invalid --set '{expr}', expected key=value");
    };
    let key = normalize_key(key);
    if key.is_empty() {
        bail!("Invalid --set '{expr}', key is empty");
    }
    if !KEY_RE.is_match(&key) {
        bail!("Invalid --set '{expr}', keys are lowercase parameter names");
    }

    let raw = raw.trim();
    let literal = toml::from_str::<Table>(&format!("value = {raw}"))
        .ok()
        .and_then(|mut table| table.remove("value"))
        .filter(|value| !matches!(value, Value::Float(_) | Value::Datetime(_)));
    Ok((key, literal.unwrap_or_else(|| Value::String(raw.to_string()))))
}

/// Merge every source into typed raw parameters.
pub fn build_raw(
    params_file: Option<&Path>,
    sets: &[String],
    overrides: &Overrides<'_>,
) -> Result<RawParameters> {
    let mut table = match params_file {
        Some(path) => load_params_file(path)?,
        None => Table::new(),
    };

    for expr in sets {
        let (key, value) = parse_set(expr)?;
        log::debug!("--set {key}");
        table.insert(key, value);
    }

    table.insert(
        "resource_group_name".to_string(),
        Value::String(overrides.resource_group.to_string()),
    );
    table.insert("name".to_string(), Value::String(overrides.name.to_string()));
    if overrides.yes {
        table.insert("yes".to_string(), Value::Boolean(true));
    }
    if overrides.no_wait {
        table.insert("no_wait".to_string(), Value::Boolean(true));
    }

    Value::Table(table)
        .try_into()
        .context("Invalid parameters")
}

// ============================================================================
// Tests
// ============================================================================
