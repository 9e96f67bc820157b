//! Reading and writing `conda-forge.yml`.
//!
//! Feedstocks sometimes carry an empty file or a bare `[]`; both read as an
//! empty mapping. Key order is kept on rewrite; comments are not.

use std::path::Path;

use anyhow::{bail, Context};
use serde_yaml::{Mapping, Value};

pub const CONDA_FORGE_YML: &str = "conda-forge.yml";

/// Parse `conda-forge.yml` text into its top-level mapping.
pub fn parse(raw: &str) -> anyhow::Result<Mapping> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "[]" || trimmed == "[ ]" {
        return Ok(Mapping::new());
    }
    match serde_yaml::from_str::<Value>(raw).context("parsing conda-forge.yml")? {
        Value::Mapping(map) => Ok(map),
        Value::Null => Ok(Mapping::new()),
        other => bail!("conda-forge.yml is not a mapping: {other:?}"),
    }
}

/// Read the file; a missing file reads as empty.
pub fn read(path: &Path) -> anyhow::Result<Mapping> {
    if !path.exists() {
        return Ok(Mapping::new());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    parse(&raw)
}

pub fn write(path: &Path, cfg: &Mapping) -> anyhow::Result<()> {
    let raw = serde_yaml::to_string(cfg)?;
    std::fs::write(path, raw).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

/// `cfg[outer][inner]`, when `cfg[outer]` is a mapping.
pub fn nested<'a>(cfg: &'a Mapping, outer: &str, inner: &str) -> Option<&'a Value> {
    cfg.get(outer)?.as_mapping()?.get(inner)
}

/// Set `cfg[outer][inner] = value`, replacing a non-mapping `outer`.
pub fn set_nested(cfg: &mut Mapping, outer: &str, inner: &str, value: Value) {
    let key = Value::from(outer);
    if !cfg.get(&key).is_some_and(Value::is_mapping) {
        cfg.insert(key.clone(), Value::Mapping(Mapping::new()));
    }
    if let Some(Value::Mapping(map)) = cfg.get_mut(&key) {
        map.insert(Value::from(inner), value);
    }
}
