//! Default host capability: shell actions plus a few project queries.
//!
//! Embedders with their own host application build a [`HostCapability`] from
//! their own runner and registry instead.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use bridge_spec::QueryParams;
use serde_json::{json, Value};

use crate::capability::{HostCapability, QueryRegistry};
use crate::runner::ShellActionRunner;

/// Query returning the project title and path.
pub const GET_PROJECT_INFO: &str = "get_project_info";
/// Query listing the project directory.
pub const LIST_ENTRIES: &str = "list_entries";
/// Query describing the running executor.
pub const GET_BRIDGE_INFO: &str = "get_bridge_info";

/// Build the default capability rooted at `project_dir`.
pub fn project_capability(project_dir: &Path, base_dir: &Path) -> anyhow::Result<HostCapability> {
    let project_dir = project_dir
        .canonicalize()
        .with_context(|| format!("project directory {} is not accessible", project_dir.display()))?;
    let runner = ShellActionRunner::new(project_dir.clone());
    Ok(HostCapability::new(
        Arc::new(runner),
        project_queries(project_dir, base_dir.to_path_buf()),
    ))
}

/// Query handlers describing `project_dir`.
pub fn project_queries(project_dir: PathBuf, base_dir: PathBuf) -> QueryRegistry {
    let info_dir = project_dir.clone();
    QueryRegistry::new()
        .with(GET_PROJECT_INFO, move |_| Ok(project_info(&info_dir)))
        .with(LIST_ENTRIES, move |params| list_entries(&project_dir, params))
        .with(GET_BRIDGE_INFO, move |_| {
            Ok(json!({
                "base_dir": base_dir.display().to_string(),
                "pid": std::process::id(),
                "version": env!("CARGO_PKG_VERSION"),
            }))
        })
}

fn project_info(dir: &Path) -> Value {
    let title = dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    json!({ "Title": title, "Path": dir.display().to_string() })
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    File,
    Dir,
}

impl EntryKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Dir => "dir",
        }
    }
}

fn kind_filter(params: Option<&QueryParams>) -> anyhow::Result<Option<EntryKind>> {
    let Some(raw) = params.and_then(|p| p.get("kind")) else {
        return Ok(None);
    };
    match raw.as_str() {
        Some("file") => Ok(Some(EntryKind::File)),
        Some("dir") => Ok(Some(EntryKind::Dir)),
        _ => anyhow::bail!("unsupported kind filter {raw}; expected \"file\" or \"dir\""),
    }
}

fn list_entries(dir: &Path, params: Option<&QueryParams>) -> anyhow::Result<Value> {
    let filter = kind_filter(params)?;
    let mut entries = Vec::new();
    for entry in
        fs::read_dir(dir).with_context(|| format!("failed to list {}", dir.display()))?
    {
        let entry = entry?;
        let meta = entry.metadata()?;
        let kind = if meta.is_dir() {
            EntryKind::Dir
        } else {
            EntryKind::File
        };
        if filter.is_some_and(|wanted| wanted != kind) {
            continue;
        }
        entries.push((
            entry.file_name().to_string_lossy().into_owned(),
            kind,
            meta.len(),
        ));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(Value::Array(
        entries
            .into_iter()
            .map(|(name, kind, size)| {
                Value::String(format!(
                    "Entry: {name} Kind: {} Size: {size}",
                    kind.as_str()
                ))
            })
            .collect(),
    ))
}
