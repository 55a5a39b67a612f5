//! Policy cascade: builtin defaults, then policy files in order, then `HEALKIT_POLICY__*`
//! variables and the JSON blob, then the CLI-style override list. Later layers win.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::api::apply_override_to_snapshot;
use crate::defaults::default_snapshot;
use crate::errors::PolicyError;
use crate::model::{PolicySnapshot, PolicySource};

const ENV_PREFIX: &str = "HEALKIT_POLICY__";
const ENV_JSON: &str = "HEALKIT_POLICY_OVERRIDE_JSON";
const ENV_CLI_OVERRIDES: &str = "HEALKIT_POLICY_CLI_OVERRIDES";

const SECTIONS: [&str; 5] = ["resolution", "gate", "heal", "cache", "profile"];

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub paths: Vec<PathBuf>,
    pub include_env: bool,
    pub include_cli_env: bool,
}

impl LoadOptions {
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            paths: vec![path.into()],
            ..Self::env_only()
        }
    }

    /// Builtin defaults plus the given files; process env is ignored.
    pub fn files_only(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            paths: paths.into_iter().collect(),
            include_env: false,
            include_cli_env: false,
        }
    }

    fn env_only() -> Self {
        Self {
            paths: Vec::new(),
            include_env: true,
            include_cli_env: true,
        }
    }
}

/// Defaults, the optional file, and both env layers.
pub fn load_snapshot(path: Option<&Path>) -> Result<PolicySnapshot, PolicyError> {
    let options = match path {
        Some(path) => LoadOptions::with_path(path),
        None => LoadOptions::env_only(),
    };
    load_snapshot_with_options(&options)
}

pub fn load_snapshot_with_options(options: &LoadOptions) -> Result<PolicySnapshot, PolicyError> {
    let mut snapshot = default_snapshot();
    mark_builtin(&mut snapshot)?;

    let mut assignments = Vec::new();
    for path in &options.paths {
        if let Some(document) = read_policy_file(path)? {
            assignments.extend(flatten(document, PolicySource::File));
        }
    }
    if options.include_env {
        assignments.extend(env_assignments(env::vars()));
        if let Ok(raw) = env::var(ENV_JSON) {
            assignments.extend(json_assignments(&raw)?);
        }
    }
    if options.include_cli_env {
        if let Ok(raw) = env::var(ENV_CLI_OVERRIDES) {
            assignments.extend(cli_assignments(&raw));
        }
    }

    let applied = assignments.len();
    for assignment in assignments {
        apply_override_to_snapshot(
            &mut snapshot,
            &assignment.path,
            &assignment.value,
            assignment.source,
        )?;
    }
    debug!(applied, files = options.paths.len(), "policy snapshot loaded");
    Ok(snapshot)
}

/// One `section.key = value` setting and the layer it came from.
#[derive(Debug, PartialEq)]
struct Assignment {
    path: String,
    value: Value,
    source: PolicySource,
}

/// Missing files are skipped. `.json` is parsed as JSON, anything else as YAML.
fn read_policy_file(path: &Path) -> Result<Option<Value>, PolicyError> {
    if !path.exists() {
        debug!(path = %path.display(), "policy file absent, skipping");
        return Ok(None);
    }
    let content = fs::read_to_string(path)
        .map_err(|err| PolicyError::Io(format!("{}: {}", path.display(), err)))?;
    let is_json = path
        .extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("json"));
    let document = if is_json {
        serde_json::from_str::<Value>(&content)
            .map_err(|err| PolicyError::Invalid(format!("{}: {}", path.display(), err)))?
    } else {
        serde_yaml::from_str::<Value>(&content)
            .map_err(|err| PolicyError::Invalid(format!("{}: {}", path.display(), err)))?
    };
    Ok(Some(document))
}

/// `HEALKIT_POLICY__HEAL__BACKOFF_MS=250` becomes `heal.backoff_ms = 250`.
/// Sorted by variable name so the result does not depend on env iteration order.
fn env_assignments(vars: impl IntoIterator<Item = (String, String)>) -> Vec<Assignment> {
    let selected: BTreeMap<String, String> = vars
        .into_iter()
        .filter_map(|(key, raw)| {
            let path = key
                .strip_prefix(ENV_PREFIX)?
                .split("__")
                .filter(|segment| !segment.is_empty())
                .map(str::to_ascii_lowercase)
                .collect::<Vec<_>>()
                .join(".");
            (!path.is_empty()).then_some((path, raw))
        })
        .collect();
    selected
        .into_iter()
        .map(|(path, raw)| Assignment {
            path,
            value: parse_scalar(&raw),
            source: PolicySource::Env,
        })
        .collect()
}

fn json_assignments(raw: &str) -> Result<Vec<Assignment>, PolicyError> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    let document: Value = serde_json::from_str(raw)
        .map_err(|err| PolicyError::Invalid(format!("{ENV_JSON}: {err}")))?;
    Ok(flatten(document, PolicySource::Env))
}

/// `"heal.max_rounds=2, profile.override=static"`; a bare path clears the value.
fn cli_assignments(raw: &str) -> Vec<Assignment> {
    raw.split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .filter_map(|token| {
            let (path, value) = token.split_once('=').unwrap_or((token, ""));
            let path = path.trim();
            (!path.is_empty()).then(|| Assignment {
                path: path.to_string(),
                value: parse_scalar(value.trim()),
                source: PolicySource::Cli,
            })
        })
        .collect()
}

/// JSON if it parses, otherwise the raw string. Empty means null.
fn parse_scalar(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::Null;
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Objects become dotted paths; arrays and scalars are leaves.
fn flatten(document: Value, source: PolicySource) -> Vec<Assignment> {
    let mut out = Vec::new();
    let mut path = Vec::new();
    walk(document, &mut path, source, &mut out);
    out
}

fn walk(value: Value, path: &mut Vec<String>, source: PolicySource, out: &mut Vec<Assignment>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                path.push(key.trim().to_ascii_lowercase());
                walk(child, path, source, out);
                path.pop();
            }
        }
        leaf if !path.is_empty() => out.push(Assignment {
            path: path.join("."),
            value: leaf,
            source,
        }),
        _ => {}
    }
}

fn mark_builtin(snapshot: &mut PolicySnapshot) -> Result<(), PolicyError> {
    let document = serde_json::to_value(&*snapshot)
        .map_err(|err| PolicyError::Invalid(err.to_string()))?;
    let Value::Object(mut sections) = document else {
        return Ok(());
    };
    for name in SECTIONS {
        if let Some(section) = sections.remove(name) {
            let mut path = vec![name.to_string()];
            let mut leaves = Vec::new();
            walk(section, &mut path, PolicySource::Builtin, &mut leaves);
            for leaf in leaves {
                snapshot.set_provenance(&leaf.path, leaf.source);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn env_names_map_to_dotted_paths_in_name_order() {
        let vars = vec![
            ("HEALKIT_POLICY__HEAL__BACKOFF_MS".to_string(), "250".to_string()),
            ("PATH".to_string(), "/usr/bin".to_string()),
            ("HEALKIT_POLICY__CACHE__DRIFT_THRESHOLD".to_string(), "0.3".to_string()),
            ("HEALKIT_POLICY__".to_string(), "ignored".to_string()),
        ];
        let assignments = env_assignments(vars);
        let paths: Vec<&str> = assignments.iter().map(|a| a.path.as_str()).collect();
        assert_eq!(paths, vec!["cache.drift_threshold", "heal.backoff_ms"]);
        assert_eq!(assignments[1].value, json!(250));
    }

    #[test]
    fn cli_tokens_parse_scalars_and_bare_paths() {
        let assignments = cli_assignments(" profile.override=static, ,cache.durable_path ");
        assert_eq!(
            assignments,
            vec![
                Assignment {
                    path: "profile.override".into(),
                    value: json!("static"),
                    source: PolicySource::Cli,
                },
                Assignment {
                    path: "cache.durable_path".into(),
                    value: Value::Null,
                    source: PolicySource::Cli,
                },
            ]
        );
    }

    #[test]
    fn nested_documents_flatten_to_leaves() {
        let leaves = flatten(
            json!({"gate": {"Stability_Samples": 4}, "profile": {"framework_markers": ["ng-version"]}}),
            PolicySource::File,
        );
        let paths: Vec<&str> = leaves.iter().map(|a| a.path.as_str()).collect();
        assert_eq!(paths, vec!["gate.stability_samples", "profile.framework_markers"]);
    }
}
