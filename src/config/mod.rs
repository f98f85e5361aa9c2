//! The configuration pipeline (§4.1): merge → migrate → validate → transform.
//!
//! This is the crate's only disk/env I/O boundary outside the runtime
//! adapter. Everything downstream of [`load`] operates on the domain model
//! in [`crate::domain`] and never touches YAML again.

pub mod error;
pub mod filters;
pub mod merge;
pub mod migrate;
pub mod schema;
pub mod simple;
pub mod transform;
pub mod versions;

use std::path::{Path, PathBuf};

use serde_yaml::Value;

pub use error::ConfigError;
pub use filters::NodeFilter;
pub use simple::SimpleConfig;
pub use transform::{RunSettings, TransformOutput};
pub use versions::ApiVersion;

fn read_yaml(path: &Path) -> Result<Value, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::FileReadFailure {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    serde_yaml::from_str(&raw).map_err(|e| ConfigError::FileReadFailure {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// Resolve a primary file's `include` directive (a list of paths, relative
/// to the primary file's own directory) into the parsed documents, in list
/// order — lower precedence than the primary file itself (§4.1: "flags >
/// primary file > includes > defaults").
fn load_includes(primary_dir: &Path, primary: &Value) -> Result<Vec<Value>, ConfigError> {
    let Some(entries) = primary.get("include").and_then(Value::as_sequence) else {
        return Ok(Vec::new());
    };
    let mut includes = Vec::new();
    for entry in entries {
        let Some(rel) = entry.as_str() else {
            continue;
        };
        includes.push(read_yaml(&primary_dir.join(rel))?);
    }
    Ok(includes)
}

fn strip_include_key(mut doc: Value) -> Value {
    if let Value::Mapping(map) = &mut doc {
        map.remove(Value::String("include".to_string()));
    }
    doc
}

/// Load a `Simple` configuration document from `path`, apply CLI flag
/// overrides (already parsed into a `Value` mapping by the external
/// consumer — clap argument parsing is out of scope here), and run it
/// through the full pipeline to produce the domain aggregate.
pub fn load(path: &Path, flag_overrides: Value) -> Result<TransformOutput, ConfigError> {
    let primary = read_yaml(path)?;
    let primary_dir = path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
    let includes = load_includes(&primary_dir, &primary)?;
    let primary = strip_include_key(primary);

    let merged = merge::merge_layers(merge::empty_mapping(), includes, primary, flag_overrides);
    let migrated = migrate::migrate(merged)?;
    schema::validate(&migrated)?;

    let cfg: SimpleConfig = serde_yaml::from_value(migrated)
        .map_err(|e| ConfigError::SchemaViolation(vec![e.to_string()]))?;

    transform::transform(&cfg, Some(primary_dir.as_path()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn loads_a_minimal_current_version_document() {
        let file = write_temp(&format!(
            r#"
apiVersion: {}
kind: Simple
metadata:
  name: demo
servers: 1
agents: 0
"#,
            ApiVersion::CURRENT.as_str()
        ));
        let out = load(file.path(), merge::empty_mapping()).unwrap();
        assert_eq!(out.cluster.name, "demo");
        assert_eq!(out.cluster.servers().count(), 1);
    }

    #[test]
    fn migrates_an_old_document_transparently() {
        let file = write_temp(
            r#"
apiVersion: k3cluster.io/v1alpha2
kind: Simple
name: demo
servers: 1
agents: 0
exposeAPI:
  hostIP: 0.0.0.0
  hostPort: 6443
"#,
        );
        let out = load(file.path(), merge::empty_mapping()).unwrap();
        assert_eq!(out.cluster.name, "demo");
        assert_eq!(out.cluster.kube_api.host_port, 6443);
    }

    #[test]
    fn flag_overrides_win_over_file_contents() {
        let file = write_temp(&format!(
            r#"
apiVersion: {}
kind: Simple
metadata:
  name: demo
servers: 1
"#,
            ApiVersion::CURRENT.as_str()
        ));
        let flags: Value = serde_yaml::from_str("agents: 3\n").unwrap();
        let out = load(file.path(), flags).unwrap();
        assert_eq!(out.cluster.agents().count(), 3);
    }

    #[test]
    fn rejects_documents_that_fail_schema_validation() {
        let file = write_temp(&format!(
            r#"
apiVersion: {}
kind: Simple
metadata:
  name: "Not Valid!"
"#,
            ApiVersion::CURRENT.as_str()
        ));
        let err = load(file.path(), merge::empty_mapping()).unwrap_err();
        assert!(matches!(err, ConfigError::SchemaViolation(_)));
    }
}
