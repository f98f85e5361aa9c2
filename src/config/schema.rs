//! Schema validation (§4.1 stage 3): checked against the migrated,
//! fully-merged document. Collects every violation rather than stopping
//! at the first (§8 invariant: "all errors surfaced, not just the first").

use std::collections::HashSet;

use serde_yaml::Value;

use super::error::ConfigError;
use super::filters::NodeFilter;
use super::versions::ApiVersion;
use crate::domain::cluster::validate_cluster_name;

fn push_if_err<T>(errors: &mut Vec<String>, result: Result<T, String>) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(e) => {
            errors.push(e);
            None
        }
    }
}

fn as_str_field(doc: &Value, path: &str) -> Result<&str, String> {
    doc.as_str()
        .ok_or_else(|| format!("{path}: expected a string"))
}

fn validate_node_filters(value: &Value, path: &str, errors: &mut Vec<String>) {
    let Some(seq) = value.get("nodeFilters").and_then(Value::as_sequence) else {
        return;
    };
    for (i, filter) in seq.iter().enumerate() {
        let field_path = format!("{path}.nodeFilters[{i}]");
        match filter.as_str() {
            Some(s) => {
                if let Err(e) = NodeFilter::parse(s) {
                    errors.push(format!("{field_path}: {e}"));
                }
            }
            None => errors.push(format!("{field_path}: expected a string")),
        }
    }
}

fn validate_ports(doc: &Value, errors: &mut Vec<String>) {
    let Some(ports) = doc.get("ports").and_then(Value::as_sequence) else {
        return;
    };
    let mut seen_host_ports: HashSet<u16> = HashSet::new();
    for (i, entry) in ports.iter().enumerate() {
        let path = format!("ports[{i}]");
        let Some(port_spec) = entry.get("port").and_then(Value::as_str) else {
            errors.push(format!("{path}.port: expected a string"));
            continue;
        };
        let host_part = port_spec.split(':').next().unwrap_or(port_spec);
        let host_part = host_part.split('/').next().unwrap_or(host_part);
        if let Ok(host_port) = host_part.parse::<u16>() {
            if !seen_host_ports.insert(host_port) {
                errors.push(format!(
                    "duplicate host port binding: {host_port} (from {path})"
                ));
            }
        }
        validate_node_filters(entry, &path, errors);
    }
}

fn validate_list_with_filters(doc: &Value, key: &str, field: &str, errors: &mut Vec<String>) {
    let Some(entries) = doc.get(key).and_then(Value::as_sequence) else {
        return;
    };
    for (i, entry) in entries.iter().enumerate() {
        let path = format!("{key}[{i}]");
        if entry.get(field).and_then(Value::as_str).is_none() {
            errors.push(format!("{path}.{field}: expected a string"));
        }
        validate_node_filters(entry, &path, errors);
    }
}

fn validate_registries(doc: &Value, errors: &mut Vec<String>) {
    let Some(registries) = doc.get("registries") else {
        return;
    };
    if let Some(create) = registries.get("create") {
        if !create.is_null() && !create.is_mapping() {
            errors.push("registries.create: expected a mapping or null".to_string());
        }
    }
    if let Some(use_list) = registries.get("use") {
        if let Some(seq) = use_list.as_sequence() {
            for (i, v) in seq.iter().enumerate() {
                if v.as_str().is_none() {
                    errors.push(format!("registries.use[{i}]: expected a string"));
                }
            }
        } else if !use_list.is_null() {
            errors.push("registries.use: expected a sequence".to_string());
        }
    }
    if let Some(config) = registries.get("config") {
        if !config.is_null() && config.as_str().is_none() {
            errors.push("registries.config: expected an inline YAML string".to_string());
        }
    }
}

/// Validate the document, collecting every violation found.
pub fn validate(doc: &Value) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    match doc.get("apiVersion").and_then(Value::as_str) {
        Some(v) if v == ApiVersion::CURRENT.as_str() => {}
        Some(v) => errors.push(format!("apiVersion: unexpected value {v:?} after migration")),
        None => errors.push("apiVersion: missing".to_string()),
    }

    match doc.get("kind").and_then(Value::as_str) {
        Some("Simple") => {}
        Some(other) => errors.push(format!("kind: unsupported kind {other:?}")),
        None => errors.push("kind: missing".to_string()),
    }

    match doc.get("metadata").and_then(|m| m.get("name")) {
        Some(name) => {
            if let Some(name) = push_if_err(&mut errors, as_str_field(name, "metadata.name")) {
                if let Err(e) = validate_cluster_name(name) {
                    errors.push(format!("metadata.name: {e}"));
                }
            }
        }
        None => errors.push("metadata.name: missing".to_string()),
    }

    for key in ["servers", "agents"] {
        if let Some(v) = doc.get(key) {
            if v.as_u64().is_none() {
                errors.push(format!("{key}: expected a non-negative integer"));
            }
        }
    }

    validate_ports(doc, &mut errors);
    validate_list_with_filters(doc, "volumes", "volume", &mut errors);
    validate_list_with_filters(doc, "env", "envVar", &mut errors);
    validate_list_with_filters(doc, "files", "destination", &mut errors);
    validate_registries(doc, &mut errors);

    if let Some(kube_api) = doc.get("kubeAPI") {
        if let Some(port) = kube_api.get("hostPort") {
            if port.as_u64().is_none() {
                errors.push("kubeAPI.hostPort: expected an integer".to_string());
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::SchemaViolation(errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(s: &str) -> Value {
        serde_yaml::from_str(s).unwrap()
    }

    fn valid_doc() -> Value {
        yaml(&format!(
            r#"
apiVersion: {}
kind: Simple
metadata:
  name: demo
servers: 1
agents: 2
ports:
  - port: "8080:80/tcp"
    nodeFilters: ["loadbalancer"]
"#,
            ApiVersion::CURRENT.as_str()
        ))
    }

    #[test]
    fn accepts_a_well_formed_document() {
        assert!(validate(&valid_doc()).is_ok());
    }

    #[test]
    fn collects_multiple_errors_at_once() {
        let doc = yaml(&format!(
            r#"
apiVersion: {}
kind: Bogus
metadata:
  name: "Not_A_DNS_Label!"
servers: "not-a-number"
"#,
            ApiVersion::CURRENT.as_str()
        ));
        let err = validate(&doc).unwrap_err();
        let ConfigError::SchemaViolation(messages) = err else {
            panic!("expected SchemaViolation");
        };
        assert!(messages.len() >= 3, "expected several errors, got {messages:?}");
    }

    #[test]
    fn rejects_duplicate_host_port_bindings() {
        let mut doc = valid_doc();
        if let Value::Sequence(ports) = doc.get_mut("ports").unwrap() {
            ports.push(yaml(r#"port: "8080:443/tcp""#));
        }
        let err = validate(&doc).unwrap_err();
        let ConfigError::SchemaViolation(messages) = err else {
            panic!("expected SchemaViolation");
        };
        assert!(messages.iter().any(|m| m.contains("duplicate host port")));
    }

    #[test]
    fn rejects_invalid_node_filter_syntax() {
        let mut doc = valid_doc();
        if let Value::Sequence(ports) = doc.get_mut("ports").unwrap() {
            if let Value::Mapping(first) = &mut ports[0] {
                first.insert(
                    Value::String("nodeFilters".to_string()),
                    Value::Sequence(vec![Value::String("bogus-role".to_string())]),
                );
            }
        }
        assert!(validate(&doc).is_err());
    }
}
