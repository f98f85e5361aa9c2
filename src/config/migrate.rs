//! Migration chain `V2 → V3 → V4 → V5` (§4.1 stage 2).
//!
//! Each edge is a pure `Value → Value` transform. `migrate` walks from the
//! document's declared version to [`ApiVersion::CURRENT`], applying only
//! the edges still needed — which is what makes it idempotent: a document
//! already at V5 takes zero edges (§8 invariant 6).

use serde_yaml::{Mapping, Value};

use super::error::ConfigError;
use super::versions::ApiVersion;

fn get_version(doc: &Value) -> Result<ApiVersion, ConfigError> {
    let raw = doc
        .get("apiVersion")
        .and_then(Value::as_str)
        .ok_or_else(|| ConfigError::UnknownApiVersion("<missing>".to_string()))?;
    ApiVersion::parse(raw)
}

fn set_version(doc: &mut Value, version: ApiVersion) {
    if let Value::Mapping(map) = doc {
        map.insert(
            Value::String("apiVersion".to_string()),
            Value::String(version.as_str().to_string()),
        );
    }
}

fn take_key(map: &mut Mapping, key: &str) -> Option<Value> {
    map.remove(Value::String(key.to_string()))
}

/// v1alpha2 → v1alpha3: `name` moves under `metadata.name`; `exposeAPI`
/// becomes `kubeAPI` with an explicit `host`; flat `portMapping` strings
/// ("8080:80/tcp@loadbalancer") split into structured `ports` entries.
fn v2_to_v3(doc: Value) -> Result<Value, ConfigError> {
    let Value::Mapping(mut map) = doc else {
        return Err(ConfigError::MigrationFailure {
            from: ApiVersion::V2.as_str().into(),
            to: ApiVersion::V3.as_str().into(),
            reason: "document root is not a mapping".into(),
        });
    };

    if let Some(name) = take_key(&mut map, "name") {
        let mut metadata = Mapping::new();
        metadata.insert(Value::String("name".to_string()), name);
        map.insert(Value::String("metadata".to_string()), Value::Mapping(metadata));
    }

    if let Some(Value::Mapping(mut expose)) = take_key(&mut map, "exposeAPI") {
        if !expose.contains_key(Value::String("host".to_string())) {
            expose.insert(
                Value::String("host".to_string()),
                Value::String("0.0.0.0".to_string()),
            );
        }
        map.insert(Value::String("kubeAPI".to_string()), Value::Mapping(expose));
    }

    if let Some(Value::Sequence(mappings)) = take_key(&mut map, "portMapping") {
        let mut ports = Vec::new();
        for entry in mappings {
            let Value::String(spec) = entry else { continue };
            let (port_part, filter_part) = match spec.split_once('@') {
                Some((p, f)) => (p.to_string(), Some(f.to_string())),
                None => (spec.clone(), None),
            };
            let mut port_entry = Mapping::new();
            port_entry.insert(Value::String("port".to_string()), Value::String(port_part));
            let filters = filter_part
                .map(|f| vec![Value::String(f)])
                .unwrap_or_default();
            port_entry.insert(
                Value::String("nodeFilters".to_string()),
                Value::Sequence(filters),
            );
            ports.push(Value::Mapping(port_entry));
        }
        map.insert(Value::String("ports".to_string()), Value::Sequence(ports));
    }

    let mut doc = Value::Mapping(map);
    set_version(&mut doc, ApiVersion::V3);
    Ok(doc)
}

/// v1alpha3 → v1alpha4: introduces `volumes`/`env`/`files` as first-class
/// arrays (defaulted empty rather than being absent).
fn v3_to_v4(doc: Value) -> Result<Value, ConfigError> {
    let Value::Mapping(mut map) = doc else {
        return Err(ConfigError::MigrationFailure {
            from: ApiVersion::V3.as_str().into(),
            to: ApiVersion::V4.as_str().into(),
            reason: "document root is not a mapping".into(),
        });
    };
    for key in ["volumes", "env", "files"] {
        map.entry(Value::String(key.to_string()))
            .or_insert_with(|| Value::Sequence(Vec::new()));
    }
    let mut doc = Value::Mapping(map);
    set_version(&mut doc, ApiVersion::V4);
    Ok(doc)
}

/// v1alpha4 → v1alpha5: `registries.create` upgrades from a bare boolean
/// to the full struct shape; `options.k3d.disableLoadBalancer` is renamed
/// to `disableLoadbalancer` for casing consistency with the rest of the
/// `k3d` options block.
fn v4_to_v5(doc: Value) -> Result<Value, ConfigError> {
    let Value::Mapping(mut map) = doc else {
        return Err(ConfigError::MigrationFailure {
            from: ApiVersion::V4.as_str().into(),
            to: ApiVersion::V5.as_str().into(),
            reason: "document root is not a mapping".into(),
        });
    };

    if let Some(Value::Mapping(mut registries)) = take_key(&mut map, "registries") {
        if let Some(Value::Bool(true)) = registries.get(&Value::String("create".to_string())) {
            let mut create = Mapping::new();
            create.insert(Value::String("name".to_string()), Value::Null);
            create.insert(Value::String("host".to_string()), Value::Null);
            create.insert(Value::String("hostPort".to_string()), Value::Null);
            create.insert(Value::String("image".to_string()), Value::Null);
            registries.insert(
                Value::String("create".to_string()),
                Value::Mapping(create),
            );
        }
        map.insert(Value::String("registries".to_string()), Value::Mapping(registries));
    }

    if let Some(Value::Mapping(mut options)) = take_key(&mut map, "options") {
        if let Some(Value::Mapping(mut k3d)) = take_key(&mut options, "k3d") {
            if let Some(v) = take_key(&mut k3d, "disableLoadBalancer") {
                k3d.insert(Value::String("disableLoadbalancer".to_string()), v);
            }
            options.insert(Value::String("k3d".to_string()), Value::Mapping(k3d));
        }
        map.insert(Value::String("options".to_string()), Value::Mapping(options));
    }

    let mut doc = Value::Mapping(map);
    set_version(&mut doc, ApiVersion::V5);
    Ok(doc)
}

fn apply_edge(version: ApiVersion, doc: Value) -> Result<Value, ConfigError> {
    match version {
        ApiVersion::V2 => v2_to_v3(doc),
        ApiVersion::V3 => v3_to_v4(doc),
        ApiVersion::V4 => v4_to_v5(doc),
        ApiVersion::V5 => Ok(doc),
    }
}

/// Walk the document from its declared version to [`ApiVersion::CURRENT`].
pub fn migrate(doc: Value) -> Result<Value, ConfigError> {
    let mut version = get_version(&doc)?;
    let mut doc = doc;
    while version != ApiVersion::CURRENT {
        doc = apply_edge(version, doc)?;
        version = get_version(&doc)?;
    }
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v2_fixture() -> Value {
        serde_yaml::from_str(
            r#"
apiVersion: k3cluster.io/v1alpha2
kind: Simple
name: demo
servers: 1
agents: 0
exposeAPI:
  hostIP: 0.0.0.0
  hostPort: 6443
portMapping:
  - "8080:80/tcp@loadbalancer"
"#,
        )
        .unwrap()
    }

    #[test]
    fn migrates_v2_all_the_way_to_current() {
        let migrated = migrate(v2_fixture()).unwrap();
        assert_eq!(
            migrated.get("apiVersion").unwrap().as_str().unwrap(),
            ApiVersion::CURRENT.as_str()
        );
        assert_eq!(
            migrated
                .get("metadata")
                .unwrap()
                .get("name")
                .unwrap()
                .as_str()
                .unwrap(),
            "demo"
        );
        assert!(migrated.get("kubeAPI").unwrap().get("host").is_some());
        let ports = migrated.get("ports").unwrap().as_sequence().unwrap();
        assert_eq!(ports.len(), 1);
        assert_eq!(
            ports[0].get("nodeFilters").unwrap().as_sequence().unwrap()[0]
                .as_str()
                .unwrap(),
            "loadbalancer"
        );
    }

    #[test]
    fn migration_is_idempotent() {
        let once = migrate(v2_fixture()).unwrap();
        let twice = migrate(once.clone()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn current_version_document_is_unchanged() {
        let doc: Value = serde_yaml::from_str(&format!(
            "apiVersion: {}\nkind: Simple\nmetadata:\n  name: demo\n",
            ApiVersion::CURRENT.as_str()
        ))
        .unwrap();
        let migrated = migrate(doc.clone()).unwrap();
        assert_eq!(doc, migrated);
    }
}
