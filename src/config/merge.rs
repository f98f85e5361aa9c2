//! Deep merge with precedence `flags > primary file > includes > defaults`
//! (§4.1 stage 1).
//!
//! Scalars and mappings: the higher-precedence side wins, recursing into
//! nested mappings. Sequences (`ports`, `volumes`, `env`, `files`, …)
//! accumulate by appending the higher-precedence side's entries after the
//! lower one's, since these are additive declarations rather than
//! overridable settings.

use serde_yaml::{Mapping, Value};

/// Merge `overlay` on top of `base`. `overlay` wins on scalar/mapping
/// conflicts; sequences from both sides are concatenated, `base` first.
pub fn merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Mapping(mut base_map), Value::Mapping(overlay_map)) => {
            for (key, overlay_val) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_val) => merge(base_val, overlay_val),
                    None => overlay_val,
                };
                base_map.insert(key, merged);
            }
            Value::Mapping(base_map)
        }
        (Value::Sequence(mut base_seq), Value::Sequence(overlay_seq)) => {
            base_seq.extend(overlay_seq);
            Value::Sequence(base_seq)
        }
        (_, overlay) if !matches!(overlay, Value::Null) => overlay,
        (base, _) => base,
    }
}

/// Merge layers in ascending precedence order: `defaults`, then each
/// `includes` entry in list order, then the `primary` file's own keys,
/// then `flags` (already-parsed CLI overrides as a `Value::Mapping`).
pub fn merge_layers(
    defaults: Value,
    includes: Vec<Value>,
    primary: Value,
    flags: Value,
) -> Value {
    let mut acc = defaults;
    for include in includes {
        acc = merge(acc, include);
    }
    acc = merge(acc, primary);
    acc = merge(acc, flags);
    acc
}

pub fn empty_mapping() -> Value {
    Value::Mapping(Mapping::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(s: &str) -> Value {
        serde_yaml::from_str(s).unwrap()
    }

    #[test]
    fn scalar_overlay_wins() {
        let base = yaml("servers: 1\nagents: 0\n");
        let overlay = yaml("servers: 3\n");
        let merged = merge(base, overlay);
        assert_eq!(merged.get("servers").unwrap().as_u64().unwrap(), 3);
        assert_eq!(merged.get("agents").unwrap().as_u64().unwrap(), 0);
    }

    #[test]
    fn sequences_accumulate_base_first() {
        let base = yaml("ports:\n  - port: \"80\"\n");
        let overlay = yaml("ports:\n  - port: \"443\"\n");
        let merged = merge(base, overlay);
        let ports = merged.get("ports").unwrap().as_sequence().unwrap();
        assert_eq!(ports.len(), 2);
        assert_eq!(ports[0].get("port").unwrap().as_str().unwrap(), "80");
        assert_eq!(ports[1].get("port").unwrap().as_str().unwrap(), "443");
    }

    #[test]
    fn nested_mappings_merge_recursively() {
        let base = yaml("kubeAPI:\n  host: a\n  hostPort: 6443\n");
        let overlay = yaml("kubeAPI:\n  host: b\n");
        let merged = merge(base, overlay);
        assert_eq!(merged.get("kubeAPI").unwrap().get("host").unwrap().as_str().unwrap(), "b");
        assert_eq!(
            merged.get("kubeAPI").unwrap().get("hostPort").unwrap().as_u64().unwrap(),
            6443
        );
    }

    #[test]
    fn precedence_order_is_defaults_includes_primary_flags() {
        let defaults = yaml("image: rancher/k3s:default\n");
        let include = yaml("image: rancher/k3s:include\n");
        let primary = yaml("image: rancher/k3s:primary\n");
        let flags = yaml("image: rancher/k3s:flag\n");
        let merged = merge_layers(defaults, vec![include], primary, flags);
        assert_eq!(
            merged.get("image").unwrap().as_str().unwrap(),
            "rancher/k3s:flag"
        );
    }

    #[test]
    fn null_overlay_does_not_clobber_base() {
        let base = yaml("token: secret\n");
        let overlay = yaml("token: null\n");
        let merged = merge(base, overlay);
        assert_eq!(merged.get("token").unwrap().as_str().unwrap(), "secret");
    }
}
