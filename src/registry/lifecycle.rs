//! Create/Use/Config mode handling and the name/port collision rule
//! (§4.3).

use crate::domain::labels::{LabelSelector, LABEL_REGISTRY_HOST_PORT};
use crate::domain::node::Node;
use crate::domain::registry::{Registry, RegistryLifecycle};
use crate::runtime::Runtime;

use super::error::RegistryError;

/// Stamp a registry's published port onto its node's labels so a later
/// `list_existing` can recover it without inspecting live port bindings.
pub fn prepare_node(node: &mut Node, registry: &Registry) {
    node.runtime_labels.insert(
        LABEL_REGISTRY_HOST_PORT.to_string(),
        registry.host_port.to_string(),
    );
}

/// All registries this host currently knows about, independent of any one
/// cluster (registries are independently lifecycled, §3).
pub async fn list_existing(runtime: &dyn Runtime) -> Result<Vec<Registry>, RegistryError> {
    let containers = runtime
        .list_containers_by_label(&LabelSelector::for_registry())
        .await?;
    let mut registries = Vec::with_capacity(containers.len());
    for container in containers {
        let host_port = container
            .labels
            .get(LABEL_REGISTRY_HOST_PORT)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        registries.push(Registry {
            name: container.name.clone(),
            host: container.name,
            host_port,
            image: String::new(),
            lifecycle: RegistryLifecycle::Owned,
            networks: container.network_ips.keys().cloned().collect(),
            proxy: None,
        });
    }
    Ok(registries)
}

/// Enforce the collision rule for a registry about to be created: no two
/// registries may share a name or a published host port.
pub fn check_collision(existing: &[Registry], candidate: &Registry) -> Result<(), RegistryError> {
    if existing.iter().any(|r| r.name == candidate.name) {
        return Err(RegistryError::NameCollision(candidate.name.clone()));
    }
    if candidate.host_port != 0 && existing.iter().any(|r| r.host_port == candidate.host_port) {
        return Err(RegistryError::HostPortCollision(candidate.host_port));
    }
    Ok(())
}

/// Verify every `use:` reference resolves to a registry that actually
/// exists, independent of create-mode collisions.
pub fn check_use_references(existing: &[Registry], used: &[Registry]) -> Result<(), RegistryError> {
    for reference in used {
        if !existing.iter().any(|r| r.name == reference.name) {
            return Err(RegistryError::ReferencedRegistryMissing(reference.name.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(name: &str, port: u16) -> Registry {
        Registry {
            name: name.into(),
            host: name.into(),
            host_port: port,
            image: "registry:2".into(),
            lifecycle: RegistryLifecycle::Owned,
            networks: vec![],
            proxy: None,
        }
    }

    #[test]
    fn detects_name_collision() {
        let existing = vec![registry("demo-registry", 5000)];
        let err = check_collision(&existing, &registry("demo-registry", 5001)).unwrap_err();
        assert!(matches!(err, RegistryError::NameCollision(_)));
    }

    #[test]
    fn detects_port_collision() {
        let existing = vec![registry("demo-registry", 5000)];
        let err = check_collision(&existing, &registry("other-registry", 5000)).unwrap_err();
        assert!(matches!(err, RegistryError::HostPortCollision(5000)));
    }

    #[test]
    fn distinct_name_and_port_is_fine() {
        let existing = vec![registry("demo-registry", 5000)];
        assert!(check_collision(&existing, &registry("other-registry", 5001)).is_ok());
    }

    #[test]
    fn use_reference_must_exist() {
        let existing = vec![registry("demo-registry", 5000)];
        let used = vec![registry("missing-registry", 5001)];
        assert!(matches!(
            check_use_references(&existing, &used),
            Err(RegistryError::ReferencedRegistryMissing(_))
        ));
    }
}
