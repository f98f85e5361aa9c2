//! The `local-registry-hosting` ConfigMap (§4.3): tells workloads inside
//! the cluster which in-cluster address reaches a registry this system
//! manages, following the community `local-registry-hosting.v1` schema.
//! Delivered as a k3s auto-deploy manifest so it appears as soon as the
//! first server starts — no post-install kubectl step required.

use crate::domain::node::{FileTransform, HookAction};
use crate::domain::registry::Registry;

const MANIFEST_PATH: &str = "/var/lib/rancher/k3s/server/manifests/k3cluster-registries.yaml";

fn render(registries: &[Registry]) -> String {
    let mut hosting = String::new();
    for registry in registries {
        hosting.push_str(&format!(
            "host: \"localhost:{}\"\nhostFromClusterNetwork: \"{}\"\nhelp: \"https://github.com/kubernetes/enhancements/tree/master/keps/sig-cluster-lifecycle/generic/1755-communicating-a-local-registry\"\n",
            registry.host_port,
            registry.endpoint(),
        ));
    }
    format!(
        r#"apiVersion: v1
kind: ConfigMap
metadata:
  name: local-registry-hosting
  namespace: kube-public
data:
  localRegistryHosting.v1: |
{}
"#,
        hosting
            .lines()
            .map(|l| format!("    {l}"))
            .collect::<Vec<_>>()
            .join("\n")
    )
}

/// Build the hook that writes the manifest onto every server node. Only
/// meaningful when at least one registry is owned or referenced by the
/// cluster; callers should skip attaching it otherwise.
pub fn write_manifest_hook(registries: &[Registry]) -> HookAction {
    HookAction::WriteFile {
        path: MANIFEST_PATH.to_string(),
        content: render(registries).into_bytes(),
        mode: 0o644,
        description: "write local-registry-hosting ConfigMap".to_string(),
    }
}

/// A merge-based variant for re-applying after a registry set changes —
/// rewrites the whole manifest rather than attempting a partial YAML
/// merge, since k3s re-applies the manifest file wholesale on change.
pub fn rewrite_manifest_hook(registries: &[Registry]) -> HookAction {
    let doc: serde_yaml::Value = serde_yaml::from_str(&render(registries)).unwrap_or(serde_yaml::Value::Null);
    HookAction::RewriteFile {
        path: MANIFEST_PATH.to_string(),
        transform: FileTransform::MergeYaml(doc),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::registry::RegistryLifecycle;

    #[test]
    fn manifest_names_every_registry() {
        let registries = vec![Registry {
            name: "demo-registry".into(),
            host: "demo-registry".into(),
            host_port: 5000,
            image: "registry:2".into(),
            lifecycle: RegistryLifecycle::Owned,
            networks: vec![],
            proxy: None,
        }];
        let action = write_manifest_hook(&registries);
        let HookAction::WriteFile { content, path, .. } = action else {
            panic!("expected WriteFile");
        };
        assert_eq!(path, MANIFEST_PATH);
        let text = String::from_utf8(content).unwrap();
        assert!(text.contains("demo-registry:5000"));
        assert!(text.contains("local-registry-hosting"));
    }
}
