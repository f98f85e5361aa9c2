//! Apply a [`Hook`] to a container (§3, §4.5).
//!
//! `WriteFile` is a direct `CopyTo`. `RewriteFile` reads the existing file
//! back first (`CopyFrom`), applies the transform in memory, then writes
//! the result — so a repeated `AppendLineIfMissing` or `MergeYaml` hook
//! stays idempotent across retries.

use thiserror::Error;

use crate::domain::node::{FileTransform, HookAction};
use crate::runtime::archive::{build_file_tar, read_first_file};
use crate::runtime::{Runtime, RuntimeError};

#[derive(Debug, Error)]
pub enum HookError {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error("could not read existing file at {0:?} to rewrite it")]
    ExistingFileUnreadable(String),
    #[error("existing file at {0:?} is not valid YAML, cannot merge")]
    NotYaml(String),
}

fn split_dir_and_name(path: &str) -> (&str, &str) {
    match path.rsplit_once('/') {
        Some((dir, name)) if !dir.is_empty() => (dir, name),
        Some((_, name)) => ("/", name),
        None => (".", path),
    }
}

fn apply_transform(existing: Vec<u8>, transform: &FileTransform) -> Result<Vec<u8>, HookError> {
    match transform {
        FileTransform::ReplaceAll { from, to } => {
            let text = String::from_utf8_lossy(&existing);
            Ok(text.replace(from.as_str(), to.as_str()).into_bytes())
        }
        FileTransform::AppendLineIfMissing(line) => {
            let text = String::from_utf8_lossy(&existing);
            if text.lines().any(|l| l == line) {
                Ok(existing)
            } else {
                let mut out = text.into_owned();
                if !out.is_empty() && !out.ends_with('\n') {
                    out.push('\n');
                }
                out.push_str(line);
                out.push('\n');
                Ok(out.into_bytes())
            }
        }
        FileTransform::MergeYaml(overlay) => {
            let base: serde_yaml::Value = if existing.is_empty() {
                serde_yaml::Value::Null
            } else {
                serde_yaml::from_slice(&existing)
                    .map_err(|_| HookError::NotYaml(String::from_utf8_lossy(&existing).to_string()))?
            };
            let merged = crate::config::merge::merge(base, overlay.clone());
            serde_yaml::to_string(&merged)
                .map(|s| s.into_bytes())
                .map_err(|_| HookError::NotYaml("<merged document>".to_string()))
        }
    }
}

pub async fn apply(runtime: &dyn Runtime, container_id: &str, action: &HookAction) -> Result<(), HookError> {
    match action {
        HookAction::WriteFile { path, content, mode, .. } => {
            let (dir, name) = split_dir_and_name(path);
            let mut tar = tar::Builder::new(Vec::new());
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(*mode);
            header.set_cksum();
            tar.append_data(&mut header, name, content.as_slice())
                .expect("in-memory tar append is infallible");
            let bytes = tar.into_inner().expect("in-memory tar finish is infallible");
            runtime.copy_to_container(container_id, dir, bytes).await?;
            Ok(())
        }
        HookAction::RewriteFile { path, transform } => {
            let (dir, name) = split_dir_and_name(path);
            let existing = runtime
                .copy_from_container(container_id, path)
                .await
                .ok()
                .and_then(|tar| read_first_file(&tar))
                .unwrap_or_default();
            let updated = apply_transform(existing, transform)?;
            let tar = build_file_tar(name, &updated);
            runtime.copy_to_container(container_id, dir, tar).await?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_line_if_missing_is_idempotent() {
        let once = apply_transform(
            b"a\nb\n".to_vec(),
            &FileTransform::AppendLineIfMissing("c".to_string()),
        )
        .unwrap();
        let twice = apply_transform(once.clone(), &FileTransform::AppendLineIfMissing("c".to_string())).unwrap();
        assert_eq!(once, twice);
        assert_eq!(String::from_utf8(once).unwrap(), "a\nb\nc\n");
    }

    #[test]
    fn replace_all_rewrites_every_occurrence() {
        let out = apply_transform(
            b"foo=bar foo=baz".to_vec(),
            &FileTransform::ReplaceAll {
                from: "foo".to_string(),
                to: "qux".to_string(),
            },
        )
        .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "qux=bar qux=baz");
    }

    #[test]
    fn merge_yaml_preserves_existing_keys_not_in_overlay() {
        let existing = b"a: 1\nb: 2\n".to_vec();
        let overlay: serde_yaml::Value = serde_yaml::from_str("b: 3\nc: 4\n").unwrap();
        let out = apply_transform(existing, &FileTransform::MergeYaml(overlay)).unwrap();
        let doc: serde_yaml::Value = serde_yaml::from_slice(&out).unwrap();
        assert_eq!(doc.get("a").unwrap().as_i64(), Some(1));
        assert_eq!(doc.get("b").unwrap().as_i64(), Some(3));
        assert_eq!(doc.get("c").unwrap().as_i64(), Some(4));
    }

    #[test]
    fn split_dir_and_name_handles_absolute_paths() {
        assert_eq!(split_dir_and_name("/etc/rancher/k3s/registries.yaml"), ("/etc/rancher/k3s", "registries.yaml"));
        assert_eq!(split_dir_and_name("/file"), ("/", "file"));
    }
}
