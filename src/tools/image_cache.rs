//! First-pull-wins shared-wait image cache (§4.7, §9 design note: replaces
//! a process-global mutex with a per-image lock so unrelated images pull
//! concurrently). Concurrent callers for the same image share one
//! in-flight `pull_image`; once it completes, the slot is cleared so a
//! later call gets a fresh attempt rather than a stale cached verdict.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::runtime::{Runtime, RuntimeError};

enum PullState {
    Pending,
    Done(Result<(), String>),
}

#[derive(Default)]
pub struct ImagePullCache {
    entries: DashMap<String, Arc<Mutex<PullState>>>,
}

impl ImagePullCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pull `image` if it isn't already present, coalescing concurrent
    /// requests for the same reference into a single daemon call.
    pub async fn ensure_pulled(
        &self,
        runtime: &dyn Runtime,
        image: &str,
        cancel: CancellationToken,
    ) -> Result<(), RuntimeError> {
        if runtime.image_exists(image).await? {
            return Ok(());
        }

        let slot = self
            .entries
            .entry(image.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(PullState::Pending)))
            .clone();

        let mut guard = slot.lock().await;
        match &*guard {
            PullState::Done(Ok(())) => return Ok(()),
            PullState::Done(Err(reason)) => return Err(RuntimeError::Daemon(reason.clone())),
            PullState::Pending => {}
        }

        let result = runtime.pull_image(image, cancel).await;
        *guard = PullState::Done(result.as_ref().map(|_| ()).map_err(|e| e.to_string()));
        drop(guard);
        self.entries.remove(image);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{
        ContainerCreateSpec, ContainerInfo, ExecOutput, ExecSpec, NetworkHandle, NetworkSpec,
        RuntimeKind, VolumeHandle, VolumeSpec,
    };
    use async_trait::async_trait;
    use std::net::IpAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingRuntime {
        pulls: AtomicUsize,
    }

    #[async_trait]
    impl Runtime for CountingRuntime {
        async fn create_container(&self, _: ContainerCreateSpec, _: CancellationToken) -> Result<ContainerInfo, RuntimeError> {
            unimplemented!()
        }
        async fn start_container(&self, _: &str, _: CancellationToken) -> Result<(), RuntimeError> {
            unimplemented!()
        }
        async fn stop_container(&self, _: &str, _: Duration, _: CancellationToken) -> Result<(), RuntimeError> {
            unimplemented!()
        }
        async fn delete_container(&self, _: &str, _: CancellationToken) -> Result<(), RuntimeError> {
            unimplemented!()
        }
        async fn get_container(&self, _: &str) -> Result<Option<ContainerInfo>, RuntimeError> {
            unimplemented!()
        }
        async fn list_containers_by_label(&self, _: &crate::domain::LabelSelector) -> Result<Vec<ContainerInfo>, RuntimeError> {
            unimplemented!()
        }
        async fn inspect_container(&self, _: &str) -> Result<ContainerInfo, RuntimeError> {
            unimplemented!()
        }
        async fn rename_container(&self, _: &str, _: &str) -> Result<(), RuntimeError> {
            unimplemented!()
        }
        async fn copy_to_container(&self, _: &str, _: &str, _: Vec<u8>) -> Result<(), RuntimeError> {
            unimplemented!()
        }
        async fn copy_from_container(&self, _: &str, _: &str) -> Result<Vec<u8>, RuntimeError> {
            unimplemented!()
        }
        async fn exec_one_shot(&self, _: &str, _: ExecSpec, _: CancellationToken) -> Result<ExecOutput, RuntimeError> {
            unimplemented!()
        }
        async fn exec_streaming(&self, _: &str, _: ExecSpec, _: CancellationToken) -> Result<tokio::sync::mpsc::Receiver<Vec<u8>>, RuntimeError> {
            unimplemented!()
        }
        async fn read_logs(&self, _: &str, _: Option<usize>) -> Result<Vec<u8>, RuntimeError> {
            unimplemented!()
        }
        async fn create_network_if_absent(&self, _: NetworkSpec) -> Result<NetworkHandle, RuntimeError> {
            unimplemented!()
        }
        async fn connect_network(&self, _: &str, _: &str) -> Result<(), RuntimeError> {
            unimplemented!()
        }
        async fn disconnect_network(&self, _: &str, _: &str) -> Result<(), RuntimeError> {
            unimplemented!()
        }
        async fn delete_network(&self, _: &str) -> Result<(), RuntimeError> {
            unimplemented!()
        }
        async fn get_network(&self, _: &str) -> Result<Option<NetworkHandle>, RuntimeError> {
            unimplemented!()
        }
        async fn list_networks_by_label(&self, _: &crate::domain::LabelSelector) -> Result<Vec<NetworkHandle>, RuntimeError> {
            unimplemented!()
        }
        async fn allocate_ip(&self, _: &str) -> Result<IpAddr, RuntimeError> {
            unimplemented!()
        }
        async fn release_ip(&self, _: &str, _: IpAddr) -> Result<(), RuntimeError> {
            unimplemented!()
        }
        async fn create_volume(&self, _: VolumeSpec) -> Result<VolumeHandle, RuntimeError> {
            unimplemented!()
        }
        async fn delete_volume(&self, _: &str) -> Result<(), RuntimeError> {
            unimplemented!()
        }
        async fn get_volume(&self, _: &str) -> Result<Option<VolumeHandle>, RuntimeError> {
            unimplemented!()
        }
        async fn list_volumes_by_label(&self, _: &crate::domain::LabelSelector) -> Result<Vec<VolumeHandle>, RuntimeError> {
            unimplemented!()
        }
        async fn image_exists(&self, _: &str) -> Result<bool, RuntimeError> {
            Ok(false)
        }
        async fn pull_image(&self, _: &str, _: CancellationToken) -> Result<(), RuntimeError> {
            self.pulls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(())
        }
        async fn save_image_to_tar(&self, _: &str) -> Result<Vec<u8>, RuntimeError> {
            unimplemented!()
        }
        async fn load_image_from_tar(&self, _: Vec<u8>) -> Result<(), RuntimeError> {
            unimplemented!()
        }
        async fn detect_host_address(&self) -> Result<String, RuntimeError> {
            unimplemented!()
        }
        fn kind(&self) -> RuntimeKind {
            RuntimeKind::Native
        }
    }

    #[tokio::test]
    async fn concurrent_requests_for_the_same_image_share_one_pull() {
        let runtime = CountingRuntime { pulls: AtomicUsize::new(0) };
        let cache = ImagePullCache::new();
        let (a, b) = tokio::join!(
            cache.ensure_pulled(&runtime, "rancher/k3s:v1.30.3-k3s1", CancellationToken::new()),
            cache.ensure_pulled(&runtime, "rancher/k3s:v1.30.3-k3s1", CancellationToken::new()),
        );
        a.unwrap();
        b.unwrap();
        assert_eq!(runtime.pulls.load(Ordering::SeqCst), 1);
    }
}
