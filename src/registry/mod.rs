//! The registry subsystem (§4.3): Create/Use/Config modes and the
//! cluster-facing `local-registry-hosting` ConfigMap.

pub mod error;
pub mod hosting_configmap;
pub mod lifecycle;

pub use error::RegistryError;
pub use hosting_configmap::{rewrite_manifest_hook, write_manifest_hook};
pub use lifecycle::{check_collision, check_use_references, list_existing, prepare_node};
