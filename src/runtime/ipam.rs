//! IP address management — deterministic allocation given an IPAM state
//! (§4.2, §5).
//!
//! Docker's network-create API accepts labels, but there is no
//! corresponding update endpoint: once a network exists, its labels are
//! immutable for the rest of its life. A per-network label can't be the
//! compare-and-set target §5 describes, because nothing can ever rewrite
//! it. [`super::docker::DockerRuntime`] instead serializes allocation
//! through an in-process, per-network mutex-guarded reservation set (seeded
//! from the network's own live container/IP map so pre-existing
//! attachments are respected), which is a genuine compare-and-set rather
//! than a read that always reports "unchanged".

use std::net::IpAddr;

use ipnet::IpNet;

use super::RuntimeError;

/// Deterministically pick the first address in `prefix` that is neither
/// the network address, the broadcast address, nor already in `used`.
/// Same `(prefix, used)` always yields the same result — this is what
/// makes `AllocateIP` deterministic (§4.2).
pub fn next_free_ip(prefix: &IpNet, used: &[IpAddr]) -> Result<IpAddr, RuntimeError> {
    let network_addr = prefix.network();
    let broadcast_addr = prefix.broadcast();

    for candidate in prefix.hosts() {
        if candidate == network_addr || candidate == broadcast_addr {
            continue;
        }
        if !used.contains(&candidate) {
            return Ok(candidate);
        }
    }
    Err(RuntimeError::Daemon(format!(
        "no free address left in {prefix}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_first_free_host_address() {
        let prefix: IpNet = "172.20.0.0/29".parse().unwrap();
        let used = vec!["172.20.0.1".parse().unwrap()];
        let ip = next_free_ip(&prefix, &used).unwrap();
        assert_eq!(ip, "172.20.0.2".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn allocation_is_deterministic() {
        let prefix: IpNet = "10.0.0.0/28".parse().unwrap();
        let used = vec![];
        let a = next_free_ip(&prefix, &used).unwrap();
        let b = next_free_ip(&prefix, &used).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn exhausted_prefix_is_an_error() {
        let prefix: IpNet = "10.0.0.0/31".parse().unwrap();
        // /31 has no usable host addresses under the network/broadcast rule.
        let used = vec![];
        assert!(next_free_ip(&prefix, &used).is_err());
    }
}
