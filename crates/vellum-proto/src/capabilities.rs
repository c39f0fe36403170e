//! Capability sets and handshake negotiation.
//!
//! Each peer declares what it supports; negotiation runs once per
//! handshake and must produce the same result on both sides.

use serde::{Deserialize, Serialize};

/// Feature flags and limits a peer declares during the handshake.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Capabilities {
    pub delta_sync: bool,
    pub conflict_resolution: bool,
    pub realtime_push: bool,
    pub batch_operations: bool,
    pub binary_payloads: bool,
    pub vector_clocks: bool,
    pub checkpoints: bool,

    /// Largest payload this peer will accept, in bytes.
    pub max_payload_size: u64,

    /// Supported compression algorithms, in preference order.
    pub compression: Vec<String>,
}

impl Default for Capabilities {
    fn default() -> Self {
        Capabilities {
            delta_sync: true,
            conflict_resolution: true,
            realtime_push: true,
            batch_operations: true,
            binary_payloads: true,
            vector_clocks: true,
            checkpoints: true,
            max_payload_size: 4 * 1024 * 1024,
            compression: vec!["zstd".to_string(), "gzip".to_string()],
        }
    }
}

impl Capabilities {
    /// Intersect this peer's capabilities with a remote's.
    ///
    /// Boolean flags AND together, `max_payload_size` takes the minimum,
    /// and the compression list is the set intersection ordered by `self`
    /// (the responder). Run on both sides with swapped arguments the flag
    /// and size results are identical, so the negotiated set is symmetric.
    pub fn negotiate(&self, remote: &Capabilities) -> Capabilities {
        Capabilities {
            delta_sync: self.delta_sync && remote.delta_sync,
            conflict_resolution: self.conflict_resolution && remote.conflict_resolution,
            realtime_push: self.realtime_push && remote.realtime_push,
            batch_operations: self.batch_operations && remote.batch_operations,
            binary_payloads: self.binary_payloads && remote.binary_payloads,
            vector_clocks: self.vector_clocks && remote.vector_clocks,
            checkpoints: self.checkpoints && remote.checkpoints,
            max_payload_size: self.max_payload_size.min(remote.max_payload_size),
            compression: self
                .compression
                .iter()
                .filter(|alg| remote.compression.contains(alg))
                .cloned()
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> Capabilities {
        Capabilities {
            delta_sync: true,
            conflict_resolution: false,
            realtime_push: false,
            batch_operations: true,
            binary_payloads: false,
            vector_clocks: true,
            checkpoints: false,
            max_payload_size: 64 * 1024,
            compression: vec!["gzip".to_string()],
        }
    }

    #[test]
    fn test_flags_and_together() {
        let negotiated = Capabilities::default().negotiate(&minimal());

        assert!(negotiated.delta_sync);
        assert!(!negotiated.conflict_resolution);
        assert!(!negotiated.realtime_push);
        assert!(negotiated.batch_operations);
        assert!(!negotiated.binary_payloads);
        assert!(negotiated.vector_clocks);
        assert!(!negotiated.checkpoints);
    }

    #[test]
    fn test_payload_size_is_minimum() {
        let negotiated = Capabilities::default().negotiate(&minimal());
        assert_eq!(negotiated.max_payload_size, 64 * 1024);
    }

    #[test]
    fn test_compression_intersection_keeps_responder_order() {
        let responder = Capabilities {
            compression: vec!["lz4".to_string(), "zstd".to_string(), "gzip".to_string()],
            ..Capabilities::default()
        };
        let initiator = Capabilities {
            compression: vec!["gzip".to_string(), "lz4".to_string()],
            ..Capabilities::default()
        };

        let negotiated = responder.negotiate(&initiator);
        assert_eq!(negotiated.compression, vec!["lz4", "gzip"]);
    }

    #[test]
    fn test_negotiation_symmetric_up_to_order() {
        let a = Capabilities::default();
        let b = minimal();

        let ab = a.negotiate(&b);
        let ba = b.negotiate(&a);

        assert_eq!(ab.delta_sync, ba.delta_sync);
        assert_eq!(ab.conflict_resolution, ba.conflict_resolution);
        assert_eq!(ab.max_payload_size, ba.max_payload_size);

        let mut ab_comp = ab.compression.clone();
        let mut ba_comp = ba.compression.clone();
        ab_comp.sort();
        ba_comp.sort();
        assert_eq!(ab_comp, ba_comp);
    }
}
