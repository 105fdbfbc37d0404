//! Service identifier: a 64-bit CRC over the service name string.
//!
//! Spec: data model §3 "Service identifier", §4.4 "`service_id` (CRC of
//! name) must be stable across versions".

use crc::{Crc, CRC_64_WE};

/// CRC-64/WE, matching the spec's "CRC64_WE(name)" testable property.
static CRC64_WE: Crc<u64> = Crc::<u64>::new(&CRC_64_WE);

/// Compute the stable 64-bit service identifier for a service name.
pub fn service_id(name: &str) -> u64 {
    CRC64_WE.checksum(name.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_across_calls() {
        let a = service_id("ocvsmd.svc.file_server.list_roots");
        let b = service_id("ocvsmd.svc.file_server.list_roots");
        assert_eq!(a, b);
    }

    #[test]
    fn distinguishes_names() {
        assert_ne!(
            service_id("ocvsmd.svc.file_server.list_roots"),
            service_id("ocvsmd.svc.node.execute_command")
        );
    }

    #[test]
    fn empty_name_is_defined() {
        // Must not panic; the empty string is a valid (if useless) input.
        let _ = service_id("");
    }
}
