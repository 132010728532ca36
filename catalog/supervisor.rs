// This file is part of Blackhole, a virtual-production take archival service.
// Copyright (C) 2024 The Blackhole Authors; see AUTHORS and LICENSE.txt.

//! Builds and owns the set of capture threads for a recording: one thread per distinct
//! bind address, with devices that share an address grouped onto it.

use crate::capture::{self, CaptureConfig, CaptureThread, DeviceBinding};
use crate::config::DeviceConfig;
use crate::protocol;
use crate::sample::TakeBuffer;
use base::{bail, shutdown, Error};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::warn;

/// Owns every capture thread spawned for one recording session and the buffer they feed.
pub struct CaptureSupervisor {
    threads: Vec<CaptureThread>,
    buffer: Arc<Mutex<TakeBuffer>>,
}

impl CaptureSupervisor {
    /// Groups `devices` by bind address, checks each group against its protocol's
    /// multi-device capability, and spawns one capture thread per group.
    ///
    /// Devices are checked for name uniqueness up front: a duplicate device name is a
    /// configuration error, not a runtime race, so it is caught before any socket is bound.
    /// Past that point, one device's misconfiguration never aborts the whole recording
    /// attempt: an unknown protocol, a bind failure, or a port shared by devices that can't
    /// agree on a protocol is logged and that device (or, for a single-device protocol
    /// overcommitted by two devices, every device but the first-registered one) is skipped
    /// instead.
    pub fn start(
        devices: &[DeviceConfig],
        frame_rate: i64,
        shutdown: shutdown::Receiver,
    ) -> Result<CaptureSupervisor, Error> {
        let mut seen = std::collections::HashSet::new();
        for d in devices {
            if !seen.insert(d.name.as_str()) {
                bail!(
                    ConfigError,
                    msg("duplicate device name {:?} in capture configuration", d.name)
                );
            }
        }

        let mut groups: HashMap<SocketAddr, Vec<&DeviceConfig>> = HashMap::new();
        for d in devices {
            groups.entry(d.bind_addr).or_default().push(d);
        }

        let buffer = Arc::new(Mutex::new(TakeBuffer::new()));
        let mut threads = Vec::new();
        for (bind_addr, mut group) in groups {
            let protocol_id = group[0].protocol_id.clone();
            if group.iter().any(|d| d.protocol_id != protocol_id) {
                warn!(%bind_addr, "devices sharing this address declare different protocols, skipping all of them");
                continue;
            }

            let protocol = match protocol::lookup(&protocol_id) {
                Ok(p) => p,
                Err(e) => {
                    warn!(%bind_addr, %protocol_id, err = %base::prettify_error(&e), "skipping device group");
                    continue;
                }
            };
            if group.len() > 1 && !protocol.supports_multi_device {
                let dropped: Vec<&str> = group[1..].iter().map(|d| d.name.as_str()).collect();
                warn!(
                    %bind_addr, protocol_id, dropped = ?dropped,
                    "protocol does not support multiple devices on one port; keeping only the first-registered device"
                );
                group.truncate(1);
            }

            let config = CaptureConfig {
                bind_addr,
                protocol_id,
                frame_rate,
                devices: group
                    .iter()
                    .map(|d| DeviceBinding {
                        device_name: d.name.clone(),
                        protocol_key: d.protocol_key.clone(),
                    })
                    .collect(),
            };
            match capture::spawn(config, buffer.clone(), shutdown.clone()) {
                Ok(thread) => threads.push(thread),
                Err(e) => {
                    warn!(%bind_addr, err = %base::prettify_error(&e), "skipping device group");
                }
            }
        }

        Ok(CaptureSupervisor { threads, buffer })
    }

    pub fn buffer(&self) -> Arc<Mutex<TakeBuffer>> {
        self.buffer.clone()
    }

    /// Waits for every capture thread to exit. Call after the shutdown signal has fired;
    /// otherwise this blocks until it does.
    pub fn join(self) {
        for t in self.threads {
            t.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn device(name: &str, port: u16, key: &str) -> DeviceConfig {
        DeviceConfig {
            name: name.to_string(),
            protocol_id: "freed".to_string(),
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, port)),
            protocol_key: key.to_string(),
        }
    }

    #[test]
    fn spawns_one_thread_per_distinct_address() {
        let (_tx, rx) = shutdown::channel();
        let devices = vec![device("cam1", 0, "0"), device("cam2", 0, "0")];
        // Two devices both binding port 0 (ephemeral) land on *different* real addresses,
        // so this exercises the "one thread per group" path with two groups of size one.
        let sup = CaptureSupervisor::start(&devices, 24, rx).unwrap();
        assert_eq!(sup.threads.len(), 2);
    }

    #[test]
    fn duplicate_device_name_is_a_config_error() {
        let (_tx, rx) = shutdown::channel();
        let devices = vec![device("cam1", 0, "0"), device("cam1", 0, "1")];
        let e = CaptureSupervisor::start(&devices, 24, rx).unwrap_err();
        assert_eq!(e.kind(), base::ErrorKind::ConfigError);
    }

    #[test]
    fn mismatched_protocols_on_one_port_are_skipped_not_fatal() {
        let (_tx, rx) = shutdown::channel();
        let mut conflicting = device("cam2", 9000, "0");
        conflicting.protocol_id = "other".to_string();
        let devices = vec![device("cam1", 9000, "0"), conflicting, device("cam3", 0, "0")];
        // The two devices sharing port 9000 disagree on protocol and are both skipped; the
        // unrelated device on its own ephemeral port still gets a thread.
        let sup = CaptureSupervisor::start(&devices, 24, rx).unwrap();
        assert_eq!(sup.threads.len(), 1);
    }

    #[test]
    fn unknown_protocol_is_skipped_not_fatal() {
        let (_tx, rx) = shutdown::channel();
        let mut bogus = device("cam1", 9001, "0");
        bogus.protocol_id = "nonexistent".to_string();
        let devices = vec![bogus, device("cam2", 0, "0")];
        let sup = CaptureSupervisor::start(&devices, 24, rx).unwrap();
        assert_eq!(sup.threads.len(), 1);
    }
}
