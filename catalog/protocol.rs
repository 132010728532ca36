// This file is part of Blackhole, a virtual-production take archival service.
// Copyright (C) 2024 The Blackhole Authors; see AUTHORS and LICENSE.txt.

//! The tracking-protocol registry.
//!
//! Each supported wire protocol publishes a static [`Protocol`] capability set: its fixed
//! packet length, a decode function, and whether it allows more than one device to share a
//! capture socket. Device configuration names a protocol by id string; the supervisor looks
//! it up here rather than dispatching on the capture thread's own runtime type, so the
//! question "can this protocol multiplex several devices on one port" is answered by a plain
//! data lookup instead of an `instanceof`-style check against a thread instance.

use crate::freed;
use crate::sample::TrackingSample;
use base::Error;

/// A decoded sample plus the identifying key (e.g. FreeD's camera id) used to route it to a
/// device name when several devices share one socket. `valid` is `false` for a packet that
/// carried the protocol's header but was otherwise malformed; callers decide whether to log
/// and drop it or thread it through anyway.
pub struct DecodedSample {
    pub key: String,
    pub valid: bool,
    pub sample: TrackingSample,
}

/// Static capabilities of one tracking-protocol implementation.
pub struct Protocol {
    pub id: &'static str,
    pub packet_len: usize,
    pub supports_multi_device: bool,
    decode_fn: fn(&[u8]) -> Option<DecodedSample>,
}

impl Protocol {
    /// Returns `None` when `packet` isn't a transform message for this protocol at all (e.g.
    /// a bad header byte); `Some` otherwise, with `DecodedSample::valid` reporting whether the
    /// packet was well-formed.
    pub fn decode(&self, packet: &[u8]) -> Option<DecodedSample> {
        (self.decode_fn)(packet)
    }
}

fn decode_freed(packet: &[u8]) -> Option<DecodedSample> {
    let s = freed::decode(packet)?;
    Some(DecodedSample {
        key: s.camera_id.to_string(),
        valid: s.valid,
        sample: TrackingSample {
            x: s.x,
            y: s.y,
            z: s.z,
            pitch: s.pitch,
            yaw: s.yaw,
            roll: s.roll,
            frame: 0,
            timecode: String::new(),
        },
    })
}

const FREED: Protocol = Protocol {
    id: "freed",
    packet_len: freed::PACKET_LEN,
    supports_multi_device: true,
    decode_fn: decode_freed,
};

const ALL: &[&Protocol] = &[&FREED];

/// Looks up a protocol by its device-config id (case-insensitive).
pub fn lookup(id: &str) -> Result<&'static Protocol, Error> {
    ALL.iter()
        .find(|p| p.id.eq_ignore_ascii_case(id))
        .copied()
        .ok_or_else(|| {
            let known: Vec<&str> = ALL.iter().map(|p| p.id).collect();
            base::err!(
                ProtocolError,
                msg("unknown tracking protocol {id:?}; known protocols: {}", known.join(", "))
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn looks_up_freed_case_insensitively() {
        let p = lookup("FreeD").unwrap();
        assert_eq!(p.id, "freed");
        assert!(p.supports_multi_device);
    }

    #[test]
    fn unknown_protocol_is_a_protocol_error() {
        let e = lookup("nonexistent").unwrap_err();
        assert_eq!(e.kind(), base::ErrorKind::ProtocolError);
    }
}
