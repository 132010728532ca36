// This file is part of Blackhole, a virtual-production take archival service.
// Copyright (C) 2024 The Blackhole Authors; see AUTHORS and LICENSE.txt.

//! FreeD camera-tracking protocol: packet decode, checksum, and coordinate conversion.
//!
//! A FreeD packet is 29 bytes, big-endian, with a leading `0xD1` camera-data header byte.
//! Positions and rotations are 24-bit signed fixed-point fields; the device's zoom/focus/user
//! fields are carried but unused by Blackhole. Positions arrive in millimeters, Z-up,
//! right-handed, with pan measured clockwise-positive; Blackhole restates every sample in USD
//! convention (centimeters, Y-up, right-handed) at decode time so nothing downstream needs to
//! know about FreeD's axis layout.

pub const PACKET_LEN: usize = 29;
const HEADER_BYTE: u8 = 0xD1;

/// One decoded FreeD camera sample, already in USD's axis convention.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FreeDSample {
    /// `false` for a packet that carried the FreeD header byte but was otherwise malformed
    /// (wrong length or failed checksum). Fields are still populated on a best-effort basis
    /// so callers can log what arrived, but must not be trusted as a real camera position.
    pub valid: bool,
    pub camera_id: u8,
    /// Centimeters.
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Degrees.
    pub pitch: f64,
    pub yaw: f64,
    pub roll: f64,
    pub zoom: i32,
    pub focus: i32,
}

fn sign_extend_24(raw: u32) -> i32 {
    if raw & 0x0080_0000 != 0 {
        (raw | 0xFF00_0000) as i32
    } else {
        raw as i32
    }
}

/// Reads a 24-bit big-endian signed fixed-point field from `bytes` and divides by
/// `2^fractional_bits`.
fn read_fixed_point(bytes: &[u8], fractional_bits: u32) -> f64 {
    debug_assert_eq!(bytes.len(), 3);
    let raw = u32::from(bytes[0]) << 16 | u32::from(bytes[1]) << 8 | u32::from(bytes[2]);
    f64::from(sign_extend_24(raw)) / f64::from(1u32 << fractional_bits)
}

/// Validates a packet's checksum: starting from `0x40`, subtracting every other byte mod 256
/// must leave the trailing checksum byte as zero.
pub fn checksum_valid(packet: &[u8]) -> bool {
    if packet.len() != PACKET_LEN {
        return false;
    }
    let mut sum: u8 = 0x40;
    for &b in &packet[..PACKET_LEN - 1] {
        sum = sum.wrapping_sub(b);
    }
    sum == packet[PACKET_LEN - 1]
}

/// Decodes a raw FreeD packet into a sample already converted to USD's axis convention.
///
/// A packet whose first byte is not the camera-data header is not a FreeD transform message
/// at all, and `None` is returned so the caller can tell "nothing to see here" apart from
/// "something arrived and it's broken". A packet that does carry the header byte but is the
/// wrong length or fails its checksum still yields `Some`, with [`FreeDSample::valid`] set to
/// `false`: the device is clearly trying to report and callers may want to count or log that,
/// even though the position it carries can't be trusted. Never panics on attacker-controlled
/// input.
pub fn decode(packet: &[u8]) -> Option<FreeDSample> {
    if packet.is_empty() || packet[0] != HEADER_BYTE {
        return None;
    }

    let valid = packet.len() == PACKET_LEN && checksum_valid(packet);

    let mut buf = [0u8; PACKET_LEN];
    let n = packet.len().min(PACKET_LEN);
    buf[..n].copy_from_slice(&packet[..n]);

    let camera_id = buf[1];
    let rot_pan = read_fixed_point(&buf[2..5], 15);
    let rot_tilt = read_fixed_point(&buf[5..8], 15);
    let rot_roll = read_fixed_point(&buf[8..11], 15);
    let pos_x = read_fixed_point(&buf[11..14], 6);
    let pos_y = read_fixed_point(&buf[14..17], 6);
    let pos_z = read_fixed_point(&buf[17..20], 6);
    let zoom =
        sign_extend_24(u32::from(buf[20]) << 16 | u32::from(buf[21]) << 8 | u32::from(buf[22]));
    let focus =
        sign_extend_24(u32::from(buf[23]) << 16 | u32::from(buf[24]) << 8 | u32::from(buf[25]));

    Some(FreeDSample {
        valid,
        camera_id,
        x: pos_y / 10.0,
        y: pos_z / 10.0,
        z: pos_x / 10.0,
        pitch: rot_tilt,
        yaw: -(rot_pan + 90.0),
        roll: rot_roll,
        zoom,
        focus,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet_with(camera_id: u8, fields: [(f64, u32); 6], zoom: i32, focus: i32) -> Vec<u8> {
        let mut p = vec![0u8; PACKET_LEN];
        p[0] = HEADER_BYTE;
        p[1] = camera_id;
        let mut offset = 2;
        for (value, frac_bits) in fields {
            let scaled = (value * f64::from(1u32 << frac_bits)).round() as i32;
            let raw = (scaled as u32) & 0x00FF_FFFF;
            p[offset] = (raw >> 16) as u8;
            p[offset + 1] = (raw >> 8) as u8;
            p[offset + 2] = raw as u8;
            offset += 3;
        }
        let write_i24 = |p: &mut Vec<u8>, at: usize, v: i32| {
            let raw = (v as u32) & 0x00FF_FFFF;
            p[at] = (raw >> 16) as u8;
            p[at + 1] = (raw >> 8) as u8;
            p[at + 2] = raw as u8;
        };
        write_i24(&mut p, 20, zoom);
        write_i24(&mut p, 23, focus);
        p[26] = 0; // user-defined byte, unused
        let mut sum: u8 = 0x40;
        for &b in &p[..PACKET_LEN - 1] {
            sum = sum.wrapping_sub(b);
        }
        p[PACKET_LEN - 1] = sum;
        p
    }

    #[test]
    fn decodes_zeroed_packet() {
        let p = packet_with(1, [(0.0, 15), (0.0, 15), (0.0, 15), (0.0, 6), (0.0, 6), (0.0, 6)], 0, 0);
        let s = decode(&p).unwrap();
        assert!(s.valid);
        assert_eq!(s.camera_id, 1);
        assert_eq!(s.x, 0.0);
        assert_eq!(s.y, 0.0);
        assert_eq!(s.z, 0.0);
        assert_eq!(s.yaw, -90.0);
    }

    #[test]
    fn converts_position_and_rotation_to_usd_convention() {
        // pan=10, tilt=20, roll=30 degrees; pos x=100mm, y=200mm, z=300mm.
        let p = packet_with(
            7,
            [(10.0, 15), (20.0, 15), (30.0, 15), (100.0, 6), (200.0, 6), (300.0, 6)],
            0,
            0,
        );
        let s = decode(&p).unwrap();
        assert!((s.x - 20.0).abs() < 1e-3); // pos_y / 10
        assert!((s.y - 30.0).abs() < 1e-3); // pos_z / 10
        assert!((s.z - 10.0).abs() < 1e-3); // pos_x / 10
        assert!((s.pitch - 20.0).abs() < 1e-3);
        assert!((s.yaw - -100.0).abs() < 1e-3); // -(pan + 90)
        assert!((s.roll - 30.0).abs() < 1e-3);
    }

    #[test]
    fn negative_fixed_point_fields_sign_extend() {
        let p = packet_with(1, [(-10.0, 15), (0.0, 15), (0.0, 15), (-50.0, 6), (0.0, 6), (0.0, 6)], 0, 0);
        let s = decode(&p).unwrap();
        assert!((s.yaw - -80.0).abs() < 1e-3); // -(-10 + 90)
        assert!((s.z - -5.0).abs() < 1e-3);
    }

    #[test]
    fn empty_packet_is_not_a_transform_message() {
        assert!(decode(&[]).is_none());
    }

    #[test]
    fn bad_header_byte_is_not_a_transform_message() {
        let mut p = packet_with(1, [(0.0, 15), (0.0, 15), (0.0, 15), (0.0, 6), (0.0, 6), (0.0, 6)], 0, 0);
        p[0] = 0xD2;
        // recompute checksum so only the header byte is wrong
        let mut sum: u8 = 0x40;
        for &b in &p[..PACKET_LEN - 1] {
            sum = sum.wrapping_sub(b);
        }
        p[PACKET_LEN - 1] = sum;
        assert!(decode(&p).is_none());
    }

    #[test]
    fn short_packet_decodes_as_invalid() {
        // 28 bytes: one short of PACKET_LEN, per the boundary case in the protocol docs.
        let mut p = packet_with(1, [(0.0, 15), (0.0, 15), (0.0, 15), (0.0, 6), (0.0, 6), (0.0, 6)], 0, 0);
        p.truncate(PACKET_LEN - 1);
        let s = decode(&p).unwrap();
        assert!(!s.valid);
    }

    #[test]
    fn long_packet_decodes_as_invalid() {
        // 30 bytes: one over PACKET_LEN.
        let mut p = packet_with(1, [(0.0, 15), (0.0, 15), (0.0, 15), (0.0, 6), (0.0, 6), (0.0, 6)], 0, 0);
        p.push(0);
        let s = decode(&p).unwrap();
        assert!(!s.valid);
    }

    #[test]
    fn bad_checksum_decodes_as_invalid() {
        let mut p = packet_with(1, [(0.0, 15), (0.0, 15), (0.0, 15), (0.0, 6), (0.0, 6), (0.0, 6)], 0, 0);
        let last = p.len() - 1;
        p[last] ^= 0xFF;
        let s = decode(&p).unwrap();
        assert!(!s.valid);
    }
}
