// This file is part of Blackhole, a virtual-production take archival service.
// Copyright (C) 2024 The Blackhole Authors; see AUTHORS and LICENSE.txt.

//! In-memory representation of a single timestamped tracking sample, and the per-take buffer
//! that accumulates them device by device while a recording is in progress.

use std::collections::HashMap;

/// One pose sample, already in USD's axis convention, stamped with the SMPTE timecode frame
/// it was received on.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackingSample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub pitch: f64,
    pub yaw: f64,
    pub roll: f64,
    /// Frame count elapsed since midnight, at the take's frame rate. Monotonically
    /// non-decreasing within one device's sample stream.
    pub frame: i64,
    /// Rendered `HH:MM:SS:FF` (or `;` for drop-frame) form of `frame`, cached so USD export
    /// doesn't re-derive it per sample.
    pub timecode: String,
}

/// Accumulates samples per device name for the duration of a recording. A device name maps
/// to every sample captured for it, in arrival order.
#[derive(Clone, Debug, Default)]
pub struct TakeBuffer {
    by_device: HashMap<String, Vec<TrackingSample>>,
}

impl TakeBuffer {
    pub fn new() -> Self {
        TakeBuffer::default()
    }

    pub fn push(&mut self, device_name: &str, sample: TrackingSample) {
        self.by_device
            .entry(device_name.to_string())
            .or_default()
            .push(sample);
    }

    pub fn devices(&self) -> impl Iterator<Item = &str> {
        self.by_device.keys().map(String::as_str)
    }

    pub fn samples(&self, device_name: &str) -> &[TrackingSample] {
        self.by_device
            .get(device_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.by_device.values().all(Vec::is_empty)
    }

    /// Consumes the buffer, handing ownership of each device's samples to the caller. This is
    /// the shape USD export needs: one archiver thread per device, each owning its own
    /// samples outright rather than sharing a reference.
    pub fn into_device_samples(self) -> HashMap<String, Vec<TrackingSample>> {
        self.by_device
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(frame: i64) -> TrackingSample {
        TrackingSample {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            pitch: 0.0,
            yaw: 0.0,
            roll: 0.0,
            frame,
            timecode: String::new(),
        }
    }

    #[test]
    fn push_groups_by_device_and_preserves_order() {
        let mut buf = TakeBuffer::new();
        buf.push("cam1", sample(1));
        buf.push("cam2", sample(1));
        buf.push("cam1", sample(2));

        assert_eq!(buf.samples("cam1").len(), 2);
        assert_eq!(buf.samples("cam1")[0].frame, 1);
        assert_eq!(buf.samples("cam1")[1].frame, 2);
        assert_eq!(buf.samples("cam2").len(), 1);
    }

    #[test]
    fn empty_buffer_reports_empty() {
        let buf = TakeBuffer::new();
        assert!(buf.is_empty());
    }

    #[test]
    fn into_device_samples_yields_a_plain_map() {
        let mut buf = TakeBuffer::new();
        buf.push("cam1", sample(1));
        let map = buf.into_device_samples();
        assert_eq!(map.get("cam1").unwrap().len(), 1);
    }
}
