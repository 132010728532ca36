// This file is part of Blackhole, a virtual-production take archival service.
// Copyright (C) 2024 The Blackhole Authors; see AUTHORS and LICENSE.txt.

//! Writes one device's captured samples out as an animated USD camera stage.
//!
//! No USD SDK is linked in; a `.usda` stage is plain, line-oriented ASCII text, and the
//! layout this module emits (`/World` group Xform, `/World/anim` group Xform holding the
//! `Slate`/`TakeNumber` attributes, one `Camera` prim per device with per-frame
//! `xformOp:translate`/`xformOp:rotateXYZ` time samples) is fixed enough to build directly
//! with `std::fmt::Write` rather than through a scene-graph API.

use crate::sample::TrackingSample;
use base::err;
use base::Error;
use std::fmt::Write as _;
use std::path::Path;

/// Everything needed to write one device's stage.
pub struct DeviceStage<'a> {
    pub device_name: &'a str,
    pub samples: &'a [TrackingSample],
    pub frame_rate: i64,
    pub slate: &'a str,
    pub take_number: i64,
    pub map: Option<&'a str>,
}

fn fmt_f64(v: f64) -> String {
    // USD accepts plain decimal notation; trim to a sane precision so stages stay readable
    // and diff-friendly.
    format!("{v:.6}")
}

/// Renders `stage` as `.usda` text and writes it to `path`, creating parent directories as
/// needed. Returns [`base::ErrorKind::ArchiveError`] on any I/O failure, never panics if
/// `samples` is empty (an empty stage with no time samples is still written).
pub fn write_device_stage(stage: &DeviceStage, path: &Path) -> Result<(), Error> {
    let text = render_device_stage(stage);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| err!(ArchiveError, msg("creating stage directory {parent:?}"), source(e)))?;
    }
    std::fs::write(path, text)
        .map_err(|e| err!(ArchiveError, msg("writing stage {path:?}"), source(e)))
}

fn render_device_stage(stage: &DeviceStage) -> String {
    let mut out = String::new();

    let (start, end) = match (stage.samples.first(), stage.samples.last()) {
        (Some(first), Some(last)) => (first.frame, last.frame),
        _ => (0, 0),
    };

    writeln!(out, "#usda 1.0").unwrap();
    writeln!(out, "(").unwrap();
    writeln!(out, "    startTimeCode = {start}").unwrap();
    writeln!(out, "    endTimeCode = {end}").unwrap();
    writeln!(out, "    framesPerSecond = {}", stage.frame_rate).unwrap();
    writeln!(out, "    timeCodesPerSecond = {}", stage.frame_rate).unwrap();
    writeln!(out, "    upAxis = \"Y\"").unwrap();
    writeln!(out, ")").unwrap();
    writeln!(out).unwrap();

    writeln!(out, "def Xform \"World\" (").unwrap();
    writeln!(out, "    kind = \"group\"").unwrap();
    writeln!(out, ")").unwrap();
    writeln!(out, "{{").unwrap();
    if let Some(map) = stage.map {
        writeln!(out, "    string Map = \"{map}\"").unwrap();
        writeln!(out).unwrap();
    }

    writeln!(out, "    def Xform \"anim\" (").unwrap();
    writeln!(out, "        kind = \"group\"").unwrap();
    writeln!(out, "    )").unwrap();
    writeln!(out, "    {{").unwrap();
    writeln!(out, "        string Slate = \"{}\"", stage.slate).unwrap();
    writeln!(out, "        int TakeNumber = {}", stage.take_number).unwrap();
    writeln!(out).unwrap();

    writeln!(out, "        def Camera \"{}\" (", sanitize_prim_name(stage.device_name)).unwrap();
    writeln!(out, "            kind = \"group\"").unwrap();
    writeln!(out, "        )").unwrap();
    writeln!(out, "        {{").unwrap();
    writeln!(
        out,
        "            uniform token[] xformOpOrder = [\"xformOp:translate\", \"xformOp:rotateXYZ\"]"
    )
    .unwrap();
    write_translate_samples(&mut out, stage.samples);
    write_rotate_samples(&mut out, stage.samples);
    writeln!(out, "        }}").unwrap();

    writeln!(out, "    }}").unwrap();
    writeln!(out, "}}").unwrap();

    out
}

fn write_translate_samples(out: &mut String, samples: &[TrackingSample]) {
    writeln!(out, "            double3 xformOp:translate.timeSamples = {{").unwrap();
    for s in samples {
        writeln!(
            out,
            "                {}: ({}, {}, {}),",
            s.frame,
            fmt_f64(s.x),
            fmt_f64(s.y),
            fmt_f64(s.z),
        )
        .unwrap();
    }
    writeln!(out, "            }}").unwrap();
}

fn write_rotate_samples(out: &mut String, samples: &[TrackingSample]) {
    writeln!(out, "            double3 xformOp:rotateXYZ.timeSamples = {{").unwrap();
    for s in samples {
        writeln!(
            out,
            "                {}: ({}, {}, {}),",
            s.frame,
            fmt_f64(s.pitch),
            fmt_f64(s.yaw),
            fmt_f64(s.roll),
        )
        .unwrap();
    }
    writeln!(out, "            }}").unwrap();
}

/// USD prim names must be valid identifiers; device names come from free-text INI sections,
/// so non-identifier characters are replaced with `_`.
fn sanitize_prim_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for (i, c) in name.chars().enumerate() {
        if c.is_alphanumeric() || c == '_' {
            out.push(c);
        } else {
            out.push('_');
        }
        if i == 0 && out.chars().next().is_some_and(|c| c.is_ascii_digit()) {
            out.insert(0, '_');
        }
    }
    if out.is_empty() {
        out.push('_');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample(frame: i64) -> TrackingSample {
        TrackingSample {
            x: 1.0,
            y: 2.0,
            z: 3.0,
            pitch: 4.0,
            yaw: 5.0,
            roll: 6.0,
            frame,
            timecode: String::new(),
        }
    }

    #[test]
    fn renders_start_and_end_timecode_from_samples() {
        let samples = vec![sample(100), sample(101), sample(150)];
        let stage = DeviceStage {
            device_name: "cam1",
            samples: &samples,
            frame_rate: 24,
            slate: "SlateA",
            take_number: 3,
            map: Some("MapName"),
        };
        let text = render_device_stage(&stage);
        assert!(text.contains("startTimeCode = 100"));
        assert!(text.contains("endTimeCode = 150"));
        assert!(text.contains("string Slate = \"SlateA\""));
        assert!(text.contains("int TakeNumber = 3"));
        assert!(text.contains("string Map = \"MapName\""));
        assert!(text.contains("def Camera \"cam1\" ("));
        let camera_idx = text.find("def Camera \"cam1\"").unwrap();
        assert!(text[camera_idx..].contains("kind = \"group\""));
    }

    #[test]
    fn empty_samples_still_produce_a_valid_stage() {
        let stage = DeviceStage {
            device_name: "cam1",
            samples: &[],
            frame_rate: 24,
            slate: "SlateA",
            take_number: 1,
            map: None,
        };
        let text = render_device_stage(&stage);
        assert!(text.contains("startTimeCode = 0"));
        assert!(!text.contains("Map ="));
    }

    #[test]
    fn sanitizes_non_identifier_device_names() {
        assert_eq!(sanitize_prim_name("cam-1 (left)"), "cam_1__left_");
    }

    #[test]
    fn writes_stage_to_disk() {
        let dir = tempdir().unwrap();
        let samples = vec![sample(0)];
        let stage = DeviceStage {
            device_name: "cam1",
            samples: &samples,
            frame_rate: 24,
            slate: "SlateA",
            take_number: 1,
            map: None,
        };
        let path = dir.path().join("cam1/cam1.usda");
        write_device_stage(&stage, &path).unwrap();
        assert!(path.exists());
    }
}
