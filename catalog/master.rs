// This file is part of Blackhole, a virtual-production take archival service.
// Copyright (C) 2024 The Blackhole Authors; see AUTHORS and LICENSE.txt.

//! Writes the master stage for a take: a thin `.usda` file whose only content is a
//! `subLayerPaths` list referencing every per-device stage, each as a path relative to the
//! master stage's own directory.

use base::err;
use base::Error;
use std::path::Path;

/// Renders a master stage that sub-layers `device_stage_paths`, each already given relative
/// to the master stage's directory (typically `../cameras/<device>/<device>.usda`).
fn render_master_stage(device_stage_paths: &[String]) -> String {
    let mut out = String::from("#usda 1.0\n(\n    subLayerPaths = [\n");
    for p in device_stage_paths {
        out.push_str("        @");
        out.push_str(&p.replace('\\', "/"));
        out.push_str("@,\n");
    }
    out.push_str("    ]\n)\n");
    out
}

/// Writes the master stage for a take at `master_path`, sub-layering one stage per entry in
/// `device_stage_paths` (already relative to `master_path`'s parent directory).
pub fn write_master_stage(device_stage_paths: &[String], master_path: &Path) -> Result<(), Error> {
    let text = render_master_stage(device_stage_paths);
    if let Some(parent) = master_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            err!(ArchiveError, msg("creating master stage directory {parent:?}"), source(e))
        })?;
    }
    std::fs::write(master_path, text)
        .map_err(|e| err!(ArchiveError, msg("writing master stage {master_path:?}"), source(e)))
}

/// Builds the relative sub-layer path for one device stage, given the per-device stage's
/// directory name (conventionally the device name) and file name. Device stages live under
/// `cameras/<device_dir>/` relative to the take directory, while the master stage lives
/// under `master/`, so the reference climbs one level before descending into `cameras/`.
pub fn relative_sublayer_path(device_dir: &str, file_name: &str) -> String {
    format!("../cameras/{device_dir}/{file_name}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn renders_sublayer_paths_in_order() {
        let paths = vec![
            relative_sublayer_path("cam1", "cam1.usda"),
            relative_sublayer_path("cam2", "cam2.usda"),
        ];
        let text = render_master_stage(&paths);
        let cam1_idx = text.find("cameras/cam1/cam1.usda").unwrap();
        let cam2_idx = text.find("cameras/cam2/cam2.usda").unwrap();
        assert!(cam1_idx < cam2_idx);
        assert!(text.contains("@../cameras/cam1/cam1.usda@"));
    }

    #[test]
    fn writes_master_stage_to_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("master/SlateA_1.usda");
        write_master_stage(&[relative_sublayer_path("cam1", "cam1.usda")], &path).unwrap();
        assert!(path.exists());
    }
}
