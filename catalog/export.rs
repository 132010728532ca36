// This file is part of Blackhole, a virtual-production take archival service.
// Copyright (C) 2024 The Blackhole Authors; see AUTHORS and LICENSE.txt.

//! Packages a set of takes' USD archives into a single timestamped zip, alongside a
//! workbook manifest covering just that selection.
//!
//! The pipeline stages everything into a temporary directory under the export root, zips
//! it, then removes the staging directory — the zip file is the only thing that survives.

use crate::take::Take;
use crate::workbook;
use base::err;
use base::Error;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use tracing::warn;
use zip::write::FileOptions;
use zip::ZipWriter;

/// The outcome of one export run: the zip file written plus which takes made it in.
pub struct ExportResult {
    pub zip_path: PathBuf,
    pub exported: Vec<String>,
    pub failed: Vec<(String, String)>,
}

fn take_label(t: &Take) -> String {
    format!("{}/{}", t.slate, t.take_number)
}

/// Copies `src` into `dst` recursively, creating directories as needed.
fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<(), Error> {
    std::fs::create_dir_all(dst)
        .map_err(|e| err!(ArchiveError, msg("creating {dst:?}"), source(e)))?;
    for entry in std::fs::read_dir(src)
        .map_err(|e| err!(ArchiveError, msg("reading {src:?}"), source(e)))?
    {
        let entry = entry.map_err(|e| err!(ArchiveError, source(e)))?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        let file_type = entry
            .file_type()
            .map_err(|e| err!(ArchiveError, source(e)))?;
        if file_type.is_dir() {
            copy_dir_recursive(&from, &to)?;
        } else {
            std::fs::copy(&from, &to)
                .map_err(|e| err!(ArchiveError, msg("copying {from:?} to {to:?}"), source(e)))?;
        }
    }
    Ok(())
}

fn add_dir_to_zip<W: std::io::Write + std::io::Seek>(
    zip: &mut ZipWriter<W>,
    dir: &Path,
    prefix: &Path,
    options: FileOptions,
) -> Result<(), Error> {
    for entry in std::fs::read_dir(dir)
        .map_err(|e| err!(ArchiveError, msg("reading {dir:?}"), source(e)))?
    {
        let entry = entry.map_err(|e| err!(ArchiveError, source(e)))?;
        let path = entry.path();
        let name = prefix.join(entry.file_name());
        let file_type = entry
            .file_type()
            .map_err(|e| err!(ArchiveError, source(e)))?;
        if file_type.is_dir() {
            zip.add_directory(name.to_string_lossy(), options)
                .map_err(|e| err!(ArchiveError, source(e)))?;
            add_dir_to_zip(zip, &path, &name, options)?;
        } else {
            zip.start_file(name.to_string_lossy(), options)
                .map_err(|e| err!(ArchiveError, source(e)))?;
            let bytes = std::fs::read(&path)
                .map_err(|e| err!(ArchiveError, msg("reading {path:?}"), source(e)))?;
            zip.write_all(&bytes)
                .map_err(|e| err!(ArchiveError, msg("writing {name:?} into zip"), source(e)))?;
        }
    }
    Ok(())
}

/// Stages `takes`' archive directories (one per take, at `archive_root/<slate>/<take_number>`)
/// plus a selection workbook into a fresh directory under `export_root`, zips it, and cleans
/// up the staging directory. A take that was never archived (`usd_export_location` unset) is
/// recorded in `failed` without touching disk; a take that claims to be archived but whose
/// directory copy fails is also recorded in `failed` rather than aborting the whole export.
pub fn export_takes(
    archive_root: &Path,
    export_root: &Path,
    takes: &[Take],
    timestamp: &str,
) -> Result<ExportResult, Error> {
    let staging_dir = export_root.join(timestamp);
    std::fs::create_dir_all(&staging_dir)
        .map_err(|e| err!(ArchiveError, msg("creating export staging dir {staging_dir:?}"), source(e)))?;

    let mut exported = Vec::new();
    let mut failed = Vec::new();
    let mut exported_takes = Vec::new();

    for take in takes {
        if take.usd_export_location.is_none() {
            failed.push((take_label(take), "take has not been archived".to_string()));
            continue;
        }
        let take_dir = archive_root.join(&take.slate).join(take.take_number.to_string());
        let dest = staging_dir.join(&take.slate).join(take.take_number.to_string());
        match copy_dir_recursive(&take_dir, &dest) {
            Ok(()) => {
                exported.push(take_label(take));
                exported_takes.push(take.clone());
            }
            Err(e) => {
                warn!(take = %take_label(take), error = %e, "failed to copy take into export staging");
                failed.push((take_label(take), e.to_string()));
            }
        }
    }

    let manifest_path = staging_dir.join("export_manifest.xlsx");
    workbook::write_selection(&manifest_path, &exported_takes)?;

    let zip_name = format!("{timestamp}.zip");
    let zip_path = export_root.join(&zip_name);
    let zip_file = std::fs::File::create(&zip_path)
        .map_err(|e| err!(ArchiveError, msg("creating {zip_path:?}"), source(e)))?;
    let mut zip = ZipWriter::new(zip_file);
    let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    add_dir_to_zip(&mut zip, &staging_dir, Path::new(""), options)?;
    zip.finish()
        .map_err(|e| err!(ArchiveError, msg("finalizing {zip_path:?}"), source(e)))?;

    std::fs::remove_dir_all(&staging_dir)
        .map_err(|e| err!(ArchiveError, msg("removing staging dir {staging_dir:?}"), source(e)))?;

    Ok(ExportResult {
        zip_path,
        exported,
        failed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn take(slate: &str, take_number: i64, usd_export_location: Option<String>) -> Take {
        Take {
            slate: slate.to_string(),
            take_number,
            corrected_slate: None,
            corrected_take_number: None,
            valid: true,
            date_created: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            frame_rate: Some(24),
            timecode_in_frames: Some(0),
            timecode_out_frames: Some(100),
            timecode_in_smpte: Some("00:00:00:00".to_string()),
            timecode_out_smpte: Some("00:00:04:04".to_string()),
            level_snapshot_location: None,
            level_sequence_location: None,
            map: None,
            usd_export_location,
            description: None,
        }
    }

    #[test]
    fn exports_archived_take_and_flags_unarchived_one() {
        let archive = tempdir().unwrap();
        let export = tempdir().unwrap();
        let take_dir = archive.path().join("SlateA").join("1");
        let present = take("SlateA", 1, Some(take_dir.to_string_lossy().into_owned()));
        let never_archived = take("SlateB", 2, None);

        std::fs::create_dir_all(&take_dir).unwrap();
        std::fs::write(take_dir.join("cam1.usda"), b"#usda 1.0\n").unwrap();

        let result = export_takes(
            archive.path(),
            export.path(),
            &[present, never_archived],
            "2024-01-01_00-00-00",
        )
        .unwrap();

        assert_eq!(result.exported, vec!["SlateA/1"]);
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].0, "SlateB/2");
        assert!(result.zip_path.exists());
        assert!(!export.path().join("2024-01-01_00-00-00").exists());
    }

    #[test]
    fn missing_usd_export_location_is_rejected_before_touching_disk() {
        let archive = tempdir().unwrap();
        let export = tempdir().unwrap();
        let never_archived = take("SlateB", 2, None);

        let result = export_takes(archive.path(), export.path(), &[never_archived], "2024-01-01_00-00-00")
            .unwrap();

        assert!(result.exported.is_empty());
        assert_eq!(result.failed, vec![("SlateB/2".to_string(), "take has not been archived".to_string())]);
    }
}
