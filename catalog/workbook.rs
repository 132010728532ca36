// This file is part of Blackhole, a virtual-production take archival service.
// Copyright (C) 2024 The Blackhole Authors; see AUTHORS and LICENSE.txt.

//! The workbook mirror: a human-browsable `.xlsx` copy of the catalog, one sheet per
//! recording date, kept in sync with every catalog write.
//!
//! `rust_xlsxwriter` can only write a workbook, not read one back, so this module never
//! opens the existing file to find a row to update. Instead it keeps its own in-memory copy
//! of every row it has written this process, grouped by date; each mutation updates that
//! copy and then rewrites the whole file. That's exactly the set of rows the mirror itself
//! produced, so "never read back an existing file" costs nothing a fresh process wouldn't
//! rebuild anyway by replaying the catalog.

use crate::take::{Catalog, Take};
use base::err;
use base::Error;
use chrono::NaiveDate;
use parking_lot::Mutex;
use rust_xlsxwriter::Workbook as XlsxWorkbook;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const BACKUP_DIR: &str = "Spreadsheet_Backups";

const COLUMNS: &[&str] = &[
    "Slate",
    "Take Number",
    "Corrected Slate",
    "Corrected Take Number",
    "Valid",
    "Frame Rate",
    "Timecode In (Frames)",
    "Timecode In (SMPTE)",
    "Timecode Out (Frames)",
    "Timecode Out (SMPTE)",
    "Level Snapshot Location",
    "Level Sequence Location",
    "Map",
    "USD Archive Location",
    "Description",
];

/// A `.xlsx` mirror of the take catalog at `path`, updated in place as takes are inserted or
/// changed.
pub struct Workbook {
    path: PathBuf,
    rows: Mutex<BTreeMap<NaiveDate, Vec<Take>>>,
}

impl Workbook {
    pub fn new(path: PathBuf) -> Workbook {
        Workbook {
            path,
            rows: Mutex::new(BTreeMap::new()),
        }
    }

    /// Loads every take already in `catalog` into the in-memory row set, so a freshly
    /// started process mirrors takes recorded in a previous run before the next write.
    pub fn seed_from_catalog(&self, catalog: &Catalog) -> Result<(), Error> {
        let takes = catalog.retrieve_takes(&Default::default())?;
        let mut rows = self.rows.lock();
        for take in takes {
            upsert_in_place(rows.entry(take.date_created).or_default(), take);
        }
        Ok(())
    }

    /// Inserts or updates `take`'s row, backs up the previous file (if any), and rewrites
    /// the workbook.
    pub fn upsert_take(&self, take: &Take) -> Result<(), Error> {
        {
            let mut rows = self.rows.lock();
            upsert_in_place(rows.entry(take.date_created).or_default(), take.clone());
        }
        self.create_backup()?;
        self.save()
    }

    fn create_backup(&self) -> Result<(), Error> {
        if !self.path.exists() {
            return Ok(());
        }
        let parent = self.path.parent().unwrap_or_else(|| Path::new("."));
        let backup_dir = parent.join(BACKUP_DIR);
        std::fs::create_dir_all(&backup_dir)
            .map_err(|e| err!(ArchiveError, msg("creating {backup_dir:?}"), source(e)))?;
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "workbook.xlsx".to_string());
        let backup_path = backup_dir.join(format!("{stamp}_{file_name}"));
        std::fs::copy(&self.path, &backup_path)
            .map_err(|e| err!(ArchiveError, msg("backing up workbook to {backup_path:?}"), source(e)))?;
        Ok(())
    }

    fn save(&self) -> Result<(), Error> {
        let rows = self.rows.lock();
        let mut xlsx = XlsxWorkbook::new();
        for (date, takes) in rows.iter() {
            let sheet_name = date.format("%Y-%m-%d").to_string();
            let sheet = xlsx
                .add_worksheet()
                .set_name(&sheet_name)
                .map_err(|e| err!(ArchiveError, msg("naming sheet {sheet_name:?}"), source(e)))?;
            // Row 0 is a title row; the header proper lives on row 1 (`A2`), frozen so it
            // stays visible while scrolling.
            sheet
                .write_string(0, 0, format!("Blackhole takes — {sheet_name}"))
                .map_err(|e| err!(ArchiveError, source(e)))?;
            for (col, header) in COLUMNS.iter().enumerate() {
                sheet
                    .write_string(1, col as u16, *header)
                    .map_err(|e| err!(ArchiveError, source(e)))?;
            }
            sheet
                .set_freeze_panes(2, 0)
                .map_err(|e| err!(ArchiveError, source(e)))?;

            for (row_i, take) in takes.iter().enumerate() {
                let row = (row_i + 2) as u32;
                write_row(sheet, row, take)?;
            }
        }
        xlsx.save(&self.path)
            .map_err(|e| err!(ArchiveError, msg("saving workbook {:?}", self.path), source(e)))?;
        Ok(())
    }
}

/// Writes a standalone single-sheet workbook covering exactly `takes`, grouped onto one
/// sheet regardless of date. Used by the export pipeline to ship a manifest alongside a
/// bundle of selected takes, separately from the ever-growing master mirror.
pub fn write_selection(path: &Path, takes: &[Take]) -> Result<(), Error> {
    let mut xlsx = XlsxWorkbook::new();
    let sheet = xlsx
        .add_worksheet()
        .set_name("Export")
        .map_err(|e| err!(ArchiveError, source(e)))?;
    for (col, header) in COLUMNS.iter().enumerate() {
        sheet
            .write_string(0, col as u16, *header)
            .map_err(|e| err!(ArchiveError, source(e)))?;
    }
    sheet
        .set_freeze_panes(1, 0)
        .map_err(|e| err!(ArchiveError, source(e)))?;
    for (row_i, take) in takes.iter().enumerate() {
        write_row(sheet, (row_i + 1) as u32, take)?;
    }
    xlsx.save(path)
        .map_err(|e| err!(ArchiveError, msg("saving export workbook {path:?}"), source(e)))?;
    Ok(())
}

fn upsert_in_place(rows: &mut Vec<Take>, take: Take) {
    match rows
        .iter()
        .position(|r| r.slate == take.slate && r.take_number == take.take_number)
    {
        Some(i) => rows[i] = take,
        None => rows.push(take),
    }
}

fn write_row(sheet: &mut rust_xlsxwriter::Worksheet, row: u32, take: &Take) -> Result<(), Error> {
    let opt_str = |v: &Option<String>| v.clone().unwrap_or_default();
    let cells: [String; 15] = [
        take.slate.clone(),
        take.take_number.to_string(),
        opt_str(&take.corrected_slate),
        take.corrected_take_number.map(|v| v.to_string()).unwrap_or_default(),
        take.valid.to_string(),
        take.frame_rate.map(|v| v.to_string()).unwrap_or_default(),
        take.timecode_in_frames.map(|v| v.to_string()).unwrap_or_default(),
        opt_str(&take.timecode_in_smpte),
        take.timecode_out_frames.map(|v| v.to_string()).unwrap_or_default(),
        opt_str(&take.timecode_out_smpte),
        opt_str(&take.level_snapshot_location),
        opt_str(&take.level_sequence_location),
        opt_str(&take.map),
        opt_str(&take.usd_export_location),
        opt_str(&take.description),
    ];
    for (col, value) in cells.iter().enumerate() {
        sheet
            .write_string(row, col as u16, value)
            .map_err(|e| err!(ArchiveError, source(e)))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn take(slate: &str, take_number: i64, date: NaiveDate) -> Take {
        Take {
            slate: slate.to_string(),
            take_number,
            corrected_slate: None,
            corrected_take_number: None,
            valid: false,
            date_created: date,
            frame_rate: Some(24),
            timecode_in_frames: Some(0),
            timecode_out_frames: None,
            timecode_in_smpte: Some("00:00:00:00".to_string()),
            timecode_out_smpte: None,
            level_snapshot_location: None,
            level_sequence_location: None,
            map: None,
            usd_export_location: None,
            description: None,
        }
    }

    #[test]
    fn upsert_then_save_writes_a_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("master.xlsx");
        let wb = Workbook::new(path.clone());
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        wb.upsert_take(&take("SlateA", 1, date)).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn second_upsert_for_same_take_replaces_the_row() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("master.xlsx");
        let wb = Workbook::new(path);
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        wb.upsert_take(&take("SlateA", 1, date)).unwrap();
        let mut updated = take("SlateA", 1, date);
        updated.valid = true;
        wb.upsert_take(&updated).unwrap();

        let rows = wb.rows.lock();
        let day_rows = &rows[&date];
        assert_eq!(day_rows.len(), 1);
        assert!(day_rows[0].valid);
    }

    #[test]
    fn backup_is_skipped_when_no_prior_file_exists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("master.xlsx");
        let wb = Workbook::new(path);
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        wb.upsert_take(&take("SlateA", 1, date)).unwrap();
        let backup_dir = dir.path().join(BACKUP_DIR);
        assert!(!backup_dir.exists());
    }

    #[test]
    fn backup_is_written_before_a_second_save() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("master.xlsx");
        let wb = Workbook::new(path);
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        wb.upsert_take(&take("SlateA", 1, date)).unwrap();
        wb.upsert_take(&take("SlateB", 1, date)).unwrap();
        let backup_dir = dir.path().join(BACKUP_DIR);
        assert!(backup_dir.exists());
        assert_eq!(std::fs::read_dir(&backup_dir).unwrap().count(), 1);
    }
}
