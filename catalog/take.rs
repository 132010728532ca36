// This file is part of Blackhole, a virtual-production take archival service.
// Copyright (C) 2024 The Blackhole Authors; see AUTHORS and LICENSE.txt.

//! The take catalog: a single SQLite table, one row per recorded take.

use base::{bail, err, Error, ErrorKind};
use chrono::NaiveDate;
use parking_lot::Mutex;
use rusqlite::{named_params, Connection, OptionalExtension, Row};
use tracing::warn;

const TABLE: &str = "blackhole_takes";

const CREATE_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS blackhole_takes (
    slate                    TEXT NOT NULL,
    take_number              INT  NOT NULL,
    corrected_slate          TEXT,
    corrected_take_number    INT,
    valid                    INT  NOT NULL DEFAULT 0,
    date                     TEXT NOT NULL,
    frame_rate               INT,
    timecode_in_frames       INT,
    timecode_out_frames      INT,
    timecode_in_smpte        TEXT,
    timecode_out_smpte       TEXT,
    level_snapshot_location  TEXT,
    level_sequence_location  TEXT,
    map                      TEXT,
    usd_archive_location     TEXT,
    description              TEXT,
    PRIMARY KEY (slate, take_number)
)
"#;

/// A take: one row of the catalog, keyed by `(slate, take_number)`.
#[derive(Clone, Debug, PartialEq)]
pub struct Take {
    pub slate: String,
    pub take_number: i64,
    pub corrected_slate: Option<String>,
    pub corrected_take_number: Option<i64>,
    pub valid: bool,
    pub date_created: NaiveDate,
    pub frame_rate: Option<i64>,
    pub timecode_in_frames: Option<i64>,
    pub timecode_out_frames: Option<i64>,
    pub timecode_in_smpte: Option<String>,
    pub timecode_out_smpte: Option<String>,
    pub level_snapshot_location: Option<String>,
    pub level_sequence_location: Option<String>,
    pub map: Option<String>,
    pub usd_export_location: Option<String>,
    pub description: Option<String>,
}

impl Take {
    fn from_row(row: &Row) -> rusqlite::Result<Take> {
        Ok(Take {
            slate: row.get("slate")?,
            take_number: row.get("take_number")?,
            corrected_slate: row.get("corrected_slate")?,
            corrected_take_number: row.get("corrected_take_number")?,
            valid: row.get::<_, i64>("valid")? != 0,
            date_created: row.get("date")?,
            frame_rate: row.get("frame_rate")?,
            timecode_in_frames: row.get("timecode_in_frames")?,
            timecode_out_frames: row.get("timecode_out_frames")?,
            timecode_in_smpte: row.get("timecode_in_smpte")?,
            timecode_out_smpte: row.get("timecode_out_smpte")?,
            level_snapshot_location: row.get("level_snapshot_location")?,
            level_sequence_location: row.get("level_sequence_location")?,
            map: row.get("map")?,
            usd_export_location: row.get("usd_archive_location")?,
            description: row.get("description")?,
        })
    }
}

/// Fields supplied when starting a recording; becomes the initial catalog row.
#[derive(Clone, Debug)]
pub struct TakeCreation {
    pub slate: String,
    pub take_number: i64,
    pub date_created: NaiveDate,
    pub frame_rate: i64,
    pub timecode_in_frames: i64,
    pub timecode_in_smpte: String,
    pub description: Option<String>,
    pub map: Option<String>,
}

/// A partial update to an existing take. `slate`/`take_number` identify the row; every other
/// field is applied only if `Some`. The creation date is immutable and never appears here.
#[derive(Clone, Debug, Default)]
pub struct TakeUpdate {
    pub slate: String,
    pub take_number: i64,
    pub corrected_slate: Option<String>,
    pub corrected_take_number: Option<i64>,
    pub valid: Option<bool>,
    pub frame_rate: Option<i64>,
    pub timecode_in_frames: Option<i64>,
    pub timecode_out_frames: Option<i64>,
    pub timecode_in_smpte: Option<String>,
    pub timecode_out_smpte: Option<String>,
    pub level_snapshot_location: Option<String>,
    pub level_sequence_location: Option<String>,
    pub map: Option<String>,
    pub usd_export_location: Option<String>,
    pub description: Option<String>,
}

impl TakeUpdate {
    pub fn new(slate: impl Into<String>, take_number: i64) -> Self {
        TakeUpdate {
            slate: slate.into(),
            take_number,
            ..Default::default()
        }
    }
}

/// An id pair used to request a bulk export. Corrected ids are matched too, mirroring the
/// catalog's `corrected_slate`/`corrected_take_number` late-binding rename support.
#[derive(Clone, Debug)]
pub struct TakeId {
    pub slate: String,
    pub take_number: i64,
}

/// Optional filters for [`Catalog::retrieve_takes`]. `slate_hint` is a prefix match.
#[derive(Clone, Debug, Default)]
pub struct TakeFilter {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub slate_hint: Option<String>,
}

/// The take catalog: a SQLite-backed store of [`Take`] rows, guarded by a mutex since
/// `rusqlite::Connection` is `!Sync`.
pub struct Catalog {
    conn: Mutex<Connection>,
}

impl Catalog {
    /// Opens (creating if necessary) the catalog database at `path`.
    pub fn open(path: &std::path::Path) -> Result<Catalog, Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| err!(CatalogError, msg("creating catalog directory {parent:?}"), source(e)))?;
        }
        let conn = Connection::open(path)
            .map_err(|e| err!(CatalogError, msg("opening catalog database {path:?}"), source(e)))?;
        conn.execute(CREATE_TABLE_SQL, [])
            .map_err(|e| err!(CatalogError, msg("creating {TABLE} table"), source(e)))?;
        Ok(Catalog {
            conn: Mutex::new(conn),
        })
    }

    /// Opens a private in-memory catalog, for tests.
    pub fn open_in_memory() -> Result<Catalog, Error> {
        let conn = Connection::open_in_memory()
            .map_err(|e| err!(CatalogError, msg("opening in-memory catalog"), source(e)))?;
        conn.execute(CREATE_TABLE_SQL, [])
            .map_err(|e| err!(CatalogError, msg("creating {TABLE} table"), source(e)))?;
        Ok(Catalog {
            conn: Mutex::new(conn),
        })
    }

    pub fn check_exists(&self, slate: &str, take_number: i64) -> Result<bool, Error> {
        let conn = self.conn.lock();
        let exists: Option<i64> = conn
            .query_row(
                &format!("SELECT 1 FROM {TABLE} WHERE slate = :slate AND take_number = :take_number"),
                named_params! { ":slate": slate, ":take_number": take_number },
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| err!(CatalogError, source(e)))?;
        Ok(exists.is_some())
    }

    pub fn retrieve_take(&self, slate: &str, take_number: i64) -> Result<Option<Take>, Error> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT * FROM {TABLE} WHERE slate = :slate AND take_number = :take_number"),
            named_params! { ":slate": slate, ":take_number": take_number },
            Take::from_row,
        )
        .optional()
        .map_err(|e| err!(CatalogError, source(e)))
    }

    pub fn retrieve_takes(&self, filter: &TakeFilter) -> Result<Vec<Take>, Error> {
        let mut clauses = Vec::new();
        if filter.start_date.is_some() {
            clauses.push("date >= :start_date");
        }
        if filter.end_date.is_some() {
            clauses.push("date <= :end_date");
        }
        if filter.slate_hint.is_some() {
            clauses.push("slate LIKE :slate_hint");
        }
        let mut sql = format!("SELECT * FROM {TABLE}");
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        let slate_hint_pattern = filter.slate_hint.as_ref().map(|s| format!("{s}%"));

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql).map_err(|e| err!(CatalogError, source(e)))?;
        let rows = stmt
            .query_map(
                named_params! {
                    ":start_date": filter.start_date,
                    ":end_date": filter.end_date,
                    ":slate_hint": slate_hint_pattern,
                },
                Take::from_row,
            )
            .map_err(|e| err!(CatalogError, source(e)))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| err!(CatalogError, source(e)))
    }

    /// Retrieves takes matching any of `ids`, by either their primary id or their corrected id.
    pub fn retrieve_takes_by_ids(&self, ids: &[TakeId]) -> Result<Vec<Take>, Error> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let primary: Vec<String> = ids
            .iter()
            .map(|id| format!("('{}', {})", id.slate.replace('\'', "''"), id.take_number))
            .collect();
        let list = primary.join(", ");
        let sql = format!(
            "SELECT * FROM {TABLE} WHERE (slate, take_number) IN ({list}) \
             OR (corrected_slate, corrected_take_number) IN ({list})"
        );
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql).map_err(|e| err!(CatalogError, source(e)))?;
        let rows = stmt
            .query_map([], Take::from_row)
            .map_err(|e| err!(CatalogError, source(e)))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| err!(CatalogError, source(e)))
    }

    pub fn insert_take(&self, new_take: &TakeCreation) -> Result<Take, Error> {
        let conn = self.conn.lock();
        let result = conn.execute(
            &format!(
                "INSERT INTO {TABLE} \
                 (slate, take_number, date, valid, frame_rate, timecode_in_frames, \
                  timecode_in_smpte, description, map) \
                 VALUES \
                 (:slate, :take_number, :date, 0, :frame_rate, :timecode_in_frames, \
                  :timecode_in_smpte, :description, :map)"
            ),
            named_params! {
                ":slate": new_take.slate,
                ":take_number": new_take.take_number,
                ":date": new_take.date_created,
                ":frame_rate": new_take.frame_rate,
                ":timecode_in_frames": new_take.timecode_in_frames,
                ":timecode_in_smpte": new_take.timecode_in_smpte,
                ":description": new_take.description,
                ":map": new_take.map,
            },
        );
        match result {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                bail!(
                    Conflict,
                    msg(
                        "take {}/{} already exists",
                        new_take.slate, new_take.take_number
                    )
                );
            }
            Err(e) => bail!(CatalogError, source(e)),
        }
        drop(conn);
        self.retrieve_take(&new_take.slate, new_take.take_number)?
            .ok_or_else(|| err!(Internal, msg("take vanished immediately after insert")))
    }

    pub fn update_take(&self, update: &TakeUpdate) -> Result<Take, Error> {
        let mut sets = Vec::new();
        if update.corrected_slate.is_some() {
            sets.push("corrected_slate = :corrected_slate");
        }
        if update.corrected_take_number.is_some() {
            sets.push("corrected_take_number = :corrected_take_number");
        }
        if update.valid.is_some() {
            sets.push("valid = :valid");
        }
        if update.frame_rate.is_some() {
            sets.push("frame_rate = :frame_rate");
        }
        if update.timecode_in_frames.is_some() {
            sets.push("timecode_in_frames = :timecode_in_frames");
        }
        if update.timecode_out_frames.is_some() {
            sets.push("timecode_out_frames = :timecode_out_frames");
        }
        if update.timecode_in_smpte.is_some() {
            sets.push("timecode_in_smpte = :timecode_in_smpte");
        }
        if update.timecode_out_smpte.is_some() {
            sets.push("timecode_out_smpte = :timecode_out_smpte");
        }
        if update.level_snapshot_location.is_some() {
            sets.push("level_snapshot_location = :level_snapshot_location");
        }
        if update.level_sequence_location.is_some() {
            sets.push("level_sequence_location = :level_sequence_location");
        }
        if update.map.is_some() {
            sets.push("map = :map");
        }
        if update.usd_export_location.is_some() {
            sets.push("usd_archive_location = :usd_archive_location");
        }
        if update.description.is_some() {
            sets.push("description = :description");
        }

        if sets.is_empty() {
            warn!(
                slate = %update.slate,
                take_number = update.take_number,
                "update_take called with no fields to update; skipping"
            );
            return self
                .retrieve_take(&update.slate, update.take_number)?
                .ok_or_else(|| {
                    err!(
                        NotFound,
                        msg("no such take {}/{}", update.slate, update.take_number)
                    )
                });
        }

        let valid_as_int = update.valid.map(|v| v as i64);
        let sql = format!(
            "UPDATE {TABLE} SET {} WHERE slate = :slate AND take_number = :take_number",
            sets.join(", ")
        );
        let conn = self.conn.lock();
        let n = conn
            .execute(
                &sql,
                named_params! {
                    ":slate": update.slate,
                    ":take_number": update.take_number,
                    ":corrected_slate": update.corrected_slate,
                    ":corrected_take_number": update.corrected_take_number,
                    ":valid": valid_as_int,
                    ":frame_rate": update.frame_rate,
                    ":timecode_in_frames": update.timecode_in_frames,
                    ":timecode_out_frames": update.timecode_out_frames,
                    ":timecode_in_smpte": update.timecode_in_smpte,
                    ":timecode_out_smpte": update.timecode_out_smpte,
                    ":level_snapshot_location": update.level_snapshot_location,
                    ":level_sequence_location": update.level_sequence_location,
                    ":map": update.map,
                    ":usd_archive_location": update.usd_export_location,
                    ":description": update.description,
                },
            )
            .map_err(|e| err!(CatalogError, source(e)))?;
        drop(conn);
        if n == 0 {
            bail!(
                NotFound,
                msg("no such take {}/{}", update.slate, update.take_number)
            );
        }
        self.retrieve_take(&update.slate, update.take_number)?
            .ok_or_else(|| err!(Internal, msg("take vanished immediately after update")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_catalog() -> Catalog {
        Catalog::open_in_memory().unwrap()
    }

    fn creation(slate: &str, take_number: i64) -> TakeCreation {
        TakeCreation {
            slate: slate.to_string(),
            take_number,
            date_created: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            frame_rate: 24,
            timecode_in_frames: 1000,
            timecode_in_smpte: "00:00:41:16".to_string(),
            description: None,
            map: None,
        }
    }

    #[test]
    fn insert_then_retrieve_round_trips() {
        let cat = new_catalog();
        let inserted = cat.insert_take(&creation("SlateA", 1)).unwrap();
        assert_eq!(inserted.slate, "SlateA");
        assert!(!inserted.valid);
        let fetched = cat.retrieve_take("SlateA", 1).unwrap().unwrap();
        assert_eq!(fetched, inserted);
    }

    #[test]
    fn duplicate_insert_is_a_conflict() {
        let cat = new_catalog();
        cat.insert_take(&creation("SlateA", 1)).unwrap();
        let e = cat.insert_take(&creation("SlateA", 1)).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn partial_update_leaves_other_fields_unchanged() {
        let cat = new_catalog();
        cat.insert_take(&creation("SlateA", 1)).unwrap();

        let mut update = TakeUpdate::new("SlateA", 1);
        update.description = Some("first pass".to_string());
        cat.update_take(&update).unwrap();

        let mut update2 = TakeUpdate::new("SlateA", 1);
        update2.valid = Some(true);
        update2.timecode_out_frames = Some(2000);
        let after = cat.update_take(&update2).unwrap();

        assert_eq!(after.description.as_deref(), Some("first pass"));
        assert!(after.valid);
        assert_eq!(after.timecode_out_frames, Some(2000));
    }

    #[test]
    fn update_of_missing_take_is_not_found() {
        let cat = new_catalog();
        let e = cat
            .update_take(&TakeUpdate::new("Nope", 1))
            .unwrap_err();
        assert_eq!(e.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn slate_hint_is_a_prefix_match() {
        let cat = new_catalog();
        cat.insert_take(&creation("SlateA_1", 1)).unwrap();
        cat.insert_take(&creation("OtherSlate", 1)).unwrap();

        let results = cat
            .retrieve_takes(&TakeFilter {
                slate_hint: Some("SlateA".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].slate, "SlateA_1");
    }
}
