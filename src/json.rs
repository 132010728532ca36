// This file is part of Blackhole, a virtual-production take archival service.
// Copyright (C) 2024 The Blackhole Authors; see AUTHORS and LICENSE.txt.

//! Wire-format request/response types for the HTTP API. Kept separate from `catalog`'s
//! domain types so a change to the wire format (renaming a JSON field, say) never forces a
//! change to the catalog's own schema, and vice versa.

use catalog::{Take, TakeFilter, TakeId, TakeUpdate};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(Deserialize))]
pub struct TakeDto {
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

impl From<Take> for TakeDto {
    fn from(t: Take) -> Self {
        TakeDto {
            slate: t.slate,
            take_number: t.take_number,
            corrected_slate: t.corrected_slate,
            corrected_take_number: t.corrected_take_number,
            valid: t.valid,
            date_created: t.date_created,
            frame_rate: t.frame_rate,
            timecode_in_frames: t.timecode_in_frames,
            timecode_out_frames: t.timecode_out_frames,
            timecode_in_smpte: t.timecode_in_smpte,
            timecode_out_smpte: t.timecode_out_smpte,
            level_snapshot_location: t.level_snapshot_location,
            level_sequence_location: t.level_sequence_location,
            map: t.map,
            usd_export_location: t.usd_export_location,
            description: t.description,
        }
    }
}

#[derive(Debug)]
pub struct TakeListQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub slate_hint: Option<String>,
}

impl From<TakeListQuery> for TakeFilter {
    fn from(q: TakeListQuery) -> Self {
        TakeFilter {
            start_date: q.start_date,
            end_date: q.end_date,
            slate_hint: q.slate_hint,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TakeUpdateRequest {
    pub slate: String,
    pub take_number: i64,
    #[serde(default)]
    pub corrected_slate: Option<String>,
    #[serde(default)]
    pub corrected_take_number: Option<i64>,
    #[serde(default)]
    pub valid: Option<bool>,
    #[serde(default)]
    pub frame_rate: Option<i64>,
    #[serde(default)]
    pub timecode_in_frames: Option<i64>,
    #[serde(default)]
    pub timecode_out_frames: Option<i64>,
    #[serde(default)]
    pub timecode_in_smpte: Option<String>,
    #[serde(default)]
    pub timecode_out_smpte: Option<String>,
    #[serde(default)]
    pub level_snapshot_location: Option<String>,
    #[serde(default)]
    pub level_sequence_location: Option<String>,
    #[serde(default)]
    pub map: Option<String>,
    #[serde(default)]
    pub usd_export_location: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl From<TakeUpdateRequest> for TakeUpdate {
    fn from(r: TakeUpdateRequest) -> Self {
        TakeUpdate {
            slate: r.slate,
            take_number: r.take_number,
            corrected_slate: r.corrected_slate,
            corrected_take_number: r.corrected_take_number,
            valid: r.valid,
            frame_rate: r.frame_rate,
            timecode_in_frames: r.timecode_in_frames,
            timecode_out_frames: r.timecode_out_frames,
            timecode_in_smpte: r.timecode_in_smpte,
            timecode_out_smpte: r.timecode_out_smpte,
            level_snapshot_location: r.level_snapshot_location,
            level_sequence_location: r.level_sequence_location,
            map: r.map,
            usd_export_location: r.usd_export_location,
            description: r.description,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StartRecordingRequest {
    #[serde(default)]
    pub map: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub frame_rate: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct RecordingStatusDto {
    pub status: &'static str,
    pub slate: Option<String>,
    pub take_number: Option<i64>,
    pub frame_rate: Option<i64>,
}

impl From<catalog::RecordingStatus> for RecordingStatusDto {
    fn from(s: catalog::RecordingStatus) -> Self {
        RecordingStatusDto {
            status: if s.is_recording { "started" } else { "stopped" },
            slate: s.slate,
            take_number: s.take_number,
            frame_rate: s.frame_rate,
        }
    }
}

/// Envelope wrapping a `start`/`stop` action's resulting take alongside the status word the
/// action just produced, per the HTTP API's documented response shape.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(Deserialize))]
pub struct RecordingActionResponse {
    pub status: &'static str,
    pub result: TakeDto,
}

/// The export-selection request identifies each take as a `[slate, take_number]` pair rather
/// than a `{slate, take_number}` object, matching the documented wire contract.
#[derive(Debug, Deserialize)]
pub struct ExportSelectionRequest {
    pub id_list: Vec<(String, i64)>,
}

impl ExportSelectionRequest {
    pub fn into_take_ids(self) -> Vec<TakeId> {
        self.id_list
            .into_iter()
            .map(|(slate, take_number)| TakeId { slate, take_number })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
pub struct ExportByDateRequest {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Serialize)]
pub struct ExportResponseDto {
    pub export_location: String,
    pub successful_exports: Vec<String>,
    pub failed_exports: Vec<ExportFailureDto>,
}

#[derive(Debug, Serialize)]
pub struct ExportFailureDto {
    pub take: String,
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorDto {
    pub error: String,
}
