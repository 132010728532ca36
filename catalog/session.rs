// This file is part of Blackhole, a virtual-production take archival service.
// Copyright (C) 2024 The Blackhole Authors; see AUTHORS and LICENSE.txt.

//! One recording session: from capture start through stop-time archival into USD stages.

use crate::config::{AppConfig, DeviceConfig};
use crate::master;
use crate::sample::TrackingSample;
use crate::supervisor::CaptureSupervisor;
use crate::take::{Catalog, TakeCreation, TakeUpdate};
use crate::usd::{self, DeviceStage};
use crate::workbook::Workbook;
use base::timecode;
use base::{bail, err, shutdown, Error};
use chrono::Local;
use std::collections::HashMap;
use tracing::{info, warn};

/// A recording in progress: the capture supervisor plus the identifying fields that will
/// become the catalog row once the take is stopped.
pub struct RecordingSession {
    slate: String,
    take_number: i64,
    frame_rate: i64,
    timecode_in_frames: i64,
    timecode_in_smpte: String,
    map: Option<String>,
    supervisor: CaptureSupervisor,
    shutdown_tx: shutdown::Sender,
}

/// What archival produced for a stopped take: the catalog row and per-device stage paths
/// written, relative to the take's archive directory.
pub struct ArchiveResult {
    pub stage_paths: HashMap<String, std::path::PathBuf>,
}

impl RecordingSession {
    pub fn slate(&self) -> &str {
        &self.slate
    }

    pub fn take_number(&self) -> i64 {
        self.take_number
    }

    pub fn frame_rate(&self) -> i64 {
        self.frame_rate
    }

    pub fn timecode_in_smpte(&self) -> &str {
        &self.timecode_in_smpte
    }

    /// Starts capture threads for `devices`, records a catalog row for the take, and mirrors
    /// it into the workbook.
    pub fn start(
        catalog: &Catalog,
        workbook: &Workbook,
        devices: &[DeviceConfig],
        slate: String,
        take_number: i64,
        frame_rate: i64,
        map: Option<String>,
        description: Option<String>,
    ) -> Result<RecordingSession, Error> {
        if catalog.check_exists(&slate, take_number)? {
            bail!(
                Conflict,
                msg("take {slate}/{take_number} already exists in the catalog")
            );
        }

        let timecode_in_frames = timecode::system_timecode_as_frames(frame_rate)?;
        let timecode_in_smpte = timecode::frames_to_smpte(frame_rate, timecode_in_frames)?;

        let take = catalog.insert_take(&TakeCreation {
            slate: slate.clone(),
            take_number,
            date_created: Local::now().date_naive(),
            frame_rate,
            timecode_in_frames,
            timecode_in_smpte: timecode_in_smpte.clone(),
            description,
            map: map.clone(),
        })?;

        if let Err(e) = workbook.upsert_take(&take) {
            warn!(%slate, take_number, error = %e, "workbook mirror update failed");
        }

        let (shutdown_tx, shutdown_rx) = shutdown::channel();
        let supervisor = CaptureSupervisor::start(devices, frame_rate, shutdown_rx)?;

        info!(%slate, take_number, frame_rate, "recording started");
        Ok(RecordingSession {
            slate,
            take_number,
            frame_rate,
            timecode_in_frames,
            timecode_in_smpte,
            map,
            supervisor,
            shutdown_tx,
        })
    }

    /// Stops capture, archives every device's captured samples into a USD stage, writes the
    /// master stage, updates the catalog row and the workbook mirror, and returns the stage
    /// paths written. Consumes the session: a stopped recording cannot be resumed.
    pub fn stop(
        self,
        catalog: &Catalog,
        app: &AppConfig,
        workbook: &Workbook,
    ) -> Result<ArchiveResult, Error> {
        let RecordingSession {
            slate,
            take_number,
            frame_rate,
            timecode_in_frames,
            map,
            supervisor,
            shutdown_tx,
            ..
        } = self;

        let buffer = supervisor.buffer();
        drop(shutdown_tx);
        supervisor.join();

        let device_samples: HashMap<String, Vec<TrackingSample>> = std::sync::Arc::try_unwrap(buffer)
            .map(|mutex| mutex.into_inner())
            .unwrap_or_else(|arc| arc.lock().clone())
            .into_device_samples();

        let mut last_frame = timecode_in_frames;
        let take_dir = app
            .archive_path
            .join(&slate)
            .join(take_number.to_string());

        let mut stage_paths = HashMap::new();
        let mut sublayer_paths = Vec::new();
        for (device_name, samples) in &device_samples {
            if let Some(last) = samples.last() {
                last_frame = last_frame.max(last.frame);
            }
            let file_name = format!("{device_name}.usda");
            let path = take_dir.join("cameras").join(device_name).join(&file_name);
            let stage = DeviceStage {
                device_name,
                samples,
                frame_rate,
                slate: &slate,
                take_number,
                map: map.as_deref(),
            };
            // A single device's USD write failing must not lose the other devices' tracks
            // or block the master stage/catalog update that follows.
            if let Err(e) = usd::write_device_stage(&stage, &path) {
                warn!(%slate, take_number, %device_name, error = %e, "writing device stage failed, skipping device");
                continue;
            }
            sublayer_paths.push(master::relative_sublayer_path(device_name, &file_name));
            stage_paths.insert(device_name.clone(), path);
        }

        let master_path = take_dir.join("master").join("MasterSequence.usda");
        master::write_master_stage(&sublayer_paths, &master_path)?;

        let timecode_out_smpte = timecode::frames_to_smpte(frame_rate, last_frame)?;
        let mut update = TakeUpdate::new(slate.clone(), take_number);
        update.valid = Some(true);
        update.timecode_out_frames = Some(last_frame);
        update.timecode_out_smpte = Some(timecode_out_smpte);
        update.usd_export_location = Some(take_dir.to_string_lossy().into_owned());
        let take = catalog.update_take(&update)?;

        if let Err(e) = workbook.upsert_take(&take) {
            warn!(%slate, take_number, error = %e, "workbook mirror update failed");
        }

        info!(%slate, take_number, devices = device_samples.len(), "recording stopped and archived");
        Ok(ArchiveResult { stage_paths })
    }
}
