// This file is part of Blackhole, a virtual-production take archival service.
// Copyright (C) 2024 The Blackhole Authors; see AUTHORS and LICENSE.txt.

//! Serializes access to the single in-progress recording, if any.
//!
//! Blackhole only ever records one take at a time: the capture supervisor binds one UDP
//! socket per device, and starting a second session while one is active would either
//! collide on those sockets or silently interleave two takes' samples. `SessionManager`
//! exists to make that invariant a type-level fact — `start_recording` refuses a second
//! session rather than quietly racing one.

use crate::config::{AppConfig, DeviceConfig};
use crate::session::{ArchiveResult, RecordingSession};
use crate::take::Catalog;
use crate::workbook::Workbook;
use base::{bail, Error};
use parking_lot::Mutex;

/// The current recording status: whether one is in progress, and if so, which take and at
/// what frame rate. Mirrors every field a caller needs to render a status response without
/// reaching back into the session itself.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordingStatus {
    pub is_recording: bool,
    pub slate: Option<String>,
    pub take_number: Option<i64>,
    pub frame_rate: Option<i64>,
}

impl RecordingStatus {
    fn idle() -> Self {
        RecordingStatus {
            is_recording: false,
            slate: None,
            take_number: None,
            frame_rate: None,
        }
    }
}

/// Owns the (at most one) active [`RecordingSession`].
pub struct SessionManager {
    current: Mutex<Option<RecordingSession>>,
}

impl SessionManager {
    pub fn new() -> Self {
        SessionManager {
            current: Mutex::new(None),
        }
    }

    /// Returns the full recording status. Every caller destructures all four fields —
    /// there is no abbreviated three-field form, so a status check can never silently drop
    /// the frame rate a caller asked for.
    pub fn get_recording_status(&self) -> RecordingStatus {
        match &*self.current.lock() {
            Some(session) => RecordingStatus {
                is_recording: true,
                slate: Some(session.slate().to_string()),
                take_number: Some(session.take_number()),
                frame_rate: Some(session.frame_rate()),
            },
            None => RecordingStatus::idle(),
        }
    }

    pub fn start_recording(
        &self,
        catalog: &Catalog,
        workbook: &Workbook,
        devices: &[DeviceConfig],
        slate: String,
        take_number: i64,
        frame_rate: i64,
        map: Option<String>,
        description: Option<String>,
    ) -> Result<(), Error> {
        let mut current = self.current.lock();
        if current.is_some() {
            bail!(
                Conflict,
                msg("a recording is already in progress; stop it before starting another")
            );
        }
        let session = RecordingSession::start(
            catalog,
            workbook,
            devices,
            slate,
            take_number,
            frame_rate,
            map,
            description,
        )?;
        *current = Some(session);
        Ok(())
    }

    pub fn stop_recording(
        &self,
        catalog: &Catalog,
        app: &AppConfig,
        workbook: &Workbook,
    ) -> Result<ArchiveResult, Error> {
        let session = self
            .current
            .lock()
            .take()
            .ok_or_else(|| base::err!(NotFound, msg("no recording is in progress")))?;
        session.stop(catalog, app, workbook)
    }

    /// Discards an in-progress session without archiving, e.g. after a crash-recovery check
    /// finds stale capture threads. The catalog row inserted at start time is left in place
    /// (`valid = false`) as a record that the take was attempted.
    pub fn reset_recording_state(&self) {
        if self.current.lock().take().is_some() {
            tracing::warn!("recording session reset without archiving");
        }
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_status_has_all_four_fields_none_or_false() {
        let mgr = SessionManager::new();
        let status = mgr.get_recording_status();
        assert!(!status.is_recording);
        assert!(status.slate.is_none());
        assert!(status.take_number.is_none());
        assert!(status.frame_rate.is_none());
    }

    #[test]
    fn reset_on_idle_manager_is_a_no_op() {
        let mgr = SessionManager::new();
        mgr.reset_recording_state();
        assert!(!mgr.get_recording_status().is_recording);
    }
}
