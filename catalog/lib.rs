// This file is part of Blackhole, a virtual-production take archival service.
// Copyright (C) 2024 The Blackhole Authors; see AUTHORS and LICENSE.txt.

//! The take catalog crate: device/app configuration, tracking-protocol decode, capture
//! threads and their supervisor, recording sessions, USD stage writers, the workbook
//! mirror, and the zip export pipeline. Everything here is orchestrated by the `blackhole`
//! binary crate's HTTP layer; this crate has no network-facing code of its own beyond the
//! UDP capture sockets.

pub mod capture;
pub mod config;
pub mod export;
pub mod freed;
pub mod manager;
pub mod master;
pub mod protocol;
pub mod sample;
pub mod session;
pub mod supervisor;
pub mod take;
pub mod usd;
pub mod workbook;

// Not `#[cfg(test)]`: the root binary crate's integration tests use this too, and
// `#[cfg(test)]` isn't passed through to dependent crates.
pub mod testutil;

pub use crate::manager::{RecordingStatus, SessionManager};
pub use crate::session::{ArchiveResult, RecordingSession};
pub use crate::take::{Catalog, Take, TakeCreation, TakeFilter, TakeId, TakeUpdate};
