// This file is part of Blackhole, a virtual-production take archival service.
// Copyright (C) 2024 The Blackhole Authors; see AUTHORS and LICENSE.txt.

//! Utilities for automated testing involving Blackhole's catalog crate.

use crate::config::{AppConfig, DeviceConfig};
use crate::take::Catalog;
use crate::workbook::Workbook;
use std::net::{Ipv4Addr, SocketAddr};
use tempfile::TempDir;

static INIT: std::sync::Once = std::sync::Once::new();

/// Performs global initialization for tests: installs a `tracing` subscriber so `cargo test
/// -- --nocapture` shows log output instead of silently swallowing it.
pub fn init() {
    INIT.call_once(|| {
        base::tracing_setup::install_for_tests();
    });
}

/// A disposable set of catalog-adjacent state for one test: an in-memory catalog, an
/// on-disk workbook and archive tree rooted in a temporary directory, and a device fixture
/// ready to hand to [`crate::supervisor::CaptureSupervisor::start`].
pub struct TestHarness {
    pub tmpdir: TempDir,
    pub catalog: Catalog,
    pub workbook: Workbook,
    pub app: AppConfig,
}

impl TestHarness {
    pub fn new() -> Self {
        init();
        let tmpdir = tempfile::Builder::new()
            .prefix("blackhole-test")
            .tempdir()
            .unwrap();
        let app = AppConfig {
            database_path: tmpdir.path().join("blackhole.db"),
            archive_path: tmpdir.path().join("archive"),
            export_path: tmpdir.path().join("export"),
            spreadsheet_path: tmpdir.path().join("master.xlsx"),
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
            default_frame_rate: 24,
        };
        let catalog = Catalog::open_in_memory().unwrap();
        let workbook = Workbook::new(app.spreadsheet_path.clone());
        TestHarness {
            tmpdir,
            catalog,
            workbook,
            app,
        }
    }

    /// A single FreeD device bound to an ephemeral port, suitable for exercising the
    /// capture supervisor without colliding with a real camera's port.
    pub fn one_freed_device(&self, name: &str) -> Vec<DeviceConfig> {
        vec![DeviceConfig {
            name: name.to_string(),
            protocol_id: "freed".to_string(),
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
            protocol_key: "0".to_string(),
        }]
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
