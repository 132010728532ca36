// This file is part of Blackhole, a virtual-production take archival service.
// Copyright (C) 2024 The Blackhole Authors; see AUTHORS and LICENSE.txt.

//! Subcommand to seed a fresh config directory with working defaults.

use base::Error;
use bpaf::Bpaf;
use catalog::config;
use std::path::PathBuf;
use tracing::info;

/// Writes app_config.ini and device_config.ini into a config directory, if not already present.
#[derive(Bpaf, Debug)]
#[bpaf(command("init-config"))]
pub struct Args {
    /// Directory to seed with app_config.ini and device_config.ini.
    #[bpaf(external(crate::parse_config_dir))]
    config_dir: PathBuf,
}

pub fn run(args: Args) -> Result<i32, Error> {
    config::seed_defaults(&args.config_dir)?;
    info!(config_dir = %args.config_dir.display(), "config directory seeded");
    Ok(0)
}
