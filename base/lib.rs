// This file is part of Blackhole, a virtual-production take archival service.
// Copyright (C) 2024 The Blackhole Authors; see AUTHORS and LICENSE.txt.

mod error;
pub mod shutdown;
pub mod timecode;
pub mod tracing_setup;

pub use crate::error::{prettify_error, Error, ErrorKind, ResultExt};
