// This file is part of adlinkd, a daemon which monitors the data link between an FPGA-based acquisition card and its host and rebinds it when packet synchronisation is lost.
//
// Copyright 2025 Canonical Ltd.
//
// SPDX-License-Identifier: GPL-3.0-only
//
// adlinkd is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License version 3, as published by the Free Software Foundation.
//
// adlinkd is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranties of MERCHANTABILITY, SATISFACTORY QUALITY, or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with this program.  If not, see http://www.gnu.org/licenses/.

use std::num::ParseIntError;

/// Error type for all adlinkd operations.
///
/// A `Channel` or `Value` error from a single monitor iteration means "link
/// status unknown" and is absorbed by the supervising task, which retries on
/// the next tick. `Config` errors are fatal at startup. Bind and rebind
/// timeouts are deliberately not represented here; they are ordinary state
/// machine transitions, not failures.
#[derive(Debug, thiserror::Error)]
pub enum AdlinkError {
    #[error("AdlinkError::Channel: register transport failed: {0}")]
    Channel(#[from] zbus::Error),
    #[error("AdlinkError::Value: could not parse register value {value:?} read from {field}: {e}")]
    Value {
        field: String,
        value: String,
        e: ParseIntError,
    },
    #[error("AdlinkError::Config: {0}")]
    Config(String),
}
