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

//! Supervising loop that drives the link monitor.

use crate::comm::ParameterClient;
use crate::monitor::LinkMonitor;
use log::{error, info};
use std::time::Duration;

/// Cadence at which the supervising loop invokes [`LinkMonitor::step`].
pub const TICK: Duration = Duration::from_secs(1);

/// Drive `monitor` until its enabled flag is cleared.
///
/// The monitor's single execution context: one `step` per tick, no other
/// task ever touches the machine or its channel. A failed iteration is
/// logged and absorbed so one transient channel error cannot end the
/// recovery capability for the rest of the process's life; the next tick
/// retries from the state the machine was left in.
pub async fn run<P: ParameterClient>(mut monitor: LinkMonitor<P>, tick: Duration) {
    info!("link monitor task started");
    while monitor.is_enabled() {
        if let Err(e) = monitor.step().await {
            error!("link monitor iteration failed: {e}");
        }
        tokio::time::sleep(tick).await;
    }
    info!("link monitor task stopped");
}
