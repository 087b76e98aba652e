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

//! Acquisition link daemon (adlinkd) - background remediation for a card/host data link.
//!
//! The daemon supervises the high-speed data link between an FPGA-based
//! acquisition card and its host. It polls the card's Aurora channel/lane
//! status registers through the register service on the system DBus and,
//! when packet binding is lost, drives the recovery sequence autonomously:
//! datapath reset strobes, a bounded wait for data activity, an ASIC rebond
//! command to the peer application, and a bounded wait for the link to
//! confirm it is fully bound.
//!
//! There is no client-facing surface: the subsystem is fire-and-forget, its
//! behaviour observable only through the logs. The monitor runs on a single
//! supervising loop and stops when the process receives SIGINT, which clears
//! the shared enabled flag; all in-state waits observe the flag within one
//! second.
//!
//! # Environment Variables
//!
//! - `RUST_LOG` - Controls logging level (`trace`, `debug`, `info`, `warn`,
//!   `error` or `off`). Defaults to `info`

use log::info;
use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use zbus::Connection;

mod channel;
mod comm;
mod config;
mod error;
mod monitor;
mod task;

use crate::channel::StatusChannel;
use crate::comm::dbus::DbusParameterClient;
use crate::config::MonitorConfig;
use crate::monitor::LinkMonitor;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let connection = Connection::system().await?;
    let client = DbusParameterClient::new(&connection).await?;

    let monitor_config = MonitorConfig::default();
    let status_channel = StatusChannel::new(client, &monitor_config);
    let enabled = Arc::new(AtomicBool::new(true));
    let link_monitor = LinkMonitor::new(status_channel, monitor_config, enabled.clone())?;

    // SIGINT clears the enabled flag; the monitor observes it within one
    // poll period and the supervising loop falls out at the next tick.
    tokio::spawn({
        let enabled = enabled.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown requested, stopping link monitor");
                enabled.store(false, Ordering::SeqCst);
            }
        }
    });

    info!("Started adlinkd data link supervision");
    task::run(link_monitor, task::TICK).await;

    Ok(())
}
