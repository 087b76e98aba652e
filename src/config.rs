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

//! Register tree paths, field names and monitor tuning parameters.
//!
//! The path constants mirror the layout of the register service's parameter
//! tree for the ADM-PCIE-9V5 card. They are collected here so that the status
//! channel and the link monitor never hard-code tree locations themselves.

use crate::error::AdlinkError;
use std::time::Duration;

/// Status register block of the acquisition card. Holds the Aurora channel
/// and lane indicators read on every poll.
pub static STATUS_BLOCK_PATH: &str = "adxdma/registers/adm_pcie_9v5_stat";

/// Control register fields used to strobe the datapath resets.
pub static CONTROL_FIELDS_PATH: &str = "adxdma/registers/adm_pcie_9v5_ctrl/domain_resets/fields";

/// System state surface of the peer application that drives the ASIC,
/// targeted by the rebond command.
pub static PEER_SYSTEM_STATE_PATH: &str = "loki/application/system_state";

/// Field holding the per-channel "up" bitmask.
pub static CHAN_UP_FIELD: &str = "aurora_chan_up";

/// Field holding the per-lane "up" bitmask.
pub static LANE_UP_FIELD: &str = "aurora_lane_up";

/// Reset fields strobed during a datapath reset, in the order the hardware
/// requires them to be pulsed.
pub static RESET_FIELDS: [&str; 3] = ["aurora_reset", "data_path_reset", "cmac_0_reset"];

/// Key written to the peer application to request ASIC rebonding.
pub static REBOND_FIELD: &str = "ASIC_REBOND";

/// Value of `aurora_chan_up`/`aurora_lane_up` when every channel and lane is
/// bound to acquisition packets.
pub const BOUND_MASK: u32 = 0xfffff;

/// Tuning parameters and register tree locations for a [`LinkMonitor`].
///
/// Immutable once the monitor has been constructed. [`Default`] gives the
/// production values; tests shrink the timeouts.
///
/// [`LinkMonitor`]: crate::monitor::LinkMonitor
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Idle poll period while the link is bound.
    pub check_interval: Duration,
    /// Longest time to wait for data activity after a reset before giving up
    /// and returning to idle monitoring.
    pub bind_timeout: Duration,
    /// Longest time to wait for the link to report fully bound after a rebond
    /// command before restarting the reset cycle.
    pub rebind_timeout: Duration,
    /// Both status fields must equal this mask for the link to count as bound.
    pub bound_mask: u32,
    /// Parameter tree path of the status register block.
    pub status_path: String,
    /// Parameter tree path of the reset control fields.
    pub control_path: String,
    /// Parameter tree path of the peer application's system state surface.
    pub peer_path: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            check_interval: Duration::from_secs(5),
            bind_timeout: Duration::from_secs(100),
            rebind_timeout: Duration::from_secs(100),
            bound_mask: BOUND_MASK,
            status_path: STATUS_BLOCK_PATH.to_string(),
            control_path: CONTROL_FIELDS_PATH.to_string(),
            peer_path: PEER_SYSTEM_STATE_PATH.to_string(),
        }
    }
}

impl MonitorConfig {
    /// Reject configurations the monitor cannot run with.
    ///
    /// # Returns: `Result<(), AdlinkError>`
    /// * `Ok(())` - Configuration is usable
    /// * `Err(AdlinkError::Config)` - A path is empty or a timeout is zero
    pub fn validate(&self) -> Result<(), AdlinkError> {
        if self.status_path.is_empty() || self.control_path.is_empty() || self.peer_path.is_empty()
        {
            return Err(AdlinkError::Config(
                "status, control and peer parameter tree paths must all be non-empty".to_string(),
            ));
        }
        if self.bind_timeout.is_zero() || self.rebind_timeout.is_zero() {
            return Err(AdlinkError::Config(
                "bind and rebind timeouts must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
