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

//! Status channel of the acquisition card's data link.
//!
//! Bundles the three register operations the link monitor needs: a fresh
//! read of the Aurora channel/lane status, the three-field datapath reset
//! strobe, and the rebond command to the peer application. Nothing here is
//! cached or retried; every call is one round trip through the
//! [`ParameterClient`] and a failure means the link status is unknown.

use crate::comm::ParameterClient;
use crate::config::{self, MonitorConfig};
use crate::error::AdlinkError;
use log::trace;

/// One fresh reading of the link status registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkStatus {
    /// Bitmask of Aurora channels currently up.
    pub chan_up: u32,
    /// Bitmask of Aurora lanes currently up.
    pub lane_up: u32,
}

impl LinkStatus {
    /// Both fields bitwise-equal to the full mask. A partially up link (one
    /// field up, one down) counts as not bound, the same as total loss.
    pub fn is_bound(&self, mask: u32) -> bool {
        self.chan_up == mask && self.lane_up == mask
    }

    /// Any channel or lane showing activity at all.
    pub fn has_activity(&self) -> bool {
        self.chan_up != 0 || self.lane_up != 0
    }
}

/// Parse a register value as rendered by the parameter tree, either plain
/// decimal or `0x`-prefixed hex.
fn parse_register(field: &str, raw: &str) -> Result<u32, AdlinkError> {
    let trimmed = raw.trim();
    let (digits, radix) = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex_digits) => (hex_digits, 16),
        None => (trimmed, 10),
    };
    u32::from_str_radix(digits, radix).map_err(|e| AdlinkError::Value {
        field: field.to_string(),
        value: raw.to_string(),
        e,
    })
}

/// Register access for one monitored link, bound to the tree paths in a
/// [`MonitorConfig`].
pub struct StatusChannel<P: ParameterClient> {
    client: P,
    status_path: String,
    control_path: String,
    peer_path: String,
}

impl<P: ParameterClient> StatusChannel<P> {
    pub fn new(client: P, config: &MonitorConfig) -> Self {
        StatusChannel {
            client,
            status_path: config.status_path.clone(),
            control_path: config.control_path.clone(),
            peer_path: config.peer_path.clone(),
        }
    }

    /// Read both status fields in one synchronous round trip each.
    ///
    /// # Returns: `Result<LinkStatus, AdlinkError>`
    /// * `Ok(LinkStatus)` - Fresh channel/lane bitmasks
    /// * `Err(AdlinkError::Channel)` - Transport failure, status unknown
    /// * `Err(AdlinkError::Value)` - Register value did not parse
    pub async fn read_status(&self) -> Result<LinkStatus, AdlinkError> {
        let chan_raw = self
            .client
            .read_field(&self.status_path, config::CHAN_UP_FIELD)
            .await?;
        let lane_raw = self
            .client
            .read_field(&self.status_path, config::LANE_UP_FIELD)
            .await?;
        Ok(LinkStatus {
            chan_up: parse_register(config::CHAN_UP_FIELD, &chan_raw)?,
            lane_up: parse_register(config::LANE_UP_FIELD, &lane_raw)?,
        })
    }

    /// Strobe the three datapath reset fields.
    ///
    /// Each field is written to 1 and back to 0, and each pulse completes
    /// before the next field is touched. The field order is fixed by the
    /// hardware: `aurora_reset`, `data_path_reset`, `cmac_0_reset`.
    pub async fn pulse_resets(&self) -> Result<(), AdlinkError> {
        for field in config::RESET_FIELDS {
            trace!("pulsing reset field {field}");
            self.client
                .write_field(&self.control_path, field, "1")
                .await?;
            self.client
                .write_field(&self.control_path, field, "0")
                .await?;
        }
        Ok(())
    }

    /// Ask the peer application to rebond the ASIC to the card.
    pub async fn send_rebond(&self) -> Result<(), AdlinkError> {
        self.client
            .write_field(&self.peer_path, config::REBOND_FIELD, "true")
            .await
    }

    #[cfg(test)]
    pub(crate) fn client(&self) -> &P {
        &self.client
    }
}
