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

pub mod dbus;

use crate::error::AdlinkError;

/// Access to named fields in the remote register/parameter tree.
///
/// This is the transport seam of the daemon: production code talks to the
/// register service over DBus through [`dbus::DbusParameterClient`], tests
/// substitute a scripted implementation. Paths address a block in the tree,
/// fields name a value within that block.
#[allow(async_fn_in_trait)]
pub trait ParameterClient {
    /// Read the current value of `field` under `path`, as the tree's string
    /// rendering of the register (decimal or `0x`-prefixed hex).
    async fn read_field(&self, path: &str, field: &str) -> Result<String, AdlinkError>;

    /// Write `value` to `field` under `path`. A non-success response from the
    /// register service surfaces as `AdlinkError::Channel`.
    async fn write_field(&self, path: &str, field: &str, value: &str) -> Result<(), AdlinkError>;
}
