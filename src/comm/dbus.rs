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

//! DBus proxy for the acquisition card's register service.
//!
//! The register service exposes the card's parameter tree on the system bus
//! at `com.canonical.adregistry`. The [`RegistersProxy`] trait is generated
//! by the `zbus` `#[proxy]` macro and provides type-safe, asynchronous access
//! to it; [`DbusParameterClient`] wraps the proxy behind the crate's
//! [`ParameterClient`] seam so the monitor never sees DBus types.

use crate::comm::ParameterClient;
use crate::error::AdlinkError;
use log::trace;
use zbus::{Connection, proxy};

#[proxy(
    interface = "com.canonical.adregistry.registers",
    default_service = "com.canonical.adregistry",
    default_path = "/com/canonical/adregistry/registers"
)]
pub trait Registers {
    /// Read the string rendering of a single register field.
    async fn read_field(&self, path: &str, field: &str) -> zbus::Result<String>;

    /// Write a single register field.
    async fn write_field(&self, path: &str, field: &str, value: &str) -> zbus::Result<()>;
}

/// [`ParameterClient`] backed by the register service's DBus interface.
pub struct DbusParameterClient {
    proxy: RegistersProxy<'static>,
}

impl DbusParameterClient {
    /// Create a client on an established bus connection.
    ///
    /// # Returns: `Result<DbusParameterClient, AdlinkError>`
    /// * `Ok(DbusParameterClient)` - Proxy built and ready
    /// * `Err(AdlinkError::Channel)` - Proxy construction failed
    pub async fn new(connection: &Connection) -> Result<Self, AdlinkError> {
        let proxy = RegistersProxy::new(connection).await?;
        Ok(DbusParameterClient { proxy })
    }
}

impl ParameterClient for DbusParameterClient {
    async fn read_field(&self, path: &str, field: &str) -> Result<String, AdlinkError> {
        trace!("reading register field {path}/{field}");
        Ok(self.proxy.read_field(path, field).await?)
    }

    async fn write_field(&self, path: &str, field: &str, value: &str) -> Result<(), AdlinkError> {
        trace!("writing {value} to register field {path}/{field}");
        Ok(self.proxy.write_field(path, field, value).await?)
    }
}
