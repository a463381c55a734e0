// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Runtime configuration.
//!
//! Values come from, in increasing priority: built-in defaults, an optional
//! TOML file, and `ERP_LEDGER__*` environment variables
//! (e.g. `ERP_LEDGER__LOCK_TIMEOUT_MS=250`).

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Upper bound on any single balance/batch lock wait.
    pub lock_timeout_ms: u64,
    /// Requires lot number and expiry on every stock line and forces FEFO.
    pub pharmaceutical_compliance: bool,
    /// Annual carrying rate used when a report does not pass one.
    pub carrying_rate: Decimal,
    /// Cumulative value share (percent) up to which items are class A.
    pub abc_a_threshold: Decimal,
    /// Cumulative value share (percent) up to which items are class B.
    pub abc_b_threshold: Decimal,
    pub default_page_size: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 5_000,
            pharmaceutical_compliance: false,
            carrying_rate: dec!(0.25),
            abc_a_threshold: dec!(80),
            abc_b_threshold: dec!(95),
            default_page_size: 50,
        }
    }
}

impl LedgerConfig {
    /// Loads configuration from an optional file and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or a value fails to parse.
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        builder
            .add_source(config::Environment::with_prefix("ERP_LEDGER").separator("__"))
            .build()?
            .try_deserialize()
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}
