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

//! Materialized balance rows.
//!
//! A [`BalanceStore`] keeps one current-state row per key (an account, or a
//! tenant/warehouse/product triple) as a cache of "sum of all ledger entries
//! for this key". Rows are the only shared mutable state in the core and are
//! guarded by a per-key pessimistic lock:
//!
//! - [`BalanceStore::slot`] hands out the row cell for a key.
//! - [`BalanceSlot::lock`] blocks other mutators of the same key, bounded by a
//!   timeout. The guard reports `None` while no row exists yet; the caller
//!   initializes one under the same lock.
//! - [`BalanceGuard::save`] upserts under the held lock after validating the
//!   row's invariants.
//! - [`BalanceStore::find`] is a short read for reporting.

use crate::error::{LedgerError, LedgerResult};
use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use std::fmt::{Debug, Display};
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// A materialized row that can check its own invariants.
pub trait Balance: Clone + Send {
    /// Rejects states that must never be stored.
    fn validate(&self) -> LedgerResult<()>;
}

type Cell<B> = Arc<Mutex<Option<B>>>;

/// Lockable row cells keyed by `K`.
#[derive(Debug)]
pub struct BalanceStore<K, B>
where
    K: Eq + Hash,
{
    rows: DashMap<K, Cell<B>>,
}

impl<K, B> BalanceStore<K, B>
where
    K: Clone + Eq + Hash + Display,
    B: Balance,
{
    pub fn new() -> Self {
        Self {
            rows: DashMap::new(),
        }
    }

    /// Returns the cell for `key`, creating an empty one if needed.
    ///
    /// Never hold a lock from [`BalanceSlot::lock`] while calling this for a
    /// different key in a different order; collect slots first, then lock.
    pub fn slot(&self, key: &K) -> BalanceSlot<K, B> {
        let cell = self
            .rows
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone();
        BalanceSlot {
            key: key.clone(),
            cell,
        }
    }

    /// Unlocked-for-the-caller read: the row lock is taken only long enough
    /// to copy the current value.
    pub fn find(&self, key: &K) -> Option<B> {
        let cell = self.rows.get(key).map(|cell| Arc::clone(cell.value()))?;
        let row = cell.lock();
        row.clone()
    }

    /// Copies every existing row.
    pub fn snapshot(&self) -> Vec<(K, B)> {
        let cells: Vec<(K, Cell<B>)> = self
            .rows
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();

        cells
            .into_iter()
            .filter_map(|(key, cell)| {
                let row = cell.lock();
                row.clone().map(|balance| (key, balance))
            })
            .collect()
    }
}

impl<K, B> Default for BalanceStore<K, B>
where
    K: Clone + Eq + Hash + Display,
    B: Balance,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Handle on one row cell.
pub struct BalanceSlot<K, B> {
    key: K,
    cell: Cell<B>,
}

impl<K, B> BalanceSlot<K, B>
where
    K: Display,
    B: Balance,
{
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Acquires the row lock, waiting at most `timeout`.
    ///
    /// # Errors
    ///
    /// [`LedgerError::LockTimeout`] if the lock is still held elsewhere when
    /// the timeout expires.
    pub fn lock(&self, timeout: Duration) -> LedgerResult<BalanceGuard<'_, B>> {
        match self.cell.try_lock_for(timeout) {
            Some(guard) => {
                debug!(key = %self.key, "balance row locked");
                Ok(BalanceGuard { row: guard })
            }
            None => {
                warn!(key = %self.key, ?timeout, "balance row lock timed out");
                Err(LedgerError::LockTimeout(self.key.to_string()))
            }
        }
    }
}

/// Exclusive access to a row until dropped.
pub struct BalanceGuard<'a, B> {
    row: MutexGuard<'a, Option<B>>,
}

impl<B: Balance> BalanceGuard<'_, B> {
    /// Current row, or `None` if it was never initialized.
    pub fn current(&self) -> Option<&B> {
        self.row.as_ref()
    }

    /// Upserts the row.
    ///
    /// # Errors
    ///
    /// Propagates the row's validation error; the stored row is left as it was.
    pub fn save(&mut self, balance: B) -> LedgerResult<()> {
        balance.validate()?;
        *self.row = Some(balance);
        Ok(())
    }
}

impl<B: Debug> Debug for BalanceGuard<'_, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BalanceGuard").field("row", &*self.row).finish()
    }
}
