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

//! Append-only ledger entry store.
//!
//! Stock movements and posted journal lines are written once and never
//! updated or deleted; the only write operation is `append`, and appending an
//! id that already exists is rejected. Corrections are new rows.

use crate::base::{AccountId, JournalEntryId, ProductId, StockEntryId, TenantId, WarehouseId};
use crate::error::{LedgerError, LedgerResult};
use crate::journal::AccountLedgerEntry;
use crate::stock::{StockKey, StockLedgerEntry};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Offset/limit window over an ordered listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

impl Page {
    pub fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }

    /// Everything, in one page.
    pub fn all() -> Self {
        Self {
            offset: 0,
            limit: usize::MAX,
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(0, 50)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageResult<T> {
    pub items: Vec<T>,
    /// Row count across all pages.
    pub total: usize,
}

impl<T> PageResult<T> {
    fn empty() -> Self {
        Self {
            items: Vec::new(),
            total: 0,
        }
    }
}

/// Immutable rows by id plus an insertion-ordered index per key.
#[derive(Debug)]
struct AppendLog<I, K, E>
where
    I: Eq + Hash,
    K: Eq + Hash,
{
    /// Rows by id; the entry API makes check-and-insert atomic.
    rows: DashMap<I, Arc<E>>,
    /// Row ids per key in append order.
    index: DashMap<K, Vec<I>>,
}

impl<I, K, E> AppendLog<I, K, E>
where
    I: Copy + Eq + Hash + Debug,
    K: Clone + Eq + Hash,
{
    fn new() -> Self {
        Self {
            rows: DashMap::new(),
            index: DashMap::new(),
        }
    }

    fn append(&self, id: I, key: K, row: E) -> LedgerResult<Arc<E>> {
        let row = Arc::new(row);
        match self.rows.entry(id) {
            Entry::Occupied(_) => return Err(LedgerError::DuplicateEntry(format!("{id:?}"))),
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&row));
            }
        }
        self.index.entry(key).or_default().push(id);
        Ok(row)
    }

    fn find(&self, id: &I) -> Option<Arc<E>> {
        self.rows.get(id).map(|row| Arc::clone(row.value()))
    }

    fn list(&self, key: &K, page: Page) -> PageResult<Arc<E>> {
        let Some(ids) = self.index.get(key) else {
            return PageResult::empty();
        };
        let total = ids.len();
        let window: Vec<I> = ids
            .iter()
            .skip(page.offset)
            .take(page.limit)
            .copied()
            .collect();
        drop(ids);

        let items = window.iter().filter_map(|id| self.find(id)).collect();
        PageResult { items, total }
    }

    fn keys(&self) -> Vec<K> {
        self.index.iter().map(|entry| entry.key().clone()).collect()
    }
}

/// Durable home of every stock movement and posted journal line.
#[derive(Debug)]
pub struct LedgerEntryStore {
    stock: AppendLog<StockEntryId, StockKey, StockLedgerEntry>,
    accounts: AppendLog<(JournalEntryId, u32), (TenantId, AccountId), AccountLedgerEntry>,
    next_stock_id: AtomicU64,
}

impl LedgerEntryStore {
    pub fn new() -> Self {
        Self {
            stock: AppendLog::new(),
            accounts: AppendLog::new(),
            next_stock_id: AtomicU64::new(1),
        }
    }

    /// Reserves the id for the next stock row.
    pub fn next_stock_entry_id(&self) -> StockEntryId {
        StockEntryId(self.next_stock_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Appends a stock movement.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::DuplicateEntry`] if a row with the same id exists.
    pub fn append_stock(&self, entry: StockLedgerEntry) -> LedgerResult<Arc<StockLedgerEntry>> {
        self.stock.append(entry.id, entry.key(), entry)
    }

    pub fn find_stock(&self, id: StockEntryId) -> Option<Arc<StockLedgerEntry>> {
        self.stock.find(&id)
    }

    /// Stock movements for one (tenant, warehouse, product) in append order.
    pub fn list_by_product_warehouse(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        page: Page,
    ) -> PageResult<Arc<StockLedgerEntry>> {
        let key = StockKey::new(tenant_id, warehouse_id, product_id);
        self.stock.list(&key, page)
    }

    /// Every stock movement of a tenant, ordered by id.
    pub fn stock_entries_for_tenant(&self, tenant_id: TenantId) -> Vec<Arc<StockLedgerEntry>> {
        let mut entries: Vec<_> = self
            .stock
            .keys()
            .into_iter()
            .filter(|key| key.tenant_id == tenant_id)
            .flat_map(|key| self.stock.list(&key, Page::all()).items)
            .collect();
        entries.sort_by_key(|entry| entry.id);
        entries
    }

    /// Appends one posted journal line.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::DuplicateEntry`] if the same (entry, line) was
    /// already recorded.
    pub fn append_account(&self, entry: AccountLedgerEntry) -> LedgerResult<Arc<AccountLedgerEntry>> {
        let id = (entry.entry_id, entry.line_no);
        let key = (entry.tenant_id, entry.account_id);
        self.accounts.append(id, key, entry)
    }

    /// Posted lines for one account in posting order.
    pub fn list_by_account(
        &self,
        tenant_id: TenantId,
        account_id: AccountId,
        page: Page,
    ) -> PageResult<Arc<AccountLedgerEntry>> {
        self.accounts.list(&(tenant_id, account_id), page)
    }
}

impl Default for LedgerEntryStore {
    fn default() -> Self {
        Self::new()
    }
}
