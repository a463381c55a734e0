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

//! # ERP Ledger
//!
//! Multi-tenant ledger core: a double-entry journal over a chart of accounts,
//! and a stock ledger with batch costing and inventory analytics.
//!
//! ## Core Components
//!
//! - [`Engine`]: Entry point for every operation, tenant passed explicitly
//! - [`ChartOfAccounts`]: Accounts, hierarchy and current balances
//! - [`JournalPostingEngine`]: Draft → Posted → Reversed lifecycle
//! - [`StockCostingEngine`]: Receipts and FIFO/LIFO/FEFO/manual deductions
//! - [`valuation`]: Valuation, ABC, turnover, carrying cost and demand forecast
//! - [`LedgerError`]: Error type for every failure
//!
//! ## Example
//!
//! ```
//! use erp_ledger::{AccountType, Amount, Engine, JournalEntryLine, NewJournalEntry, TenantId};
//! use chrono::NaiveDate;
//! use rust_decimal_macros::dec;
//!
//! let engine = Engine::default();
//! let tenant = TenantId(1);
//!
//! let cash = engine.chart()
//!     .create_account(tenant, "1000", "Cash", AccountType::Asset, None, false)
//!     .unwrap();
//! let revenue = engine.chart()
//!     .create_account(tenant, "4000", "Revenue", AccountType::Revenue, None, false)
//!     .unwrap();
//!
//! let lines = vec![
//!     JournalEntryLine::debit(cash.id, dec!(1000).into()).unwrap(),
//!     JournalEntryLine::credit(revenue.id, dec!(1000).into()).unwrap(),
//! ];
//! let date = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
//! let outcome = engine
//!     .post_journal_entry(tenant, NewJournalEntry::new(date, lines))
//!     .unwrap();
//! assert_eq!(outcome.value.entry_number, "JE-202503-000001");
//!
//! let cash = engine.chart().get_account(tenant, cash.id).unwrap();
//! assert_eq!(cash.current_balance, Amount::from(1000));
//! ```
//!
//! ## Thread Safety
//!
//! Balance rows are the only shared mutable state. Each is guarded by its own
//! lock with a bounded wait, and multi-row operations lock rows in ascending
//! key order, so concurrent writers never deadlock.

pub mod account;
pub mod balance;
mod base;
pub mod config;
pub mod costing;
mod decimal;
mod engine;
pub mod error;
pub mod events;
pub mod journal;
pub mod ledger_store;
pub mod posting;
pub mod stock;
pub mod telemetry;
pub mod valuation;

pub use account::{Account, AccountType, ChartOfAccounts, NormalBalance, TrialBalance, TrialBalanceRow};
pub use base::{
    AccountId, BatchId, JournalEntryId, ProductId, Reference, StockEntryId, TenantId, VariantId,
    WarehouseId,
};
pub use config::LedgerConfig;
pub use costing::{DeductionLine, DeductionRequest, Reconciliation, StockCostingEngine, StockMovement};
pub use decimal::{Amount, Rounding};
pub use engine::Engine;
pub use error::{LedgerError, LedgerResult};
pub use events::{DomainEvent, EventDispatcher, Outcome};
pub use journal::{EntryStatus, JournalEntry, JournalEntryLine, NewJournalEntry};
pub use ledger_store::{LedgerEntryStore, Page, PageResult};
pub use posting::JournalPostingEngine;
pub use stock::{
    Batch, BatchDetails, CostingStrategy, StockBalance, StockKey, StockLedgerEntry,
    StockMovementKind,
};
pub use valuation::{AbcCategory, AbcItem, ValuationReport};
