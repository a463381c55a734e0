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

//! Ledger engine.
//!
//! The [`Engine`] is the surface collaborators talk to. It owns the chart of
//! accounts, the journal posting engine, the stock costing engine and the
//! shared entry store, and exposes each operation with the tenant as an
//! explicit first argument.
//!
//! # Operations
//!
//! | Operation | Result |
//! |-----------|--------|
//! | [`post_journal_entry`](Engine::post_journal_entry) | Posted entry, balances updated |
//! | [`delete_draft_journal_entry`](Engine::delete_draft_journal_entry) | Draft removed |
//! | [`reverse_journal_entry`](Engine::reverse_journal_entry) | Mirror entry posted |
//! | [`deduct_stock`](Engine::deduct_stock) | One line per batch consumed |
//! | [`record_stock_transaction`](Engine::record_stock_transaction) | One ledger entry |
//! | [`get_stock_level`](Engine::get_stock_level) | Current balance row |
//! | [`get_valuation_report`](Engine::get_valuation_report) | Items and grand total |
//! | [`get_abc_analysis`](Engine::get_abc_analysis) | Items with A/B/C category |
//! | [`get_turnover_rate`](Engine::get_turnover_rate) | COGS / inventory value |
//!
//! Mutating operations return an [`Outcome`] holding the events they raised.
//! Delivering those is up to the caller.
//!
//! # Thread Safety
//!
//! All operations take `&self`. Writers to the same balance key serialize on
//! that key's lock; writers to disjoint keys do not block each other.

use crate::account::{ChartOfAccounts, TrialBalance};
use crate::base::{AccountId, JournalEntryId, ProductId, TenantId, WarehouseId};
use crate::config::LedgerConfig;
use crate::costing::{DeductionLine, DeductionRequest, Reconciliation, StockCostingEngine, StockMovement};
use crate::decimal::Amount;
use crate::error::LedgerResult;
use crate::events::Outcome;
use crate::journal::{AccountLedgerEntry, JournalEntry, NewJournalEntry};
use crate::ledger_store::{LedgerEntryStore, Page, PageResult};
use crate::posting::JournalPostingEngine;
use crate::stock::{StockBalance, StockLedgerEntry};
use crate::valuation::{
    self, AbcItem, AbcThresholds, CarryingCostReport, DemandForecast, Period, TurnoverItem,
    ValuationReport,
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;

/// ERP ledger core: journal and stock, scoped per tenant.
///
/// # Invariants
///
/// - A posted entry's debit and credit totals are equal.
/// - No stock balance or batch ever holds a negative quantity.
/// - A stock balance's quantity on hand equals the signed sum of its
///   ledger entries.
pub struct Engine {
    config: LedgerConfig,
    store: Arc<LedgerEntryStore>,
    chart: Arc<ChartOfAccounts>,
    journal: JournalPostingEngine,
    stock: StockCostingEngine,
}

impl Engine {
    pub fn new(config: LedgerConfig) -> Self {
        let store = Arc::new(LedgerEntryStore::new());
        let chart = Arc::new(ChartOfAccounts::new(config.lock_timeout()));
        let journal = JournalPostingEngine::new(Arc::clone(&chart), Arc::clone(&store));
        let stock = StockCostingEngine::new(
            Arc::clone(&store),
            config.pharmaceutical_compliance,
            config.lock_timeout(),
        );
        Engine {
            config,
            store,
            chart,
            journal,
            stock,
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Chart of accounts, for account setup and trial balances.
    pub fn chart(&self) -> &ChartOfAccounts {
        &self.chart
    }

    pub fn journal(&self) -> &JournalPostingEngine {
        &self.journal
    }

    pub fn stock(&self) -> &StockCostingEngine {
        &self.stock
    }

    pub fn store(&self) -> &LedgerEntryStore {
        &self.store
    }

    // Journal

    /// Creates and posts a journal entry in one step.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::UnbalancedEntry`](crate::LedgerError::UnbalancedEntry) if debits and credits differ.
    /// - [`LedgerError::InsufficientLines`](crate::LedgerError::InsufficientLines) with fewer than two lines.
    /// - [`LedgerError::AccountNotFound`](crate::LedgerError::AccountNotFound) for an unknown account.
    /// - [`LedgerError::LockTimeout`](crate::LedgerError::LockTimeout) under contention; safe to retry.
    #[tracing::instrument(skip_all, fields(tenant = %tenant))]
    pub fn post_journal_entry(
        &self,
        tenant: TenantId,
        request: NewJournalEntry,
    ) -> LedgerResult<Outcome<JournalEntry>> {
        self.journal.post_journal_entry(tenant, request)
    }

    #[tracing::instrument(skip_all, fields(tenant = %tenant))]
    pub fn create_draft(&self, tenant: TenantId, request: NewJournalEntry) -> LedgerResult<JournalEntry> {
        self.journal.create_draft(tenant, request)
    }

    #[tracing::instrument(skip_all, fields(tenant = %tenant, entry = %entry_id))]
    pub fn post(&self, tenant: TenantId, entry_id: JournalEntryId) -> LedgerResult<Outcome<JournalEntry>> {
        self.journal.post(tenant, entry_id)
    }

    #[tracing::instrument(skip_all, fields(tenant = %tenant, entry = %entry_id))]
    pub fn delete_draft_journal_entry(
        &self,
        tenant: TenantId,
        entry_id: JournalEntryId,
    ) -> LedgerResult<Outcome<()>> {
        self.journal.delete(tenant, entry_id)
    }

    #[tracing::instrument(skip_all, fields(tenant = %tenant, entry = %entry_id))]
    pub fn reverse_journal_entry(
        &self,
        tenant: TenantId,
        entry_id: JournalEntryId,
        entry_date: NaiveDate,
    ) -> LedgerResult<Outcome<JournalEntry>> {
        self.journal.reverse(tenant, entry_id, entry_date)
    }

    pub fn get_journal_entry(&self, tenant: TenantId, entry_id: JournalEntryId) -> LedgerResult<JournalEntry> {
        self.journal.get_entry(tenant, entry_id)
    }

    /// Posted lines of an account; `None` uses the configured page size.
    pub fn account_history(
        &self,
        tenant: TenantId,
        account_id: AccountId,
        page: Option<Page>,
    ) -> LedgerResult<PageResult<Arc<AccountLedgerEntry>>> {
        let page = page.unwrap_or_else(|| self.default_page());
        self.journal.account_history(tenant, account_id, page)
    }

    pub fn trial_balance(&self, tenant: TenantId) -> TrialBalance {
        self.chart.trial_balance(tenant)
    }

    // Stock

    /// Deducts stock across batches in strategy order.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InsufficientStock`](crate::LedgerError::InsufficientStock) if batches cannot cover the
    ///   quantity; nothing is written.
    /// - [`LedgerError::BatchRequired`](crate::LedgerError::BatchRequired) for a manual deduction without a
    ///   batch number.
    /// - [`LedgerError::ComplianceFieldsMissing`](crate::LedgerError::ComplianceFieldsMissing) when compliance is
    ///   enabled and a batch lacks lot number or expiry.
    #[tracing::instrument(skip_all, fields(tenant = %tenant, product = %request.product_id, warehouse = %request.warehouse_id))]
    pub fn deduct_stock(
        &self,
        tenant: TenantId,
        request: DeductionRequest,
    ) -> LedgerResult<Outcome<Vec<DeductionLine>>> {
        self.stock.deduct_by_strategy(tenant, request)
    }

    #[tracing::instrument(skip_all, fields(tenant = %tenant, kind = %movement.kind))]
    pub fn record_stock_transaction(
        &self,
        tenant: TenantId,
        movement: StockMovement,
    ) -> LedgerResult<Outcome<Arc<StockLedgerEntry>>> {
        self.stock.record_transaction(tenant, movement)
    }

    pub fn get_stock_level(
        &self,
        tenant: TenantId,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> StockBalance {
        self.stock.get_stock_level(tenant, warehouse_id, product_id)
    }

    #[tracing::instrument(skip_all, fields(tenant = %tenant))]
    pub fn reserve_stock(
        &self,
        tenant: TenantId,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        quantity: Amount,
    ) -> LedgerResult<StockBalance> {
        self.stock.reserve(tenant, warehouse_id, product_id, quantity)
    }

    #[tracing::instrument(skip_all, fields(tenant = %tenant))]
    pub fn release_stock(
        &self,
        tenant: TenantId,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        quantity: Amount,
    ) -> LedgerResult<StockBalance> {
        self.stock.release(tenant, warehouse_id, product_id, quantity)
    }

    pub fn reconcile_stock(
        &self,
        tenant: TenantId,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> LedgerResult<Reconciliation> {
        self.stock.reconcile(tenant, warehouse_id, product_id)
    }

    pub fn set_reorder_point(
        &self,
        tenant: TenantId,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        reorder_point: Amount,
    ) -> LedgerResult<()> {
        self.stock
            .set_reorder_point(tenant, warehouse_id, product_id, reorder_point)
    }

    /// Ledger entries of one product in one warehouse; `None` uses the
    /// configured page size.
    pub fn stock_history(
        &self,
        tenant: TenantId,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        page: Option<Page>,
    ) -> PageResult<Arc<StockLedgerEntry>> {
        let page = page.unwrap_or_else(|| self.default_page());
        self.store
            .list_by_product_warehouse(tenant, product_id, warehouse_id, page)
    }

    // Reports

    pub fn get_valuation_report(
        &self,
        tenant: TenantId,
        warehouse: Option<WarehouseId>,
    ) -> LedgerResult<ValuationReport> {
        valuation::valuation(&self.stock.balances(tenant), warehouse)
    }

    /// ABC classification with the configured thresholds.
    pub fn get_abc_analysis(
        &self,
        tenant: TenantId,
        warehouse: Option<WarehouseId>,
    ) -> LedgerResult<Vec<AbcItem>> {
        let report = self.get_valuation_report(tenant, warehouse)?;
        valuation::abc_analysis(&report, self.abc_thresholds())
    }

    /// # Errors
    ///
    /// [`LedgerError::InvalidPeriod`](crate::LedgerError::InvalidPeriod) for `period_days == 0`.
    pub fn get_turnover_rate(
        &self,
        tenant: TenantId,
        warehouse: Option<WarehouseId>,
        period_days: u32,
        as_of: DateTime<Utc>,
    ) -> LedgerResult<Vec<TurnoverItem>> {
        let period = Period::new(as_of, period_days)?;
        let entries = self.store.stock_entries_for_tenant(tenant);
        valuation::turnover(&self.stock.balances(tenant), &entries, warehouse, period)
    }

    /// Carrying cost over `period_days`; `None` uses the configured rate.
    pub fn get_carrying_cost(
        &self,
        tenant: TenantId,
        warehouse: Option<WarehouseId>,
        period_days: u32,
        carrying_rate: Option<Decimal>,
    ) -> LedgerResult<CarryingCostReport> {
        valuation::carrying_cost(
            &self.stock.balances(tenant),
            warehouse,
            period_days,
            carrying_rate.unwrap_or(self.config.carrying_rate),
        )
    }

    pub fn get_demand_forecast(
        &self,
        tenant: TenantId,
        warehouse: Option<WarehouseId>,
        period_days: u32,
        as_of: DateTime<Utc>,
    ) -> LedgerResult<Vec<DemandForecast>> {
        let period = Period::new(as_of, period_days)?;
        let entries = self.store.stock_entries_for_tenant(tenant);
        valuation::demand_forecast(&self.stock.balances(tenant), &entries, warehouse, period)
    }

    fn abc_thresholds(&self) -> AbcThresholds {
        AbcThresholds {
            a: self.config.abc_a_threshold,
            b: self.config.abc_b_threshold,
        }
    }

    fn default_page(&self) -> Page {
        Page::new(0, self.config.default_page_size)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(LedgerConfig::default())
    }
}
