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

//! Chart of accounts.
//!
//! Accounts form a per-tenant tree through `parent_id`. The static part of an
//! account (code, name, type, parent) changes only through the chart's own
//! commands, which are serialized by a single structure lock; the balance
//! lives in a [`BalanceStore`] row and changes only when the posting engine
//! holds that row's lock.
//!
//! # Example
//!
//! ```
//! use erp_ledger::{AccountType, Amount, ChartOfAccounts, NormalBalance, TenantId};
//! use std::time::Duration;
//!
//! let chart = ChartOfAccounts::new(Duration::from_millis(100));
//! let cash = chart
//!     .create_account(TenantId(1), "1000", "Cash", AccountType::Asset, None, false)
//!     .unwrap();
//! assert_eq!(cash.normal_balance, NormalBalance::Debit);
//! assert_eq!(cash.current_balance, Amount::ZERO);
//! ```

use crate::balance::{Balance, BalanceSlot, BalanceStore};
use crate::base::{AccountId, TenantId};
use crate::decimal::Amount;
use crate::error::{LedgerError, LedgerResult};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
}

impl AccountType {
    pub fn normal_balance(self) -> NormalBalance {
        match self {
            Self::Asset | Self::Expense => NormalBalance::Debit,
            Self::Liability | Self::Equity | Self::Revenue => NormalBalance::Credit,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asset => "asset",
            Self::Liability => "liability",
            Self::Equity => "equity",
            Self::Revenue => "revenue",
            Self::Expense => "expense",
        }
    }
}

/// The side on which an account increases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalBalance {
    Debit,
    Credit,
}

impl NormalBalance {
    /// Balance change caused by one line.
    ///
    /// A debit increases a debit-normal account and decreases a credit-normal
    /// one; credits do the opposite.
    pub fn signed_delta(self, debit: Amount, credit: Amount) -> Amount {
        match self {
            Self::Debit => debit - credit,
            Self::Credit => credit - debit,
        }
    }
}

/// Materialized balance row of one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBalance {
    pub account_id: AccountId,
    pub current_balance: Amount,
    pub updated_at: DateTime<Utc>,
}

impl Balance for AccountBalance {
    /// Account balances may legitimately be negative (an overdrawn bank
    /// account, a contra account).
    fn validate(&self) -> LedgerResult<()> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct AccountData {
    id: AccountId,
    tenant_id: TenantId,
    code: String,
    name: String,
    account_type: AccountType,
    parent_id: Option<AccountId>,
    is_system: bool,
}

impl AccountData {
    fn view(&self, current_balance: Amount) -> Account {
        Account {
            id: self.id,
            tenant_id: self.tenant_id,
            code: self.code.clone(),
            name: self.name.clone(),
            account_type: self.account_type,
            normal_balance: self.account_type.normal_balance(),
            parent_id: self.parent_id,
            is_system: self.is_system,
            current_balance,
        }
    }
}

/// Ledger account as seen by callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub tenant_id: TenantId,
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    pub normal_balance: NormalBalance,
    pub parent_id: Option<AccountId>,
    pub is_system: bool,
    pub current_balance: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrialBalanceRow {
    pub account_id: AccountId,
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    pub balance: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrialBalance {
    /// Ordered by account code.
    pub rows: Vec<TrialBalanceRow>,
    /// Sum of debit-normal balances.
    pub total_debit: Amount,
    /// Sum of credit-normal balances.
    pub total_credit: Amount,
}

impl TrialBalance {
    pub fn is_balanced(&self) -> bool {
        self.total_debit == self.total_credit
    }
}

/// Accounts of every tenant plus their balance rows.
#[derive(Debug)]
pub struct ChartOfAccounts {
    accounts: DashMap<AccountId, AccountData>,
    /// Unique account code per tenant.
    codes: DashMap<(TenantId, String), AccountId>,
    /// Serializes create, reparent and delete so tree checks see a stable tree.
    structure: Mutex<()>,
    balances: BalanceStore<AccountId, AccountBalance>,
    next_id: AtomicU64,
    lock_timeout: Duration,
}

impl ChartOfAccounts {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            accounts: DashMap::new(),
            codes: DashMap::new(),
            structure: Mutex::new(()),
            balances: BalanceStore::new(),
            next_id: AtomicU64::new(1),
            lock_timeout,
        }
    }

    /// Adds an account to a tenant's chart.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAccountCode`] for a blank code.
    /// - [`LedgerError::DuplicateAccountCode`] if the tenant already uses `code`.
    /// - [`LedgerError::ParentAccountNotFound`] if `parent_id` is not an account
    ///   of the same tenant.
    pub fn create_account(
        &self,
        tenant_id: TenantId,
        code: impl Into<String>,
        name: impl Into<String>,
        account_type: AccountType,
        parent_id: Option<AccountId>,
        is_system: bool,
    ) -> LedgerResult<Account> {
        let code = code.into();
        if code.trim().is_empty() {
            return Err(LedgerError::InvalidAccountCode(code));
        }
        let _structure = self.structure.lock();

        if let Some(parent_id) = parent_id {
            self.account_data(tenant_id, parent_id)
                .map_err(|_| LedgerError::ParentAccountNotFound(parent_id))?;
        }
        if self.codes.contains_key(&(tenant_id, code.clone())) {
            return Err(LedgerError::DuplicateAccountCode(code));
        }

        let id = AccountId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let data = AccountData {
            id,
            tenant_id,
            code: code.clone(),
            name: name.into(),
            account_type,
            parent_id,
            is_system,
        };
        let account = data.view(Amount::ZERO);
        self.codes.insert((tenant_id, code), id);
        self.accounts.insert(id, data);

        info!(%tenant_id, account_id = %id, code = %account.code, "account created");
        Ok(account)
    }

    /// Returns the account with its current balance.
    ///
    /// # Errors
    ///
    /// [`LedgerError::AccountNotFound`] if the account does not exist, or
    /// [`LedgerError::TenantMismatch`] if it belongs to another tenant.
    pub fn get_account(&self, tenant_id: TenantId, account_id: AccountId) -> LedgerResult<Account> {
        let data = self.account_data(tenant_id, account_id)?;
        Ok(data.view(self.balance_of(account_id)))
    }

    pub fn find_by_code(&self, tenant_id: TenantId, code: &str) -> Option<Account> {
        let id = *self.codes.get(&(tenant_id, code.to_string()))?;
        self.get_account(tenant_id, id).ok()
    }

    pub fn rename_account(
        &self,
        tenant_id: TenantId,
        account_id: AccountId,
        name: impl Into<String>,
    ) -> LedgerResult<Account> {
        {
            let mut data = self
                .accounts
                .get_mut(&account_id)
                .ok_or(LedgerError::AccountNotFound(account_id))?;
            if data.tenant_id != tenant_id {
                return Err(LedgerError::TenantMismatch);
            }
            if data.is_system {
                return Err(LedgerError::SystemAccountProtected(account_id));
            }
            data.name = name.into();
        }

        info!(%tenant_id, %account_id, "account renamed");
        self.get_account(tenant_id, account_id)
    }

    /// Moves an account under a new parent, or to the root with `None`.
    ///
    /// # Errors
    ///
    /// [`LedgerError::AccountCycle`] if `parent_id` is the account itself or one
    /// of its descendants.
    pub fn reparent_account(
        &self,
        tenant_id: TenantId,
        account_id: AccountId,
        parent_id: Option<AccountId>,
    ) -> LedgerResult<Account> {
        let _structure = self.structure.lock();

        let data = self.account_data(tenant_id, account_id)?;
        if data.is_system {
            return Err(LedgerError::SystemAccountProtected(account_id));
        }
        if let Some(parent_id) = parent_id {
            self.account_data(tenant_id, parent_id)
                .map_err(|_| LedgerError::ParentAccountNotFound(parent_id))?;
            if self.is_self_or_ancestor(account_id, parent_id) {
                return Err(LedgerError::AccountCycle(account_id));
            }
        }

        if let Some(mut data) = self.accounts.get_mut(&account_id) {
            data.parent_id = parent_id;
        }

        info!(%tenant_id, %account_id, parent = ?parent_id, "account moved");
        self.get_account(tenant_id, account_id)
    }

    /// Removes an account with a zero balance and no children.
    ///
    /// The balance row stays locked while the account is removed, so a
    /// posting cannot land on it in between.
    pub fn delete_account(&self, tenant_id: TenantId, account_id: AccountId) -> LedgerResult<()> {
        let _structure = self.structure.lock();

        let data = self.account_data(tenant_id, account_id)?;
        if data.is_system {
            return Err(LedgerError::SystemAccountProtected(account_id));
        }
        if self
            .accounts
            .iter()
            .any(|entry| entry.parent_id == Some(account_id))
        {
            return Err(LedgerError::AccountInUse(account_id));
        }

        let slot = self.balances.slot(&account_id);
        let guard = slot.lock(self.lock_timeout)?;
        let balance = guard
            .current()
            .map_or(Amount::ZERO, |row| row.current_balance);
        if !balance.is_zero() {
            return Err(LedgerError::AccountInUse(account_id));
        }

        self.accounts.remove(&account_id);
        self.codes.remove(&(tenant_id, data.code.clone()));
        drop(guard);

        info!(%tenant_id, %account_id, code = %data.code, "account deleted");
        Ok(())
    }

    /// Direct children ordered by code.
    pub fn children(&self, tenant_id: TenantId, account_id: AccountId) -> LedgerResult<Vec<Account>> {
        self.account_data(tenant_id, account_id)?;
        Ok(self.views(|data| data.parent_id == Some(account_id)))
    }

    /// Every account of a tenant ordered by code.
    pub fn accounts(&self, tenant_id: TenantId) -> Vec<Account> {
        self.views(|data| data.tenant_id == tenant_id)
    }

    pub fn trial_balance(&self, tenant_id: TenantId) -> TrialBalance {
        let mut total_debit = Amount::ZERO;
        let mut total_credit = Amount::ZERO;
        let rows = self
            .accounts(tenant_id)
            .into_iter()
            .map(|account| {
                match account.normal_balance {
                    NormalBalance::Debit => total_debit += account.current_balance,
                    NormalBalance::Credit => total_credit += account.current_balance,
                }
                TrialBalanceRow {
                    account_id: account.id,
                    code: account.code,
                    name: account.name,
                    account_type: account.account_type,
                    balance: account.current_balance,
                }
            })
            .collect();

        TrialBalance {
            rows,
            total_debit,
            total_credit,
        }
    }

    /// Normal balance of a tenant's account.
    pub(crate) fn normal_balance(
        &self,
        tenant_id: TenantId,
        account_id: AccountId,
    ) -> LedgerResult<NormalBalance> {
        Ok(self
            .account_data(tenant_id, account_id)?
            .account_type
            .normal_balance())
    }

    pub(crate) fn contains(&self, account_id: AccountId) -> bool {
        self.accounts.contains_key(&account_id)
    }

    /// Balance row cell for an account; lock it through [`BalanceSlot::lock`].
    pub(crate) fn balance_slot(&self, account_id: AccountId) -> BalanceSlot<AccountId, AccountBalance> {
        self.balances.slot(&account_id)
    }

    pub(crate) fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    fn account_data(&self, tenant_id: TenantId, account_id: AccountId) -> LedgerResult<AccountData> {
        let data = self
            .accounts
            .get(&account_id)
            .ok_or(LedgerError::AccountNotFound(account_id))?;
        if data.tenant_id != tenant_id {
            return Err(LedgerError::TenantMismatch);
        }
        Ok(data.clone())
    }

    /// Map guards are released before any balance row is read.
    fn views(&self, filter: impl Fn(&AccountData) -> bool) -> Vec<Account> {
        let matching: Vec<AccountData> = self
            .accounts
            .iter()
            .filter(|entry| filter(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        let mut views: Vec<Account> = matching
            .iter()
            .map(|data| data.view(self.balance_of(data.id)))
            .collect();
        views.sort_by(|a, b| a.code.cmp(&b.code));
        views
    }

    fn balance_of(&self, account_id: AccountId) -> Amount {
        self.balances
            .find(&account_id)
            .map_or(Amount::ZERO, |row| row.current_balance)
    }

    /// Whether `candidate` is `account_id` or lies below it.
    fn is_self_or_ancestor(&self, account_id: AccountId, candidate: AccountId) -> bool {
        let mut cursor = Some(candidate);
        while let Some(id) = cursor {
            if id == account_id {
                return true;
            }
            cursor = self.accounts.get(&id).and_then(|data| data.parent_id);
        }
        false
    }
}

impl Default for ChartOfAccounts {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}
