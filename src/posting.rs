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

//! Journal posting engine.
//!
//! # Lock order
//!
//! 1. The journal entry's own lock.
//! 2. Account balance rows, in ascending [`AccountId`] order.
//!
//! Every account lock is acquired and every new balance computed before the
//! first write, so a failure at any point (lock timeout, unknown account,
//! overflow) leaves balances, the entry log and the entry status untouched.

use crate::account::{AccountBalance, ChartOfAccounts};
use crate::balance::BalanceGuard;
use crate::base::{AccountId, JournalEntryId, Reference, TenantId};
use crate::decimal::Amount;
use crate::error::{LedgerError, LedgerResult};
use crate::events::{DomainEvent, Outcome};
use crate::journal::{
    AccountLedgerEntry, EntryStatus, JournalEntry, JournalEntryLine, NewJournalEntry, totals,
};
use crate::ledger_store::{LedgerEntryStore, Page, PageResult};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// Per (tenant, year-month) entry number sequence.
#[derive(Debug, Default)]
pub struct EntryNumberSequence {
    counters: DashMap<(TenantId, u32), u64>,
}

impl EntryNumberSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next number for the period containing `date`, e.g. `JE-202503-000001`.
    ///
    /// Strictly increasing per (tenant, month) under concurrent callers.
    pub fn next(&self, tenant_id: TenantId, date: NaiveDate) -> String {
        let period = date.year().unsigned_abs() * 100 + date.month();
        let seq = {
            let mut counter = self.counters.entry((tenant_id, period)).or_insert(0);
            *counter += 1;
            *counter
        };
        format!("JE-{period:06}-{seq:06}")
    }
}

/// `None` once the entry has been deleted.
type EntryCell = Arc<Mutex<Option<JournalEntry>>>;

/// Creates, posts, deletes and reverses journal entries.
#[derive(Debug)]
pub struct JournalPostingEngine {
    chart: Arc<ChartOfAccounts>,
    store: Arc<LedgerEntryStore>,
    entries: DashMap<JournalEntryId, EntryCell>,
    numbers: EntryNumberSequence,
    next_id: AtomicU64,
}

impl JournalPostingEngine {
    pub fn new(chart: Arc<ChartOfAccounts>, store: Arc<LedgerEntryStore>) -> Self {
        Self {
            chart,
            store,
            entries: DashMap::new(),
            numbers: EntryNumberSequence::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn chart(&self) -> &Arc<ChartOfAccounts> {
        &self.chart
    }

    /// Stores a new Draft entry.
    ///
    /// Totals are the exact sums of the lines. Balance is not required for a
    /// draft; it is checked at [`post`](Self::post).
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InsufficientLines`] with fewer than two lines.
    /// - [`LedgerError::AccountNotFound`] / [`LedgerError::TenantMismatch`] for a
    ///   line whose account is unknown or belongs to another tenant.
    pub fn create_draft(
        &self,
        tenant_id: TenantId,
        request: NewJournalEntry,
    ) -> LedgerResult<JournalEntry> {
        let entry = self.build_entry(tenant_id, request, None)?;
        self.entries
            .insert(entry.id, Arc::new(Mutex::new(Some(entry.clone()))));

        debug!(%tenant_id, entry_id = %entry.id, number = %entry.entry_number, "draft created");
        Ok(entry)
    }

    /// Draft → Posted.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::EntryNotFound`] if the entry does not exist.
    /// - [`LedgerError::AlreadyPosted`] unless the entry is a Draft.
    /// - [`LedgerError::UnbalancedEntry`] if the totals differ.
    /// - [`LedgerError::LockTimeout`] if an entry or balance lock is not
    ///   acquired in time.
    pub fn post(
        &self,
        tenant_id: TenantId,
        entry_id: JournalEntryId,
    ) -> LedgerResult<Outcome<JournalEntry>> {
        let cell = self.cell(entry_id)?;
        let mut guard = self.lock_entry(&cell, entry_id)?;
        let entry = Self::live_entry(&mut guard, tenant_id, entry_id)?;

        if entry.status != EntryStatus::Draft {
            return Err(LedgerError::AlreadyPosted(entry_id));
        }
        if !entry.is_balanced() {
            warn!(%tenant_id, %entry_id, debit = %entry.total_debit, credit = %entry.total_credit, "unbalanced entry rejected");
            return Err(LedgerError::UnbalancedEntry {
                debit: entry.total_debit,
                credit: entry.total_credit,
            });
        }

        self.apply_posting(entry, Utc::now())?;

        info!(%tenant_id, %entry_id, number = %entry.entry_number, total = %entry.total_debit, "journal entry posted");
        let event = posted_event(entry);
        Ok(Outcome::new(entry.clone(), vec![event]))
    }

    /// Creates and posts an entry in one step.
    ///
    /// An unbalanced request is rejected before anything is stored; if
    /// posting fails for any other reason the draft is discarded.
    pub fn post_journal_entry(
        &self,
        tenant_id: TenantId,
        request: NewJournalEntry,
    ) -> LedgerResult<Outcome<JournalEntry>> {
        let (debit, credit) = totals(&request.lines)?;
        if debit != credit {
            return Err(LedgerError::UnbalancedEntry { debit, credit });
        }

        let draft = self.create_draft(tenant_id, request)?;
        match self.post(tenant_id, draft.id) {
            Ok(outcome) => Ok(outcome),
            Err(error) => {
                self.entries.remove(&draft.id);
                Err(error)
            }
        }
    }

    /// Deletes a Draft entry.
    ///
    /// # Errors
    ///
    /// [`LedgerError::CannotDeletePostedEntry`] for Posted and Reversed entries.
    pub fn delete(&self, tenant_id: TenantId, entry_id: JournalEntryId) -> LedgerResult<Outcome<()>> {
        let cell = self.cell(entry_id)?;
        let mut guard = self.lock_entry(&cell, entry_id)?;
        let entry = Self::live_entry(&mut guard, tenant_id, entry_id)?;
        if entry.status != EntryStatus::Draft {
            return Err(LedgerError::CannotDeletePostedEntry(entry_id));
        }

        *guard = None;
        self.entries.remove(&entry_id);
        drop(guard);

        info!(%tenant_id, %entry_id, "draft journal entry deleted");
        Ok(Outcome::new(
            (),
            vec![DomainEvent::JournalEntryDeleted {
                tenant_id,
                entry_id,
            }],
        ))
    }

    /// Posts a mirror entry with every line's sides swapped and marks the
    /// original Reversed. Returns the new entry.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NotPosted`] for a Draft.
    /// - [`LedgerError::AlreadyReversed`] if the entry was reversed before.
    pub fn reverse(
        &self,
        tenant_id: TenantId,
        entry_id: JournalEntryId,
        entry_date: NaiveDate,
    ) -> LedgerResult<Outcome<JournalEntry>> {
        let cell = self.cell(entry_id)?;
        let mut guard = self.lock_entry(&cell, entry_id)?;
        let original = Self::live_entry(&mut guard, tenant_id, entry_id)?;
        match original.status {
            EntryStatus::Draft => return Err(LedgerError::NotPosted(entry_id)),
            EntryStatus::Reversed => return Err(LedgerError::AlreadyReversed(entry_id)),
            EntryStatus::Posted => {}
        }

        let request = NewJournalEntry {
            entry_date,
            description: format!("Reversal of {}", original.entry_number),
            currency: original.currency.clone(),
            reference: Some(Reference::JournalEntry(entry_id)),
            lines: original.lines.iter().map(JournalEntryLine::reversed).collect(),
        };
        let mut reversal = self.build_entry(tenant_id, request, Some(entry_id))?;
        self.apply_posting(&mut reversal, Utc::now())?;

        original.status = EntryStatus::Reversed;
        original.reversed_by = Some(reversal.id);
        self.entries
            .insert(reversal.id, Arc::new(Mutex::new(Some(reversal.clone()))));
        drop(guard);

        info!(%tenant_id, %entry_id, reversal_id = %reversal.id, "journal entry reversed");
        let events = vec![
            posted_event(&reversal),
            DomainEvent::JournalEntryReversed {
                tenant_id,
                entry_id,
                reversal_id: reversal.id,
            },
        ];
        Ok(Outcome::new(reversal, events))
    }

    pub fn get_entry(&self, tenant_id: TenantId, entry_id: JournalEntryId) -> LedgerResult<JournalEntry> {
        let cell = self.cell(entry_id)?;
        let guard = self.lock_entry(&cell, entry_id)?;
        match guard.as_ref() {
            Some(entry) if entry.tenant_id == tenant_id => Ok(entry.clone()),
            Some(_) => Err(LedgerError::TenantMismatch),
            None => Err(LedgerError::EntryNotFound(entry_id)),
        }
    }

    /// Posted lines of an account, oldest first.
    pub fn account_history(
        &self,
        tenant_id: TenantId,
        account_id: AccountId,
        page: Page,
    ) -> LedgerResult<PageResult<Arc<AccountLedgerEntry>>> {
        self.chart.get_account(tenant_id, account_id)?;
        Ok(self.store.list_by_account(tenant_id, account_id, page))
    }

    fn build_entry(
        &self,
        tenant_id: TenantId,
        request: NewJournalEntry,
        reversal_of: Option<JournalEntryId>,
    ) -> LedgerResult<JournalEntry> {
        if request.lines.len() < 2 {
            return Err(LedgerError::InsufficientLines(request.lines.len()));
        }
        for line in &request.lines {
            self.chart.normal_balance(tenant_id, line.account_id())?;
        }

        let (total_debit, total_credit) = totals(&request.lines)?;
        let id = JournalEntryId(self.next_id.fetch_add(1, Ordering::Relaxed));
        Ok(JournalEntry {
            id,
            tenant_id,
            entry_number: self.numbers.next(tenant_id, request.entry_date),
            entry_date: request.entry_date,
            description: request.description,
            currency: request.currency,
            reference: request.reference,
            status: EntryStatus::Draft,
            total_debit,
            total_credit,
            lines: request.lines,
            reversal_of,
            reversed_by: None,
            created_at: Utc::now(),
            posted_at: None,
        })
    }

    /// Applies a balanced Draft entry to account balances and the entry log,
    /// then flips it to Posted. All or nothing.
    fn apply_posting(&self, entry: &mut JournalEntry, posted_at: DateTime<Utc>) -> LedgerResult<()> {
        let tenant_id = entry.tenant_id;

        // Net delta per account; BTreeMap iteration gives the lock order.
        let mut deltas: BTreeMap<AccountId, Amount> = BTreeMap::new();
        for line in &entry.lines {
            let normal = self.chart.normal_balance(tenant_id, line.account_id())?;
            let delta = deltas.entry(line.account_id()).or_insert(Amount::ZERO);
            *delta = delta.checked_add(normal.signed_delta(line.debit_amount(), line.credit_amount()))?;
        }

        let slots: Vec<_> = deltas
            .keys()
            .map(|account_id| self.chart.balance_slot(*account_id))
            .collect();
        let mut guards: Vec<BalanceGuard<'_, AccountBalance>> = Vec::with_capacity(slots.len());
        for slot in &slots {
            guards.push(slot.lock(self.chart.lock_timeout())?);
        }

        // An account may have been deleted between lookup and lock.
        let mut next_balances = Vec::with_capacity(guards.len());
        for (guard, (account_id, delta)) in guards.iter().zip(&deltas) {
            if !self.chart.contains(*account_id) {
                return Err(LedgerError::AccountNotFound(*account_id));
            }
            let current = guard
                .current()
                .map_or(Amount::ZERO, |row| row.current_balance);
            next_balances.push(AccountBalance {
                account_id: *account_id,
                current_balance: current.checked_add(*delta)?,
                updated_at: posted_at,
            });
        }

        for (index, line) in entry.lines.iter().enumerate() {
            self.store.append_account(AccountLedgerEntry {
                entry_id: entry.id,
                line_no: u32::try_from(index + 1).map_err(|_| LedgerError::Overflow)?,
                tenant_id,
                account_id: line.account_id(),
                entry_number: entry.entry_number.clone(),
                entry_date: entry.entry_date,
                debit_amount: line.debit_amount(),
                credit_amount: line.credit_amount(),
                description: line.description().map(str::to_string),
                posted_at,
            })?;
        }
        for (guard, balance) in guards.iter_mut().zip(next_balances) {
            guard.save(balance)?;
        }

        entry.status = EntryStatus::Posted;
        entry.posted_at = Some(posted_at);
        Ok(())
    }

    fn cell(&self, entry_id: JournalEntryId) -> LedgerResult<EntryCell> {
        self.entries
            .get(&entry_id)
            .map(|cell| Arc::clone(cell.value()))
            .ok_or(LedgerError::EntryNotFound(entry_id))
    }

    fn lock_entry<'a>(
        &self,
        cell: &'a EntryCell,
        entry_id: JournalEntryId,
    ) -> LedgerResult<MutexGuard<'a, Option<JournalEntry>>> {
        cell.try_lock_for(self.chart.lock_timeout()).ok_or_else(|| {
            warn!(%entry_id, "journal entry lock timed out");
            LedgerError::LockTimeout(format!("journal entry {entry_id}"))
        })
    }

    fn live_entry<'g>(
        guard: &'g mut MutexGuard<'_, Option<JournalEntry>>,
        tenant_id: TenantId,
        entry_id: JournalEntryId,
    ) -> LedgerResult<&'g mut JournalEntry> {
        match &mut **guard {
            Some(entry) if entry.tenant_id == tenant_id => Ok(entry),
            Some(_) => Err(LedgerError::TenantMismatch),
            None => Err(LedgerError::EntryNotFound(entry_id)),
        }
    }
}

fn posted_event(entry: &JournalEntry) -> DomainEvent {
    DomainEvent::JournalEntryPosted {
        tenant_id: entry.tenant_id,
        entry_id: entry.id,
        entry_number: entry.entry_number.clone(),
        total: entry.total_debit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountType;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    const TENANT: TenantId = TenantId(1);

    struct Fixture {
        engine: JournalPostingEngine,
        cash: AccountId,
        revenue: AccountId,
    }

    fn fixture() -> Fixture {
        let chart = Arc::new(ChartOfAccounts::new(Duration::from_millis(100)));
        let cash = chart
            .create_account(TENANT, "1000", "Cash", AccountType::Asset, None, false)
            .unwrap()
            .id;
        let revenue = chart
            .create_account(TENANT, "4000", "Revenue", AccountType::Revenue, None, false)
            .unwrap()
            .id;
        let engine = JournalPostingEngine::new(chart, Arc::new(LedgerEntryStore::new()));
        Fixture {
            engine,
            cash,
            revenue,
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()
    }

    fn sale(f: &Fixture, debit: Amount, credit: Amount) -> NewJournalEntry {
        NewJournalEntry::new(
            date(),
            vec![
                JournalEntryLine::debit(f.cash, debit).unwrap(),
                JournalEntryLine::credit(f.revenue, credit).unwrap(),
            ],
        )
    }

    #[test]
    fn entry_numbers_are_per_tenant_and_month() {
        let seq = EntryNumberSequence::new();
        assert_eq!(seq.next(TENANT, date()), "JE-202503-000001");
        assert_eq!(seq.next(TENANT, date()), "JE-202503-000002");
        let april = NaiveDate::from_ymd_opt(2025, 4, 1).unwrap();
        assert_eq!(seq.next(TENANT, april), "JE-202504-000001");
        assert_eq!(seq.next(TenantId(2), date()), "JE-202503-000001");
    }

    #[test]
    fn draft_needs_two_lines() {
        let f = fixture();
        let request = NewJournalEntry::new(
            date(),
            vec![JournalEntryLine::debit(f.cash, Amount::from(1)).unwrap()],
        );
        assert_eq!(
            f.engine.create_draft(TENANT, request),
            Err(LedgerError::InsufficientLines(1))
        );
    }

    #[test]
    fn post_updates_both_sides() {
        let f = fixture();
        let amount = Amount::new(dec!(1000));
        let draft = f.engine.create_draft(TENANT, sale(&f, amount, amount)).unwrap();
        assert_eq!(draft.status, EntryStatus::Draft);

        let outcome = f.engine.post(TENANT, draft.id).unwrap();
        assert_eq!(outcome.value.status, EntryStatus::Posted);
        assert!(outcome.value.posted_at.is_some());
        assert_eq!(outcome.events[0].event_type(), "accounting.journal_entry.posted");

        let chart = f.engine.chart();
        assert_eq!(chart.get_account(TENANT, f.cash).unwrap().current_balance, amount);
        assert_eq!(chart.get_account(TENANT, f.revenue).unwrap().current_balance, amount);
    }

    #[test]
    fn unbalanced_draft_cannot_post() {
        let f = fixture();
        let draft = f
            .engine
            .create_draft(TENANT, sale(&f, Amount::from(100), Amount::from(90)))
            .unwrap();
        assert_eq!(
            f.engine.post(TENANT, draft.id),
            Err(LedgerError::UnbalancedEntry {
                debit: Amount::from(100),
                credit: Amount::from(90),
            })
        );
        assert_eq!(
            f.engine.get_entry(TENANT, draft.id).unwrap().status,
            EntryStatus::Draft
        );
    }

    #[test]
    fn failed_one_step_post_leaves_nothing() {
        let f = fixture();
        let result = f
            .engine
            .post_journal_entry(TENANT, sale(&f, Amount::from(5), Amount::from(4)));
        assert!(matches!(result, Err(LedgerError::UnbalancedEntry { .. })));
        assert!(f.engine.entries.is_empty());
    }

    #[test]
    fn same_account_lines_net_out() {
        let f = fixture();
        let request = NewJournalEntry::new(
            date(),
            vec![
                JournalEntryLine::debit(f.cash, Amount::from(70)).unwrap(),
                JournalEntryLine::debit(f.cash, Amount::from(30)).unwrap(),
                JournalEntryLine::credit(f.revenue, Amount::from(100)).unwrap(),
            ],
        );
        f.engine.post_journal_entry(TENANT, request).unwrap();
        let cash = f.engine.chart().get_account(TENANT, f.cash).unwrap();
        assert_eq!(cash.current_balance, Amount::from(100));

        let history = f.engine.account_history(TENANT, f.cash, Page::default()).unwrap();
        assert_eq!(history.total, 2);
        assert_eq!(history.items[0].line_no, 1);
        assert_eq!(history.items[1].line_no, 2);
    }

    #[test]
    fn deleted_draft_is_gone() {
        let f = fixture();
        let draft = f
            .engine
            .create_draft(TENANT, sale(&f, Amount::from(1), Amount::from(1)))
            .unwrap();
        let outcome = f.engine.delete(TENANT, draft.id).unwrap();
        assert_eq!(outcome.events.len(), 1);
        assert_eq!(
            f.engine.get_entry(TENANT, draft.id),
            Err(LedgerError::EntryNotFound(draft.id))
        );
        assert_eq!(
            f.engine.post(TENANT, draft.id),
            Err(LedgerError::EntryNotFound(draft.id))
        );
    }

    #[test]
    fn other_tenants_cannot_touch_an_entry() {
        let f = fixture();
        let draft = f
            .engine
            .create_draft(TENANT, sale(&f, Amount::from(1), Amount::from(1)))
            .unwrap();
        assert_eq!(
            f.engine.post(TenantId(2), draft.id),
            Err(LedgerError::TenantMismatch)
        );
        assert_eq!(
            f.engine.delete(TenantId(2), draft.id),
            Err(LedgerError::TenantMismatch)
        );
    }

    #[test]
    fn reversal_restores_balances() {
        let f = fixture();
        let posted = f
            .engine
            .post_journal_entry(TENANT, sale(&f, Amount::from(250), Amount::from(250)))
            .unwrap()
            .value;

        let outcome = f.engine.reverse(TENANT, posted.id, date()).unwrap();
        let reversal = outcome.value;
        assert_eq!(reversal.reversal_of, Some(posted.id));
        assert_eq!(reversal.status, EntryStatus::Posted);
        assert_eq!(reversal.reference, Some(Reference::JournalEntry(posted.id)));
        assert_eq!(outcome.events.len(), 2);

        let original = f.engine.get_entry(TENANT, posted.id).unwrap();
        assert_eq!(original.status, EntryStatus::Reversed);
        assert_eq!(original.reversed_by, Some(reversal.id));

        let chart = f.engine.chart();
        assert_eq!(chart.get_account(TENANT, f.cash).unwrap().current_balance, Amount::ZERO);
        assert_eq!(chart.get_account(TENANT, f.revenue).unwrap().current_balance, Amount::ZERO);

        assert_eq!(
            f.engine.reverse(TENANT, posted.id, date()),
            Err(LedgerError::AlreadyReversed(posted.id))
        );
    }

    #[test]
    fn lock_timeout_leaves_nothing_behind() {
        let f = fixture();
        let draft = f
            .engine
            .create_draft(TENANT, sale(&f, Amount::from(40), Amount::from(40)))
            .unwrap();

        // Cash sorts first and is locked by the posting; revenue is held here.
        let slot = f.engine.chart().balance_slot(f.revenue);
        let held = slot.lock(Duration::from_millis(100)).unwrap();
        let result = f.engine.post(TENANT, draft.id);
        drop(held);

        assert!(matches!(result, Err(LedgerError::LockTimeout(_))));
        assert!(result.unwrap_err().is_retryable());
        let chart = f.engine.chart();
        assert_eq!(chart.get_account(TENANT, f.cash).unwrap().current_balance, Amount::ZERO);
        assert_eq!(chart.get_account(TENANT, f.revenue).unwrap().current_balance, Amount::ZERO);
        assert_eq!(
            f.engine.get_entry(TENANT, draft.id).unwrap().status,
            EntryStatus::Draft
        );
        for account in [f.cash, f.revenue] {
            assert_eq!(f.engine.store.list_by_account(TENANT, account, Page::all()).total, 0);
        }

        // Once the row is free the same draft posts.
        f.engine.post(TENANT, draft.id).unwrap();
        assert_eq!(
            f.engine.chart().get_account(TENANT, f.cash).unwrap().current_balance,
            Amount::from(40)
        );
    }

    #[test]
    fn balance_overflow_is_rejected_without_side_effects() {
        let f = fixture();
        let big: Amount = "5000000000000000000000000".parse().unwrap();
        f.engine.post_journal_entry(TENANT, sale(&f, big, big)).unwrap();

        let draft = f.engine.create_draft(TENANT, sale(&f, big, big)).unwrap();
        assert_eq!(f.engine.post(TENANT, draft.id), Err(LedgerError::Overflow));
        assert_eq!(
            f.engine.chart().get_account(TENANT, f.cash).unwrap().current_balance,
            big
        );
        assert_eq!(
            f.engine.get_entry(TENANT, draft.id).unwrap().status,
            EntryStatus::Draft
        );
        assert_eq!(f.engine.store.list_by_account(TENANT, f.cash, Page::all()).total, 1);
    }

    #[test]
    fn oversized_draft_totals_are_rejected() {
        let f = fixture();
        let big: Amount = "5000000000000000000000000".parse().unwrap();
        let request = NewJournalEntry::new(
            date(),
            vec![
                JournalEntryLine::debit(f.cash, big).unwrap(),
                JournalEntryLine::debit(f.cash, big).unwrap(),
                JournalEntryLine::credit(f.revenue, big).unwrap(),
            ],
        );
        assert_eq!(
            f.engine.create_draft(TENANT, request.clone()),
            Err(LedgerError::Overflow)
        );
        assert_eq!(
            f.engine.post_journal_entry(TENANT, request).map(|outcome| outcome.value),
            Err(LedgerError::Overflow)
        );
        assert!(f.engine.entries.is_empty());
    }

    #[test]
    fn draft_cannot_be_reversed() {
        let f = fixture();
        let draft = f
            .engine
            .create_draft(TENANT, sale(&f, Amount::from(1), Amount::from(1)))
            .unwrap();
        assert_eq!(
            f.engine.reverse(TENANT, draft.id, date()),
            Err(LedgerError::NotPosted(draft.id))
        );
    }
}
