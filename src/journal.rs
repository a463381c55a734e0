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

//! Journal entries.
//!
//! ```text
//!   Draft ──post──► Posted ──reverse──► Reversed
//!     │
//!     └──delete──► (gone)
//! ```
//!
//! A line carries exactly one positive side. This is checked when the line is
//! built, including when it is deserialized, so an entry can never hold a
//! malformed line.
//!
//! # Example
//!
//! ```
//! use erp_ledger::{AccountId, JournalEntryLine, LedgerError};
//! use rust_decimal_macros::dec;
//!
//! let line = JournalEntryLine::debit(AccountId(1), dec!(1000).into()).unwrap();
//! assert!(line.is_debit());
//!
//! let both = JournalEntryLine::new(AccountId(1), dec!(5).into(), dec!(5).into(), None);
//! assert_eq!(both, Err(LedgerError::InvalidLineShape));
//! ```

use crate::base::{AccountId, JournalEntryId, Reference, TenantId};
use crate::decimal::Amount;
use crate::error::{LedgerError, LedgerResult};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CURRENCY: &str = "USD";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Draft,
    Posted,
    Reversed,
}

/// One side of a journal entry. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "LineInput")]
pub struct JournalEntryLine {
    account_id: AccountId,
    debit_amount: Amount,
    credit_amount: Amount,
    description: Option<String>,
}

#[derive(Deserialize)]
struct LineInput {
    account_id: AccountId,
    #[serde(default)]
    debit_amount: Amount,
    #[serde(default)]
    credit_amount: Amount,
    #[serde(default)]
    description: Option<String>,
}

impl TryFrom<LineInput> for JournalEntryLine {
    type Error = LedgerError;

    fn try_from(input: LineInput) -> Result<Self, Self::Error> {
        Self::new(
            input.account_id,
            input.debit_amount,
            input.credit_amount,
            input.description,
        )
    }
}

impl JournalEntryLine {
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAmount`] if either side is negative.
    /// - [`LedgerError::InvalidLineShape`] unless exactly one side is positive.
    pub fn new(
        account_id: AccountId,
        debit_amount: Amount,
        credit_amount: Amount,
        description: Option<String>,
    ) -> LedgerResult<Self> {
        for amount in [debit_amount, credit_amount] {
            if amount.is_negative() {
                return Err(LedgerError::InvalidAmount(amount));
            }
        }
        if debit_amount.is_positive() == credit_amount.is_positive() {
            return Err(LedgerError::InvalidLineShape);
        }
        Ok(Self {
            account_id,
            debit_amount,
            credit_amount,
            description,
        })
    }

    pub fn debit(account_id: AccountId, amount: Amount) -> LedgerResult<Self> {
        Self::new(account_id, amount, Amount::ZERO, None)
    }

    pub fn credit(account_id: AccountId, amount: Amount) -> LedgerResult<Self> {
        Self::new(account_id, Amount::ZERO, amount, None)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn account_id(&self) -> AccountId {
        self.account_id
    }

    pub fn debit_amount(&self) -> Amount {
        self.debit_amount
    }

    pub fn credit_amount(&self) -> Amount {
        self.credit_amount
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn is_debit(&self) -> bool {
        self.debit_amount.is_positive()
    }

    /// The positive side.
    pub fn amount(&self) -> Amount {
        if self.is_debit() {
            self.debit_amount
        } else {
            self.credit_amount
        }
    }

    /// Same account and amount on the opposite side.
    pub fn reversed(&self) -> Self {
        Self {
            account_id: self.account_id,
            debit_amount: self.credit_amount,
            credit_amount: self.debit_amount,
            description: self.description.clone(),
        }
    }
}

/// Sums of the debit and credit sides.
///
/// # Errors
///
/// [`LedgerError::Overflow`] if either side leaves the representable range.
pub fn totals(lines: &[JournalEntryLine]) -> LedgerResult<(Amount, Amount)> {
    lines
        .iter()
        .try_fold((Amount::ZERO, Amount::ZERO), |(debit, credit), line| {
            Ok((
                debit.checked_add(line.debit_amount)?,
                credit.checked_add(line.credit_amount)?,
            ))
        })
}

/// Journal entry header with its lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: JournalEntryId,
    pub tenant_id: TenantId,
    /// `JE-{YYYYMM}-{seq}`; assigned at creation and never changed.
    pub entry_number: String,
    pub entry_date: NaiveDate,
    pub description: String,
    pub currency: String,
    pub reference: Option<Reference>,
    pub status: EntryStatus,
    pub total_debit: Amount,
    pub total_credit: Amount,
    pub lines: Vec<JournalEntryLine>,
    /// Set on a reversal entry: the entry it reverses.
    pub reversal_of: Option<JournalEntryId>,
    /// Set on a reversed entry: the entry that reversed it.
    pub reversed_by: Option<JournalEntryId>,
    pub created_at: DateTime<Utc>,
    pub posted_at: Option<DateTime<Utc>>,
}

impl JournalEntry {
    pub fn is_balanced(&self) -> bool {
        self.total_debit == self.total_credit
    }
}

/// Request for a new journal entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewJournalEntry {
    pub entry_date: NaiveDate,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub reference: Option<Reference>,
    pub lines: Vec<JournalEntryLine>,
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

impl NewJournalEntry {
    pub fn new(entry_date: NaiveDate, lines: Vec<JournalEntryLine>) -> Self {
        Self {
            entry_date,
            description: String::new(),
            currency: default_currency(),
            reference: None,
            lines,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    pub fn reference(mut self, reference: Reference) -> Self {
        self.reference = Some(reference);
        self
    }
}

/// One posted line, as recorded in the ledger entry store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountLedgerEntry {
    pub entry_id: JournalEntryId,
    /// 1-based position within the entry.
    pub line_no: u32,
    pub tenant_id: TenantId,
    pub account_id: AccountId,
    pub entry_number: String,
    pub entry_date: NaiveDate,
    pub debit_amount: Amount,
    pub credit_amount: Amount,
    pub description: Option<String>,
    pub posted_at: DateTime<Utc>,
}
