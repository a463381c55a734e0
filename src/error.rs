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

//! Error types for journal posting and stock costing.
//!
//! Every variant is a synchronous domain failure that aborts the enclosing
//! operation without leaving partial state behind. Only [`LedgerError::LockTimeout`]
//! is safe to retry as-is.

use crate::base::{AccountId, JournalEntryId};
use crate::decimal::Amount;
use thiserror::Error;

pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Debit and credit totals differ
    #[error("journal entry is unbalanced: total debit {debit}, total credit {credit}")]
    UnbalancedEntry { debit: Amount, credit: Amount },

    /// Fewer than two lines on a journal entry
    #[error("journal entry needs at least 2 lines, got {0}")]
    InsufficientLines(usize),

    /// A line has both or neither of debit and credit set
    #[error("journal line must have exactly one of debit or credit")]
    InvalidLineShape,

    /// Amount is negative, or zero where a positive value is required
    #[error("invalid amount {0}")]
    InvalidAmount(Amount),

    #[error("invalid decimal '{0}'")]
    InvalidDecimal(String),

    #[error("journal entry {0} is already posted")]
    AlreadyPosted(JournalEntryId),

    #[error("journal entry {0} is posted and cannot be deleted")]
    CannotDeletePostedEntry(JournalEntryId),

    #[error("journal entry {0} is not posted")]
    NotPosted(JournalEntryId),

    #[error("journal entry {0} is already reversed")]
    AlreadyReversed(JournalEntryId),

    #[error("journal entry {0} not found")]
    EntryNotFound(JournalEntryId),

    #[error("account {0} not found")]
    AccountNotFound(AccountId),

    #[error("parent account {0} not found")]
    ParentAccountNotFound(AccountId),

    #[error("account {0} is a system account")]
    SystemAccountProtected(AccountId),

    #[error("account code '{0}' already exists")]
    DuplicateAccountCode(String),

    #[error("invalid account code '{0}'")]
    InvalidAccountCode(String),

    /// Reparenting would make an account its own ancestor
    #[error("account {0} cannot be moved under its own subtree")]
    AccountCycle(AccountId),

    /// Account still has a balance or children
    #[error("account {0} is in use")]
    AccountInUse(AccountId),

    /// Resource belongs to a different tenant
    #[error("tenant mismatch")]
    TenantMismatch,

    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: Amount, available: Amount },

    /// Manual strategy without a batch number
    #[error("batch number is required for manual batch selection")]
    BatchRequired,

    #[error("batch '{0}' not found")]
    BatchNotFound(String),

    /// Receipt into an existing batch with conflicting lot, serial or expiry
    #[error("batch '{batch}' is recorded with a different {field}")]
    BatchMismatch { batch: String, field: &'static str },

    /// Lot number or expiry date missing under pharmaceutical compliance
    #[error("lot number and expiry date are required for {0}")]
    ComplianceFieldsMissing(String),

    /// A balance row would go below zero
    #[error("{0} cannot be negative")]
    NegativeBalance(&'static str),

    #[error("division by zero")]
    DivisionByZero,

    #[error("arithmetic overflow")]
    Overflow,

    /// Row lock not acquired within the configured timeout
    #[error("timed out waiting for lock on {0}")]
    LockTimeout(String),

    /// Append of an id that is already stored
    #[error("ledger entry {0} already exists")]
    DuplicateEntry(String),

    #[error("period must span at least one day")]
    InvalidPeriod,

    /// Unknown movement kind, or a kind used in the wrong direction
    #[error("invalid stock movement kind '{0}'")]
    InvalidMovementKind(String),

    #[error("invalid costing strategy '{0}'")]
    InvalidStrategy(String),
}

impl LedgerError {
    /// Stable machine-readable code.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::UnbalancedEntry { .. } => "UNBALANCED_ENTRY",
            Self::InsufficientLines(_) => "INSUFFICIENT_LINES",
            Self::InvalidLineShape => "INVALID_LINE_SHAPE",
            Self::InvalidAmount(_) => "INVALID_AMOUNT",
            Self::InvalidDecimal(_) => "INVALID_DECIMAL",
            Self::AlreadyPosted(_) => "ALREADY_POSTED",
            Self::CannotDeletePostedEntry(_) => "CANNOT_DELETE_POSTED_ENTRY",
            Self::NotPosted(_) => "NOT_POSTED",
            Self::AlreadyReversed(_) => "ALREADY_REVERSED",
            Self::EntryNotFound(_) => "ENTRY_NOT_FOUND",
            Self::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            Self::ParentAccountNotFound(_) => "PARENT_ACCOUNT_NOT_FOUND",
            Self::SystemAccountProtected(_) => "SYSTEM_ACCOUNT_PROTECTED",
            Self::DuplicateAccountCode(_) => "DUPLICATE_ACCOUNT_CODE",
            Self::InvalidAccountCode(_) => "INVALID_ACCOUNT_CODE",
            Self::AccountCycle(_) => "ACCOUNT_CYCLE",
            Self::AccountInUse(_) => "ACCOUNT_IN_USE",
            Self::TenantMismatch => "TENANT_MISMATCH",
            Self::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            Self::BatchRequired => "BATCH_REQUIRED",
            Self::BatchNotFound(_) => "BATCH_NOT_FOUND",
            Self::ComplianceFieldsMissing(_) => "COMPLIANCE_FIELDS_MISSING",
            Self::BatchMismatch { .. } => "BATCH_MISMATCH",
            Self::NegativeBalance(_) => "NEGATIVE_BALANCE",
            Self::DivisionByZero => "DIVISION_BY_ZERO",
            Self::Overflow => "OVERFLOW",
            Self::LockTimeout(_) => "LOCK_TIMEOUT",
            Self::DuplicateEntry(_) => "DUPLICATE_ENTRY",
            Self::InvalidPeriod => "INVALID_PERIOD",
            Self::InvalidMovementKind(_) => "INVALID_MOVEMENT_KIND",
            Self::InvalidStrategy(_) => "INVALID_STRATEGY",
        }
    }

    /// Concurrency failures may be retried; invariant violations may not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LockTimeout(_))
    }
}
