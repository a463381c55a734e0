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

//! Property-based tests for the ledger engine.
//!
//! These tests verify invariants that should hold for any sequence of
//! journal postings and stock movements.

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use erp_ledger::{
    AccountId, AccountType, Amount, BatchDetails, CostingStrategy, DeductionRequest, Engine,
    JournalEntryLine, LedgerError, NewJournalEntry, ProductId, Rounding, StockMovement,
    StockMovementKind, TenantId, WarehouseId,
};
use proptest::prelude::*;
use rust_decimal::Decimal;

const TENANT: TenantId = TenantId(1);
const WAREHOUSE: WarehouseId = WarehouseId(1);
const PRODUCT: ProductId = ProductId(1);

// =============================================================================
// Arbitrary Strategies
// =============================================================================

/// Generate a positive amount (0.0001 to 1000 with 4 decimal places).
fn arb_amount() -> impl Strategy<Value = Amount> {
    (1i64..=10_000_000i64).prop_map(|units| Amount::new(Decimal::new(units, 4)))
}

/// Generate a positive whole quantity.
fn arb_quantity() -> impl Strategy<Value = i64> {
    1i64..=200
}

fn arb_strategy() -> impl Strategy<Value = CostingStrategy> {
    prop_oneof![
        Just(CostingStrategy::Fifo),
        Just(CostingStrategy::Lifo),
        Just(CostingStrategy::Fefo),
    ]
}

#[derive(Debug, Clone)]
enum StockOp {
    Receive { quantity: i64, cost: i64, expiry_month: Option<u32> },
    Deduct { quantity: i64, strategy: CostingStrategy },
}

fn arb_stock_op() -> impl Strategy<Value = StockOp> {
    prop_oneof![
        (arb_quantity(), 0i64..50, prop::option::of(1u32..=12)).prop_map(
            |(quantity, cost, expiry_month)| StockOp::Receive {
                quantity,
                cost,
                expiry_month,
            }
        ),
        (arb_quantity(), arb_strategy())
            .prop_map(|(quantity, strategy)| StockOp::Deduct { quantity, strategy }),
    ]
}

// =============================================================================
// Helpers
// =============================================================================

fn chart(engine: &Engine, count: usize) -> Vec<AccountId> {
    let types = [
        AccountType::Asset,
        AccountType::Liability,
        AccountType::Equity,
        AccountType::Revenue,
        AccountType::Expense,
    ];
    (0..count)
        .map(|i| {
            engine
                .chart()
                .create_account(TENANT, format!("{}", 1000 + i), "acct", types[i % types.len()], None, false)
                .unwrap()
                .id
        })
        .collect()
}

/// Debit lines on the given accounts and one balancing credit line.
fn balanced_entry(accounts: &[AccountId], debits: &[(usize, Amount)], credit_to: usize) -> NewJournalEntry {
    let mut lines: Vec<JournalEntryLine> = debits
        .iter()
        .map(|(account, amount)| JournalEntryLine::debit(accounts[*account], *amount).unwrap())
        .collect();
    let total: Amount = debits.iter().map(|(_, amount)| *amount).sum();
    lines.push(JournalEntryLine::credit(accounts[credit_to], total).unwrap());
    NewJournalEntry::new(NaiveDate::from_ymd_opt(2025, 2, 1).unwrap(), lines)
}

fn apply(engine: &Engine, op: &StockOp, step: i64) -> Result<(), LedgerError> {
    let at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(step);
    match op {
        StockOp::Receive {
            quantity,
            cost,
            expiry_month,
        } => {
            let mut batch = BatchDetails::new(format!("B{step}"));
            if let Some(month) = expiry_month {
                batch = batch.expires(NaiveDate::from_ymd_opt(2026, *month, 1).unwrap());
            }
            engine
                .record_stock_transaction(
                    TENANT,
                    StockMovement::new(
                        StockMovementKind::Purchase,
                        WAREHOUSE,
                        PRODUCT,
                        Amount::from(*quantity),
                        Amount::from(*cost),
                    )
                    .batch(batch)
                    .at(at),
                )
                .map(|_| ())
        }
        StockOp::Deduct { quantity, strategy } => engine
            .deduct_stock(
                TENANT,
                DeductionRequest::new(WAREHOUSE, PRODUCT, Amount::from(*quantity), *strategy).at(at),
            )
            .map(|_| ()),
    }
}

// =============================================================================
// Journal Invariant Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Posted entries balance and keep the trial balance balanced.
    #[test]
    fn posted_entries_always_balance(
        entries in prop::collection::vec(
            (prop::collection::vec((0usize..6, arb_amount()), 1..5), 0usize..6),
            1..10,
        ),
    ) {
        let engine = Engine::default();
        let accounts = chart(&engine, 6);

        for (debits, credit_to) in &entries {
            let outcome = engine
                .post_journal_entry(TENANT, balanced_entry(&accounts, debits, *credit_to))
                .unwrap();
            let entry = outcome.value;
            prop_assert_eq!(entry.total_debit, entry.total_credit);
            let debit: Amount = entry.lines.iter().map(|line| line.debit_amount()).sum();
            prop_assert_eq!(debit, entry.total_debit);
        }

        prop_assert!(engine.trial_balance(TENANT).is_balanced());
    }

    /// Posting a posted entry again fails and moves no balance.
    #[test]
    fn second_post_changes_nothing(
        debits in prop::collection::vec((0usize..4, arb_amount()), 1..5),
        credit_to in 0usize..4,
    ) {
        let engine = Engine::default();
        let accounts = chart(&engine, 4);
        let entry = engine
            .post_journal_entry(TENANT, balanced_entry(&accounts, &debits, credit_to))
            .unwrap()
            .value;
        let before = engine.trial_balance(TENANT);

        let again = engine.post(TENANT, entry.id).map(|outcome| outcome.value);
        prop_assert_eq!(again, Err(LedgerError::AlreadyPosted(entry.id)));
        prop_assert_eq!(engine.trial_balance(TENANT), before);
    }

    /// Reversal brings every account back to its prior balance.
    #[test]
    fn reversal_nets_to_zero(
        debits in prop::collection::vec((0usize..4, arb_amount()), 1..5),
        credit_to in 0usize..4,
    ) {
        let engine = Engine::default();
        let accounts = chart(&engine, 4);
        let entry = engine
            .post_journal_entry(TENANT, balanced_entry(&accounts, &debits, credit_to))
            .unwrap()
            .value;
        engine
            .reverse_journal_entry(TENANT, entry.id, NaiveDate::from_ymd_opt(2025, 2, 2).unwrap())
            .unwrap();

        for row in engine.trial_balance(TENANT).rows {
            prop_assert_eq!(row.balance, Amount::ZERO);
        }
    }
}

// =============================================================================
// Stock Invariant Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// No balance or batch ever goes negative, and failed deductions leave
    /// the balance untouched.
    #[test]
    fn stock_never_negative(ops in prop::collection::vec(arb_stock_op(), 1..30)) {
        let engine = Engine::default();

        for (step, op) in ops.iter().enumerate() {
            let before = engine.get_stock_level(TENANT, PRODUCT, WAREHOUSE);
            let result = apply(&engine, op, step as i64);
            let after = engine.get_stock_level(TENANT, PRODUCT, WAREHOUSE);

            prop_assert!(!after.quantity_on_hand.is_negative());
            prop_assert!(!after.quantity_reserved.is_negative());
            if let Err(error) = result {
                prop_assert!(matches!(error, LedgerError::InsufficientStock { .. }), "{error}");
                prop_assert_eq!(after, before);
            }
        }

        for batch in engine.stock().batches(TENANT, WAREHOUSE, PRODUCT).unwrap() {
            prop_assert!(!batch.quantity_on_hand.is_negative());
            prop_assert!(batch.quantity_available <= batch.quantity_on_hand);
        }
    }

    /// Quantity on hand equals the signed sum of the ledger and of the batches.
    #[test]
    fn balance_matches_ledger(ops in prop::collection::vec(arb_stock_op(), 1..30)) {
        let engine = Engine::default();
        for (step, op) in ops.iter().enumerate() {
            let _ = apply(&engine, op, step as i64);
        }

        let reconciliation = engine.reconcile_stock(TENANT, PRODUCT, WAREHOUSE).unwrap();
        prop_assert!(reconciliation.is_consistent());

        let batches: Amount = engine
            .stock()
            .batches(TENANT, WAREHOUSE, PRODUCT)
            .unwrap()
            .iter()
            .map(|batch| batch.quantity_on_hand)
            .sum();
        prop_assert_eq!(batches, reconciliation.balance_quantity);
    }

    /// A successful deduction takes exactly the requested quantity, and FIFO
    /// lines come out in receipt order.
    #[test]
    fn fifo_lines_follow_receipt_order(
        receipts in prop::collection::vec(arb_quantity(), 1..8),
        fraction in 1i64..=100,
    ) {
        let engine = Engine::default();
        for (step, quantity) in receipts.iter().enumerate() {
            apply(&engine, &StockOp::Receive { quantity: *quantity, cost: 1, expiry_month: None }, step as i64).unwrap();
        }
        let total: i64 = receipts.iter().sum();
        let requested = (total * fraction / 100).max(1);

        let lines = engine
            .deduct_stock(
                TENANT,
                DeductionRequest::new(WAREHOUSE, PRODUCT, Amount::from(requested), CostingStrategy::Fifo),
            )
            .unwrap()
            .value;

        let taken: Amount = lines.iter().map(|line| line.quantity_deducted).sum();
        prop_assert_eq!(taken, Amount::from(requested));
        prop_assert!(lines.windows(2).all(|pair| pair[0].batch_id < pair[1].batch_id));
    }
}

// =============================================================================
// Decimal Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    /// Amounts always render with four places.
    #[test]
    fn amounts_render_four_places(amount in arb_amount()) {
        let rendered = amount.to_string();
        let places = rendered.split('.').nth(1).map_or(0, str::len);
        prop_assert_eq!(places, 4);
        prop_assert_eq!(rendered.parse::<Amount>().unwrap(), amount);
    }

    /// Addition and subtraction are exact.
    #[test]
    fn add_sub_exact(a in arb_amount(), b in arb_amount()) {
        prop_assert_eq!(a + b - b, a);
    }

    /// Division by zero is an error, never a panic.
    #[test]
    fn division_by_zero_is_error(a in arb_amount()) {
        prop_assert_eq!(a.checked_div(Amount::ZERO, Rounding::HalfEven), Err(LedgerError::DivisionByZero));
    }
}
