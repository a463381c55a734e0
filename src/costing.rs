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

//! Stock costing engine.
//!
//! Receipts create or top up batches and move the weighted average cost;
//! issues draw from one named batch; [`StockCostingEngine::deduct_by_strategy`]
//! walks batches in FIFO, LIFO, FEFO or manual order until the requested
//! quantity is covered.
//!
//! # Lock order
//!
//! 1. The (tenant, warehouse, product) balance row.
//! 2. Batches of that key, in ascending [`BatchId`] order.
//!
//! Batches are created and changed only while their key's balance row is
//! held. Every operation validates and plans against a locked snapshot before
//! its first write, so a rejected deduction leaves batches, balances and the
//! entry log untouched.

use crate::balance::BalanceStore;
use crate::base::{BatchId, ProductId, Reference, StockEntryId, TenantId, VariantId, WarehouseId};
use crate::decimal::{Amount, div_internal, mul_internal};
use crate::error::{LedgerError, LedgerResult};
use crate::events::{DomainEvent, Outcome};
use crate::ledger_store::{LedgerEntryStore, Page};
use crate::stock::{
    Batch, BatchDetails, CostingStrategy, DEFAULT_UOM, StockBalance, StockKey, StockLedgerEntry,
    StockMovementKind,
};
use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use std::cmp::Ordering as CmpOrdering;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// A single-batch stock movement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockMovement {
    pub kind: StockMovementKind,
    pub warehouse_id: WarehouseId,
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub quantity: Amount,
    pub unit_cost: Amount,
    pub uom: String,
    pub reference: Option<Reference>,
    /// Receipt attributes for inbound kinds; the source batch for outbound.
    pub batch: Option<BatchDetails>,
    pub occurred_at: DateTime<Utc>,
}

impl StockMovement {
    pub fn new(
        kind: StockMovementKind,
        warehouse_id: WarehouseId,
        product_id: ProductId,
        quantity: Amount,
        unit_cost: Amount,
    ) -> Self {
        Self {
            kind,
            warehouse_id,
            product_id,
            variant_id: None,
            quantity,
            unit_cost,
            uom: DEFAULT_UOM.to_string(),
            reference: None,
            batch: None,
            occurred_at: Utc::now(),
        }
    }

    pub fn variant(mut self, variant_id: VariantId) -> Self {
        self.variant_id = Some(variant_id);
        self
    }

    pub fn uom(mut self, uom: impl Into<String>) -> Self {
        self.uom = uom.into();
        self
    }

    pub fn reference(mut self, reference: Reference) -> Self {
        self.reference = Some(reference);
        self
    }

    pub fn batch(mut self, batch: BatchDetails) -> Self {
        self.batch = Some(batch);
        self
    }

    pub fn at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = occurred_at;
        self
    }
}

/// A multi-batch deduction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeductionRequest {
    pub warehouse_id: WarehouseId,
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub quantity: Amount,
    /// Used for a batch whose cost price is zero.
    pub unit_cost: Amount,
    pub uom: String,
    pub strategy: CostingStrategy,
    /// Required by [`CostingStrategy::Manual`].
    pub batch_number: Option<String>,
    /// Outbound kind recorded on the ledger entries.
    pub kind: StockMovementKind,
    pub reference: Option<Reference>,
    pub occurred_at: DateTime<Utc>,
}

impl DeductionRequest {
    pub fn new(
        warehouse_id: WarehouseId,
        product_id: ProductId,
        quantity: Amount,
        strategy: CostingStrategy,
    ) -> Self {
        Self {
            warehouse_id,
            product_id,
            variant_id: None,
            quantity,
            unit_cost: Amount::ZERO,
            uom: DEFAULT_UOM.to_string(),
            strategy,
            batch_number: None,
            kind: StockMovementKind::Shipment,
            reference: None,
            occurred_at: Utc::now(),
        }
    }

    pub fn unit_cost(mut self, unit_cost: Amount) -> Self {
        self.unit_cost = unit_cost;
        self
    }

    pub fn uom(mut self, uom: impl Into<String>) -> Self {
        self.uom = uom.into();
        self
    }

    pub fn batch_number(mut self, batch_number: impl Into<String>) -> Self {
        self.batch_number = Some(batch_number.into());
        self
    }

    pub fn kind(mut self, kind: StockMovementKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn reference(mut self, reference: Reference) -> Self {
        self.reference = Some(reference);
        self
    }

    pub fn at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = occurred_at;
        self
    }
}

/// What one batch contributed to a deduction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeductionLine {
    pub batch_id: BatchId,
    pub batch_number: Option<String>,
    pub quantity_deducted: Amount,
    pub unit_cost: Amount,
    /// Ledger entry recording this line.
    pub transaction_id: StockEntryId,
}

/// Balance row versus the sum of its ledger entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub key: StockKey,
    pub ledger_quantity: Amount,
    pub balance_quantity: Amount,
}

impl Reconciliation {
    pub fn is_consistent(&self) -> bool {
        self.ledger_quantity == self.balance_quantity
    }
}

/// `(on_hand * average + quantity * cost) / (on_hand + quantity)`, evaluated at
/// the internal scale and rounded once.
pub fn weighted_average_cost(
    on_hand: Amount,
    average: Amount,
    quantity: Amount,
    cost: Amount,
) -> LedgerResult<Amount> {
    let total_quantity = on_hand.checked_add(quantity)?;
    if total_quantity.is_zero() {
        return Ok(cost);
    }
    let value = mul_internal(on_hand.as_decimal(), average.as_decimal())?
        .checked_add(mul_internal(quantity.as_decimal(), cost.as_decimal())?)
        .ok_or(LedgerError::Overflow)?;
    Ok(Amount::new(div_internal(value, total_quantity.as_decimal())?))
}

type BatchCell = Arc<Mutex<Batch>>;

/// Batch-aware stock ledger for every tenant.
#[derive(Debug)]
pub struct StockCostingEngine {
    balances: BalanceStore<StockKey, StockBalance>,
    batches: DashMap<BatchId, BatchCell>,
    /// Batch ids per key in creation order.
    batch_index: DashMap<StockKey, Vec<BatchId>>,
    batch_numbers: DashMap<(StockKey, String), BatchId>,
    reorder_points: DashMap<StockKey, Amount>,
    store: Arc<LedgerEntryStore>,
    next_batch_id: AtomicU64,
    pharmaceutical_compliance: bool,
    lock_timeout: Duration,
}

impl StockCostingEngine {
    pub fn new(
        store: Arc<LedgerEntryStore>,
        pharmaceutical_compliance: bool,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            balances: BalanceStore::new(),
            batches: DashMap::new(),
            batch_index: DashMap::new(),
            batch_numbers: DashMap::new(),
            reorder_points: DashMap::new(),
            store,
            next_batch_id: AtomicU64::new(1),
            pharmaceutical_compliance,
            lock_timeout,
        }
    }

    pub fn store(&self) -> &Arc<LedgerEntryStore> {
        &self.store
    }

    /// Records one movement against one batch.
    ///
    /// Inbound kinds create a batch (or top up the batch with the same number)
    /// and update the weighted average cost. Outbound kinds draw from the
    /// batch named in `movement.batch`.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAmount`] for a non-positive quantity or a
    ///   negative cost.
    /// - [`LedgerError::BatchRequired`] for an outbound movement without a batch.
    /// - [`LedgerError::BatchNotFound`] / [`LedgerError::InsufficientStock`] when
    ///   the named batch is unknown or too small.
    /// - [`LedgerError::ComplianceFieldsMissing`] under pharmaceutical
    ///   compliance when lot number or expiry is absent.
    pub fn record_transaction(
        &self,
        tenant_id: TenantId,
        movement: StockMovement,
    ) -> LedgerResult<Outcome<Arc<StockLedgerEntry>>> {
        require_positive(movement.quantity)?;
        require_non_negative(movement.unit_cost)?;
        if movement.kind.is_inbound() {
            self.receive(tenant_id, movement)
        } else {
            self.issue(tenant_id, movement)
        }
    }

    /// Deducts `request.quantity` across batches in strategy order.
    ///
    /// One ledger entry is appended per batch touched, in the order the
    /// batches were consumed. If the candidates cannot cover the full
    /// quantity nothing is written.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::BatchRequired`] for [`CostingStrategy::Manual`] without
    ///   a batch number.
    /// - [`LedgerError::InsufficientStock`] if available batches fall short.
    /// - [`LedgerError::ComplianceFieldsMissing`] under pharmaceutical
    ///   compliance when a touched batch lacks lot number or expiry.
    /// - [`LedgerError::LockTimeout`] if the balance row or a batch stays locked.
    pub fn deduct_by_strategy(
        &self,
        tenant_id: TenantId,
        request: DeductionRequest,
    ) -> LedgerResult<Outcome<Vec<DeductionLine>>> {
        require_positive(request.quantity)?;
        require_non_negative(request.unit_cost)?;
        if request.kind.is_inbound() {
            return Err(LedgerError::InvalidMovementKind(request.kind.to_string()));
        }
        let strategy = self.effective_strategy(request.strategy);
        if strategy == CostingStrategy::Manual && request.batch_number.is_none() {
            return Err(LedgerError::BatchRequired);
        }

        let key = StockKey::new(tenant_id, request.warehouse_id, request.product_id);
        let slot = self.balances.slot(&key);
        let mut balance = slot.lock(self.lock_timeout)?;

        let mut candidates: Vec<Batch> = self
            .key_batches(&key)?
            .into_iter()
            .filter(|batch| batch.quantity_available.is_positive())
            .collect();
        if let (CostingStrategy::Manual, Some(number)) = (strategy, &request.batch_number) {
            if self.batch_by_number(&key, number).is_none() {
                return Err(LedgerError::BatchNotFound(number.clone()));
            }
            candidates.retain(|batch| batch.batch_number.as_deref() == Some(number.as_str()));
        }
        sort_candidates(&mut candidates, strategy);

        let plan = plan_deduction(candidates, request.quantity).inspect_err(|_| {
            warn!(%key, requested = %request.quantity, ?strategy, "over-deduction rejected");
        })?;
        if self.pharmaceutical_compliance {
            if let Some((batch, _)) = plan.iter().find(|(batch, _)| !batch.has_compliance_fields()) {
                return Err(LedgerError::ComplianceFieldsMissing(batch.label()));
            }
        }

        // Lock touched batches in ascending id and confirm the snapshot.
        let mut cells: Vec<(BatchId, BatchCell)> = plan
            .iter()
            .map(|(batch, _)| {
                self.batch_cell(batch.id)
                    .map(|cell| (batch.id, cell))
                    .ok_or_else(|| LedgerError::BatchNotFound(batch.label()))
            })
            .collect::<LedgerResult<_>>()?;
        cells.sort_by_key(|(id, _)| *id);
        let mut locked: BTreeMap<BatchId, MutexGuard<'_, Batch>> = BTreeMap::new();
        for (id, cell) in &cells {
            locked.insert(*id, self.lock_batch(cell, *id)?);
        }
        for (batch, take) in &plan {
            let available = locked
                .get(&batch.id)
                .map_or(Amount::ZERO, |guard| guard.quantity_available);
            if available < *take {
                return Err(LedgerError::InsufficientStock {
                    requested: request.quantity,
                    available,
                });
            }
        }

        let current = balance
            .current()
            .cloned()
            .unwrap_or_else(|| StockBalance::empty(key, request.occurred_at));
        let next = after_outflow(&current, request.quantity, request.occurred_at)?;

        let mut lines = Vec::with_capacity(plan.len());
        for (batch, take) in &plan {
            let unit_cost = cost_of(batch, request.unit_cost);
            let entry = self.store.append_stock(StockLedgerEntry {
                id: self.store.next_stock_entry_id(),
                tenant_id,
                product_id: request.product_id,
                variant_id: request.variant_id,
                warehouse_id: request.warehouse_id,
                batch_id: Some(batch.id),
                batch_number: batch.batch_number.clone(),
                kind: request.kind,
                quantity: *take,
                unit_cost,
                uom: request.uom.clone(),
                reference: request.reference.clone(),
                created_at: request.occurred_at,
            })?;
            if let Some(guard) = locked.get_mut(&batch.id) {
                guard.quantity_on_hand -= *take;
                guard.quantity_available -= *take;
            }
            lines.push(DeductionLine {
                batch_id: batch.id,
                batch_number: batch.batch_number.clone(),
                quantity_deducted: *take,
                unit_cost,
                transaction_id: entry.id,
            });
        }
        let on_hand = next.quantity_on_hand;
        balance.save(next)?;
        drop(locked);
        drop(balance);

        info!(%key, quantity = %request.quantity, ?strategy, batches = lines.len(), "stock deducted");
        let mut events = vec![DomainEvent::StockDeducted {
            tenant_id,
            warehouse_id: request.warehouse_id,
            product_id: request.product_id,
            quantity: request.quantity,
            batches: lines.len(),
        }];
        events.extend(self.low_stock_event(key, on_hand));
        Ok(Outcome::new(lines, events))
    }

    /// Moves `quantity` from available to reserved.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InsufficientStock`] if less than `quantity` is available.
    pub fn reserve(
        &self,
        tenant_id: TenantId,
        warehouse_id: WarehouseId,
        product_id: ProductId,
        quantity: Amount,
    ) -> LedgerResult<StockBalance> {
        require_positive(quantity)?;
        let key = StockKey::new(tenant_id, warehouse_id, product_id);
        let slot = self.balances.slot(&key);
        let mut balance = slot.lock(self.lock_timeout)?;
        let current = balance
            .current()
            .cloned()
            .unwrap_or_else(|| StockBalance::empty(key, Utc::now()));
        if current.available() < quantity {
            return Err(LedgerError::InsufficientStock {
                requested: quantity,
                available: current.available(),
            });
        }

        let next = StockBalance {
            quantity_reserved: current.quantity_reserved + quantity,
            updated_at: Utc::now(),
            ..current
        };
        balance.save(next.clone())?;
        debug!(%key, %quantity, "stock reserved");
        Ok(next)
    }

    /// Returns reserved stock to available.
    ///
    /// # Errors
    ///
    /// [`LedgerError::NegativeBalance`] if more than the reserved quantity is
    /// released.
    pub fn release(
        &self,
        tenant_id: TenantId,
        warehouse_id: WarehouseId,
        product_id: ProductId,
        quantity: Amount,
    ) -> LedgerResult<StockBalance> {
        require_positive(quantity)?;
        let key = StockKey::new(tenant_id, warehouse_id, product_id);
        let slot = self.balances.slot(&key);
        let mut balance = slot.lock(self.lock_timeout)?;
        let current = balance
            .current()
            .cloned()
            .unwrap_or_else(|| StockBalance::empty(key, Utc::now()));

        let next = StockBalance {
            quantity_reserved: current.quantity_reserved - quantity,
            updated_at: Utc::now(),
            ..current
        };
        balance.save(next.clone())?;
        debug!(%key, %quantity, "reservation released");
        Ok(next)
    }

    /// Recomputes quantity on hand from the entry log under the balance lock.
    pub fn reconcile(
        &self,
        tenant_id: TenantId,
        warehouse_id: WarehouseId,
        product_id: ProductId,
    ) -> LedgerResult<Reconciliation> {
        let key = StockKey::new(tenant_id, warehouse_id, product_id);
        let slot = self.balances.slot(&key);
        let balance = slot.lock(self.lock_timeout)?;
        let ledger_quantity: Amount = self
            .store
            .list_by_product_warehouse(tenant_id, product_id, warehouse_id, Page::all())
            .items
            .iter()
            .map(|entry| entry.signed_quantity())
            .sum();
        let balance_quantity = balance
            .current()
            .map_or(Amount::ZERO, |row| row.quantity_on_hand);

        let reconciliation = Reconciliation {
            key,
            ledger_quantity,
            balance_quantity,
        };
        if !reconciliation.is_consistent() {
            warn!(%key, ledger = %ledger_quantity, balance = %balance_quantity, "stock balance drift");
        }
        Ok(reconciliation)
    }

    /// Current position; a zero row if nothing was ever recorded.
    pub fn get_stock_level(
        &self,
        tenant_id: TenantId,
        warehouse_id: WarehouseId,
        product_id: ProductId,
    ) -> StockBalance {
        let key = StockKey::new(tenant_id, warehouse_id, product_id);
        self.balances
            .find(&key)
            .unwrap_or_else(|| StockBalance::empty(key, DateTime::<Utc>::UNIX_EPOCH))
    }

    /// Every balance row of a tenant ordered by key.
    pub fn balances(&self, tenant_id: TenantId) -> Vec<StockBalance> {
        let mut rows: Vec<StockBalance> = self
            .balances
            .snapshot()
            .into_iter()
            .filter(|(key, _)| key.tenant_id == tenant_id)
            .map(|(_, row)| row)
            .collect();
        rows.sort_by_key(StockBalance::key);
        rows
    }

    /// Batches of one key ordered by id.
    pub fn batches(
        &self,
        tenant_id: TenantId,
        warehouse_id: WarehouseId,
        product_id: ProductId,
    ) -> LedgerResult<Vec<Batch>> {
        self.key_batches(&StockKey::new(tenant_id, warehouse_id, product_id))
    }

    /// Quantity at or below which a deduction raises [`DomainEvent::LowStock`].
    pub fn set_reorder_point(
        &self,
        tenant_id: TenantId,
        warehouse_id: WarehouseId,
        product_id: ProductId,
        reorder_point: Amount,
    ) -> LedgerResult<()> {
        require_non_negative(reorder_point)?;
        self.reorder_points.insert(
            StockKey::new(tenant_id, warehouse_id, product_id),
            reorder_point,
        );
        Ok(())
    }

    fn receive(
        &self,
        tenant_id: TenantId,
        movement: StockMovement,
    ) -> LedgerResult<Outcome<Arc<StockLedgerEntry>>> {
        let key = StockKey::new(tenant_id, movement.warehouse_id, movement.product_id);
        if self.pharmaceutical_compliance
            && !movement
                .batch
                .as_ref()
                .is_some_and(BatchDetails::has_compliance_fields)
        {
            let label = movement
                .batch
                .as_ref()
                .map_or_else(|| key.to_string(), |details| details.batch_number.clone());
            return Err(LedgerError::ComplianceFieldsMissing(label));
        }

        let slot = self.balances.slot(&key);
        let mut balance = slot.lock(self.lock_timeout)?;
        let current = balance
            .current()
            .cloned()
            .unwrap_or_else(|| StockBalance::empty(key, movement.occurred_at));
        let next = StockBalance {
            quantity_on_hand: current.quantity_on_hand.checked_add(movement.quantity)?,
            average_cost: weighted_average_cost(
                current.quantity_on_hand,
                current.average_cost,
                movement.quantity,
                movement.unit_cost,
            )?,
            updated_at: movement.occurred_at,
            ..current
        };

        let existing = movement
            .batch
            .as_ref()
            .and_then(|details| self.batch_by_number(&key, &details.batch_number));
        let mut existing_guard = match &existing {
            Some((id, cell)) => Some(self.lock_batch(cell, *id)?),
            None => None,
        };
        let batch = match existing_guard.as_deref() {
            Some(batch) => topped_up(batch, &movement)?,
            None => self.new_batch(key, &movement),
        };

        let entry = self.store.append_stock(StockLedgerEntry {
            id: self.store.next_stock_entry_id(),
            tenant_id,
            product_id: movement.product_id,
            variant_id: movement.variant_id,
            warehouse_id: movement.warehouse_id,
            batch_id: Some(batch.id),
            batch_number: batch.batch_number.clone(),
            kind: movement.kind,
            quantity: movement.quantity,
            unit_cost: movement.unit_cost,
            uom: movement.uom,
            reference: movement.reference,
            created_at: movement.occurred_at,
        })?;
        match existing_guard.as_mut() {
            Some(guard) => **guard = batch,
            None => self.insert_batch(batch),
        }
        balance.save(next)?;
        drop(existing_guard);
        drop(balance);

        info!(%key, quantity = %movement.quantity, kind = %movement.kind, "stock received");
        let event = DomainEvent::StockReceived {
            tenant_id,
            warehouse_id: movement.warehouse_id,
            product_id: movement.product_id,
            quantity: movement.quantity,
            batch_number: entry.batch_number.clone(),
        };
        Ok(Outcome::new(entry, vec![event]))
    }

    fn issue(
        &self,
        tenant_id: TenantId,
        movement: StockMovement,
    ) -> LedgerResult<Outcome<Arc<StockLedgerEntry>>> {
        let key = StockKey::new(tenant_id, movement.warehouse_id, movement.product_id);
        let batch_number = movement
            .batch
            .as_ref()
            .map(|details| details.batch_number.clone())
            .ok_or(LedgerError::BatchRequired)?;

        let slot = self.balances.slot(&key);
        let mut balance = slot.lock(self.lock_timeout)?;
        let (batch_id, cell) = self
            .batch_by_number(&key, &batch_number)
            .ok_or_else(|| LedgerError::BatchNotFound(batch_number.clone()))?;
        let mut batch = self.lock_batch(&cell, batch_id)?;
        if self.pharmaceutical_compliance && !batch.has_compliance_fields() {
            return Err(LedgerError::ComplianceFieldsMissing(batch.label()));
        }
        if batch.quantity_available < movement.quantity {
            warn!(%key, batch = %batch_number, requested = %movement.quantity, "over-deduction rejected");
            return Err(LedgerError::InsufficientStock {
                requested: movement.quantity,
                available: batch.quantity_available,
            });
        }

        let current = balance
            .current()
            .cloned()
            .unwrap_or_else(|| StockBalance::empty(key, movement.occurred_at));
        let next = after_outflow(&current, movement.quantity, movement.occurred_at)?;

        let entry = self.store.append_stock(StockLedgerEntry {
            id: self.store.next_stock_entry_id(),
            tenant_id,
            product_id: movement.product_id,
            variant_id: movement.variant_id,
            warehouse_id: movement.warehouse_id,
            batch_id: Some(batch_id),
            batch_number: Some(batch_number),
            kind: movement.kind,
            quantity: movement.quantity,
            unit_cost: cost_of(&batch, movement.unit_cost),
            uom: movement.uom,
            reference: movement.reference,
            created_at: movement.occurred_at,
        })?;
        batch.quantity_on_hand -= movement.quantity;
        batch.quantity_available -= movement.quantity;
        let on_hand = next.quantity_on_hand;
        balance.save(next)?;
        drop(batch);
        drop(balance);

        info!(%key, quantity = %movement.quantity, kind = %movement.kind, "stock issued");
        let mut events = vec![DomainEvent::StockDeducted {
            tenant_id,
            warehouse_id: movement.warehouse_id,
            product_id: movement.product_id,
            quantity: movement.quantity,
            batches: 1,
        }];
        events.extend(self.low_stock_event(key, on_hand));
        Ok(Outcome::new(entry, events))
    }

    fn effective_strategy(&self, requested: CostingStrategy) -> CostingStrategy {
        match requested {
            CostingStrategy::Fifo | CostingStrategy::Lifo if self.pharmaceutical_compliance => {
                debug!(?requested, "pharmaceutical compliance forces FEFO");
                CostingStrategy::Fefo
            }
            other => other,
        }
    }

    fn new_batch(&self, key: StockKey, movement: &StockMovement) -> Batch {
        let details = movement.batch.clone().unwrap_or_default();
        Batch {
            id: BatchId(self.next_batch_id.fetch_add(1, Ordering::Relaxed)),
            tenant_id: key.tenant_id,
            product_id: key.product_id,
            warehouse_id: key.warehouse_id,
            batch_number: movement.batch.as_ref().map(|_| details.batch_number),
            lot_number: details.lot_number,
            serial_number: details.serial_number,
            expiry_date: details.expiry_date,
            quantity_on_hand: movement.quantity,
            quantity_available: movement.quantity,
            cost_price: movement.unit_cost,
            created_at: movement.occurred_at,
        }
    }

    fn insert_batch(&self, batch: Batch) {
        let key = batch.key();
        if let Some(number) = &batch.batch_number {
            self.batch_numbers.insert((key, number.clone()), batch.id);
        }
        self.batch_index.entry(key).or_default().push(batch.id);
        self.batches.insert(batch.id, Arc::new(Mutex::new(batch)));
    }

    fn batch_cell(&self, batch_id: BatchId) -> Option<BatchCell> {
        self.batches
            .get(&batch_id)
            .map(|cell| Arc::clone(cell.value()))
    }

    fn batch_by_number(&self, key: &StockKey, batch_number: &str) -> Option<(BatchId, BatchCell)> {
        let id = *self.batch_numbers.get(&(*key, batch_number.to_string()))?;
        self.batch_cell(id).map(|cell| (id, cell))
    }

    fn lock_batch<'a>(&self, cell: &'a BatchCell, batch_id: BatchId) -> LedgerResult<MutexGuard<'a, Batch>> {
        cell.try_lock_for(self.lock_timeout).ok_or_else(|| {
            warn!(%batch_id, "batch lock timed out");
            LedgerError::LockTimeout(format!("batch {batch_id}"))
        })
    }

    /// Copies of a key's batches, ordered by id. Each batch is locked only
    /// while it is copied.
    fn key_batches(&self, key: &StockKey) -> LedgerResult<Vec<Batch>> {
        let ids: Vec<BatchId> = self
            .batch_index
            .get(key)
            .map(|ids| ids.value().clone())
            .unwrap_or_default();
        let mut batches = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(cell) = self.batch_cell(id) {
                batches.push(self.lock_batch(&cell, id)?.clone());
            }
        }
        batches.sort_by_key(|batch| batch.id);
        Ok(batches)
    }

    fn low_stock_event(&self, key: StockKey, on_hand: Amount) -> Option<DomainEvent> {
        let reorder_point = *self.reorder_points.get(&key)?;
        if on_hand > reorder_point {
            return None;
        }
        info!(%key, %on_hand, %reorder_point, "stock at or below reorder point");
        Some(DomainEvent::LowStock {
            tenant_id: key.tenant_id,
            warehouse_id: key.warehouse_id,
            product_id: key.product_id,
            quantity_on_hand: on_hand,
            reorder_point,
        })
    }
}

fn require_positive(quantity: Amount) -> LedgerResult<()> {
    if quantity.is_positive() {
        Ok(())
    } else {
        Err(LedgerError::InvalidAmount(quantity))
    }
}

fn require_non_negative(amount: Amount) -> LedgerResult<()> {
    if amount.is_negative() {
        Err(LedgerError::InvalidAmount(amount))
    } else {
        Ok(())
    }
}

/// Batch cost price, or `fallback` for a batch received at zero cost.
fn cost_of(batch: &Batch, fallback: Amount) -> Amount {
    if batch.cost_price.is_zero() {
        fallback
    } else {
        batch.cost_price
    }
}

/// `batch` after an inbound `movement` naming it.
///
/// Lot, serial and expiry the stored batch lacks are taken from the movement;
/// a value that disagrees with the stored one fails
/// [`LedgerError::BatchMismatch`].
fn topped_up(batch: &Batch, movement: &StockMovement) -> LedgerResult<Batch> {
    let details = movement.batch.as_ref();
    let lot_number = merged_detail(
        batch,
        "lot number",
        &batch.lot_number,
        details.and_then(|d| d.lot_number.as_ref()),
    )?;
    let serial_number = merged_detail(
        batch,
        "serial number",
        &batch.serial_number,
        details.and_then(|d| d.serial_number.as_ref()),
    )?;
    let expiry_date = merged_detail(
        batch,
        "expiry date",
        &batch.expiry_date,
        details.and_then(|d| d.expiry_date.as_ref()),
    )?;

    Ok(Batch {
        lot_number,
        serial_number,
        expiry_date,
        quantity_on_hand: batch.quantity_on_hand.checked_add(movement.quantity)?,
        quantity_available: batch.quantity_available.checked_add(movement.quantity)?,
        cost_price: weighted_average_cost(
            batch.quantity_on_hand,
            batch.cost_price,
            movement.quantity,
            movement.unit_cost,
        )?,
        ..batch.clone()
    })
}

fn merged_detail<T: Clone + PartialEq>(
    batch: &Batch,
    field: &'static str,
    stored: &Option<T>,
    supplied: Option<&T>,
) -> LedgerResult<Option<T>> {
    match (stored, supplied) {
        (Some(stored), Some(supplied)) if stored != supplied => {
            warn!(batch = %batch.label(), field, "top-up conflicts with stored batch");
            Err(LedgerError::BatchMismatch {
                batch: batch.label(),
                field,
            })
        }
        (Some(stored), _) => Ok(Some(stored.clone())),
        (None, supplied) => {
            if supplied.is_some() {
                debug!(batch = %batch.label(), field, "batch detail filled in by top-up");
            }
            Ok(supplied.cloned())
        }
    }
}

/// Balance after `quantity` leaves stock. Reservations shrink with the stock
/// they were held against.
fn after_outflow(
    current: &StockBalance,
    quantity: Amount,
    at: DateTime<Utc>,
) -> LedgerResult<StockBalance> {
    let quantity_on_hand = current.quantity_on_hand.checked_sub(quantity)?;
    let quantity_reserved = current.quantity_reserved.min(quantity_on_hand.max(Amount::ZERO));
    if quantity_reserved < current.quantity_reserved {
        warn!(
            key = %current.key(),
            reserved = %current.quantity_reserved,
            remaining = %quantity_reserved,
            "deduction consumed reserved stock"
        );
    }
    StockBalance::try_new(
        current.key(),
        quantity_on_hand,
        quantity_reserved,
        current.average_cost,
        at,
    )
}

fn expiry_order(a: Option<NaiveDate>, b: Option<NaiveDate>) -> CmpOrdering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => CmpOrdering::Less,
        (None, Some(_)) => CmpOrdering::Greater,
        (None, None) => CmpOrdering::Equal,
    }
}

/// Orders candidates for consumption; ties go to the lower batch id.
fn sort_candidates(batches: &mut [Batch], strategy: CostingStrategy) {
    match strategy {
        CostingStrategy::Fifo => {
            batches.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        }
        CostingStrategy::Lifo => {
            batches.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        }
        CostingStrategy::Fefo => {
            batches.sort_by(|a, b| expiry_order(a.expiry_date, b.expiry_date).then(a.id.cmp(&b.id)));
        }
        CostingStrategy::Manual => batches.sort_by_key(|batch| batch.id),
    }
}

/// Takes `min(remaining, available)` from each batch in order.
fn plan_deduction(candidates: Vec<Batch>, quantity: Amount) -> LedgerResult<Vec<(Batch, Amount)>> {
    let mut remaining = quantity;
    let mut plan = Vec::new();
    for batch in candidates {
        if remaining.is_zero() {
            break;
        }
        let take = remaining.min(batch.quantity_available);
        remaining -= take;
        plan.push((batch, take));
    }
    if remaining.is_positive() {
        return Err(LedgerError::InsufficientStock {
            requested: quantity,
            available: quantity - remaining,
        });
    }
    Ok(plan)
}
