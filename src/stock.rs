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

//! Stock domain types.
//!
//! Movement kinds have a fixed direction:
//!
//! | Kind | Direction |
//! |------|-----------|
//! | Purchase, Return, AdjustmentIn, TransferIn, Opening | inbound |
//! | Shipment, AdjustmentOut, TransferOut, Consumption | outbound |
//!
//! A [`StockLedgerEntry`] is never updated once appended; the
//! [`StockBalance`] for its (tenant, warehouse, product) is the running sum of
//! [`StockLedgerEntry::signed_quantity`] over every entry for that key.

use crate::balance::Balance;
use crate::base::{
    BatchId, ProductId, Reference, StockEntryId, TenantId, VariantId, WarehouseId,
};
use crate::decimal::{Amount, mul_internal};
use crate::error::{LedgerError, LedgerResult};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Unit of measure used when a movement does not name one.
pub const DEFAULT_UOM: &str = "unit";

/// Balance key: one row per tenant, warehouse and product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StockKey {
    pub tenant_id: TenantId,
    pub warehouse_id: WarehouseId,
    pub product_id: ProductId,
}

impl StockKey {
    pub fn new(tenant_id: TenantId, warehouse_id: WarehouseId, product_id: ProductId) -> Self {
        Self {
            tenant_id,
            warehouse_id,
            product_id,
        }
    }
}

impl fmt::Display for StockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "stock {}/{}/{}",
            self.tenant_id, self.warehouse_id, self.product_id
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockMovementKind {
    Purchase,
    Return,
    AdjustmentIn,
    TransferIn,
    Opening,
    Shipment,
    AdjustmentOut,
    TransferOut,
    Consumption,
}

impl StockMovementKind {
    pub fn is_inbound(self) -> bool {
        matches!(
            self,
            Self::Purchase | Self::Return | Self::AdjustmentIn | Self::TransferIn | Self::Opening
        )
    }

    /// Outbound kinds that count toward cost of goods sold.
    pub fn counts_as_cogs(self) -> bool {
        matches!(self, Self::Shipment | Self::AdjustmentOut)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Purchase => "purchase",
            Self::Return => "return",
            Self::AdjustmentIn => "adjustment_in",
            Self::TransferIn => "transfer_in",
            Self::Opening => "opening",
            Self::Shipment => "shipment",
            Self::AdjustmentOut => "adjustment_out",
            Self::TransferOut => "transfer_out",
            Self::Consumption => "consumption",
        }
    }
}

impl FromStr for StockMovementKind {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "purchase" => Ok(Self::Purchase),
            "return" => Ok(Self::Return),
            "adjustment_in" => Ok(Self::AdjustmentIn),
            "transfer_in" => Ok(Self::TransferIn),
            "opening" => Ok(Self::Opening),
            "shipment" => Ok(Self::Shipment),
            "adjustment_out" => Ok(Self::AdjustmentOut),
            "transfer_out" => Ok(Self::TransferOut),
            "consumption" => Ok(Self::Consumption),
            other => Err(LedgerError::InvalidMovementKind(other.to_string())),
        }
    }
}

impl fmt::Display for StockMovementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Batch selection order for multi-batch deductions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostingStrategy {
    /// Oldest batch first.
    #[default]
    Fifo,
    /// Newest batch first.
    Lifo,
    /// Earliest expiry first, batches without expiry last.
    Fefo,
    /// Exactly the named batch.
    Manual,
}

impl FromStr for CostingStrategy {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fifo" => Ok(Self::Fifo),
            "lifo" => Ok(Self::Lifo),
            "fefo" => Ok(Self::Fefo),
            "manual" => Ok(Self::Manual),
            other => Err(LedgerError::InvalidStrategy(other.to_string())),
        }
    }
}

/// Immutable stock movement row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLedgerEntry {
    pub id: StockEntryId,
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub warehouse_id: WarehouseId,
    pub batch_id: Option<BatchId>,
    pub batch_number: Option<String>,
    pub kind: StockMovementKind,
    /// Always positive; direction comes from `kind`.
    pub quantity: Amount,
    pub unit_cost: Amount,
    pub uom: String,
    pub reference: Option<Reference>,
    pub created_at: DateTime<Utc>,
}

impl StockLedgerEntry {
    pub fn key(&self) -> StockKey {
        StockKey::new(self.tenant_id, self.warehouse_id, self.product_id)
    }

    pub fn signed_quantity(&self) -> Amount {
        if self.kind.is_inbound() {
            self.quantity
        } else {
            -self.quantity
        }
    }

    /// `quantity * unit_cost` at [`Amount::INTERNAL_SCALE`].
    pub fn total_cost(&self) -> LedgerResult<Decimal> {
        mul_internal(self.quantity.as_decimal(), self.unit_cost.as_decimal())
    }
}

/// Batch/lot attributes supplied with a receipt, or naming the batch an
/// outbound movement draws from.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BatchDetails {
    pub batch_number: String,
    pub lot_number: Option<String>,
    pub serial_number: Option<String>,
    pub expiry_date: Option<NaiveDate>,
}

impl BatchDetails {
    pub fn new(batch_number: impl Into<String>) -> Self {
        Self {
            batch_number: batch_number.into(),
            ..Self::default()
        }
    }

    pub fn lot(mut self, lot_number: impl Into<String>) -> Self {
        self.lot_number = Some(lot_number.into());
        self
    }

    pub fn serial(mut self, serial_number: impl Into<String>) -> Self {
        self.serial_number = Some(serial_number.into());
        self
    }

    pub fn expires(mut self, expiry_date: NaiveDate) -> Self {
        self.expiry_date = Some(expiry_date);
        self
    }

    pub fn has_compliance_fields(&self) -> bool {
        self.lot_number.is_some() && self.expiry_date.is_some()
    }
}

/// The unit a deduction draws from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub id: BatchId,
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub batch_number: Option<String>,
    pub lot_number: Option<String>,
    pub serial_number: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub quantity_on_hand: Amount,
    pub quantity_available: Amount,
    pub cost_price: Amount,
    /// Receipt time; drives FIFO/LIFO order.
    pub created_at: DateTime<Utc>,
}

impl Batch {
    pub fn key(&self) -> StockKey {
        StockKey::new(self.tenant_id, self.warehouse_id, self.product_id)
    }

    pub fn has_compliance_fields(&self) -> bool {
        self.lot_number.is_some() && self.expiry_date.is_some()
    }

    /// Batch number, or the id for anonymous batches.
    pub fn label(&self) -> String {
        match &self.batch_number {
            Some(number) => number.clone(),
            None => format!("batch {}", self.id),
        }
    }
}

/// Materialized stock position for one [`StockKey`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockBalance {
    pub tenant_id: TenantId,
    pub warehouse_id: WarehouseId,
    pub product_id: ProductId,
    pub quantity_on_hand: Amount,
    pub quantity_reserved: Amount,
    pub average_cost: Amount,
    pub updated_at: DateTime<Utc>,
}

impl StockBalance {
    /// Builds a balance row, rejecting negative quantities.
    ///
    /// # Errors
    ///
    /// [`LedgerError::NegativeBalance`] naming the offending field.
    pub fn try_new(
        key: StockKey,
        quantity_on_hand: Amount,
        quantity_reserved: Amount,
        average_cost: Amount,
        updated_at: DateTime<Utc>,
    ) -> LedgerResult<Self> {
        let balance = Self {
            tenant_id: key.tenant_id,
            warehouse_id: key.warehouse_id,
            product_id: key.product_id,
            quantity_on_hand,
            quantity_reserved,
            average_cost,
            updated_at,
        };
        balance.validate()?;
        Ok(balance)
    }

    /// Zero position, used before the first movement for a key.
    pub fn empty(key: StockKey, updated_at: DateTime<Utc>) -> Self {
        Self {
            tenant_id: key.tenant_id,
            warehouse_id: key.warehouse_id,
            product_id: key.product_id,
            quantity_on_hand: Amount::ZERO,
            quantity_reserved: Amount::ZERO,
            average_cost: Amount::ZERO,
            updated_at,
        }
    }

    pub fn key(&self) -> StockKey {
        StockKey::new(self.tenant_id, self.warehouse_id, self.product_id)
    }

    /// `quantity_on_hand - quantity_reserved`.
    pub fn available(&self) -> Amount {
        self.quantity_on_hand - self.quantity_reserved
    }

    /// `quantity_on_hand * average_cost`.
    pub fn value(&self) -> LedgerResult<Amount> {
        self.quantity_on_hand.checked_mul(self.average_cost)
    }
}

impl Balance for StockBalance {
    fn validate(&self) -> LedgerResult<()> {
        if self.quantity_on_hand.is_negative() {
            return Err(LedgerError::NegativeBalance("quantity_on_hand"));
        }
        if self.quantity_reserved.is_negative() {
            return Err(LedgerError::NegativeBalance("quantity_reserved"));
        }
        Ok(())
    }
}
