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

//! Inventory valuation and analytics.
//!
//! Pure functions over a snapshot of stock balances and ledger entries. They
//! never mutate anything, and rows come back in a fixed order (by product,
//! then warehouse, unless a report defines its own ranking), so the same
//! inputs always produce the same report.

use crate::base::{ProductId, WarehouseId};
use crate::decimal::{Amount, div_internal, mul_internal};
use crate::error::{LedgerError, LedgerResult};
use crate::stock::{StockBalance, StockKey, StockLedgerEntry};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

const DAYS_PER_YEAR: Decimal = dec!(365);
const FORECAST_DAYS: Decimal = dec!(30);
const HUNDRED: Decimal = dec!(100);

/// Reporting window ending at `as_of` and spanning `days` days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Period {
    pub as_of: DateTime<Utc>,
    pub days: u32,
}

impl Period {
    /// # Errors
    ///
    /// [`LedgerError::InvalidPeriod`] for a zero-day period.
    pub fn new(as_of: DateTime<Utc>, days: u32) -> LedgerResult<Self> {
        if days == 0 {
            return Err(LedgerError::InvalidPeriod);
        }
        Ok(Self { as_of, days })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.as_of - Duration::days(i64::from(self.days))
    }

    /// `start <= at <= as_of`.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start() <= at && at <= self.as_of
    }

    fn days_decimal(&self) -> Decimal {
        Decimal::from(self.days)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValuationItem {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub quantity_on_hand: Amount,
    pub average_cost: Amount,
    pub total_value: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValuationReport {
    pub items: Vec<ValuationItem>,
    pub grand_total_value: Amount,
}

/// `quantity_on_hand * average_cost` per (product, warehouse).
pub fn valuation(
    balances: &[StockBalance],
    warehouse: Option<WarehouseId>,
) -> LedgerResult<ValuationReport> {
    let mut items = Vec::new();
    for balance in in_scope(balances, warehouse) {
        items.push(ValuationItem {
            product_id: balance.product_id,
            warehouse_id: balance.warehouse_id,
            quantity_on_hand: balance.quantity_on_hand,
            average_cost: balance.average_cost,
            total_value: balance.value()?,
        });
    }
    let grand_total_value = items.iter().map(|item| item.total_value).sum();
    Ok(ValuationReport {
        items,
        grand_total_value,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum AbcCategory {
    A,
    B,
    C,
}

impl AbcCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
        }
    }
}

/// Cumulative value shares (percent) closing classes A and B.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbcThresholds {
    pub a: Decimal,
    pub b: Decimal,
}

impl Default for AbcThresholds {
    fn default() -> Self {
        Self {
            a: dec!(80),
            b: dec!(95),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AbcItem {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub total_value: Amount,
    /// This row's share of the grand total, in percent.
    pub value_percent: Amount,
    /// Share of this row and every higher-ranked row, in percent.
    pub cumulative_percent: Amount,
    pub category: AbcCategory,
}

/// Ranks rows by value, highest first, and classifies them by cumulative
/// share: A while at or under `thresholds.a`, B while at or under
/// `thresholds.b`, C after that. Equal values keep their report order.
///
/// With a zero grand total every row is C.
pub fn abc_analysis(report: &ValuationReport, thresholds: AbcThresholds) -> LedgerResult<Vec<AbcItem>> {
    let mut ranked: Vec<&ValuationItem> = report.items.iter().collect();
    ranked.sort_by(|a, b| b.total_value.cmp(&a.total_value));

    let grand_total = report.grand_total_value.as_decimal();
    let mut cumulative = Decimal::ZERO;
    let mut items = Vec::with_capacity(ranked.len());
    for item in ranked {
        let (share, cumulative_share) = if grand_total.is_zero() {
            (Decimal::ZERO, None)
        } else {
            cumulative = cumulative
                .checked_add(item.total_value.as_decimal())
                .ok_or(LedgerError::Overflow)?;
            (
                percent_of(item.total_value.as_decimal(), grand_total)?,
                Some(percent_of(cumulative, grand_total)?),
            )
        };
        let category = match cumulative_share {
            Some(share) if share <= thresholds.a => AbcCategory::A,
            Some(share) if share <= thresholds.b => AbcCategory::B,
            _ => AbcCategory::C,
        };
        items.push(AbcItem {
            product_id: item.product_id,
            warehouse_id: item.warehouse_id,
            total_value: item.total_value,
            value_percent: Amount::new(share),
            cumulative_percent: Amount::new(cumulative_share.unwrap_or(Decimal::ZERO)),
            category,
        });
    }
    Ok(items)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TurnoverItem {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub cost_of_goods_sold: Amount,
    pub inventory_value: Amount,
    /// `None` when there is no inventory value to turn over.
    pub turnover_rate: Option<Amount>,
    pub annualized_turnover_rate: Option<Amount>,
    /// `None` when the turnover rate is absent or zero.
    pub days_in_stock: Option<Amount>,
}

/// `COGS / current inventory value` per (product, warehouse).
///
/// COGS is the total cost of shipment and adjustment-out entries inside the
/// period.
pub fn turnover(
    balances: &[StockBalance],
    entries: &[Arc<StockLedgerEntry>],
    warehouse: Option<WarehouseId>,
    period: Period,
) -> LedgerResult<Vec<TurnoverItem>> {
    let mut cogs: BTreeMap<StockKey, Decimal> = BTreeMap::new();
    for entry in entries
        .iter()
        .filter(|entry| entry.kind.counts_as_cogs() && period.contains(entry.created_at))
    {
        let cost = entry.total_cost()?;
        let total = cogs.entry(entry.key()).or_insert(Decimal::ZERO);
        *total = total.checked_add(cost).ok_or(LedgerError::Overflow)?;
    }

    let mut items = Vec::new();
    for balance in in_scope(balances, warehouse) {
        let cost_of_goods_sold = cogs.get(&balance.key()).copied().unwrap_or(Decimal::ZERO);
        let inventory_value = mul_internal(
            balance.quantity_on_hand.as_decimal(),
            balance.average_cost.as_decimal(),
        )?;

        let rate = if inventory_value.is_zero() {
            None
        } else {
            Some(div_internal(cost_of_goods_sold, inventory_value)?)
        };
        let annualized = rate
            .map(|rate| div_internal(mul_internal(rate, DAYS_PER_YEAR)?, period.days_decimal()))
            .transpose()?;
        let days_in_stock = match rate {
            Some(rate) if !rate.is_zero() => Some(div_internal(period.days_decimal(), rate)?),
            _ => None,
        };

        items.push(TurnoverItem {
            product_id: balance.product_id,
            warehouse_id: balance.warehouse_id,
            cost_of_goods_sold: Amount::new(cost_of_goods_sold),
            inventory_value: Amount::new(inventory_value),
            turnover_rate: rate.map(Amount::new),
            annualized_turnover_rate: annualized.map(Amount::new),
            days_in_stock: days_in_stock.map(Amount::new),
        });
    }
    Ok(items)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CarryingCostItem {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub inventory_value: Amount,
    pub carrying_cost: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CarryingCostReport {
    pub items: Vec<CarryingCostItem>,
    pub total_carrying_cost: Amount,
    pub carrying_rate: Decimal,
    pub period_days: u32,
}

/// `quantity_on_hand * average_cost * carrying_rate / 365 * period_days`.
pub fn carrying_cost(
    balances: &[StockBalance],
    warehouse: Option<WarehouseId>,
    period_days: u32,
    carrying_rate: Decimal,
) -> LedgerResult<CarryingCostReport> {
    if period_days == 0 {
        return Err(LedgerError::InvalidPeriod);
    }
    let days = Decimal::from(period_days);

    let mut items = Vec::new();
    for balance in in_scope(balances, warehouse) {
        let value = mul_internal(
            balance.quantity_on_hand.as_decimal(),
            balance.average_cost.as_decimal(),
        )?;
        let annual = mul_internal(value, carrying_rate)?;
        let cost = div_internal(mul_internal(annual, days)?, DAYS_PER_YEAR)?;
        items.push(CarryingCostItem {
            product_id: balance.product_id,
            warehouse_id: balance.warehouse_id,
            inventory_value: Amount::new(value),
            carrying_cost: Amount::new(cost),
        });
    }
    let total_carrying_cost = items.iter().map(|item| item.carrying_cost).sum();
    Ok(CarryingCostReport {
        items,
        total_carrying_cost,
        carrying_rate,
        period_days,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DemandForecast {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    /// Outbound quantity inside the period.
    pub total_outflow: Amount,
    pub average_daily_outflow: Amount,
    pub forecast_30_days: Amount,
}

/// Average daily outflow over the period, projected over 30 days.
pub fn demand_forecast(
    balances: &[StockBalance],
    entries: &[Arc<StockLedgerEntry>],
    warehouse: Option<WarehouseId>,
    period: Period,
) -> LedgerResult<Vec<DemandForecast>> {
    let mut outflow: BTreeMap<StockKey, Amount> = BTreeMap::new();
    for entry in entries
        .iter()
        .filter(|entry| !entry.kind.is_inbound() && period.contains(entry.created_at))
    {
        *outflow.entry(entry.key()).or_insert(Amount::ZERO) += entry.quantity;
    }

    let mut forecasts = Vec::new();
    for balance in in_scope(balances, warehouse) {
        let total_outflow = outflow.get(&balance.key()).copied().unwrap_or(Amount::ZERO);
        let daily = div_internal(total_outflow.as_decimal(), period.days_decimal())?;
        forecasts.push(DemandForecast {
            product_id: balance.product_id,
            warehouse_id: balance.warehouse_id,
            total_outflow,
            average_daily_outflow: Amount::new(daily),
            forecast_30_days: Amount::new(mul_internal(daily, FORECAST_DAYS)?),
        });
    }
    Ok(forecasts)
}

/// Balances in the warehouse filter, ordered by (product, warehouse).
fn in_scope(balances: &[StockBalance], warehouse: Option<WarehouseId>) -> Vec<&StockBalance> {
    let mut rows: Vec<&StockBalance> = balances
        .iter()
        .filter(|balance| warehouse.is_none_or(|id| balance.warehouse_id == id))
        .collect();
    rows.sort_by_key(|balance| (balance.product_id, balance.warehouse_id));
    rows
}

fn percent_of(part: Decimal, total: Decimal) -> LedgerResult<Decimal> {
    div_internal(mul_internal(part, HUNDRED)?, total)
}
