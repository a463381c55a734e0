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

//! Valuation and analytics over engine state.

use chrono::{DateTime, Duration, TimeZone, Utc};
use erp_ledger::{
    AbcCategory, Amount, CostingStrategy, DeductionRequest, Engine, LedgerConfig, LedgerError,
    ProductId, StockMovement, StockMovementKind, TenantId, WarehouseId,
};
use rust_decimal_macros::dec;

const TENANT: TenantId = TenantId(7);

fn as_of() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 30, 0, 0, 0).unwrap()
}

fn receive(engine: &Engine, warehouse: u64, product: u64, quantity: i64, cost: i64, days_ago: i64) {
    engine
        .record_stock_transaction(
            TENANT,
            StockMovement::new(
                StockMovementKind::Purchase,
                WarehouseId(warehouse),
                ProductId(product),
                Amount::from(quantity),
                Amount::from(cost),
            )
            .at(as_of() - Duration::days(days_ago)),
        )
        .unwrap();
}

fn ship(engine: &Engine, kind: StockMovementKind, warehouse: u64, product: u64, quantity: i64, days_ago: i64) {
    engine
        .deduct_stock(
            TENANT,
            DeductionRequest::new(
                WarehouseId(warehouse),
                ProductId(product),
                Amount::from(quantity),
                CostingStrategy::Fifo,
            )
            .kind(kind)
            .at(as_of() - Duration::days(days_ago)),
        )
        .unwrap();
}

/// Four products in one warehouse worth 50/30/15/5 percent of the total.
fn shares_engine() -> Engine {
    let engine = Engine::default();
    receive(&engine, 1, 4, 5, 1, 90);
    receive(&engine, 1, 1, 50, 1, 90);
    receive(&engine, 1, 3, 15, 1, 90);
    receive(&engine, 1, 2, 30, 1, 90);
    engine
}

#[test]
fn valuation_report_totals() {
    let engine = shares_engine();
    receive(&engine, 2, 1, 10, 3, 10);

    let report = engine.get_valuation_report(TENANT, None).unwrap();
    assert_eq!(report.items.len(), 5);
    assert_eq!(report.grand_total_value, Amount::from(130));
    let first = &report.items[0];
    assert_eq!((first.product_id, first.warehouse_id), (ProductId(1), WarehouseId(1)));

    let second_warehouse = engine.get_valuation_report(TENANT, Some(WarehouseId(2))).unwrap();
    assert_eq!(second_warehouse.items.len(), 1);
    assert_eq!(second_warehouse.grand_total_value, Amount::from(30));
}

#[test]
fn abc_categories_follow_cumulative_share() {
    let engine = shares_engine();
    let items = engine.get_abc_analysis(TENANT, None).unwrap();

    let categories: Vec<(ProductId, AbcCategory)> = items
        .iter()
        .map(|item| (item.product_id, item.category))
        .collect();
    assert_eq!(
        categories,
        vec![
            (ProductId(1), AbcCategory::A),
            (ProductId(2), AbcCategory::A),
            (ProductId(3), AbcCategory::B),
            (ProductId(4), AbcCategory::C),
        ]
    );
    let cumulative: Vec<Amount> = items.iter().map(|item| item.cumulative_percent).collect();
    assert_eq!(
        cumulative,
        vec![Amount::from(50), Amount::from(80), Amount::from(95), Amount::from(100)]
    );
}

#[test]
fn abc_thresholds_come_from_config() {
    let engine = Engine::new(LedgerConfig {
        abc_a_threshold: dec!(50),
        abc_b_threshold: dec!(80),
        ..LedgerConfig::default()
    });
    receive(&engine, 1, 1, 50, 1, 1);
    receive(&engine, 1, 2, 30, 1, 1);
    receive(&engine, 1, 3, 20, 1, 1);

    let categories: Vec<AbcCategory> = engine
        .get_abc_analysis(TENANT, None)
        .unwrap()
        .iter()
        .map(|item| item.category)
        .collect();
    assert_eq!(categories, vec![AbcCategory::A, AbcCategory::B, AbcCategory::C]);
}

#[test]
fn turnover_uses_cogs_within_period() {
    let engine = Engine::default();
    receive(&engine, 1, 1, 300, 2, 60);
    ship(&engine, StockMovementKind::Shipment, 1, 1, 100, 45);
    ship(&engine, StockMovementKind::Shipment, 1, 1, 50, 20);
    ship(&engine, StockMovementKind::AdjustmentOut, 1, 1, 25, 5);
    ship(&engine, StockMovementKind::TransferOut, 1, 1, 25, 5);

    let items = engine.get_turnover_rate(TENANT, None, 30, as_of()).unwrap();
    assert_eq!(items.len(), 1);
    let item = &items[0];
    // (50 + 25) * 2 against 100 * 2 on hand.
    assert_eq!(item.cost_of_goods_sold, Amount::from(150));
    assert_eq!(item.inventory_value, Amount::from(200));
    assert_eq!(item.turnover_rate, Some(Amount::new(dec!(0.75))));
    assert_eq!(item.days_in_stock, Some(Amount::from(40)));

    // A longer window picks up the older shipment.
    let items = engine.get_turnover_rate(TENANT, None, 60, as_of()).unwrap();
    assert_eq!(items[0].cost_of_goods_sold, Amount::from(350));
}

#[test]
fn turnover_without_stock_value_has_no_rate() {
    let engine = Engine::default();
    receive(&engine, 1, 1, 10, 5, 10);
    ship(&engine, StockMovementKind::Shipment, 1, 1, 10, 1);

    let items = engine.get_turnover_rate(TENANT, None, 30, as_of()).unwrap();
    assert_eq!(items[0].cost_of_goods_sold, Amount::from(50));
    assert_eq!(items[0].turnover_rate, None);
    assert_eq!(items[0].annualized_turnover_rate, None);
    assert_eq!(items[0].days_in_stock, None);
}

#[test]
fn zero_day_period_is_rejected() {
    let engine = shares_engine();
    assert_eq!(
        engine.get_turnover_rate(TENANT, None, 0, as_of()),
        Err(LedgerError::InvalidPeriod)
    );
    assert_eq!(
        engine.get_demand_forecast(TENANT, None, 0, as_of()),
        Err(LedgerError::InvalidPeriod)
    );
    assert_eq!(
        engine.get_carrying_cost(TENANT, None, 0, None).map(|report| report.items.len()),
        Err(LedgerError::InvalidPeriod)
    );
}

#[test]
fn demand_forecast_counts_every_outflow() {
    let engine = Engine::default();
    receive(&engine, 1, 1, 1000, 1, 40);
    ship(&engine, StockMovementKind::Shipment, 1, 1, 100, 10);
    ship(&engine, StockMovementKind::Consumption, 1, 1, 50, 3);
    ship(&engine, StockMovementKind::TransferOut, 1, 1, 50, 1);
    ship(&engine, StockMovementKind::Shipment, 1, 1, 400, 35);

    let forecast = engine.get_demand_forecast(TENANT, None, 20, as_of()).unwrap();
    assert_eq!(forecast[0].total_outflow, Amount::from(200));
    assert_eq!(forecast[0].average_daily_outflow, Amount::from(10));
    assert_eq!(forecast[0].forecast_30_days, Amount::from(300));
}

#[test]
fn carrying_cost_report() {
    let engine = shares_engine();
    // 100 * 0.25 / 365 * 73 = 5
    let report = engine.get_carrying_cost(TENANT, None, 73, None).unwrap();
    assert_eq!(report.total_carrying_cost, Amount::from(5));
    assert_eq!(report.carrying_rate, dec!(0.25));
    assert_eq!(report.items.len(), 4);
}

#[test]
fn reports_are_reproducible() {
    let engine = shares_engine();
    ship(&engine, StockMovementKind::Shipment, 1, 2, 10, 2);

    let render = || {
        serde_json::to_string(&(
            engine.get_valuation_report(TENANT, None).unwrap(),
            engine.get_abc_analysis(TENANT, None).unwrap(),
            engine.get_turnover_rate(TENANT, None, 30, as_of()).unwrap(),
            engine.get_carrying_cost(TENANT, None, 30, None).unwrap(),
            engine.get_demand_forecast(TENANT, None, 30, as_of()).unwrap(),
        ))
        .unwrap()
    };
    assert_eq!(render(), render());
}
