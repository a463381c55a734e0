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

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use csv::{ReaderBuilder, Trim, Writer};
use erp_ledger::{
    AbcCategory, AccountId, AccountType, Amount, BatchDetails, CostingStrategy, DeductionRequest,
    Engine, EventDispatcher, JournalEntryLine, LedgerConfig, LedgerError, LedgerResult,
    NewJournalEntry, ProductId, StockMovement, StockMovementKind, TenantId, WarehouseId, telemetry,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process;
use tracing::{debug, error, info, warn};

/// ERP Ledger - Post journal and stock CSV files
///
/// Reads journal lines or stock movements from a CSV file and writes the
/// resulting trial balance or inventory valuation to stdout.
#[derive(Parser, Debug)]
#[command(name = "erp-ledger")]
#[command(about = "Double-entry journal and stock costing engine", long_about = None)]
struct Args {
    /// TOML configuration file, layered under `ERP_LEDGER__*` variables
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Post journal lines and print the trial balance
    ///
    /// Expected format: tenant,entry,account,debit,credit,description
    Journal {
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },
    /// Apply stock movements and print the valuation with ABC categories
    ///
    /// Expected format: tenant,kind,warehouse,product,quantity,unit_cost,batch,expiry,strategy
    Stock {
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Turnover window in days
        #[arg(long, default_value_t = 30)]
        period_days: u32,

        /// End of the turnover window (RFC 3339), defaults to now
        #[arg(long)]
        as_of: Option<DateTime<Utc>>,
    },
}

fn main() {
    let args = Args::parse();
    telemetry::init(args.json_logs);

    let config = match LedgerConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            process::exit(1);
        }
    };

    let engine = Engine::new(config);
    let dispatcher = EventDispatcher::new();

    let result = match &args.command {
        Command::Journal { input } => open(input)
            .and_then(|file| process_journal(&engine, &dispatcher, BufReader::new(file)))
            .and_then(|tenants| write_trial_balance(&engine, &tenants, std::io::stdout())),
        Command::Stock {
            input,
            period_days,
            as_of,
        } => open(input)
            .and_then(|file| process_stock(&engine, &dispatcher, BufReader::new(file)))
            .and_then(|tenants| {
                let report = StockReport {
                    period_days: *period_days,
                    as_of: as_of.unwrap_or_else(Utc::now),
                };
                write_valuation(&engine, &tenants, report, std::io::stdout())
            }),
    };

    if let Err(e) = result {
        error!(error = %e, "run failed");
        process::exit(1);
    }

    let events = dispatcher.drain();
    for event in &events {
        debug!(event = event.event_type(), tenant = %event.tenant_id(), "event");
    }
    info!(events = events.len(), "run complete");
}

fn open(path: &PathBuf) -> Result<File, csv::Error> {
    File::open(path).map_err(|e| {
        error!(path = %path.display(), error = %e, "cannot open input");
        csv::Error::from(e)
    })
}

fn csv_reader<R: Read>(reader: R) -> csv::Reader<R> {
    ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader)
}

/// Raw journal CSV record.
///
/// Fields: `tenant, entry, account, debit, credit, description`
#[derive(Debug, Deserialize)]
struct JournalRecord {
    tenant: u32,
    entry: u64,
    account: String,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    debit: Option<Decimal>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    credit: Option<Decimal>,
    #[serde(default)]
    description: Option<String>,
}

/// Consecutive rows sharing `(tenant, entry)`.
struct PendingEntry {
    tenant: TenantId,
    entry: u64,
    lines: Vec<JournalEntryLine>,
    rejected: bool,
}

/// Account type from the leading digit of a conventional account code.
fn account_type_for_code(code: &str) -> Option<AccountType> {
    match code.chars().next()? {
        '1' => Some(AccountType::Asset),
        '2' => Some(AccountType::Liability),
        '3' => Some(AccountType::Equity),
        '4' => Some(AccountType::Revenue),
        '5'..='9' => Some(AccountType::Expense),
        _ => None,
    }
}

/// Looks up an account by code, creating it on first use.
fn resolve_account(engine: &Engine, tenant: TenantId, code: &str) -> LedgerResult<AccountId> {
    if let Some(account) = engine.chart().find_by_code(tenant, code) {
        return Ok(account.id);
    }
    let account_type =
        account_type_for_code(code).ok_or_else(|| LedgerError::InvalidAccountCode(code.to_string()))?;
    let account = engine
        .chart()
        .create_account(tenant, code, code, account_type, None, false)?;
    debug!(%tenant, code, account_type = account_type.as_str(), "account created");
    Ok(account.id)
}

/// Process journal lines from a CSV reader.
///
/// Consecutive rows with the same `tenant` and `entry` form one journal
/// entry, posted once the next entry starts. `account` is an account code;
/// unknown codes are created with the type implied by their first digit.
/// An entry with any bad line, or one that fails to post, is skipped.
///
/// # CSV Format
///
/// ```csv
/// tenant,entry,account,debit,credit,description
/// 1,1,1000,1000.00,,cash sale
/// 1,1,4000,,1000.00,cash sale
/// ```
///
/// Returns the tenants seen, in order.
///
/// # Errors
///
/// Returns a CSV error only if the reader itself fails.
pub fn process_journal<R: Read>(
    engine: &Engine,
    dispatcher: &EventDispatcher,
    reader: R,
) -> Result<BTreeSet<TenantId>, csv::Error> {
    let mut tenants = BTreeSet::new();
    let mut pending: Option<PendingEntry> = None;

    for result in csv_reader(reader).deserialize::<JournalRecord>() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "skipping malformed row");
                continue;
            }
        };
        let tenant = TenantId(record.tenant);
        tenants.insert(tenant);

        if pending
            .as_ref()
            .is_some_and(|p| (p.tenant, p.entry) != (tenant, record.entry))
        {
            post_pending(engine, dispatcher, pending.take());
        }
        let current = pending.get_or_insert_with(|| PendingEntry {
            tenant,
            entry: record.entry,
            lines: Vec::new(),
            rejected: false,
        });

        let line = resolve_account(engine, tenant, &record.account).and_then(|account| {
            JournalEntryLine::new(
                account,
                Amount::new(record.debit.unwrap_or_default()),
                Amount::new(record.credit.unwrap_or_default()),
                record.description.filter(|d| !d.is_empty()),
            )
        });
        match line {
            Ok(line) => current.lines.push(line),
            Err(e) => {
                warn!(%tenant, entry = record.entry, account = %record.account, error = %e, "rejecting entry");
                current.rejected = true;
            }
        }
    }
    post_pending(engine, dispatcher, pending);

    Ok(tenants)
}

fn post_pending(engine: &Engine, dispatcher: &EventDispatcher, pending: Option<PendingEntry>) {
    let Some(pending) = pending else {
        return;
    };
    if pending.rejected {
        return;
    }

    let request = NewJournalEntry::new(Utc::now().date_naive(), pending.lines)
        .description(format!("Imported entry {}", pending.entry));
    match engine.post_journal_entry(pending.tenant, request) {
        Ok(outcome) => dispatcher.publish(outcome.events),
        Err(e) => {
            warn!(tenant = %pending.tenant, entry = pending.entry, code = e.error_code(), error = %e, "skipping entry");
        }
    }
}

#[derive(Debug, Serialize)]
struct TrialBalanceRecord<'a> {
    tenant: TenantId,
    account: AccountId,
    code: &'a str,
    #[serde(rename = "type")]
    account_type: &'static str,
    balance: Amount,
}

/// Write the trial balance of each tenant, accounts ordered by code.
///
/// # CSV Format
///
/// ```csv
/// tenant,account,code,type,balance
/// 1,1,1000,asset,1000.0000
/// 1,2,4000,revenue,1000.0000
/// ```
///
/// # Errors
///
/// Returns a CSV error if writing fails.
pub fn write_trial_balance<W: Write>(
    engine: &Engine,
    tenants: &BTreeSet<TenantId>,
    writer: W,
) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);
    for &tenant in tenants {
        let trial_balance = engine.trial_balance(tenant);
        if !trial_balance.is_balanced() {
            warn!(%tenant, debit = %trial_balance.total_debit, credit = %trial_balance.total_credit, "trial balance does not balance");
        }
        for row in &trial_balance.rows {
            wtr.serialize(TrialBalanceRecord {
                tenant,
                account: row.account_id,
                code: &row.code,
                account_type: row.account_type.as_str(),
                balance: row.balance,
            })?;
        }
    }
    wtr.flush()?;
    Ok(())
}

/// Raw stock CSV record.
///
/// Fields: `tenant, kind, warehouse, product, quantity, unit_cost, batch, expiry, strategy`
#[derive(Debug, Deserialize)]
struct StockRecord {
    tenant: u32,
    kind: String,
    warehouse: u64,
    product: u64,
    quantity: Decimal,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    unit_cost: Option<Decimal>,
    #[serde(default)]
    batch: Option<String>,
    #[serde(default)]
    expiry: Option<NaiveDate>,
    #[serde(default)]
    strategy: Option<String>,
}

impl StockRecord {
    fn apply(self, engine: &Engine, dispatcher: &EventDispatcher) -> LedgerResult<()> {
        let tenant = TenantId(self.tenant);
        let kind: StockMovementKind = self.kind.parse()?;
        let warehouse = WarehouseId(self.warehouse);
        let product = ProductId(self.product);
        let quantity = Amount::new(self.quantity);
        let unit_cost = Amount::new(self.unit_cost.unwrap_or_default());
        let batch = self.batch.filter(|b| !b.is_empty());

        if kind.is_inbound() {
            let mut movement = StockMovement::new(kind, warehouse, product, quantity, unit_cost);
            if let Some(number) = batch {
                // The batch column doubles as the lot number.
                let mut details = BatchDetails::new(number.clone()).lot(number);
                if let Some(expiry) = self.expiry {
                    details = details.expires(expiry);
                }
                movement = movement.batch(details);
            }
            let outcome = engine.record_stock_transaction(tenant, movement)?;
            dispatcher.publish(outcome.events);
        } else {
            let strategy = match self.strategy.as_deref().filter(|s| !s.is_empty()) {
                Some(strategy) => strategy.parse()?,
                None => CostingStrategy::default(),
            };
            let mut request = DeductionRequest::new(warehouse, product, quantity, strategy)
                .kind(kind)
                .unit_cost(unit_cost);
            if let Some(number) = batch {
                request = request.batch_number(number);
            }
            let outcome = engine.deduct_stock(tenant, request)?;
            dispatcher.publish(outcome.events);
        }
        Ok(())
    }
}

/// Process stock movements from a CSV reader.
///
/// Inbound kinds receive into the named batch; outbound kinds deduct by
/// `strategy` (FIFO when empty). Rows that fail to parse or apply are
/// skipped.
///
/// # CSV Format
///
/// ```csv
/// tenant,kind,warehouse,product,quantity,unit_cost,batch,expiry,strategy
/// 1,purchase,1,10,100,2.50,B1,2026-01-31,
/// 1,shipment,1,10,40,,,,fifo
/// ```
///
/// Returns the tenants seen, in order.
///
/// # Errors
///
/// Returns a CSV error only if the reader itself fails.
pub fn process_stock<R: Read>(
    engine: &Engine,
    dispatcher: &EventDispatcher,
    reader: R,
) -> Result<BTreeSet<TenantId>, csv::Error> {
    let mut tenants = BTreeSet::new();

    for result in csv_reader(reader).deserialize::<StockRecord>() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "skipping malformed row");
                continue;
            }
        };
        let tenant = TenantId(record.tenant);
        tenants.insert(tenant);
        if let Err(e) = record.apply(engine, dispatcher) {
            warn!(%tenant, code = e.error_code(), error = %e, "skipping movement");
        }
    }

    Ok(tenants)
}

/// Turnover window for the valuation output.
#[derive(Debug, Clone, Copy)]
pub struct StockReport {
    pub period_days: u32,
    pub as_of: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct ValuationRecord {
    tenant: TenantId,
    product: ProductId,
    warehouse: WarehouseId,
    quantity_on_hand: Amount,
    average_cost: Amount,
    total_value: Amount,
    category: &'static str,
    turnover_rate: Option<Amount>,
}

/// Write the valuation of each tenant with its ABC category and turnover.
///
/// # CSV Format
///
/// ```csv
/// tenant,product,warehouse,quantity_on_hand,average_cost,total_value,category,turnover_rate
/// 1,10,1,60.0000,2.5000,150.0000,A,0.6667
/// ```
///
/// # Errors
///
/// Returns a CSV error if writing fails or a report cannot be computed.
pub fn write_valuation<W: Write>(
    engine: &Engine,
    tenants: &BTreeSet<TenantId>,
    report: StockReport,
    writer: W,
) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);
    for &tenant in tenants {
        let (valuation, categories, turnover) = tenant_reports(engine, tenant, report)
            .map_err(|e| csv::Error::from(std::io::Error::other(e)))?;

        for item in valuation.items {
            let key = (item.product_id, item.warehouse_id);
            wtr.serialize(ValuationRecord {
                tenant,
                product: item.product_id,
                warehouse: item.warehouse_id,
                quantity_on_hand: item.quantity_on_hand,
                average_cost: item.average_cost,
                total_value: item.total_value,
                category: categories.get(&key).copied().unwrap_or(AbcCategory::C).as_str(),
                turnover_rate: turnover.get(&key).copied().flatten(),
            })?;
        }
    }
    wtr.flush()?;
    Ok(())
}

type Keyed<T> = HashMap<(ProductId, WarehouseId), T>;

fn tenant_reports(
    engine: &Engine,
    tenant: TenantId,
    report: StockReport,
) -> LedgerResult<(erp_ledger::ValuationReport, Keyed<AbcCategory>, Keyed<Option<Amount>>)> {
    let valuation = engine.get_valuation_report(tenant, None)?;
    let categories = engine
        .get_abc_analysis(tenant, None)?
        .into_iter()
        .map(|item| ((item.product_id, item.warehouse_id), item.category))
        .collect();
    let turnover = engine
        .get_turnover_rate(tenant, None, report.period_days, report.as_of)?
        .into_iter()
        .map(|item| ((item.product_id, item.warehouse_id), item.turnover_rate))
        .collect();
    Ok((valuation, categories, turnover))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Cursor;

    fn run_journal(csv: &str) -> (Engine, BTreeSet<TenantId>) {
        let engine = Engine::default();
        let dispatcher = EventDispatcher::new();
        let tenants = process_journal(&engine, &dispatcher, Cursor::new(csv)).unwrap();
        (engine, tenants)
    }

    fn run_stock(csv: &str) -> (Engine, BTreeSet<TenantId>) {
        let engine = Engine::default();
        let dispatcher = EventDispatcher::new();
        let tenants = process_stock(&engine, &dispatcher, Cursor::new(csv)).unwrap();
        (engine, tenants)
    }

    fn balance(engine: &Engine, tenant: u32, code: &str) -> Amount {
        engine
            .chart()
            .find_by_code(TenantId(tenant), code)
            .unwrap()
            .current_balance
    }

    #[test]
    fn post_simple_entry() {
        let csv = "tenant,entry,account,debit,credit,description\n\
                   1,1,1000,1000.00,,sale\n\
                   1,1,4000,,1000.00,sale\n";
        let (engine, tenants) = run_journal(csv);

        assert_eq!(tenants.len(), 1);
        assert_eq!(balance(&engine, 1, "1000"), Amount::from(1000));
        assert_eq!(balance(&engine, 1, "4000"), Amount::from(1000));
        assert!(engine.trial_balance(TenantId(1)).is_balanced());
    }

    #[test]
    fn account_type_follows_code() {
        let csv = "tenant,entry,account,debit,credit,description\n\
                   1,1,5100,250,,rent\n\
                   1,1,2100,,250,rent\n";
        let (engine, _) = run_journal(csv);

        let rent = engine.chart().find_by_code(TenantId(1), "5100").unwrap();
        let payable = engine.chart().find_by_code(TenantId(1), "2100").unwrap();
        assert_eq!(rent.account_type, AccountType::Expense);
        assert_eq!(payable.account_type, AccountType::Liability);
        assert_eq!(payable.current_balance, Amount::from(250));
    }

    #[test]
    fn skip_unbalanced_entry() {
        let csv = "tenant,entry,account,debit,credit,description\n\
                   1,1,1000,100,,\n\
                   1,1,4000,,90,\n\
                   1,2,1000,50,,\n\
                   1,2,4000,,50,\n";
        let (engine, _) = run_journal(csv);
        assert_eq!(balance(&engine, 1, "1000"), Amount::from(50));
    }

    #[test]
    fn skip_entry_with_bad_line() {
        let csv = "tenant,entry,account,debit,credit,description\n\
                   1,1,1000,100,100,\n\
                   1,1,4000,,100,\n\
                   1,1,1000,100,,\n";
        let (engine, _) = run_journal(csv);
        assert_eq!(balance(&engine, 1, "1000"), Amount::ZERO);
    }

    #[test]
    fn skip_malformed_journal_rows() {
        let csv = "tenant,entry,account,debit,credit,description\n\
                   1,1,1000,10,,\n\
                   not,a,row,at,all,\n\
                   1,1,4000,,10,\n";
        let (engine, _) = run_journal(csv);
        assert_eq!(balance(&engine, 1, "4000"), Amount::from(10));
    }

    #[test]
    fn write_trial_balance_to_csv() {
        let csv = "tenant,entry,account,debit,credit,description\n\
                   1,1,1000,1000.5,,\n\
                   1,1,4000,,1000.5,\n";
        let (engine, tenants) = run_journal(csv);

        let mut output = Vec::new();
        write_trial_balance(&engine, &tenants, &mut output).unwrap();

        let output = String::from_utf8(output).unwrap();
        let mut lines = output.lines();
        assert_eq!(lines.next(), Some("tenant,account,code,type,balance"));
        assert_eq!(lines.next(), Some("1,1,1000,asset,1000.5000"));
        assert_eq!(lines.next(), Some("1,2,4000,revenue,1000.5000"));
    }

    #[test]
    fn stock_fifo_flow() {
        let csv = "tenant,kind,warehouse,product,quantity,unit_cost,batch,expiry,strategy\n\
                   1,purchase,1,10,100,2,B1,,\n\
                   1,purchase,1,10,100,4,B2,,\n\
                   1,shipment,1,10,150,,,,fifo\n";
        let (engine, _) = run_stock(csv);

        let level = engine.get_stock_level(TenantId(1), ProductId(10), WarehouseId(1));
        assert_eq!(level.quantity_on_hand, Amount::from(50));
        let batches = engine
            .stock()
            .batches(TenantId(1), WarehouseId(1), ProductId(10))
            .unwrap();
        assert_eq!(batches[0].quantity_on_hand, Amount::ZERO);
        assert_eq!(batches[1].quantity_on_hand, Amount::from(50));
    }

    #[test]
    fn skip_over_deduction_and_bad_kind() {
        let csv = "tenant,kind,warehouse,product,quantity,unit_cost,batch,expiry,strategy\n\
                   1,purchase,1,10,10,1,B1,,\n\
                   1,shipment,1,10,11,,,,\n\
                   1,teleport,1,10,1,,,,\n\
                   1,shipment,1,10,2,,,,nearest\n";
        let (engine, _) = run_stock(csv);
        let level = engine.get_stock_level(TenantId(1), ProductId(10), WarehouseId(1));
        assert_eq!(level.quantity_on_hand, Amount::from(10));
    }

    #[test]
    fn write_valuation_to_csv() {
        let csv = "tenant,kind,warehouse,product,quantity,unit_cost,batch,expiry,strategy\n\
                   1,purchase,1,10,100,7,B1,2026-01-31,\n\
                   1,purchase,1,30,50,2,B3,,\n\
                   1,purchase,1,20,20,10,B2,,\n";
        let (engine, tenants) = run_stock(csv);

        let mut output = Vec::new();
        let report = StockReport {
            period_days: 30,
            as_of: Utc::now(),
        };
        write_valuation(&engine, &tenants, report, &mut output).unwrap();

        let output = String::from_utf8(output).unwrap();
        let mut lines = output.lines();
        assert_eq!(
            lines.next(),
            Some("tenant,product,warehouse,quantity_on_hand,average_cost,total_value,category,turnover_rate")
        );
        assert_eq!(lines.next(), Some("1,10,1,100.0000,7.0000,700.0000,A,0.0000"));
        assert_eq!(lines.next(), Some("1,20,1,20.0000,10.0000,200.0000,B,0.0000"));
        assert_eq!(lines.next(), Some("1,30,1,50.0000,2.0000,100.0000,C,0.0000"));
    }

    #[test]
    fn multiple_tenants_stay_apart() {
        let csv = "tenant,entry,account,debit,credit,description\n\
                   2,1,1000,30,,\n\
                   2,1,4000,,30,\n\
                   1,1,1000,20,,\n\
                   1,1,4000,,20,\n";
        let (engine, tenants) = run_journal(csv);

        assert_eq!(tenants.iter().copied().collect::<Vec<_>>(), vec![TenantId(1), TenantId(2)]);
        assert_eq!(balance(&engine, 1, "1000"), Amount::new(dec!(20)));
        assert_eq!(balance(&engine, 2, "1000"), Amount::new(dec!(30)));
    }
}
