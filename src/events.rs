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

//! Domain events.
//!
//! The core never delivers events itself. Each mutating operation returns an
//! [`Outcome`] carrying the events it raised; whoever owns the I/O hands them
//! to an [`EventDispatcher`] (or anything else) after the operation returns.

use crate::base::{JournalEntryId, ProductId, TenantId, WarehouseId};
use crate::decimal::Amount;
use crossbeam::channel::{self, Receiver, Sender};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    JournalEntryPosted {
        tenant_id: TenantId,
        entry_id: JournalEntryId,
        entry_number: String,
        total: Amount,
    },
    JournalEntryReversed {
        tenant_id: TenantId,
        entry_id: JournalEntryId,
        reversal_id: JournalEntryId,
    },
    JournalEntryDeleted {
        tenant_id: TenantId,
        entry_id: JournalEntryId,
    },
    StockReceived {
        tenant_id: TenantId,
        warehouse_id: WarehouseId,
        product_id: ProductId,
        quantity: Amount,
        batch_number: Option<String>,
    },
    StockDeducted {
        tenant_id: TenantId,
        warehouse_id: WarehouseId,
        product_id: ProductId,
        quantity: Amount,
        batches: usize,
    },
    LowStock {
        tenant_id: TenantId,
        warehouse_id: WarehouseId,
        product_id: ProductId,
        quantity_on_hand: Amount,
        reorder_point: Amount,
    },
}

impl DomainEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::JournalEntryPosted { .. } => "accounting.journal_entry.posted",
            Self::JournalEntryReversed { .. } => "accounting.journal_entry.reversed",
            Self::JournalEntryDeleted { .. } => "accounting.journal_entry.deleted",
            Self::StockReceived { .. } => "inventory.stock.received",
            Self::StockDeducted { .. } => "inventory.stock.deducted",
            Self::LowStock { .. } => "inventory.stock.low",
        }
    }

    pub fn tenant_id(&self) -> TenantId {
        match self {
            Self::JournalEntryPosted { tenant_id, .. }
            | Self::JournalEntryReversed { tenant_id, .. }
            | Self::JournalEntryDeleted { tenant_id, .. }
            | Self::StockReceived { tenant_id, .. }
            | Self::StockDeducted { tenant_id, .. }
            | Self::LowStock { tenant_id, .. } => *tenant_id,
        }
    }
}

/// Result of a mutating operation plus the events it raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome<T> {
    pub value: T,
    pub events: Vec<DomainEvent>,
}

impl<T> Outcome<T> {
    pub fn new(value: T, events: Vec<DomainEvent>) -> Self {
        Self { value, events }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome {
            value: f(self.value),
            events: self.events,
        }
    }

    pub fn into_parts(self) -> (T, Vec<DomainEvent>) {
        (self.value, self.events)
    }
}

/// Unbounded multi-producer channel for handing events to delivery workers.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: Sender<DomainEvent>,
    receiver: Receiver<DomainEvent>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        let (sender, receiver) = channel::unbounded();
        Self { sender, receiver }
    }

    /// Queues events in order. Never blocks.
    pub fn publish(&self, events: impl IntoIterator<Item = DomainEvent>) {
        for event in events {
            // Both ends live in `self`, so the channel cannot be disconnected.
            let _ = self.sender.send(event);
        }
    }

    /// Handle for a consumer thread.
    pub fn subscribe(&self) -> Receiver<DomainEvent> {
        self.receiver.clone()
    }

    /// Takes every event queued so far.
    pub fn drain(&self) -> Vec<DomainEvent> {
        self.receiver.try_iter().collect()
    }

    pub fn pending(&self) -> usize {
        self.receiver.len()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
