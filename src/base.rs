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

//! Core identifier types and document references.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_newtype {
    ($(#[$meta:meta])* $name:ident($inner:ty)) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub $inner);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(
    /// Tenant boundary. Every core call carries one explicitly.
    TenantId(u32)
);

id_newtype!(
    /// Ledger account identifier.
    ///
    /// Account locks are always taken in ascending `AccountId` order.
    AccountId(u64)
);

id_newtype!(
    /// Journal entry header identifier.
    JournalEntryId(u64)
);

id_newtype!(ProductId(u64));

id_newtype!(VariantId(u64));

id_newtype!(WarehouseId(u64));

id_newtype!(
    /// Batch/lot row identifier. Doubles as the tie-break for batch ordering.
    BatchId(u64)
);

id_newtype!(
    /// Identifier of an immutable stock ledger row.
    StockEntryId(u64)
);

/// Link from a ledger row to the document that caused it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Reference {
    SalesOrder(String),
    PurchaseOrder(String),
    Transfer(String),
    Adjustment(String),
    JournalEntry(JournalEntryId),
    Manual(String),
}

impl Reference {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SalesOrder(_) => "sales_order",
            Self::PurchaseOrder(_) => "purchase_order",
            Self::Transfer(_) => "transfer",
            Self::Adjustment(_) => "adjustment",
            Self::JournalEntry(_) => "journal_entry",
            Self::Manual(_) => "manual",
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SalesOrder(id)
            | Self::PurchaseOrder(id)
            | Self::Transfer(id)
            | Self::Adjustment(id)
            | Self::Manual(id) => write!(f, "{}:{}", self.kind(), id),
            Self::JournalEntry(id) => write!(f, "{}:{}", self.kind(), id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_order_numerically() {
        let mut ids = vec![AccountId(30), AccountId(2), AccountId(11)];
        ids.sort();
        assert_eq!(ids, vec![AccountId(2), AccountId(11), AccountId(30)]);
    }

    #[test]
    fn ids_serialize_transparently() {
        let json = serde_json::to_string(&BatchId(7)).unwrap();
        assert_eq!(json, "7");
    }

    #[test]
    fn reference_is_tagged() {
        let reference = Reference::SalesOrder("SO-1001".to_string());
        let json = serde_json::to_string(&reference).unwrap();
        assert_eq!(json, r#"{"kind":"sales_order","id":"SO-1001"}"#);
        assert_eq!(reference.to_string(), "sales_order:SO-1001");

        let back: Reference = serde_json::from_str(r#"{"kind":"journal_entry","id":42}"#).unwrap();
        assert_eq!(back, Reference::JournalEntry(JournalEntryId(42)));
    }
}
