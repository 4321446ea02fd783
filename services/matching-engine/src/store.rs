//! Order registry
//!
//! Exclusive owner of every order record. Books index into the store by id;
//! terminal records leave the books but stay here for retrieval.

use std::collections::HashMap;
use types::order::{OrderRecord, OrderStatus, Side};
use alloy_primitives::Address;
use uuid::Uuid;

/// Retrieval filters for [`OrderStore::list`]
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub base_token: Option<Address>,
    pub quote_token: Option<Address>,
    pub trader: Option<Address>,
    pub status: Option<OrderStatus>,
    pub side: Option<Side>,
}

/// In-memory order registry
#[derive(Debug, Default)]
pub struct OrderStore {
    records: HashMap<Uuid, OrderRecord>,
}

impl OrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.records.contains_key(id)
    }

    pub fn insert(&mut self, record: OrderRecord) {
        self.records.insert(record.id, record);
    }

    pub fn get(&self, id: &Uuid) -> Option<&OrderRecord> {
        self.records.get(id)
    }

    pub fn get_mut(&mut self, id: &Uuid) -> Option<&mut OrderRecord> {
        self.records.get_mut(id)
    }

    /// Filtered retrieval sorted by creation time descending
    pub fn list(&self, filter: &OrderFilter) -> Vec<OrderRecord> {
        let mut matches: Vec<OrderRecord> = self
            .records
            .values()
            .filter(|record| {
                filter.base_token.is_none_or(|token| record.base_token == token)
                    && filter.quote_token.is_none_or(|token| record.quote_token == token)
                    && filter.trader.is_none_or(|trader| record.order.maker == trader)
                    && filter.status.is_none_or(|status| record.status == status)
                    && filter.side.is_none_or(|side| record.side == side)
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        matches
    }

    /// Ids of non-terminal records whose expiry deadline has passed
    pub fn expired_ids(&self, now_seconds: u64) -> Vec<Uuid> {
        self.records
            .values()
            .filter(|record| record.is_active())
            .filter(|record| {
                record
                    .expiry_seconds()
                    .is_some_and(|deadline| deadline <= now_seconds)
            })
            .map(|record| record.id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
