//! Monotonic request tokens for suppressing superseded analysis responses.
//!
//! Every request issued for a slot gets a fresh token; only the newest token
//! of a slot is current. A response carrying any older token is stale and must
//! be dropped, no matter the order in which responses arrive.

use std::collections::BTreeMap;

use crate::traits::IndexType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestToken(u64);

impl RequestToken {
    pub fn value(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Default)]
pub struct RequestTokens {
    last_issued: u64,
    current: BTreeMap<IndexType, u64>,
}

impl RequestTokens {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&mut self, slot: IndexType) -> RequestToken {
        self.last_issued += 1;
        self.current.insert(slot, self.last_issued);
        RequestToken(self.last_issued)
    }

    pub fn is_current(&self, slot: IndexType, token: RequestToken) -> bool {
        self.current.get(&slot) == Some(&token.0)
    }

    /// Makes every outstanding token of `slot` stale.
    pub fn invalidate(&mut self, slot: IndexType) {
        self.last_issued += 1;
        self.current.insert(slot, self.last_issued);
    }

    pub fn invalidate_all(&mut self) {
        for slot in IndexType::ALL {
            self.invalidate(slot);
        }
    }
}
