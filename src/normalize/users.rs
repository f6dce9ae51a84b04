use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::types::{ActiveUser, Chain};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    Trade,
    Purchase,
    Mint,
    Transfer,
}

/// Folds activity events into one [`ActiveUser`] per (chain, address).
#[derive(Debug, Default)]
pub struct UserAccumulator {
    users: HashMap<(Chain, String), ActiveUser>,
    excluded: Vec<String>,
}

impl UserAccumulator {
    /// `excluded` addresses (burn sinks, the zero address) are never counted.
    pub fn new<I, S>(excluded: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            users: HashMap::new(),
            excluded: excluded.into_iter().map(|s| s.into().to_ascii_lowercase()).collect(),
        }
    }

    pub fn observe(&mut self, chain: Chain, address: &str, at: DateTime<Utc>, activity: Activity) {
        if address.is_empty() || self.excluded.iter().any(|e| e.eq_ignore_ascii_case(address)) {
            return;
        }
        let user = self
            .users
            .entry((chain, address.to_string()))
            .or_insert_with(|| ActiveUser {
                address: address.to_string(),
                chain,
                first_seen: at,
                last_seen: at,
                trades: 0,
                mints: 0,
                purchases: 0,
                transfers: 0,
            });

        user.first_seen = user.first_seen.min(at);
        user.last_seen = user.last_seen.max(at);
        match activity {
            Activity::Trade => user.trades += 1,
            Activity::Purchase => user.purchases += 1,
            Activity::Mint => user.mints += 1,
            Activity::Transfer => user.transfers += 1,
        }
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Most recently active first, address as tie-break.
    pub fn finish(self) -> Vec<ActiveUser> {
        let mut users: Vec<ActiveUser> = self.users.into_values().collect();
        users.sort_by(|a, b| {
            b.last_seen
                .cmp(&a.last_seen)
                .then_with(|| a.address.cmp(&b.address))
        });
        users
    }
}
