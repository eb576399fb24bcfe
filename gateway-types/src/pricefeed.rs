// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

/// The most recent price an exchange quoted for a market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangePrice {
    pub exchange_id: String,
    pub price: u64,
    /// When the exchange last updated this price. Required; an update
    /// without it is rejected.
    #[serde(default)]
    pub last_update_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketPriceUpdate {
    pub market_id: u32,
    pub exchange_prices: Vec<ExchangePrice>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateMarketPricesRequest {
    pub market_price_updates: Vec<MarketPriceUpdate>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateMarketPricesResponse {}
