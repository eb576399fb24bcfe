// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `update_market_prices`: exchange quotes from the pricefeed daemon

use crate::error::ServiceError;
use chrono::DateTime;
use chrono::Utc;
use daemon_gateway_types::pricefeed::MarketPriceUpdate;
use daemon_gateway_types::pricefeed::UpdateMarketPricesRequest;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Destination for validated market price updates
pub trait MarketPriceSink: Send + Sync {
    fn update_market_prices(
        &self,
        updates: &[MarketPriceUpdate],
    ) -> Result<(), ServiceError>;
}

pub fn validate(
    request: &UpdateMarketPricesRequest,
) -> Result<(), ServiceError> {
    if request.market_price_updates.is_empty() {
        return Err(ServiceError::InvalidPayload(String::from(
            "market price update list is empty",
        )));
    }
    for update in &request.market_price_updates {
        for price in &update.exchange_prices {
            if price.price == 0 {
                return Err(ServiceError::InvalidPayload(format!(
                    "market {}: exchange {:?} reported a zero price",
                    update.market_id, price.exchange_id
                )));
            }
            if price.last_update_time.is_none() {
                return Err(ServiceError::InvalidPayload(format!(
                    "market {}: exchange {:?} price has no last update time",
                    update.market_id, price.exchange_id
                )));
            }
        }
    }
    Ok(())
}

/// A single cached quote
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachedPrice {
    pub price: u64,
    pub last_update_time: DateTime<Utc>,
}

/// In-memory cache of the newest quote per (market, exchange)
#[derive(Debug, Default)]
pub struct MarketPriceCache {
    prices: Mutex<BTreeMap<(u32, String), CachedPrice>>,
}

impl MarketPriceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn price(&self, market_id: u32, exchange_id: &str) -> Option<CachedPrice> {
        self.prices
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&(market_id, exchange_id.to_string()))
            .cloned()
    }
}

impl MarketPriceSink for MarketPriceCache {
    fn update_market_prices(
        &self,
        updates: &[MarketPriceUpdate],
    ) -> Result<(), ServiceError> {
        let mut prices =
            self.prices.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        for update in updates {
            for quote in &update.exchange_prices {
                let Some(last_update_time) = quote.last_update_time else {
                    continue;
                };
                let incoming =
                    CachedPrice { price: quote.price, last_update_time };
                prices
                    .entry((update.market_id, quote.exchange_id.clone()))
                    .and_modify(|cached| {
                        if cached.last_update_time <= incoming.last_update_time
                        {
                            *cached = incoming.clone();
                        }
                    })
                    .or_insert(incoming);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::TimeZone;
    use daemon_gateway_types::pricefeed::ExchangePrice;

    fn quote(exchange_id: &str, price: u64, secs: i64) -> ExchangePrice {
        ExchangePrice {
            exchange_id: exchange_id.to_string(),
            price,
            last_update_time: Some(Utc.timestamp_opt(secs, 0).unwrap()),
        }
    }

    #[test]
    fn test_validate_rejects_bad_updates() {
        let empty = UpdateMarketPricesRequest { market_price_updates: vec![] };
        assert_matches!(validate(&empty), Err(ServiceError::InvalidPayload(_)));

        let zero = UpdateMarketPricesRequest {
            market_price_updates: vec![MarketPriceUpdate {
                market_id: 1,
                exchange_prices: vec![quote("Binance", 0, 10)],
            }],
        };
        assert_matches!(validate(&zero), Err(ServiceError::InvalidPayload(_)));

        let mut untimed = quote("Binance", 5, 10);
        untimed.last_update_time = None;
        let untimed = UpdateMarketPricesRequest {
            market_price_updates: vec![MarketPriceUpdate {
                market_id: 1,
                exchange_prices: vec![untimed],
            }],
        };
        assert_matches!(
            validate(&untimed),
            Err(ServiceError::InvalidPayload(_))
        );
    }

    #[test]
    fn test_cache_keeps_newest_quote() {
        let cache = MarketPriceCache::new();
        let update = |price, secs| MarketPriceUpdate {
            market_id: 7,
            exchange_prices: vec![quote("Kraken", price, secs)],
        };

        cache.update_market_prices(&[update(100, 20)]).unwrap();
        cache.update_market_prices(&[update(90, 10)]).unwrap();
        assert_eq!(cache.price(7, "Kraken").unwrap().price, 100);

        cache.update_market_prices(&[update(110, 30)]).unwrap();
        assert_eq!(cache.price(7, "Kraken").unwrap().price, 110);
        assert_eq!(cache.price(7, "Binance"), None);
    }
}
