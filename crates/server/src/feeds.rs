//! Simulated external data for the scheduler.
//!
//! Stands in for real weather, market and news providers: every snapshot is
//! freshly randomized within plausible ranges.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde_json::json;

use herald_core::NotificationContext;
use herald_rules::error::Result;
use herald_rules::ports::ContextSource;

const CONDITIONS: [&str; 4] = ["Clear", "Clouds", "Rain", "Snow"];

const HEADLINES: [&str; 3] = [
    "Central bank holds rates steady",
    "Cold front expected over the weekend",
    "Chipmakers lead market rally",
];

/// Market symbol every snapshot reports.
pub const MARKET_SYMBOL: &str = "KOSPI";

/// [`ContextSource`] backed by a random generator.
pub struct SimulatedFeed {
    rng: Mutex<StdRng>,
}

impl SimulatedFeed {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Reproducible sequence of snapshots.
    #[cfg(test)]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    fn sample(&self) -> NotificationContext {
        let mut rng = self.rng.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

        let temperature = round_to(rng.gen_range(-10.0..35.0), 1);
        let condition = CONDITIONS.choose(&mut *rng).copied().unwrap_or("Clear");
        let humidity: u32 = rng.gen_range(20..95);
        let wind_speed = round_to(rng.gen_range(0.0..15.0), 1);

        let price = round_to(rng.gen_range(2500.0..3200.0), 2);
        let change = round_to(rng.gen_range(-60.0..60.0), 2);
        let change_percent = round_to(change / (price - change) * 100.0, 2);

        NotificationContext::builder()
            .weather("temperature", temperature)
            .weather("condition", condition)
            .weather("humidity", humidity)
            .weather("wind_speed", wind_speed)
            .market("symbol", MARKET_SYMBOL)
            .market("price", price)
            .market("change", change)
            .market("change_percent", change_percent)
            .news("headlines", json!(HEADLINES))
            .news("count", HEADLINES.len())
            .timestamp(Utc::now())
            .build()
    }
}

impl Default for SimulatedFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContextSource for SimulatedFeed {
    async fn fetch_snapshot(&self) -> Result<NotificationContext> {
        Ok(self.sample())
    }
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn snapshots_stay_in_range() {
        let feed = SimulatedFeed::seeded(7);
        for _ in 0..200 {
            let ctx = feed.fetch_snapshot().await.unwrap();

            let temperature = ctx.weather()["temperature"].as_f64().unwrap();
            assert!((-10.0..=35.0).contains(&temperature), "{temperature}");
            assert_eq!(temperature, round_to(temperature, 1));
            let condition = ctx.weather()["condition"].as_str().unwrap();
            assert!(CONDITIONS.contains(&condition));

            assert_eq!(ctx.market()["symbol"], MARKET_SYMBOL);
            let price = ctx.market()["price"].as_f64().unwrap();
            assert!((2500.0..=3200.0).contains(&price), "{price}");

            assert_eq!(ctx.news()["count"], 3);
            assert_eq!(ctx.news()["headlines"].as_array().unwrap().len(), 3);
        }
    }

    #[tokio::test]
    async fn seeded_feeds_repeat() {
        let a = SimulatedFeed::seeded(42).fetch_snapshot().await.unwrap();
        let b = SimulatedFeed::seeded(42).fetch_snapshot().await.unwrap();
        assert_eq!(a.weather(), b.weather());
        assert_eq!(a.market(), b.market());
    }

    #[test]
    fn rounding() {
        assert_eq!(round_to(-4.96, 1), -5.0);
        assert_eq!(round_to(3100.499, 2), 3100.5);
    }
}
