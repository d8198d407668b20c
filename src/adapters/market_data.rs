//! Bar sources
//!
//! `BarProvider` is the price-history seam used by the execution simulator,
//! the feature backfill and the regime classifier. `SyntheticBarProvider`
//! produces deterministic bars so the loop runs without a data vendor.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc, Weekday};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use crate::domain::Bar;
use crate::error::Result;
use crate::rl::environment::sample_normal;

/// Price history for a symbol
#[async_trait]
pub trait BarProvider: Send + Sync {
    /// Up to `lookback` daily bars ending at `end` (inclusive), oldest first.
    /// An empty vector means no data.
    async fn daily_bars(&self, symbol: &str, end: NaiveDate, lookback: usize) -> Result<Vec<Bar>>;

    /// Minute bars with `start <= timestamp <= end`, oldest first
    async fn minute_bars(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>>;
}

/// Regular session, in UTC
const SESSION_OPEN_MINUTE: u32 = 14 * 60 + 30;
const SESSION_MINUTES: u32 = 390;

/// Weekdays trade, weekends do not
pub fn is_trading_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// First trading day strictly after `date`
pub fn next_trading_day(date: NaiveDate) -> NaiveDate {
    let mut next = date + Duration::days(1);
    while !is_trading_day(next) {
        next += Duration::days(1);
    }
    next
}

/// Session open on `date`
pub fn session_open(date: NaiveDate) -> DateTime<Utc> {
    let midnight = Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap_or_default());
    midnight + Duration::minutes(SESSION_OPEN_MINUTE as i64)
}

/// Deterministic random-walk bars.
///
/// Daily closes walk forward from `anchor` with a per-symbol seed; minute
/// bars for a day are seeded by symbol and date and start from the prior
/// close. The same inputs always produce the same bars.
#[derive(Debug, Clone)]
pub struct SyntheticBarProvider {
    seed: u64,
    anchor: NaiveDate,
    daily_volatility: f64,
    missing: HashSet<String>,
}

impl SyntheticBarProvider {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            anchor: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or_default(),
            daily_volatility: 0.015,
            missing: HashSet::new(),
        }
    }

    /// First date with data
    pub fn with_anchor(mut self, anchor: NaiveDate) -> Self {
        self.anchor = anchor;
        self
    }

    pub fn with_volatility(mut self, daily_volatility: f64) -> Self {
        self.daily_volatility = daily_volatility;
        self
    }

    /// Symbol that never has data
    pub fn with_missing(mut self, symbol: impl Into<String>) -> Self {
        self.missing.insert(symbol.into());
        self
    }

    fn symbol_seed(&self, symbol: &str) -> u64 {
        // FNV-1a, stable across runs and platforms
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in symbol.bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        hash ^ self.seed
    }

    /// (date, close) for every trading day in `[anchor, end]`
    fn daily_closes(&self, symbol: &str, end: NaiveDate) -> Vec<(NaiveDate, f64)> {
        let mut rng = StdRng::seed_from_u64(self.symbol_seed(symbol));
        let mut price = 20.0 + (self.symbol_seed(symbol) % 480) as f64;
        let mut closes = Vec::new();
        let mut date = self.anchor;
        while date <= end {
            if is_trading_day(date) {
                price *= 1.0 + sample_normal(&mut rng) * self.daily_volatility;
                price = price.max(1.0);
                closes.push((date, price));
            }
            date += Duration::days(1);
        }
        closes
    }

    fn session_minutes(&self, symbol: &str, date: NaiveDate, open: f64) -> Vec<Bar> {
        let day_seed = self.symbol_seed(symbol) ^ (date.num_days_from_ce() as u64).rotate_left(17);
        let mut rng = StdRng::seed_from_u64(day_seed);
        let minute_vol = self.daily_volatility / (SESSION_MINUTES as f64).sqrt();
        let start = session_open(date);

        let mut price = open;
        (0..SESSION_MINUTES)
            .map(|i| {
                let bar_open = price;
                price = (price * (1.0 + sample_normal(&mut rng) * minute_vol)).max(0.01);
                let wick = sample_normal(&mut rng).abs() * minute_vol * 0.5;
                let high = bar_open.max(price) * (1.0 + wick);
                let low = bar_open.min(price) * (1.0 - wick);
                to_bar(
                    start + Duration::minutes(i as i64),
                    bar_open,
                    high,
                    low,
                    price,
                    1_000.0 + (i % 60) as f64 * 10.0,
                )
            })
            .collect()
    }
}

fn to_decimal(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or_default().round_dp(4)
}

fn to_bar(
    timestamp: DateTime<Utc>,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
) -> Bar {
    Bar {
        timestamp,
        open: to_decimal(open),
        high: to_decimal(high),
        low: to_decimal(low),
        close: to_decimal(close),
        volume: to_decimal(volume),
    }
}

#[async_trait]
impl BarProvider for SyntheticBarProvider {
    async fn daily_bars(&self, symbol: &str, end: NaiveDate, lookback: usize) -> Result<Vec<Bar>> {
        if self.missing.contains(symbol) || end < self.anchor {
            return Ok(Vec::new());
        }
        let closes = self.daily_closes(symbol, end);
        let start = closes.len().saturating_sub(lookback);
        let mut bars = Vec::with_capacity(closes.len() - start);
        for i in start..closes.len() {
            let (date, close) = closes[i];
            let open = if i > 0 { closes[i - 1].1 } else { close };
            let timestamp = session_open(date) + Duration::minutes(SESSION_MINUTES as i64);
            bars.push(to_bar(
                timestamp,
                open,
                open.max(close) * 1.002,
                open.min(close) * 0.998,
                close,
                1_000_000.0,
            ));
        }
        Ok(bars)
    }

    async fn minute_bars(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>> {
        if self.missing.contains(symbol) || end < start {
            return Ok(Vec::new());
        }
        let closes = self.daily_closes(symbol, end.date_naive());
        let mut bars = Vec::new();
        for (i, (date, _)) in closes.iter().enumerate() {
            if *date < start.date_naive() {
                continue;
            }
            let open = if i > 0 { closes[i - 1].1 } else { closes[i].1 };
            bars.extend(
                self.session_minutes(symbol, *date, open)
                    .into_iter()
                    .filter(|bar| bar.timestamp >= start && bar.timestamp <= end),
            );
        }
        Ok(bars)
    }
}
