//! External data and storage adapters

pub mod market_data;
pub mod postgres;

pub use market_data::{
    is_trading_day, next_trading_day, session_open, BarProvider, SyntheticBarProvider,
};
pub use postgres::PostgresStore;
