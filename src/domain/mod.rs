//! Core domain types and logic.

pub mod backtest;
pub mod config;
pub mod config_loader;
pub mod config_validation;
pub mod costs;
pub mod error;
pub mod event;
pub mod event_book;
pub mod market_data;
pub mod metrics;
pub mod overlay;
pub mod regime;
pub mod risk;
pub mod stats;
pub mod sweep;
pub mod timeline;
