//! Concrete adapter implementations for ports.

pub mod bar_source;
pub mod eodhd_provider;
pub mod file_config_adapter;
#[cfg(feature = "postgres")]
pub mod postgres_adapter;
#[cfg(feature = "sqlite")]
pub mod sqlite_adapter;
pub mod svg_chart;
#[cfg(feature = "web")]
pub mod web;
