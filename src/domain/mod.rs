//! Core domain types and logic.

pub mod bar;
pub mod catalog;
pub mod chart;
pub mod config_validation;
pub mod context;
pub mod dashboard;
pub mod error;
pub mod ranking;
pub mod reconcile;
pub mod record;
pub mod segment;
