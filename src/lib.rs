//! futures-bot: Decision and risk engine for leveraged futures trading
//!
//! This library provides the core components for:
//! - Market snapshots with technical indicators and a candle replay feed
//! - Pluggable strategies combined by an adaptive strategy manager
//! - Risk control with position sizing, leverage caps and pause triggers
//! - Position lifecycle management with stop-loss and take-profit monitoring
//! - Paper execution with bounded retry
//! - Snapshot persistence and a periodic driver loop
//! - Structured logging and Prometheus metrics

pub mod cli;
pub mod config;
pub mod data;
pub mod engine;
pub mod execution;
pub mod feed;
pub mod indicators;
pub mod position;
pub mod risk;
pub mod signal;
pub mod strategy;
pub mod telemetry;
