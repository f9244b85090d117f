//! Risk management module
//!
//! Portfolio state, pause controls, sizing, leverage selection, and
//! adaptive risk parameters

mod adaptive;
mod controller;
mod limits;
mod portfolio;
mod types;

pub use adaptive::{
    AdaptiveRiskSettings, MarketConditions, RiskParameters, TradePerformance, PERFORMANCE_WINDOW,
};
pub use controller::RiskController;
pub use limits::RiskLimits;
pub use portfolio::{trading_day, PortfolioState};
pub use types::{DecisionReason, PauseReason, RiskDecision};
