//! Portfolio state and pause controls
//!
//! Tracks equity, peak, daily realized PnL and the losing streak. Each pause
//! trigger is held independently and clears only when its own condition
//! clears.

use super::{PauseReason, RiskLimits};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Shared portfolio state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioState {
    pub equity: Decimal,
    pub daily_realized_pnl: Decimal,
    pub peak_equity: Decimal,
    /// Equity at the last daily boundary
    pub day_start_equity: Decimal,
    pub trading_day: NaiveDate,
    pub consecutive_losses: u32,
    pub trading_paused: bool,
    pub pause_reasons: BTreeSet<PauseReason>,
    /// Expiry of the losing-streak pause, when a cooldown is configured
    pub pause_until: Option<DateTime<Utc>>,
}

/// Trading day containing `now` for a boundary at `reset_hour` UTC
pub fn trading_day(now: DateTime<Utc>, reset_hour: u32) -> NaiveDate {
    (now - Duration::hours(i64::from(reset_hour))).date_naive()
}

impl PortfolioState {
    /// Create a new portfolio state
    pub fn new(equity: Decimal, now: DateTime<Utc>, limits: &RiskLimits) -> Self {
        Self {
            equity,
            daily_realized_pnl: Decimal::ZERO,
            peak_equity: equity,
            day_start_equity: equity,
            trading_day: trading_day(now, limits.daily_reset_hour),
            consecutive_losses: 0,
            trading_paused: false,
            pause_reasons: BTreeSet::new(),
            pause_until: None,
        }
    }

    /// Relative decline of equity from its peak
    pub fn drawdown(&self) -> Decimal {
        if self.peak_equity <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        ((self.peak_equity - self.equity) / self.peak_equity).max(Decimal::ZERO)
    }

    /// First active pause trigger
    pub fn pause_reason(&self) -> Option<PauseReason> {
        self.pause_reasons.iter().next().copied()
    }

    /// Daily loss limit in quote currency
    pub fn daily_loss_limit(&self, limits: &RiskLimits) -> Decimal {
        limits.daily_loss_fraction * self.day_start_equity
    }

    /// Apply a closed trade's realized PnL
    pub fn apply_trade(&mut self, pnl: Decimal, limits: &RiskLimits, now: DateTime<Utc>) {
        self.apply_closed_trade(pnl, Decimal::ZERO, limits, now);
    }

    /// Apply a closed trade whose `booked` share already reached equity
    ///
    /// `pnl` is net of every fee and drives the daily figure and the losing
    /// streak; equity only moves by the unbooked remainder.
    pub fn apply_closed_trade(
        &mut self,
        pnl: Decimal,
        booked: Decimal,
        limits: &RiskLimits,
        now: DateTime<Utc>,
    ) {
        self.roll_day(limits, now);
        self.equity += pnl - booked;
        self.peak_equity = self.peak_equity.max(self.equity);
        self.daily_realized_pnl += pnl;
        if pnl < Decimal::ZERO {
            self.consecutive_losses += 1;
        } else if pnl > Decimal::ZERO {
            self.consecutive_losses = 0;
            self.pause_until = None;
        }
        tracing::info!(
            pnl = %pnl,
            equity = %self.equity,
            daily_pnl = %self.daily_realized_pnl,
            consecutive_losses = self.consecutive_losses,
            "Trade applied to portfolio"
        );
        self.reevaluate(limits, now);
    }

    /// Apply cash that settled on the exchange while the position is live
    ///
    /// Entry fees and partial closes hit the exchange balance before the
    /// trade closes.
    pub fn apply_interim(&mut self, amount: Decimal, limits: &RiskLimits, now: DateTime<Utc>) {
        if amount.is_zero() {
            return;
        }
        self.equity += amount;
        self.peak_equity = self.peak_equity.max(self.equity);
        self.reevaluate(limits, now);
    }

    /// Adopt an authoritative balance from the exchange
    pub fn reconcile_equity(&mut self, balance: Decimal, limits: &RiskLimits, now: DateTime<Utc>) {
        if balance != self.equity {
            tracing::debug!(local = %self.equity, exchange = %balance, "Reconciled equity");
        }
        self.equity = balance;
        self.peak_equity = self.peak_equity.max(balance);
        self.reevaluate(limits, now);
    }

    /// Reset daily figures when `now` falls in a new trading day
    pub fn roll_day(&mut self, limits: &RiskLimits, now: DateTime<Utc>) -> bool {
        let day = trading_day(now, limits.daily_reset_hour);
        if day <= self.trading_day {
            return false;
        }
        tracing::info!(
            %day,
            previous_pnl = %self.daily_realized_pnl,
            equity = %self.equity,
            "New trading day"
        );
        self.trading_day = day;
        self.day_start_equity = self.equity;
        self.daily_realized_pnl = Decimal::ZERO;
        self.reevaluate(limits, now);
        true
    }

    /// Recompute every pause trigger from current figures
    pub fn reevaluate(&mut self, limits: &RiskLimits, now: DateTime<Utc>) {
        if let Some(until) = self.pause_until {
            if until <= now {
                tracing::info!(
                    consecutive_losses = self.consecutive_losses,
                    "Losing-streak cooldown elapsed, streak reset"
                );
                self.consecutive_losses = 0;
                self.pause_until = None;
            }
        }

        let drawdown = self.drawdown() >= limits.drawdown_threshold;
        let streak = limits.max_consecutive_losses > 0
            && self.consecutive_losses >= limits.max_consecutive_losses;
        let daily = self.daily_realized_pnl <= -self.daily_loss_limit(limits)
            && self.daily_realized_pnl < Decimal::ZERO;

        self.set_trigger(PauseReason::Drawdown, drawdown);
        self.set_trigger(PauseReason::DailyLoss, daily);
        if streak && !self.pause_reasons.contains(&PauseReason::ConsecutiveLosses) {
            self.pause_until = limits.consecutive_loss_cooldown.map(|cooldown| now + cooldown);
        }
        self.set_trigger(PauseReason::ConsecutiveLosses, streak);

        self.trading_paused = !self.pause_reasons.is_empty();
    }

    fn set_trigger(&mut self, reason: PauseReason, active: bool) {
        if active && self.pause_reasons.insert(reason) {
            tracing::warn!(
                ?reason,
                equity = %self.equity,
                drawdown = %self.drawdown(),
                daily_pnl = %self.daily_realized_pnl,
                consecutive_losses = self.consecutive_losses,
                "Trading paused"
            );
        } else if !active && self.pause_reasons.remove(&reason) {
            tracing::info!(?reason, remaining = self.pause_reasons.len(), "Pause trigger cleared");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap()
    }

    fn portfolio() -> (PortfolioState, RiskLimits) {
        let limits = RiskLimits::default();
        (PortfolioState::new(dec!(10000), at(1), &limits), limits)
    }

    #[test]
    fn test_drawdown() {
        let (mut p, limits) = portfolio();
        p.reconcile_equity(dec!(11000), &limits, at(2));
        assert_eq!(p.peak_equity, dec!(11000));
        p.reconcile_equity(dec!(9900), &limits, at(3));
        assert_eq!(p.drawdown(), dec!(0.1));
        assert!(!p.trading_paused);
    }

    #[test]
    fn test_loss_then_win_resets_streak() {
        let (mut p, limits) = portfolio();
        p.apply_trade(dec!(-100), &limits, at(2));
        assert_eq!(p.consecutive_losses, 1);
        assert_eq!(p.daily_realized_pnl, dec!(-100));
        assert_eq!(p.equity, dec!(9900));

        p.apply_trade(dec!(50), &limits, at(3));
        assert_eq!(p.consecutive_losses, 0);
        assert_eq!(p.daily_realized_pnl, dec!(-50));
        assert_eq!(p.peak_equity, dec!(10000));
    }

    #[test]
    fn test_closed_trade_skips_booked_fees() {
        let (mut p, limits) = portfolio();
        p.apply_interim(dec!(-5), &limits, at(2));
        assert_eq!(p.equity, dec!(9995));

        // Net 9.8 after both fees; the 5.0 entry fee is already in equity
        p.apply_closed_trade(dec!(9.8), dec!(-5), &limits, at(3));
        assert_eq!(p.equity, dec!(10009.8));
        assert_eq!(p.daily_realized_pnl, dec!(9.8));
        assert_eq!(p.consecutive_losses, 0);
    }

    #[test]
    fn test_consecutive_losses_pause_until_win() {
        let (mut p, limits) = portfolio();
        for _ in 0..5 {
            p.apply_trade(dec!(-10), &limits, at(2));
        }
        assert!(p.trading_paused);
        assert_eq!(p.pause_reason(), Some(PauseReason::ConsecutiveLosses));
        assert!(p.pause_until.is_none());

        p.apply_trade(dec!(1), &limits, at(3));
        assert!(!p.trading_paused);
    }

    #[test]
    fn test_consecutive_loss_cooldown() {
        let limits = RiskLimits {
            consecutive_loss_cooldown: Some(Duration::hours(1)),
            ..RiskLimits::default()
        };
        let mut p = PortfolioState::new(dec!(10000), at(1), &limits);
        for _ in 0..5 {
            p.apply_trade(dec!(-10), &limits, at(2));
        }
        assert_eq!(p.pause_until, Some(at(3)));

        p.reevaluate(&limits, at(2) + Duration::minutes(59));
        assert!(p.trading_paused);
        p.reevaluate(&limits, at(3));
        assert!(!p.trading_paused);
        assert_eq!(p.consecutive_losses, 0);
    }

    #[test]
    fn test_daily_loss_pause_clears_on_new_day() {
        let (mut p, limits) = portfolio();
        p.apply_trade(dec!(-1000), &limits, at(2));
        assert!(p.pause_reasons.contains(&PauseReason::DailyLoss));

        assert!(!p.roll_day(&limits, at(23)));
        assert!(p.trading_paused);

        let next_day = at(1) + Duration::days(1);
        assert!(p.roll_day(&limits, next_day));
        assert_eq!(p.daily_realized_pnl, dec!(0));
        assert_eq!(p.day_start_equity, dec!(9000));
        assert!(!p.pause_reasons.contains(&PauseReason::DailyLoss));
        assert!(!p.trading_paused);
    }

    #[test]
    fn test_triggers_clear_independently() {
        let (mut p, limits) = portfolio();
        // 16% down in one day trips both drawdown and daily loss
        p.apply_trade(dec!(-1600), &limits, at(2));
        assert!(p.pause_reasons.contains(&PauseReason::Drawdown));
        assert!(p.pause_reasons.contains(&PauseReason::DailyLoss));

        // New day clears the daily trigger but drawdown persists
        p.roll_day(&limits, at(2) + Duration::days(1));
        assert_eq!(p.pause_reasons.len(), 1);
        assert!(p.trading_paused);

        // Recovery to within the threshold of peak clears it
        p.reconcile_equity(dec!(8600), &limits, at(3) + Duration::days(1));
        assert!(!p.trading_paused);
    }

    #[test]
    fn test_trading_day_respects_reset_hour() {
        let day = |h| trading_day(at(h), 8);
        assert_eq!(day(7), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        assert_eq!(day(8), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
    }
}
