//! Execution Router (§4.5): classifies a validated decision into Fast Track
//! (bypass deliberation) or Deep Dive (full War Room cycle). Pure over a
//! snapshot, mirroring the stateless `check_circuit_breakers`-style checks
//! in the source stack's risk manager, generalized into a single classifier.

use core_types::MarketContext;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

pub const VIX_FAST_TRACK_THRESHOLD: Decimal = dec!(40);
pub const DAILY_LOSS_FAST_TRACK_THRESHOLD: Decimal = dec!(-0.05);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    FastTrack,
    DeepDive,
}

#[derive(Debug, Clone, Copy)]
pub struct RouterInput {
    pub position_open: bool,
    pub stop_loss_crossed: bool,
    pub daily_pnl_pct: Decimal,
}

pub fn route(input: RouterInput, market: MarketContext) -> Route {
    if market.kill_switch_active {
        return Route::FastTrack;
    }
    if input.position_open && input.stop_loss_crossed {
        return Route::FastTrack;
    }
    if input.daily_pnl_pct < DAILY_LOSS_FAST_TRACK_THRESHOLD {
        return Route::FastTrack;
    }
    if market.vix > VIX_FAST_TRACK_THRESHOLD {
        return Route::FastTrack;
    }
    Route::DeepDive
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calm_market() -> MarketContext {
        MarketContext { vix: Decimal::from(15), kill_switch_active: false }
    }

    fn calm_input() -> RouterInput {
        RouterInput { position_open: false, stop_loss_crossed: false, daily_pnl_pct: Decimal::ZERO }
    }

    #[test]
    fn normal_conditions_route_to_deep_dive() {
        assert_eq!(route(calm_input(), calm_market()), Route::DeepDive);
    }

    #[test]
    fn stop_loss_crossed_on_open_position_is_fast_track() {
        let mut input = calm_input();
        input.position_open = true;
        input.stop_loss_crossed = true;
        assert_eq!(route(input, calm_market()), Route::FastTrack);
    }

    #[test]
    fn daily_loss_breach_is_fast_track() {
        let mut input = calm_input();
        input.daily_pnl_pct = dec!(-0.06);
        assert_eq!(route(input, calm_market()), Route::FastTrack);
    }

    #[test]
    fn high_vix_is_fast_track() {
        let mut market = calm_market();
        market.vix = Decimal::from(45);
        assert_eq!(route(calm_input(), market), Route::FastTrack);
    }

    #[test]
    fn kill_switch_is_fast_track() {
        let mut market = calm_market();
        market.kill_switch_active = true;
        assert_eq!(route(calm_input(), market), Route::FastTrack);
    }

    #[test]
    fn stop_loss_not_crossed_without_open_position_is_deep_dive() {
        let mut input = calm_input();
        input.stop_loss_crossed = true; // irrelevant without an open position
        assert_eq!(route(input, calm_market()), Route::DeepDive);
    }
}
