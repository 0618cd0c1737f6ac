//! Risk-based position sizing (§4.6). Pure function over a handful of
//! decimal inputs — no DB, no async, in the spirit of the source stack's
//! `shared_math`/`kelly-position-sizer` modules.

use core_types::{Action, SizingError};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

pub const RISK_PER_TRADE: Decimal = dec!(0.02);
pub const HIGH_VOL_THRESHOLD: Decimal = dec!(0.30);
pub const MED_VOL_THRESHOLD: Decimal = dec!(0.20);
pub const HIGH_VOL_MULTIPLIER: Decimal = dec!(0.5);
pub const MED_VOL_MULTIPLIER: Decimal = dec!(0.75);
pub const LOW_VOL_MULTIPLIER: Decimal = dec!(1.0);
pub const HARD_CAP_PCT: Decimal = dec!(0.10);
pub const DCA_FRACTION: Decimal = dec!(0.25);

#[derive(Debug, Clone)]
pub struct SizingInput {
    pub action: Action,
    pub equity: Decimal,
    pub entry_price: Decimal,
    pub stop_loss: Option<Decimal>,
    pub agent_confidence: f64,
    pub realized_vol_30d: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SizingOutput {
    pub quantity: Decimal,
    pub notional: Decimal,
    pub position_size_pct: Decimal,
}

fn vol_multiplier(vol: Decimal) -> Decimal {
    if vol > HIGH_VOL_THRESHOLD {
        HIGH_VOL_MULTIPLIER
    } else if vol > MED_VOL_THRESHOLD {
        MED_VOL_MULTIPLIER
    } else {
        LOW_VOL_MULTIPLIER
    }
}

/// Implements the eight-step formula from §4.6. DCA is sized identically to
/// BUY but the notional is quartered before the hard cap is applied,
/// per the resolved open question on DCA semantics (see DESIGN.md).
pub fn size_position(input: &SizingInput) -> Result<SizingOutput, SizingError> {
    let stop_loss = input.stop_loss.ok_or(SizingError::MissingStopLoss)?;
    if input.entry_price == Decimal::ZERO {
        return Err(SizingError::ZeroStopDistance);
    }
    let stop_distance = (input.entry_price - stop_loss).abs() / input.entry_price;
    if stop_distance == Decimal::ZERO {
        return Err(SizingError::ZeroStopDistance);
    }

    let account_risk = input.equity * RISK_PER_TRADE;
    let base = account_risk / stop_distance;

    let confidence = Decimal::try_from(input.agent_confidence).unwrap_or(Decimal::ZERO);
    let conf_adjusted = base * confidence;

    let multiplier = vol_multiplier(input.realized_vol_30d);
    let mut risk_adjusted = conf_adjusted * multiplier;

    if input.action == Action::Dca {
        risk_adjusted *= DCA_FRACTION;
    }

    let hard_cap = input.equity * HARD_CAP_PCT;
    let final_notional = risk_adjusted.min(hard_cap);

    let quantity = (final_notional / input.entry_price).floor();
    if quantity <= Decimal::ZERO {
        return Err(SizingError::ZeroQuantity);
    }

    let notional = quantity * input.entry_price;
    let position_size_pct = notional / input.equity;

    Ok(SizingOutput { quantity, notional, position_size_pct })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_input() -> SizingInput {
        SizingInput {
            action: Action::Buy,
            equity: Decimal::from(100_000),
            entry_price: Decimal::from(100),
            stop_loss: Some(Decimal::from(95)),
            agent_confidence: 0.8,
            realized_vol_30d: dec!(0.15),
        }
    }

    #[test]
    fn sizes_a_clean_buy() {
        let out = size_position(&base_input()).unwrap();
        // account_risk=2000, stop_distance=0.05, base=40000, conf_adjusted=32000,
        // multiplier=1.0 (vol 0.15 <= 0.20), hard cap = 10000 -> capped.
        assert_eq!(out.notional, Decimal::from(10_000));
        assert_eq!(out.quantity, Decimal::from(100));
    }

    #[test]
    fn missing_stop_loss_fails() {
        let mut input = base_input();
        input.stop_loss = None;
        assert_eq!(size_position(&input).unwrap_err(), SizingError::MissingStopLoss);
    }

    #[test]
    fn zero_stop_distance_fails() {
        let mut input = base_input();
        input.stop_loss = Some(input.entry_price);
        assert_eq!(size_position(&input).unwrap_err(), SizingError::ZeroStopDistance);
    }

    #[test]
    fn high_volatility_halves_size() {
        let mut low_vol = base_input();
        low_vol.equity = Decimal::from(1_000_000); // avoid hard cap masking the multiplier
        let mut high_vol = low_vol.clone();
        high_vol.realized_vol_30d = dec!(0.35);

        let low_out = size_position(&low_vol).unwrap();
        let high_out = size_position(&high_vol).unwrap();
        assert_eq!(high_out.notional, low_out.notional / Decimal::from(2));
    }

    #[test]
    fn dca_sizes_to_quarter_of_buy() {
        let mut buy = base_input();
        buy.equity = Decimal::from(1_000_000);
        let mut dca = buy.clone();
        dca.action = Action::Dca;

        let buy_out = size_position(&buy).unwrap();
        let dca_out = size_position(&dca).unwrap();
        assert_eq!(dca_out.notional, buy_out.notional / Decimal::from(4));
    }

    #[test]
    fn zero_quantity_when_notional_too_small() {
        let mut input = base_input();
        input.equity = Decimal::new(1, 0); // $1 equity
        assert_eq!(size_position(&input).unwrap_err(), SizingError::ZeroQuantity);
    }
}
