//! Eight deterministic hard rules (§4.4). No LLM involvement: this is the
//! hard floor beneath the War Room's judgment calls.

use chrono::{DateTime, Duration, Utc};
use core_types::{OrderSide, RiskContext, RuleViolation};
use rust_decimal::Decimal;

pub const MAX_POSITION_SIZE_PCT: Decimal = Decimal::from_parts(30, 0, 0, false, 2); // 0.30
pub const MAX_PORTFOLIO_RISK_PCT: Decimal = Decimal::from_parts(5, 0, 0, false, 2); // 0.05
pub const MAX_POSITION_COUNT: u32 = 20;
pub const DUPLICATE_WINDOW_MINUTES: i64 = 5;

/// A candidate order, already sized, awaiting the hard-rule pass.
#[derive(Debug, Clone)]
pub struct OrderDraft {
    pub ticker: String,
    pub side: OrderSide,
    pub requested_size_pct: Decimal,
    pub order_notional: Decimal,
    pub stop_loss: Option<Decimal>,
    pub entry_price: Decimal,
    pub exchange: String,
}

impl OrderDraft {
    fn stop_distance_pct(&self) -> Decimal {
        match self.stop_loss {
            Some(sl) if self.entry_price != Decimal::ZERO => ((self.entry_price - sl).abs()) / self.entry_price,
            _ => Decimal::ZERO,
        }
    }
}

/// Evaluated in order; the first failing rule short-circuits with its code.
pub fn validate(
    draft: &OrderDraft,
    ctx: &RiskContext,
    market_is_open: bool,
    now: DateTime<Utc>,
) -> Result<(), RuleViolation> {
    rule_1_position_size_cap(draft)?;
    rule_2_aggregate_portfolio_risk(draft, ctx)?;
    rule_3_stop_loss_required(draft)?;
    rule_4_sufficient_cash(draft, ctx)?;
    rule_5_blacklist(draft, ctx)?;
    rule_6_market_closed(draft, market_is_open)?;
    rule_7_duplicate_order(draft, ctx, now)?;
    rule_8_position_count_cap(ctx)?;
    Ok(())
}

fn violation(rule_code: u8, reason: impl Into<String>) -> RuleViolation {
    RuleViolation { rule_code, reason: reason.into() }
}

fn rule_1_position_size_cap(draft: &OrderDraft) -> Result<(), RuleViolation> {
    if draft.requested_size_pct > MAX_POSITION_SIZE_PCT {
        return Err(violation(1, format!("requested size {}% exceeds 30% cap", draft.requested_size_pct * Decimal::from(100))));
    }
    Ok(())
}

fn rule_2_aggregate_portfolio_risk(draft: &OrderDraft, ctx: &RiskContext) -> Result<(), RuleViolation> {
    let this_order_risk = draft.requested_size_pct * draft.stop_distance_pct();
    let projected = ctx.aggregate_position_risk + this_order_risk;
    if projected > MAX_PORTFOLIO_RISK_PCT {
        return Err(violation(2, format!("aggregate portfolio risk {projected} would exceed 5% cap")));
    }
    Ok(())
}

fn rule_3_stop_loss_required(draft: &OrderDraft) -> Result<(), RuleViolation> {
    if draft.side == OrderSide::Buy && draft.stop_loss.is_none() {
        return Err(violation(3, "BUY order missing required stop_loss"));
    }
    Ok(())
}

fn rule_4_sufficient_cash(draft: &OrderDraft, ctx: &RiskContext) -> Result<(), RuleViolation> {
    if draft.side == OrderSide::Buy && ctx.cash < draft.order_notional {
        return Err(violation(4, format!("cash {} insufficient for notional {}", ctx.cash, draft.order_notional)));
    }
    Ok(())
}

fn rule_5_blacklist(draft: &OrderDraft, ctx: &RiskContext) -> Result<(), RuleViolation> {
    if ctx.blacklist.contains(&draft.ticker) {
        return Err(violation(5, format!("{} is blacklisted", draft.ticker)));
    }
    Ok(())
}

fn rule_6_market_closed(draft: &OrderDraft, market_is_open: bool) -> Result<(), RuleViolation> {
    if draft.side == OrderSide::Buy && !market_is_open {
        return Err(violation(6, format!("market for {} is closed", draft.exchange)));
    }
    Ok(())
}

fn rule_7_duplicate_order(draft: &OrderDraft, ctx: &RiskContext, now: DateTime<Utc>) -> Result<(), RuleViolation> {
    let window = Duration::minutes(DUPLICATE_WINDOW_MINUTES);
    let duplicate = ctx
        .recent_orders
        .iter()
        .any(|o| o.ticker == draft.ticker && o.side == draft.side && now - o.placed_at < window);
    if duplicate {
        return Err(violation(7, format!("duplicate {:?} order for {} within {} min window", draft.side, draft.ticker, DUPLICATE_WINDOW_MINUTES)));
    }
    Ok(())
}

fn rule_8_position_count_cap(ctx: &RiskContext) -> Result<(), RuleViolation> {
    if ctx.open_position_count >= MAX_POSITION_COUNT {
        return Err(violation(8, format!("open position count {} at cap {}", ctx.open_position_count, MAX_POSITION_COUNT)));
    }
    Ok(())
}
