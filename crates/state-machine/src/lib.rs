//! Declarative order-state transition table (§4.2). Pure validation, no
//! side effects — `order-manager` is the only crate that pairs a transition
//! with a write.

use core_types::{OrderError, OrderState};

const TRANSITIONS: &[(OrderState, OrderState)] = &[
    (OrderState::Idle, OrderState::SignalReceived),
    (OrderState::SignalReceived, OrderState::Validating),
    (OrderState::Validating, OrderState::OrderPending),
    (OrderState::Validating, OrderState::Rejected),
    (OrderState::OrderPending, OrderState::OrderSent),
    (OrderState::OrderPending, OrderState::Failed),
    (OrderState::OrderSent, OrderState::PartialFilled),
    (OrderState::OrderSent, OrderState::FullyFilled),
    (OrderState::OrderSent, OrderState::Cancelled),
    (OrderState::OrderSent, OrderState::Rejected),
    (OrderState::OrderSent, OrderState::Failed),
    (OrderState::PartialFilled, OrderState::PartialFilled),
    (OrderState::PartialFilled, OrderState::FullyFilled),
    (OrderState::PartialFilled, OrderState::Cancelled),
];

/// True if `from -> to` is a legal transition, or a no-op (`from == to`) on a
/// non-terminal state — idempotent re-application is handled by the caller,
/// not by treating it as "legal" here except where explicitly tabled
/// (PartialFilled -> PartialFilled, for repeated partial-fill callbacks).
pub fn can_transition(from: OrderState, to: OrderState) -> bool {
    TRANSITIONS.contains(&(from, to))
}

pub fn transitions_from(from: OrderState) -> Vec<OrderState> {
    TRANSITIONS.iter().filter(|(f, _)| *f == from).map(|(_, t)| *t).collect()
}

/// Validate a requested transition, producing the typed error the Order
/// Manager surfaces to its caller on failure.
pub fn validate_transition(from: OrderState, to: OrderState) -> Result<(), OrderError> {
    if can_transition(from, to) {
        Ok(())
    } else {
        Err(OrderError::InvalidStateTransition { from, to })
    }
}
