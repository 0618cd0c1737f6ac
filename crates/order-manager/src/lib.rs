pub mod db;
pub mod manager;

pub use db::OrderDb;
pub use manager::OrderManager;

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::OrderSide;
    use event_bus::EventBus;
    use rust_decimal::Decimal;

    async fn manager() -> (OrderManager, EventBus) {
        let db = OrderDb::new("sqlite::memory:").await.unwrap();
        let bus = EventBus::new();
        (OrderManager::new(db, bus.clone()), bus)
    }

    fn signal() -> core_types::Signal {
        core_types::Signal::new("AAPL", core_types::Action::Buy, 0.8, 0.1, "test", core_types::Urgency::Med, None)
    }

    #[tokio::test]
    async fn happy_path_through_to_fill() {
        let (mgr, _bus) = manager().await;
        let signal = signal();
        let order = mgr.receive_signal(&signal, OrderSide::Buy, Decimal::from(10)).await.unwrap();
        mgr.begin_validation(order.id).await.unwrap();
        mgr.validated(order.id, Ok(())).await.unwrap();
        mgr.sent(order.id, "broker-123").await.unwrap();
        let filled = mgr.fully_filled(order.id, Decimal::from(150)).await.unwrap();
        assert_eq!(filled.status, core_types::OrderState::FullyFilled);
        assert_eq!(filled.filled_price, Some(Decimal::from(150)));
    }

    #[tokio::test]
    async fn fully_filled_twice_is_idempotent() {
        let (mgr, bus) = manager().await;
        let signal = signal();
        let order = mgr.receive_signal(&signal, OrderSide::Buy, Decimal::from(10)).await.unwrap();
        mgr.begin_validation(order.id).await.unwrap();
        mgr.validated(order.id, Ok(())).await.unwrap();
        mgr.sent(order.id, "broker-123").await.unwrap();
        mgr.fully_filled(order.id, Decimal::from(150)).await.unwrap();
        let second = mgr.fully_filled(order.id, Decimal::from(999)).await.unwrap();
        // No-op: price from the first call is retained, not overwritten.
        assert_eq!(second.filled_price, Some(Decimal::from(150)));
        // The repeat call must not republish OrderFilled (§8 idempotence property).
        assert_eq!(bus.history(core_types::Topic::OrderFilled).len(), 1);
    }

    #[tokio::test]
    async fn invalid_transition_is_rejected() {
        let (mgr, _bus) = manager().await;
        let signal = signal();
        let order = mgr.receive_signal(&signal, OrderSide::Buy, Decimal::from(10)).await.unwrap();
        let err = mgr.sent(order.id, "broker-123").await.unwrap_err();
        assert!(matches!(err, core_types::OrderError::InvalidStateTransition { .. }));
    }

    #[tokio::test]
    async fn rule_violation_rejects_order() {
        let (mgr, _bus) = manager().await;
        let signal = signal();
        let order = mgr.receive_signal(&signal, OrderSide::Buy, Decimal::from(10)).await.unwrap();
        mgr.begin_validation(order.id).await.unwrap();
        let violation = core_types::RuleViolation { rule_code: 4, reason: "insufficient cash".to_string() };
        let rejected = mgr.validated(order.id, Err(violation)).await.unwrap();
        assert_eq!(rejected.status, core_types::OrderState::Rejected);
    }
}
