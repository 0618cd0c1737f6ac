use serde::{Deserialize, Serialize};

/// Trading action an agent (or the ballot) can recommend.
///
/// Kept as a closed tagged enum rather than a free-form string: the ballot,
/// sizer and validator all match exhaustively on this set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Buy,
    Sell,
    Hold,
    Maintain,
    Reduce,
    Increase,
    Dca,
}

impl Action {
    /// True for actions that open or grow a long position and therefore need sizing.
    pub fn is_entry(self) -> bool {
        matches!(self, Action::Buy | Action::Dca | Action::Increase)
    }

    pub fn is_exit(self) -> bool {
        matches!(self, Action::Sell | Action::Reduce)
    }

    /// Tie-break order for the ballot: inaction preferred, then alphabetical.
    pub fn tie_break_rank(self) -> (u8, &'static str) {
        match self {
            Action::Hold => (0, "HOLD"),
            Action::Maintain => (1, "MAINTAIN"),
            Action::Buy => (2, "BUY"),
            Action::Dca => (2, "DCA"),
            Action::Increase => (2, "INCREASE"),
            Action::Reduce => (2, "REDUCE"),
            Action::Sell => (2, "SELL"),
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Action::Buy => "BUY",
            Action::Sell => "SELL",
            Action::Hold => "HOLD",
            Action::Maintain => "MAINTAIN",
            Action::Reduce => "REDUCE",
            Action::Increase => "INCREASE",
            Action::Dca => "DCA",
        };
        write!(f, "{s}")
    }
}

/// Side of a broker order. Narrower than `Action`: only BUY/SELL ever reach the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl TryFrom<Action> for OrderSide {
    type Error = &'static str;

    fn try_from(action: Action) -> Result<Self, Self::Error> {
        match action {
            Action::Buy | Action::Dca | Action::Increase => Ok(OrderSide::Buy),
            Action::Sell | Action::Reduce => Ok(OrderSide::Sell),
            Action::Hold | Action::Maintain => Err("action does not map to an order side"),
        }
    }
}
