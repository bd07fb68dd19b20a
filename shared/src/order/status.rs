//! Order status state machine
//!
//! The forward chain is strict: no transition may skip a state and nothing
//! leaves a terminal state. Cancellation branches off every pre-dispatch
//! state; a decline can only happen while the order is still `PENDING`.

use serde::{Deserialize, Serialize};

/// Order status
///
/// ```text
/// PENDING → ACCEPTED → IN_COOKING → OUT_FOR_DELIVERY → COMPLETED
///    │          │           │
///    │          └───────────┴──→ CANCELLED
///    ├──→ CANCELLED
///    └──→ DECLINED
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[default]
    Pending,
    Accepted,
    InCooking,
    OutForDelivery,
    Completed,
    Cancelled,
    Declined,
}

impl OrderStatus {
    /// Whether no further transition is permitted from this status
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Completed | OrderStatus::Cancelled | OrderStatus::Declined
        )
    }

    /// Whether the order can still be cancelled by the customer
    pub fn is_cancellable(self) -> bool {
        matches!(
            self,
            OrderStatus::Pending | OrderStatus::Accepted | OrderStatus::InCooking
        )
    }

    /// Whether `self → next` is a legal edge of the state machine
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match (self, next) {
            (Pending, Accepted) => true,
            (Accepted, InCooking) => true,
            (InCooking, OutForDelivery) => true,
            (OutForDelivery, Completed) => true,
            (Pending, Declined) => true,
            (from, Cancelled) => from.is_cancellable(),
            _ => false,
        }
    }

    /// The unique predecessor a collaborator-driven advance must observe.
    ///
    /// `CANCELLED` has several predecessors and is not reachable through an
    /// advance; customer cancellation goes through its own compare-and-set
    /// path against the currently observed status.
    pub fn advance_predecessor(next: OrderStatus) -> Option<OrderStatus> {
        use OrderStatus::*;
        match next {
            Accepted => Some(Pending),
            InCooking => Some(Accepted),
            OutForDelivery => Some(InCooking),
            Completed => Some(OutForDelivery),
            Declined => Some(Pending),
            Pending | Cancelled => None,
        }
    }
}
