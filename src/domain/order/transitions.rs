use super::value_objects::OrderStatus;

// ============================================================================
// Order State Machine - Transition Table
// ============================================================================
//
// Legality and side effects are data: each row names a legal
// (current, target) edge and the effects the engine applies for it.
//
//   pending → confirmed → processing → shipped → delivered
//      │          │            │
//      └──────────┴────────────┴──→ cancelled
//
// `shipped` and `delivered` are committed-to-fulfillment and cannot be
// cancelled.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Mark payment completed unless it already is
    CompletePayment,
    /// Issue a tracking number if the order has none
    AssignTracking,
    /// Carrier, shipped date, estimated delivery and tracking URL
    PrepareShipment,
    /// Record the actual delivery time
    RecordDelivery,
    /// Keep the cancellation note as the reason
    RecordCancellation,
    /// Return stock to inventory, after the status write commits
    RestoreInventory,
}

impl Effect {
    /// Effects that run only for the writer that won the status guard
    pub fn is_post_commit(&self) -> bool {
        matches!(self, Effect::RestoreInventory)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct TransitionRule {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub effects: &'static [Effect],
}

const CANCEL_EFFECTS: &[Effect] = &[Effect::RecordCancellation, Effect::RestoreInventory];

pub const TRANSITIONS: &[TransitionRule] = &[
    TransitionRule {
        from: OrderStatus::Pending,
        to: OrderStatus::Confirmed,
        effects: &[Effect::CompletePayment],
    },
    TransitionRule {
        from: OrderStatus::Confirmed,
        to: OrderStatus::Processing,
        effects: &[Effect::AssignTracking],
    },
    TransitionRule {
        from: OrderStatus::Processing,
        to: OrderStatus::Shipped,
        effects: &[Effect::AssignTracking, Effect::PrepareShipment],
    },
    TransitionRule {
        from: OrderStatus::Shipped,
        to: OrderStatus::Delivered,
        effects: &[Effect::RecordDelivery],
    },
    TransitionRule {
        from: OrderStatus::Pending,
        to: OrderStatus::Cancelled,
        effects: CANCEL_EFFECTS,
    },
    TransitionRule {
        from: OrderStatus::Confirmed,
        to: OrderStatus::Cancelled,
        effects: CANCEL_EFFECTS,
    },
    TransitionRule {
        from: OrderStatus::Processing,
        to: OrderStatus::Cancelled,
        effects: CANCEL_EFFECTS,
    },
];

pub fn rule_for(from: OrderStatus, to: OrderStatus) -> Option<&'static TransitionRule> {
    TRANSITIONS.iter().find(|rule| rule.from == from && rule.to == to)
}

pub fn is_legal(from: OrderStatus, to: OrderStatus) -> bool {
    rule_for(from, to).is_some()
}

pub fn successors(from: OrderStatus) -> impl Iterator<Item = OrderStatus> {
    TRANSITIONS
        .iter()
        .filter(move |rule| rule.from == from)
        .map(|rule| rule.to)
}
