//! Append-only status history.
//!
//! Each accepted transition is stored as a [`StatusHistoryEvent`] keyed by
//! (entity kind, entity id, sequence). The log is forward-chronological and
//! can be replayed through the entity's transition table to reproduce its
//! current status.

use chrono::{DateTime, Utc};
use dealerflow_shared::types::UserId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::WorkflowError;

/// The aggregates the engine persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A customer order.
    Order,
    /// A dealer vehicle request.
    DealerRequest,
    /// A stock ledger row.
    StockEntry,
    /// A manufacturer debt ledger.
    ManufacturerDebt,
}

impl EntityKind {
    /// Returns the string representation of the kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Order => "order",
            Self::DealerRequest => "dealer_request",
            Self::StockEntry => "stock_entry",
            Self::ManufacturerDebt => "manufacturer_debt",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One accepted status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusHistoryEvent {
    /// Aggregate kind.
    pub entity: EntityKind,
    /// Aggregate id.
    pub entity_id: Uuid,
    /// 1-based position in the aggregate's log, assigned by the store.
    pub sequence: u64,
    /// When the transition happened.
    pub timestamp: DateTime<Utc>,
    /// Status before the transition; `None` for the creation event.
    pub old_status: Option<String>,
    /// Status after the transition.
    pub new_status: String,
    /// Who performed it.
    pub actor: UserId,
    /// Free-form notes (reasons, recipients).
    pub notes: Option<String>,
}

/// A status enum with an explicit transition table.
pub trait StateMachine: Copy + Eq + Sized {
    /// The aggregate this machine governs.
    const ENTITY: EntityKind;

    /// Status every instance is created in.
    fn initial() -> Self;

    /// Canonical string form.
    fn as_str(&self) -> &'static str;

    /// Parses the canonical form (and accepted aliases).
    fn parse(s: &str) -> Option<Self>;

    /// Returns true if `self → to` is in the transition table.
    fn can_transition(self, to: Self) -> bool;

    /// Returns true if no transition leaves this status.
    fn is_terminal(self) -> bool;

    /// Checks the table, returning `InvalidTransition` on a miss.
    fn ensure_transition(self, to: Self) -> Result<(), WorkflowError> {
        if self.can_transition(to) {
            Ok(())
        } else {
            Err(WorkflowError::InvalidTransition {
                entity: Self::ENTITY,
                from: self.as_str(),
                to: to.as_str(),
            })
        }
    }
}

/// A transition accepted by a state machine, pending persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition<S> {
    /// Status before.
    pub from: S,
    /// Status after.
    pub to: S,
}

impl<S: StateMachine> Transition<S> {
    /// Turns the transition into a history event (sequence assigned on commit).
    #[must_use]
    pub fn into_event(
        self,
        entity_id: Uuid,
        actor: UserId,
        timestamp: DateTime<Utc>,
        notes: Option<String>,
    ) -> StatusHistoryEvent {
        StatusHistoryEvent {
            entity: S::ENTITY,
            entity_id,
            sequence: 0,
            timestamp,
            old_status: Some(self.from.as_str().to_string()),
            new_status: self.to.as_str().to_string(),
            actor,
            notes,
        }
    }
}

/// The creation event for a new aggregate.
#[must_use]
pub fn creation_event<S: StateMachine>(
    entity_id: Uuid,
    actor: UserId,
    timestamp: DateTime<Utc>,
    notes: Option<String>,
) -> StatusHistoryEvent {
    StatusHistoryEvent {
        entity: S::ENTITY,
        entity_id,
        sequence: 0,
        timestamp,
        old_status: None,
        new_status: S::initial().as_str().to_string(),
        actor,
        notes,
    }
}

/// Replays a log through the transition table and returns the final status.
///
/// # Errors
///
/// Returns a validation error if the log is empty, out of order, does not
/// start with a creation event in the initial status, or contains a
/// transition the table does not allow.
pub fn replay<S: StateMachine>(events: &[StatusHistoryEvent]) -> Result<S, WorkflowError> {
    let corrupt = |reason: String| WorkflowError::validation(format!("corrupt history: {reason}"));

    let (first, rest) = events
        .split_first()
        .ok_or_else(|| corrupt("log is empty".into()))?;

    if first.old_status.is_some() || first.new_status != S::initial().as_str() {
        return Err(corrupt(format!(
            "first event must create the entity in {}",
            S::initial().as_str()
        )));
    }

    let mut current = S::initial();
    let mut last_sequence = first.sequence;

    for event in rest {
        if event.sequence <= last_sequence {
            return Err(corrupt(format!("sequence {} out of order", event.sequence)));
        }
        let from = event
            .old_status
            .as_deref()
            .and_then(S::parse)
            .ok_or_else(|| corrupt(format!("event {} has no prior status", event.sequence)))?;
        let to = S::parse(&event.new_status)
            .ok_or_else(|| corrupt(format!("unknown status {}", event.new_status)))?;
        if from != current {
            return Err(corrupt(format!(
                "event {} starts from {} but entity was {}",
                event.sequence,
                from.as_str(),
                current.as_str()
            )));
        }
        current.ensure_transition(to)?;
        current = to;
        last_sequence = event.sequence;
    }

    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Light {
        Red,
        Green,
    }

    impl StateMachine for Light {
        const ENTITY: EntityKind = EntityKind::Order;

        fn initial() -> Self {
            Self::Red
        }

        fn as_str(&self) -> &'static str {
            match self {
                Self::Red => "red",
                Self::Green => "green",
            }
        }

        fn parse(s: &str) -> Option<Self> {
            match s {
                "red" => Some(Self::Red),
                "green" => Some(Self::Green),
                _ => None,
            }
        }

        fn can_transition(self, to: Self) -> bool {
            self != to
        }

        fn is_terminal(self) -> bool {
            false
        }
    }

    fn sequenced(mut events: Vec<StatusHistoryEvent>) -> Vec<StatusHistoryEvent> {
        for (index, event) in events.iter_mut().enumerate() {
            event.sequence = index as u64 + 1;
        }
        events
    }

    #[test]
    fn test_replay_follows_transitions() {
        let id = Uuid::now_v7();
        let actor = UserId::new();
        let now = Utc::now();
        let events = sequenced(vec![
            creation_event::<Light>(id, actor, now, None),
            Transition {
                from: Light::Red,
                to: Light::Green,
            }
            .into_event(id, actor, now, None),
            Transition {
                from: Light::Green,
                to: Light::Red,
            }
            .into_event(id, actor, now, None),
        ]);
        assert_eq!(replay::<Light>(&events).unwrap(), Light::Red);
    }

    #[test]
    fn test_replay_rejects_empty_and_gaps() {
        assert!(replay::<Light>(&[]).is_err());

        let id = Uuid::now_v7();
        let actor = UserId::new();
        let now = Utc::now();
        let events = sequenced(vec![
            creation_event::<Light>(id, actor, now, None),
            Transition {
                from: Light::Green,
                to: Light::Red,
            }
            .into_event(id, actor, now, None),
        ]);
        assert!(matches!(
            replay::<Light>(&events),
            Err(WorkflowError::Validation(_))
        ));
    }

    #[test]
    fn test_replay_rejects_illegal_transition() {
        let id = Uuid::now_v7();
        let actor = UserId::new();
        let now = Utc::now();
        let events = sequenced(vec![
            creation_event::<Light>(id, actor, now, None),
            Transition {
                from: Light::Red,
                to: Light::Red,
            }
            .into_event(id, actor, now, None),
        ]);
        assert!(matches!(
            replay::<Light>(&events),
            Err(WorkflowError::InvalidTransition { .. })
        ));
    }
}
