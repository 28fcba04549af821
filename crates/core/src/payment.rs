//! Payment records shared by the order and debt ledgers.

use chrono::{DateTime, Utc};
use dealerflow_shared::types::{Money, OrderId, PaymentId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;

/// How money changed hands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentChannel {
    /// Cash at the counter.
    Cash,
    /// Bank transfer.
    BankTransfer,
    /// Card terminal.
    Card,
}

impl PaymentChannel {
    /// Returns the string representation of the channel.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::BankTransfer => "bank_transfer",
            Self::Card => "card",
        }
    }
}

/// Which ledger operation a payment was recorded through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentKind {
    /// Order deposit.
    Deposit,
    /// Order settlement.
    FullPayment,
    /// Payment against a manufacturer debt.
    DebtPayment,
}

impl PaymentKind {
    /// Returns the string representation of the kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::FullPayment => "full_payment",
            Self::DebtPayment => "debt_payment",
        }
    }
}

/// Caller-supplied payment details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentInput {
    /// Amount paid.
    pub amount: Money,
    /// Payment channel.
    pub channel: PaymentChannel,
    /// When the money was received; defaults to now.
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
    /// Free-form notes.
    #[serde(default)]
    pub notes: Option<String>,
    /// Order this payment settles, for debt payments.
    #[serde(default)]
    pub linked_order_id: Option<OrderId>,
    /// Client retry token; a repeated key is not applied twice.
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

impl PaymentInput {
    /// Creates a payment input with only the required fields.
    #[must_use]
    pub fn new(amount: Money, channel: PaymentChannel) -> Self {
        Self {
            amount,
            channel,
            paid_at: None,
            notes: None,
            linked_order_id: None,
            idempotency_key: None,
        }
    }

    /// Sets the idempotency key.
    #[must_use]
    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// Sets the linked order.
    #[must_use]
    pub fn linked_to(mut self, order_id: OrderId) -> Self {
        self.linked_order_id = Some(order_id);
        self
    }
}

/// A payment applied to an order or a debt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    /// Payment identifier.
    pub id: PaymentId,
    /// Operation the payment was recorded through.
    pub kind: PaymentKind,
    /// Amount paid.
    pub amount: Money,
    /// Payment channel.
    pub channel: PaymentChannel,
    /// When the money was received.
    pub paid_at: DateTime<Utc>,
    /// Staff member who recorded it.
    pub recorded_by: UserId,
    /// Free-form notes.
    pub notes: Option<String>,
    /// Linked order, for debt payments.
    pub linked_order_id: Option<OrderId>,
    /// Client retry token.
    pub idempotency_key: Option<String>,
}

impl PaymentRecord {
    /// Builds a record from caller input.
    #[must_use]
    pub fn from_input(
        input: PaymentInput,
        kind: PaymentKind,
        recorded_by: UserId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PaymentId::new(),
            kind,
            amount: input.amount,
            channel: input.channel,
            paid_at: input.paid_at.unwrap_or(now),
            recorded_by,
            notes: input.notes,
            linked_order_id: input.linked_order_id,
            idempotency_key: input.idempotency_key,
        }
    }
}

/// Result of applying a payment to a ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    /// The payment was new and has been applied.
    Applied(PaymentRecord),
    /// The idempotency key was already used; nothing changed.
    Replayed(PaymentRecord),
}

impl PaymentOutcome {
    /// The payment record, whether new or replayed.
    #[must_use]
    pub fn record(&self) -> &PaymentRecord {
        match self {
            Self::Applied(record) | Self::Replayed(record) => record,
        }
    }

    /// Returns true if the call changed state.
    #[must_use]
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

/// Finds a previously applied payment carrying the same idempotency key.
pub(crate) fn find_replay<'a>(
    payments: &'a [PaymentRecord],
    key: Option<&str>,
) -> Option<&'a PaymentRecord> {
    let key = key?;
    payments
        .iter()
        .find(|payment| payment.idempotency_key.as_deref() == Some(key))
}

/// Checks a retried payment against the one already applied under its key.
///
/// The retry must come through the same operation with the same amount.
pub(crate) fn check_replay(
    previous: &PaymentRecord,
    kind: PaymentKind,
    input: &PaymentInput,
) -> Result<PaymentOutcome, WorkflowError> {
    if previous.kind != kind {
        return Err(WorkflowError::validation(format!(
            "idempotency key already used for a {} payment",
            previous.kind.as_str()
        )));
    }
    if previous.amount != input.amount {
        return Err(WorkflowError::validation(format!(
            "idempotency key reused with a different amount ({} vs {})",
            input.amount, previous.amount
        )));
    }
    Ok(PaymentOutcome::Replayed(previous.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_input_defaults_paid_at_to_now() {
        let now = Utc::now();
        let record = PaymentRecord::from_input(
            PaymentInput::new(Money::from_minor(10), PaymentChannel::Cash),
            PaymentKind::Deposit,
            UserId::new(),
            now,
        );
        assert_eq!(record.paid_at, now);
        assert_eq!(record.amount, Money::from_minor(10));
    }

    #[test]
    fn test_find_replay_matches_key() {
        let now = Utc::now();
        let keyed = PaymentRecord::from_input(
            PaymentInput::new(Money::from_minor(10), PaymentChannel::Card)
                .with_idempotency_key("abc"),
            PaymentKind::DebtPayment,
            UserId::new(),
            now,
        );
        let payments = vec![keyed.clone()];
        assert_eq!(find_replay(&payments, Some("abc")), Some(&keyed));
        assert_eq!(find_replay(&payments, Some("other")), None);
        assert_eq!(find_replay(&payments, None), None);
    }

    #[test]
    fn test_check_replay_rejects_different_amount() {
        let previous = PaymentRecord::from_input(
            PaymentInput::new(Money::from_minor(10), PaymentChannel::Cash)
                .with_idempotency_key("k"),
            PaymentKind::Deposit,
            UserId::new(),
            Utc::now(),
        );
        let same = PaymentInput::new(Money::from_minor(10), PaymentChannel::Cash);
        let other = PaymentInput::new(Money::from_minor(11), PaymentChannel::Cash);
        assert!(
            !check_replay(&previous, PaymentKind::Deposit, &same)
                .unwrap()
                .is_applied()
        );
        assert!(check_replay(&previous, PaymentKind::Deposit, &other).is_err());
    }

    #[test]
    fn test_check_replay_rejects_other_operation() {
        let previous = PaymentRecord::from_input(
            PaymentInput::new(Money::from_minor(10), PaymentChannel::Cash)
                .with_idempotency_key("k"),
            PaymentKind::Deposit,
            UserId::new(),
            Utc::now(),
        );
        let retry = PaymentInput::new(Money::from_minor(10), PaymentChannel::Cash);
        assert!(matches!(
            check_replay(&previous, PaymentKind::FullPayment, &retry),
            Err(WorkflowError::Validation(_))
        ));
    }
}
