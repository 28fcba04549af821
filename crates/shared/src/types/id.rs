//! Typed IDs for type-safe entity references.
//!
//! Using typed IDs prevents accidentally passing an `OrderId` where a
//! `DealerRequestId` is expected.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Macro to generate typed ID wrappers.
macro_rules! typed_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Creates a new random ID using UUID v7 (time-ordered).
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Creates an ID from an existing UUID.
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the inner UUID.
            #[must_use]
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

typed_id!(UserId, "Unique identifier for a staff user.");
typed_id!(DealershipId, "Unique identifier for a dealership.");
typed_id!(ManufacturerId, "Unique identifier for a vehicle manufacturer.");
typed_id!(CustomerId, "Unique identifier for a customer.");
typed_id!(VehicleId, "Unique identifier for a vehicle model.");
typed_id!(OrderId, "Unique identifier for a customer order.");
typed_id!(DealerRequestId, "Unique identifier for a dealer vehicle request.");
typed_id!(DebtId, "Unique identifier for a manufacturer debt ledger.");
typed_id!(PaymentId, "Unique identifier for a recorded payment.");
typed_id!(ContractFileId, "Unique identifier for an uploaded contract file.");

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_ids_are_time_ordered() {
        let first = OrderId::new();
        let second = OrderId::new();
        assert_ne!(first, second);
        assert_eq!(first.into_inner().get_version_num(), 7);
    }

    #[test]
    fn test_id_roundtrip_through_string() {
        let id = VehicleId::new();
        let parsed = VehicleId::from_str(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
        assert!(VehicleId::from_str("not-a-uuid").is_err());
    }

    #[test]
    fn test_id_serializes_as_bare_uuid() {
        let uuid = Uuid::nil();
        let json = serde_json::to_string(&DebtId::from_uuid(uuid)).unwrap();
        assert_eq!(json, format!("\"{uuid}\""));
    }
}
