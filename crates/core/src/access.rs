//! Actor context and role checks.
//!
//! Every engine call receives an [`ActorContext`] built by the caller from
//! verified session state. Tenant scoping is derived from it, never from
//! identifiers carried in request payloads.

use dealerflow_shared::types::{DealershipId, ManufacturerId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;
use crate::stock::StockOwner;

/// Staff role, ordered from lowest to highest privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Salesperson at a dealership.
    DealerStaff = 0,
    /// Manager at a dealership; approves dealer requests.
    DealerManager = 1,
    /// Manufacturer employee; ships dealer requests.
    ManufacturerStaff = 2,
    /// Platform administrator.
    Admin = 3,
}

impl Role {
    /// Parse a role from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "dealer_staff" => Some(Self::DealerStaff),
            "dealer_manager" => Some(Self::DealerManager),
            "manufacturer_staff" | "evm_staff" => Some(Self::ManufacturerStaff),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    /// Returns the string representation of the role.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DealerStaff => "dealer_staff",
            Self::DealerManager => "dealer_manager",
            Self::ManufacturerStaff => "manufacturer_staff",
            Self::Admin => "admin",
        }
    }

    /// Returns true for roles that belong to a dealership.
    #[must_use]
    pub fn is_dealer_role(&self) -> bool {
        matches!(self, Self::DealerStaff | Self::DealerManager)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The authenticated caller of an engine operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorContext {
    /// The staff member acting.
    pub user_id: UserId,
    /// Their role.
    pub role: Role,
    /// Their dealership, for dealer roles.
    pub dealership_id: Option<DealershipId>,
    /// Their manufacturer, for manufacturer staff.
    pub manufacturer_id: Option<ManufacturerId>,
}

impl ActorContext {
    /// A salesperson at `dealership_id`.
    #[must_use]
    pub fn dealer_staff(user_id: UserId, dealership_id: DealershipId) -> Self {
        Self {
            user_id,
            role: Role::DealerStaff,
            dealership_id: Some(dealership_id),
            manufacturer_id: None,
        }
    }

    /// A manager at `dealership_id`.
    #[must_use]
    pub fn dealer_manager(user_id: UserId, dealership_id: DealershipId) -> Self {
        Self {
            user_id,
            role: Role::DealerManager,
            dealership_id: Some(dealership_id),
            manufacturer_id: None,
        }
    }

    /// An employee of `manufacturer_id`.
    #[must_use]
    pub fn manufacturer_staff(user_id: UserId, manufacturer_id: ManufacturerId) -> Self {
        Self {
            user_id,
            role: Role::ManufacturerStaff,
            dealership_id: None,
            manufacturer_id: Some(manufacturer_id),
        }
    }

    /// A platform administrator.
    #[must_use]
    pub fn admin(user_id: UserId) -> Self {
        Self {
            user_id,
            role: Role::Admin,
            dealership_id: None,
            manufacturer_id: None,
        }
    }

    /// Returns true if the actor is dealer staff of `dealership_id`.
    #[must_use]
    pub fn belongs_to(&self, dealership_id: DealershipId) -> bool {
        self.role.is_dealer_role() && self.dealership_id == Some(dealership_id)
    }

    /// Returns true if the actor is staff of `manufacturer_id`.
    #[must_use]
    pub fn works_for(&self, manufacturer_id: ManufacturerId) -> bool {
        self.role == Role::ManufacturerStaff && self.manufacturer_id == Some(manufacturer_id)
    }
}

/// Stateless role checks used by the engine before any state is touched.
pub struct AccessPolicy;

impl AccessPolicy {
    /// Dealer staff or manager of the dealership, or an admin.
    pub fn require_dealer_member(
        actor: &ActorContext,
        dealership_id: DealershipId,
        action: &'static str,
    ) -> Result<(), WorkflowError> {
        if actor.role == Role::Admin || actor.belongs_to(dealership_id) {
            return Ok(());
        }
        Err(WorkflowError::forbidden(
            action,
            format!("{} is not staff of dealership {dealership_id}", actor.role),
        ))
    }

    /// Dealer manager of the dealership, or an admin.
    ///
    /// This is the approving role for dealer vehicle requests; any other
    /// role is refused regardless of what the caller claims.
    pub fn require_dealer_manager(
        actor: &ActorContext,
        dealership_id: DealershipId,
        action: &'static str,
    ) -> Result<(), WorkflowError> {
        if actor.role == Role::Admin
            || (actor.role == Role::DealerManager && actor.belongs_to(dealership_id))
        {
            return Ok(());
        }
        Err(WorkflowError::forbidden(
            action,
            format!(
                "requires dealer_manager of dealership {dealership_id}, actor is {}",
                actor.role
            ),
        ))
    }

    /// Staff of the manufacturer, or an admin.
    pub fn require_manufacturer(
        actor: &ActorContext,
        manufacturer_id: ManufacturerId,
        action: &'static str,
    ) -> Result<(), WorkflowError> {
        if actor.role == Role::Admin || actor.works_for(manufacturer_id) {
            return Ok(());
        }
        Err(WorkflowError::forbidden(
            action,
            format!(
                "requires manufacturer_staff of manufacturer {manufacturer_id}, actor is {}",
                actor.role
            ),
        ))
    }

    /// Who may add units to a stock pool.
    pub fn require_stock_writer(
        actor: &ActorContext,
        owner: &StockOwner,
        action: &'static str,
    ) -> Result<(), WorkflowError> {
        match owner {
            StockOwner::Manufacturer(manufacturer_id) => {
                Self::require_manufacturer(actor, *manufacturer_id, action)
            }
            StockOwner::Dealer(dealership_id) => {
                Self::require_dealer_manager(actor, *dealership_id, action)
            }
        }
    }

    /// Dealer manager of the debtor dealership, staff of the creditor
    /// manufacturer, or an admin.
    pub fn require_debt_payer(
        actor: &ActorContext,
        dealership_id: DealershipId,
        manufacturer_id: ManufacturerId,
        action: &'static str,
    ) -> Result<(), WorkflowError> {
        if actor.works_for(manufacturer_id) {
            return Ok(());
        }
        Self::require_dealer_manager(actor, dealership_id, action)
    }

    /// Read access to a dealership's data.
    pub fn require_reader(
        actor: &ActorContext,
        dealership_id: DealershipId,
        action: &'static str,
    ) -> Result<(), WorkflowError> {
        if actor.role >= Role::ManufacturerStaff {
            return Ok(());
        }
        Self::require_dealer_member(actor, dealership_id, action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_role_parse_roundtrip() {
        for role in [
            Role::DealerStaff,
            Role::DealerManager,
            Role::ManufacturerStaff,
            Role::Admin,
        ] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("EVM_STAFF"), Some(Role::ManufacturerStaff));
        assert_eq!(Role::parse("owner"), None);
    }

    #[test]
    fn test_role_hierarchy() {
        assert!(Role::DealerStaff < Role::DealerManager);
        assert!(Role::DealerManager < Role::ManufacturerStaff);
        assert!(Role::ManufacturerStaff < Role::Admin);
    }

    #[rstest]
    #[case(Role::DealerStaff, true, false)]
    #[case(Role::DealerManager, true, true)]
    #[case(Role::DealerManager, false, false)]
    #[case(Role::ManufacturerStaff, false, false)]
    #[case(Role::Admin, false, true)]
    fn test_require_dealer_manager(
        #[case] role: Role,
        #[case] same_dealership: bool,
        #[case] allowed: bool,
    ) {
        let dealership = DealershipId::new();
        let actor = ActorContext {
            user_id: UserId::new(),
            role,
            dealership_id: if role.is_dealer_role() {
                Some(if same_dealership {
                    dealership
                } else {
                    DealershipId::new()
                })
            } else {
                None
            },
            manufacturer_id: None,
        };
        let result = AccessPolicy::require_dealer_manager(&actor, dealership, "approve request");
        assert_eq!(result.is_ok(), allowed);
        if let Err(err) = result {
            assert_eq!(err.error_code(), "FORBIDDEN_TRANSITION");
        }
    }

    #[test]
    fn test_manufacturer_scoped_to_own_company() {
        let manufacturer = ManufacturerId::new();
        let maker = ActorContext::manufacturer_staff(UserId::new(), manufacturer);
        let rival = ActorContext::manufacturer_staff(UserId::new(), ManufacturerId::new());
        let admin = ActorContext::admin(UserId::new());
        let manager = ActorContext::dealer_manager(UserId::new(), DealershipId::new());

        assert!(AccessPolicy::require_manufacturer(&maker, manufacturer, "x").is_ok());
        assert!(AccessPolicy::require_manufacturer(&rival, manufacturer, "x").is_err());
        assert!(AccessPolicy::require_manufacturer(&admin, manufacturer, "x").is_ok());
        assert!(AccessPolicy::require_manufacturer(&manager, manufacturer, "x").is_err());
    }

    #[test]
    fn test_dealer_member_other_dealership_refused() {
        let actor = ActorContext::dealer_staff(UserId::new(), DealershipId::new());
        assert!(AccessPolicy::require_dealer_member(&actor, DealershipId::new(), "x").is_err());
        assert!(
            AccessPolicy::require_dealer_member(&actor, actor.dealership_id.unwrap(), "x").is_ok()
        );
    }

    #[test]
    fn test_stock_writer_depends_on_pool() {
        let dealership = DealershipId::new();
        let manufacturer = ManufacturerId::new();
        let manager = ActorContext::dealer_manager(UserId::new(), dealership);
        let maker = ActorContext::manufacturer_staff(UserId::new(), manufacturer);
        let dealer_pool = StockOwner::Dealer(dealership);
        let maker_pool = StockOwner::Manufacturer(manufacturer);
        let rival_pool = StockOwner::Manufacturer(ManufacturerId::new());

        assert!(AccessPolicy::require_stock_writer(&manager, &dealer_pool, "x").is_ok());
        assert!(AccessPolicy::require_stock_writer(&manager, &maker_pool, "x").is_err());
        assert!(AccessPolicy::require_stock_writer(&maker, &maker_pool, "x").is_ok());
        assert!(AccessPolicy::require_stock_writer(&maker, &rival_pool, "x").is_err());
        assert!(AccessPolicy::require_stock_writer(&maker, &dealer_pool, "x").is_err());
    }

    #[test]
    fn test_debt_payer_and_reader() {
        let dealership = DealershipId::new();
        let manufacturer = ManufacturerId::new();
        let staff = ActorContext::dealer_staff(UserId::new(), dealership);
        let manager = ActorContext::dealer_manager(UserId::new(), dealership);
        let maker = ActorContext::manufacturer_staff(UserId::new(), manufacturer);
        let rival = ActorContext::manufacturer_staff(UserId::new(), ManufacturerId::new());

        assert!(AccessPolicy::require_debt_payer(&staff, dealership, manufacturer, "x").is_err());
        assert!(AccessPolicy::require_debt_payer(&manager, dealership, manufacturer, "x").is_ok());
        assert!(AccessPolicy::require_debt_payer(&maker, dealership, manufacturer, "x").is_ok());
        assert!(AccessPolicy::require_debt_payer(&rival, dealership, manufacturer, "x").is_err());
        assert!(AccessPolicy::require_reader(&staff, dealership, "x").is_ok());
        assert!(AccessPolicy::require_reader(&maker, dealership, "x").is_ok());
    }
}
