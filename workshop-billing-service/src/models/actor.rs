//! Authenticated caller as established by the upstream auth layer.

use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Staff,
    StoreOwner,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Staff => "staff",
            Role::StoreOwner => "store_owner",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "customer" => Ok(Role::Customer),
            "staff" => Ok(Role::Staff),
            "store_owner" => Ok(Role::StoreOwner),
            "admin" => Ok(Role::Admin),
            other => Err(AppError::Unauthorized(anyhow::anyhow!(
                "Unknown role '{}'",
                other
            ))),
        }
    }
}

/// Store-scoped capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Capability {
    CreateQuotations,
    CreateInvoices,
    ViewFinancials,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::CreateQuotations => "CREATE_QUOTATIONS",
            Capability::CreateInvoices => "CREATE_INVOICES",
            Capability::ViewFinancials => "VIEW_FINANCIALS",
        }
    }
}

impl FromStr for Capability {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CREATE_QUOTATIONS" => Ok(Capability::CreateQuotations),
            "CREATE_INVOICES" => Ok(Capability::CreateInvoices),
            "VIEW_FINANCIALS" => Ok(Capability::ViewFinancials),
            other => Err(AppError::Unauthorized(anyhow::anyhow!(
                "Unknown capability '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePermission {
    pub store_id: Uuid,
    pub capabilities: Vec<Capability>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub actor_id: Uuid,
    pub role: Role,
    pub store_permissions: Vec<StorePermission>,
}

impl Actor {
    pub fn customer(actor_id: Uuid) -> Self {
        Self {
            actor_id,
            role: Role::Customer,
            store_permissions: Vec::new(),
        }
    }

    pub fn staff(actor_id: Uuid, store_id: Uuid, capabilities: Vec<Capability>) -> Self {
        Self {
            actor_id,
            role: Role::Staff,
            store_permissions: vec![StorePermission {
                store_id,
                capabilities,
            }],
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Whether the actor holds `capability` on `store_id`. Admins hold everything.
    pub fn can(&self, store_id: Uuid, capability: Capability) -> bool {
        self.is_admin()
            || self.store_permissions.iter().any(|p| {
                p.store_id == store_id && p.capabilities.contains(&capability)
            })
    }

    /// Whether the actor holds any capability on `store_id`.
    pub fn is_member_of(&self, store_id: Uuid) -> bool {
        self.is_admin()
            || self
                .store_permissions
                .iter()
                .any(|p| p.store_id == store_id && !p.capabilities.is_empty())
    }

    /// Read access to a document owned by `customer_id` at `store_id`.
    pub fn can_view(&self, store_id: Uuid, customer_id: Uuid) -> bool {
        self.actor_id == customer_id || self.is_member_of(store_id)
    }

    pub fn require_view(&self, store_id: Uuid, customer_id: Uuid) -> Result<(), AppError> {
        if self.can_view(store_id, customer_id) {
            Ok(())
        } else {
            Err(AppError::Forbidden(anyhow::anyhow!(
                "Not allowed to view documents of store {}",
                store_id
            )))
        }
    }

    /// Figures for a store: financial viewers, document creators, or admins.
    pub fn require_financials(&self, store_id: Option<Uuid>) -> Result<(), AppError> {
        let allowed = match store_id {
            _ if self.is_admin() => true,
            Some(store_id) => [
                Capability::ViewFinancials,
                Capability::CreateQuotations,
                Capability::CreateInvoices,
            ]
            .into_iter()
            .any(|c| self.can(store_id, c)),
            None => false,
        };
        if allowed {
            Ok(())
        } else {
            Err(AppError::Forbidden(anyhow::anyhow!(
                "Missing {} permission",
                Capability::ViewFinancials.as_str()
            )))
        }
    }

    pub fn require(&self, store_id: Uuid, capability: Capability) -> Result<(), AppError> {
        if self.can(store_id, capability) {
            Ok(())
        } else {
            Err(AppError::Forbidden(anyhow::anyhow!(
                "Missing {} permission on store {}",
                capability.as_str(),
                store_id
            )))
        }
    }
}

/// Parse `<store_uuid>:<CAP>|<CAP>,<store_uuid>:<CAP>` into store permissions.
pub fn parse_store_permissions(raw: &str) -> Result<Vec<StorePermission>, AppError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (store, caps) = entry.split_once(':').ok_or_else(|| {
                AppError::Unauthorized(anyhow::anyhow!(
                    "Malformed store permission entry '{}'",
                    entry
                ))
            })?;
            let store_id = Uuid::parse_str(store.trim()).map_err(|_| {
                AppError::Unauthorized(anyhow::anyhow!("Invalid store id '{}'", store))
            })?;
            let capabilities = caps
                .split('|')
                .filter(|c| !c.trim().is_empty())
                .map(Capability::from_str)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(StorePermission {
                store_id,
                capabilities,
            })
        })
        .collect()
}
