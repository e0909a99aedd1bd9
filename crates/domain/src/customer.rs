//! Customer aggregate: the owner of orders.

use chrono::{DateTime, Utc};
use common::{Actor, AggregateId};
use serde::{Deserialize, Serialize};
use store::Version;
use thiserror::Error;

use crate::aggregate::{Aggregate, AuditInfo, DomainEvent};

#[derive(Debug, Error)]
pub enum CustomerError {
    #[error("Customer has not been created")]
    NotCreated,

    #[error("Customer already registered")]
    AlreadyCreated,

    #[error("Customer name must not be empty")]
    InvalidName,

    #[error("Invalid email address: {0:?}")]
    InvalidEmail(String),

    #[error("Customer {customer_id} is inactive")]
    Inactive { customer_id: AggregateId },
}

impl CustomerError {
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            CustomerError::InvalidName | CustomerError::InvalidEmail(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum CustomerEvent {
    CustomerRegistered(CustomerRegisteredData),
    CustomerDeactivated(CustomerDeactivatedData),
}

impl DomainEvent for CustomerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CustomerEvent::CustomerRegistered(_) => "CustomerRegistered",
            CustomerEvent::CustomerDeactivated(_) => "CustomerDeactivated",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerRegisteredData {
    pub customer_id: AggregateId,
    pub name: String,
    pub email: String,
    pub registered_by: Actor,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerDeactivatedData {
    pub customer_id: AggregateId,
    pub deactivated_by: Actor,
    pub deactivated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Customer {
    id: Option<AggregateId>,

    #[serde(skip)]
    version: Version,

    name: String,

    /// Stored lower case.
    email: String,

    is_active: bool,
    audit: AuditInfo,
}

impl Aggregate for Customer {
    type Event = CustomerEvent;
    type Error = CustomerError;

    fn aggregate_type() -> &'static str {
        "Customer"
    }

    fn id(&self) -> Option<AggregateId> {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            CustomerEvent::CustomerRegistered(data) => {
                self.id = Some(data.customer_id);
                self.name = data.name;
                self.email = data.email;
                self.is_active = true;
            }
            CustomerEvent::CustomerDeactivated(_) => self.is_active = false,
        }
    }

    fn index_terms(&self) -> Vec<String> {
        if self.email.is_empty() {
            return Vec::new();
        }
        vec![Self::email_term(&self.email)]
    }

    fn audit_mut(&mut self) -> &mut AuditInfo {
        &mut self.audit
    }
}

impl Customer {
    pub fn email_term(email: &str) -> String {
        format!("email:{}", email.trim().to_lowercase())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn audit(&self) -> &AuditInfo {
        &self.audit
    }

    /// Fails unless the customer exists and may place orders.
    pub fn ensure_can_order(&self) -> Result<AggregateId, CustomerError> {
        let customer_id = self.id.ok_or(CustomerError::NotCreated)?;
        if !self.is_active {
            return Err(CustomerError::Inactive { customer_id });
        }
        Ok(customer_id)
    }

    pub fn register(
        &self,
        customer_id: AggregateId,
        name: &str,
        email: &str,
        actor: &Actor,
    ) -> Result<Vec<CustomerEvent>, CustomerError> {
        if self.id.is_some() {
            return Err(CustomerError::AlreadyCreated);
        }
        let name = name.trim();
        if name.is_empty() {
            return Err(CustomerError::InvalidName);
        }
        let email = email.trim().to_lowercase();
        if !is_plausible_email(&email) {
            return Err(CustomerError::InvalidEmail(email));
        }

        Ok(vec![CustomerEvent::CustomerRegistered(
            CustomerRegisteredData {
                customer_id,
                name: name.to_string(),
                email,
                registered_by: actor.clone(),
                registered_at: Utc::now(),
            },
        )])
    }

    /// Deactivating an inactive customer is a no-op.
    pub fn deactivate(&self, actor: &Actor) -> Result<Vec<CustomerEvent>, CustomerError> {
        let customer_id = self.id.ok_or(CustomerError::NotCreated)?;
        if !self.is_active {
            return Ok(Vec::new());
        }
        Ok(vec![CustomerEvent::CustomerDeactivated(
            CustomerDeactivatedData {
                customer_id,
                deactivated_by: actor.clone(),
                deactivated_at: Utc::now(),
            },
        )])
    }
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !domain.contains('@'),
        None => false,
    }
}
