//! Customer commands.

use std::sync::Arc;

use async_trait::async_trait;
use common::{Actor, AggregateId};
use domain::Customer;

use super::change;
use crate::error::{AppError, Result};
use crate::orchestrator::{Command, CommandResult, Orchestrator};
use crate::unit_of_work::UnitOfWork;

/// Command to register a customer. Emails are unique.
#[derive(Debug, Clone)]
pub struct RegisterCustomer {
    pub customer_id: AggregateId,
    pub name: String,
    pub email: String,
    pub actor: Actor,
}

impl RegisterCustomer {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            customer_id: AggregateId::new(),
            name: name.into(),
            email: email.into(),
            actor: Actor::system(),
        }
    }
}

#[async_trait]
impl Command for RegisterCustomer {
    type Output = Customer;
    const NAME: &'static str = "register_customer";

    fn actor(&self) -> &Actor {
        &self.actor
    }

    async fn execute(&self, uow: &mut UnitOfWork) -> Result<Customer> {
        let mut customer = Customer::default();
        let events = customer.register(self.customer_id, &self.name, &self.email, uow.actor())?;
        uow.apply(&mut customer, events)?;

        if uow.count::<Customer>(Customer::email_term(customer.email())).await? > 0 {
            return Err(AppError::Validation(format!(
                "email {} already registered",
                customer.email()
            )));
        }
        uow.save(&mut customer).await?;
        Ok(customer)
    }
}

/// Command to stop a customer from placing new orders.
#[derive(Debug, Clone)]
pub struct DeactivateCustomer {
    pub customer_id: AggregateId,
    pub actor: Actor,
}

impl DeactivateCustomer {
    pub fn new(customer_id: AggregateId) -> Self {
        Self {
            customer_id,
            actor: Actor::system(),
        }
    }
}

#[async_trait]
impl Command for DeactivateCustomer {
    type Output = Customer;
    const NAME: &'static str = "deactivate_customer";

    fn actor(&self) -> &Actor {
        &self.actor
    }

    async fn execute(&self, uow: &mut UnitOfWork) -> Result<Customer> {
        change(uow, self.customer_id, |customer: &Customer, actor| {
            customer.deactivate(actor)
        })
        .await
    }
}

/// Service for registering and deactivating customers.
#[derive(Clone)]
pub struct CustomerService {
    orchestrator: Arc<Orchestrator>,
}

impl CustomerService {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }

    #[tracing::instrument(skip(self, cmd), fields(customer_id = %cmd.customer_id))]
    pub async fn register(&self, cmd: RegisterCustomer) -> Result<CommandResult<Customer>> {
        self.orchestrator.dispatch(&cmd).await
    }

    #[tracing::instrument(skip(self, cmd), fields(customer_id = %cmd.customer_id))]
    pub async fn deactivate(&self, cmd: DeactivateCustomer) -> Result<CommandResult<Customer>> {
        self.orchestrator.dispatch(&cmd).await
    }
}
