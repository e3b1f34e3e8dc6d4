//! Notification dispatch.
//!
//! Rendering and delivering email happens elsewhere; this side only hands a
//! confirmation message to the mailer over NATS.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::domain::aggregates::{Order, PaymentMethod};
use crate::domain::events::OrderEvent;
use crate::domain::value_objects::Money;

pub const NOTIFICATION_SUBJECT: &str = "orders.notifications";
pub const EVENT_SUBJECT_PREFIX: &str = "orders.events";

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("notification transport failed: {0}")]
    Transport(String),
    #[error("notification encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "email", rename_all = "snake_case")]
pub enum Recipient {
    Admin(String),
    Customer(String),
}

impl Recipient {
    pub fn email(&self) -> &str {
        match self { Self::Admin(e) | Self::Customer(e) => e }
    }
}

/// Message body handed to the mailer.
#[derive(Debug, Clone, Serialize)]
pub struct OrderConfirmation {
    pub order_id: Uuid,
    pub order_number: String,
    pub recipient: Recipient,
    pub total: Money,
    pub item_count: usize,
    pub payment_method: PaymentMethod,
}

impl OrderConfirmation {
    pub fn new(order: &Order, recipient: Recipient) -> Self {
        Self {
            order_id: order.id(),
            order_number: order.order_number().to_string(),
            recipient,
            total: order.total(),
            item_count: order.items().len(),
            payment_method: order.payment().method,
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_order_confirmation(&self, order: &Order, recipient: Recipient) -> Result<(), NotifyError>;

    /// Publishes drained domain events. Delivery is best effort.
    async fn publish_events(&self, _events: &[OrderEvent]) -> Result<(), NotifyError> { Ok(()) }
}

#[derive(Clone)]
pub struct NatsNotifier { client: async_nats::Client }

impl NatsNotifier {
    pub fn new(client: async_nats::Client) -> Self { Self { client } }

    async fn publish_json<T: Serialize + Sync>(&self, subject: String, body: &T) -> Result<(), NotifyError> {
        let payload = serde_json::to_vec(body)?;
        self.client
            .publish(subject, payload.into())
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))
    }
}

#[async_trait]
impl Notifier for NatsNotifier {
    async fn send_order_confirmation(&self, order: &Order, recipient: Recipient) -> Result<(), NotifyError> {
        let message = OrderConfirmation::new(order, recipient);
        self.publish_json(NOTIFICATION_SUBJECT.to_string(), &message).await?;
        info!(order_id = %message.order_id, recipient = message.recipient.email(), "Order confirmation queued");
        Ok(())
    }

    async fn publish_events(&self, events: &[OrderEvent]) -> Result<(), NotifyError> {
        for event in events {
            self.publish_json(format!("{}.{}", EVENT_SUBJECT_PREFIX, event.name()), event).await?;
        }
        Ok(())
    }
}

/// Used when no NATS server is configured.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_order_confirmation(&self, order: &Order, recipient: Recipient) -> Result<(), NotifyError> {
        info!(order_id = %order.id(), order_number = %order.order_number(), recipient = recipient.email(), "Order confirmation (log only)");
        Ok(())
    }

    async fn publish_events(&self, events: &[OrderEvent]) -> Result<(), NotifyError> {
        for event in events {
            info!(order_id = %event.order_id(), event = event.name(), "Order event");
        }
        Ok(())
    }
}
