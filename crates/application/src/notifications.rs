//! Turns published events into customer and operator notifications.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::AggregateId;
use domain::{Money, OrderEvent, ProductEvent};
use read_cache::{Cache, CacheKey};
use serde::Serialize;
use store::EventEnvelope;
use thiserror::Error;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How long a low-stock alert suppresses repeats for the same product.
pub const LOW_STOCK_ALERT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// A message for someone outside the system.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    OrderConfirmation {
        order_id: AggregateId,
        order_number: String,
        customer_id: AggregateId,
    },
    PaymentReceived {
        order_id: AggregateId,
        order_number: String,
        customer_id: AggregateId,
        amount: Money,
        payment_method: String,
    },
    ShippingUpdate {
        order_id: AggregateId,
        order_number: String,
        customer_id: AggregateId,
        tracking_number: String,
        carrier: Option<String>,
    },
    OrderCancelled {
        order_id: AggregateId,
        order_number: String,
        customer_id: AggregateId,
        reason: String,
    },
    LowStockAlert {
        product_id: AggregateId,
        sku: String,
        product_name: String,
        current_stock: u32,
        min_stock_threshold: u32,
        detected_at: DateTime<Utc>,
    },
}

#[derive(Debug, Error)]
#[error("Notification delivery failed: {0}")]
pub struct NotifyError(pub String);

/// Delivers notifications, e.g. by email.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Writes notifications to the log.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        info!(?notification, "Notification sent");
        Ok(())
    }
}

/// Keeps every notification in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<Notification> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.sent.lock().await.push(notification.clone());
        Ok(())
    }
}

/// Consumes published events and sends the notifications they call for.
///
/// Delivery is at least once, so a notification may repeat. Low-stock
/// alerts are suppressed per product per day through a cache key.
#[derive(Clone)]
pub struct NotificationConsumer {
    cache: Arc<dyn Cache>,
    notifier: Arc<dyn Notifier>,
}

impl NotificationConsumer {
    pub fn new(cache: Arc<dyn Cache>, notifier: Arc<dyn Notifier>) -> Self {
        Self { cache, notifier }
    }

    /// Handles one event. Returns whether a notification was sent.
    pub async fn handle(&self, event: &EventEnvelope) -> bool {
        let notification = match event.aggregate_type.as_str() {
            "Order" => match event.decode::<OrderEvent>() {
                Ok(order_event) => order_notification(order_event),
                Err(e) => {
                    warn!(event_id = %event.event_id, error = %e, "Undecodable order event");
                    None
                }
            },
            "Product" => match event.decode::<ProductEvent>() {
                Ok(ProductEvent::LowStock(data)) => {
                    let key = CacheKey::LowStockAlert(data.product_id, data.detected_at.date_naive());
                    if self.already_alerted(key).await {
                        debug!(product_id = %data.product_id, "Low-stock alert already sent today");
                        None
                    } else {
                        Some(Notification::LowStockAlert {
                            product_id: data.product_id,
                            sku: data.sku,
                            product_name: data.product_name,
                            current_stock: data.current_stock,
                            min_stock_threshold: data.min_stock_threshold,
                            detected_at: data.detected_at,
                        })
                    }
                }
                Ok(_) => None,
                Err(e) => {
                    warn!(event_id = %event.event_id, error = %e, "Undecodable product event");
                    None
                }
            },
            _ => None,
        };

        let Some(notification) = notification else {
            return false;
        };
        match self.notifier.notify(&notification).await {
            Ok(()) => {
                metrics::counter!("notifications_sent_total").increment(1);
                true
            }
            Err(e) => {
                metrics::counter!("notifications_failed_total").increment(1);
                warn!(event_id = %event.event_id, error = %e, "Notification failed");
                false
            }
        }
    }

    /// Claims the suppression key. An unreachable cache never blocks an alert.
    async fn already_alerted(&self, key: CacheKey) -> bool {
        let name = key.to_string();
        match self
            .cache
            .set_if_absent(&name, serde_json::json!(true), LOW_STOCK_ALERT_TTL)
            .await
        {
            Ok(claimed) => !claimed,
            Err(e) => {
                warn!(key = %name, error = %e, "Alert suppression unavailable; sending anyway");
                false
            }
        }
    }

    /// Runs the consumer on its own task until the channel closes.
    pub fn spawn(self, mut events: broadcast::Receiver<EventEnvelope>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        self.handle(&event).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Notification consumer lagged; events skipped");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("Event channel closed; notification consumer stopping");
                        break;
                    }
                }
            }
        })
    }
}

fn order_notification(event: OrderEvent) -> Option<Notification> {
    match event {
        OrderEvent::OrderCreated(data) => Some(Notification::OrderConfirmation {
            order_id: data.order_id,
            order_number: data.order_number.to_string(),
            customer_id: data.customer_id,
        }),
        OrderEvent::OrderPaid(data) => Some(Notification::PaymentReceived {
            order_id: data.order_id,
            order_number: data.order_number.to_string(),
            customer_id: data.customer_id,
            amount: data.amount_paid,
            payment_method: data.payment_method,
        }),
        OrderEvent::OrderShipped(data) => Some(Notification::ShippingUpdate {
            order_id: data.order_id,
            order_number: data.order_number.to_string(),
            customer_id: data.customer_id,
            tracking_number: data.tracking_number,
            carrier: data.carrier,
        }),
        OrderEvent::OrderCancelled(data) => Some(Notification::OrderCancelled {
            order_id: data.order_id,
            order_number: data.order_number.to_string(),
            customer_id: data.customer_id,
            reason: data.reason,
        }),
        _ => None,
    }
}
