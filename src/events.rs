use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the channel is gone.
    /// Event delivery is best-effort; business transactions never roll back
    /// because a listener went away.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event.clone()).await {
            error!("Failed to send event {:?}: {}", event, e);
        }
    }
}

// Define the various events that can occur in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Checkout events
    CheckoutCompleted {
        transaction_group_id: Uuid,
        user_id: Uuid,
        order_count: usize,
    },

    // Order events
    OrderCreated(Uuid),
    OrderCancelled(Uuid),
    OrderCompleted(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    ReturnRequested(Uuid),
    ReturnAccepted(Uuid),
    ReturnRejected(Uuid),

    // Inventory events
    StockDecremented {
        product_id: Uuid,
        quantity: i32,
    },
    StockRestored {
        product_id: Uuid,
        quantity: i32,
    },

    // Cart events
    CartLineAdded {
        user_id: Uuid,
        product_id: Uuid,
    },
    CartLineRemoved {
        user_id: Uuid,
        line_id: Uuid,
    },
    CartCleared(Uuid),

    // Catalog events
    ProductCreated(Uuid),
    ProductSuspended(Uuid),

    // Coupon events
    CouponDefined(Uuid),
    CouponGranted {
        user_id: Uuid,
        code: String,
    },
    CouponRedeemed {
        wallet_coupon_id: Uuid,
        transaction_group_id: Uuid,
        applied_at: DateTime<Utc>,
    },
}

// Function to process incoming events and distribute them to registered event handlers.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::CheckoutCompleted {
                transaction_group_id,
                user_id,
                order_count,
            } => {
                info!(
                    "Checkout completed: transaction_group={}, user={}, orders={}",
                    transaction_group_id, user_id, order_count
                );
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(
                    "Order {} moved from {} to {}",
                    order_id, old_status, new_status
                );
            }
            Event::StockDecremented {
                product_id,
                quantity,
            } => {
                info!(
                    "Stock decremented: product={}, quantity={}",
                    product_id, quantity
                );
            }
            Event::StockRestored {
                product_id,
                quantity,
            } => {
                info!(
                    "Stock restored: product={}, quantity={}",
                    product_id, quantity
                );
            }
            Event::ReturnRequested(order_id) => {
                info!("Return requested for order {}", order_id);
            }
            Event::ReturnRejected(order_id) => {
                warn!("Return rejected for order {}", order_id);
            }
            _ => {
                info!("Received event: {:?}", event);
            }
        }
    }

    warn!("Event processing loop has ended");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_delivers_event_to_receiver() {
        let (tx, mut rx) = mpsc::channel(8);
        let sender = EventSender::new(tx);

        sender
            .send(Event::OrderCreated(Uuid::new_v4()))
            .await
            .unwrap();

        assert!(matches!(rx.recv().await, Some(Event::OrderCreated(_))));
    }

    #[tokio::test]
    async fn send_or_log_swallows_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);

        // Must not panic or return an error to the caller
        sender.send_or_log(Event::CartCleared(Uuid::new_v4())).await;
    }
}
