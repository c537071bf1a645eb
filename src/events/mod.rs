use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

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

    /// Sends an event, logging instead of failing when the channel is down.
    /// Event delivery is best effort and never blocks the request path.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("Event dropped: {}", e);
        }
    }
}

// The various domain events that can occur in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Cart events
    CartCreated(i64),
    CartItemAdded {
        cart_id: i64,
        product_id: i64,
        variant_id: Option<i64>,
        quantity: i32,
    },
    CartItemUpdated {
        cart_id: i64,
        item_id: i64,
        quantity: i32,
    },
    CartItemRemoved {
        cart_id: i64,
        item_id: i64,
    },
    CartCleared(i64),

    // Order events
    OrderCreated(i64),
    CheckoutCompleted {
        order_id: i64,
        cart_id: i64,
    },
    OrderStatusChanged {
        order_id: i64,
        old_status: String,
        new_status: String,
    },
    PaymentStatusChanged {
        order_id: i64,
        old_status: String,
        new_status: String,
    },

    // Account events
    UserRegistered(i64),
}

// Processes incoming events from the channel until all senders are dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match event {
            Event::OrderCreated(order_id) => {
                if let Err(e) = handle_order_created(order_id).await {
                    error!(
                        "Failed to handle order created event: order_id={}, error={}",
                        order_id, e
                    );
                }
            }
            Event::CheckoutCompleted { order_id, cart_id } => {
                info!(
                    "Checkout completed: order_id={}, cart_id={}",
                    order_id, cart_id
                );
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(
                    "Order {} status changed: {} -> {}",
                    order_id, old_status, new_status
                );
            }
            Event::PaymentStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(
                    "Order {} payment status changed: {} -> {}",
                    order_id, old_status, new_status
                );
            }
            Event::UserRegistered(user_id) => {
                info!("User registered: user_id={}", user_id);
            }
            other => {
                info!("Received event: {:?}", other);
            }
        }
    }

    info!("Event processing loop stopped");
}

async fn handle_order_created(order_id: i64) -> Result<(), String> {
    // Notification hooks (order confirmation email) attach here.
    info!("Order created: order_id={}", order_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_delivers_to_receiver() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);

        sender.send(Event::OrderCreated(42)).await.unwrap();

        match rx.recv().await {
            Some(Event::OrderCreated(id)) => assert_eq!(id, 42),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn send_or_log_swallows_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);

        // Must not panic or error out
        sender.send_or_log(Event::CartCreated(1)).await;
    }
}
