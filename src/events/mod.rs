use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use metrics::counter;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::entities::order::OrderStatus;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Enqueues an event without waiting. A full or closed channel drops the
    /// event with a warning; callers never observe the failure.
    pub fn send_or_log(&self, event: Event) {
        if let Err(err) = self.sender.try_send(event) {
            counter!("storefront_events_dropped_total", 1);
            warn!("Dropping analytics event: {}", err);
        }
    }
}

/// State changes that analytics consumers care about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated {
        order_id: i32,
        order_number: String,
        user_id: i32,
        total: Decimal,
        at: DateTime<Utc>,
    },
    OrderStatusChanged {
        order_id: i32,
        old_status: OrderStatus,
        new_status: OrderStatus,
        at: DateTime<Utc>,
    },
    OrderDeleted {
        order_id: i32,
        at: DateTime<Utc>,
    },
}

impl Event {
    pub fn order_id(&self) -> i32 {
        match self {
            Event::OrderCreated { order_id, .. }
            | Event::OrderStatusChanged { order_id, .. }
            | Event::OrderDeleted { order_id, .. } => *order_id,
        }
    }
}

// Handlers implementing this trait will process events asynchronously.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle_event(&self, event: &Event) -> Result<(), String>;
}

/// Drains the channel, fanning every event out to all handlers.
/// Handler errors are logged and never propagated.
pub async fn process_events(mut rx: mpsc::Receiver<Event>, handlers: Vec<Arc<dyn EventHandler>>) {
    info!(
        "Starting event processing loop with {} handler(s)",
        handlers.len()
    );

    while let Some(event) = rx.recv().await {
        debug!("Received event: {:?}", event);

        let results = join_all(handlers.iter().map(|h| h.handle_event(&event))).await;
        for result in results {
            if let Err(e) = result {
                counter!("storefront_event_handler_failures_total", 1);
                warn!(
                    "Event handler failed: order_id={}, error={}",
                    event.order_id(),
                    e
                );
            }
        }
    }

    info!("Event channel closed; event processing loop exiting");
}
