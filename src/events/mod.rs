use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

/// Events emitted after successful mutations. Consumers (audit collaborators,
/// projections) receive them on a best-effort basis; the emitting transaction
/// has already committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Order events
    OrderCreated(Uuid),
    OrderUpdated(Uuid),
    OrderCancelled(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },

    // Ledger events
    StockAllocated {
        product_id: Uuid,
        warehouse_id: Uuid,
        batch_id: Uuid,
        quantity: i32,
    },
    StockAdjusted {
        product_id: Uuid,
        warehouse_id: Uuid,
        old_quantity: i32,
        new_quantity: i32,
    },
    StockConsumed {
        product_id: Uuid,
        warehouse_id: Uuid,
        quantity: i32,
        order_id: Option<Uuid>,
    },
    StockTransferred {
        transfer_id: Uuid,
        product_id: Uuid,
        from_warehouse_id: Uuid,
        to_warehouse_id: Uuid,
        quantity: i32,
    },

    // Catalog events
    ProductCreated(Uuid),
    ProductUpdated(Uuid),
    WarehouseCreated(Uuid),
    CustomerCreated(Uuid),
}

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
}

/// Background loop draining the event channel. Runs until every sender is
/// dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Event processor started");
    while let Some(event) = rx.recv().await {
        debug!(?event, "Processing event");
    }
    info!("Event processor stopped");
}
