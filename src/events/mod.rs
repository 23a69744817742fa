use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::machine::MachineStatus;
use crate::entities::production_order::OrderStatus;
use crate::entities::time_entry::EntryKind;

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

    /// Sends an event, logging instead of failing when the consumer is gone.
    /// Events are emitted after commit, so a lost event never undoes a write.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("{}", e);
        }
    }
}

/// Domain events emitted by the services after their transaction commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    MachineStatusChanged {
        machine_id: Uuid,
        from: MachineStatus,
        to: MachineStatus,
    },
    TimeEntryOpened {
        entry_id: Uuid,
        machine_id: Uuid,
        kind: EntryKind,
    },
    TimeEntryClosed {
        entry_id: Uuid,
        machine_id: Uuid,
        kind: EntryKind,
    },
    OrderCreated(Uuid),
    OrderUpdated(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },
    OrdersImported {
        inserted: u64,
        skipped_existing: u64,
        failed: u64,
    },
}

/// Consumes the event channel until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::MachineStatusChanged {
                machine_id,
                from,
                to,
            } => {
                info!(%machine_id, %from, %to, "machine status changed");
            }
            Event::TimeEntryOpened {
                entry_id,
                machine_id,
                kind,
            } => {
                info!(%entry_id, %machine_id, %kind, "time entry opened");
            }
            Event::TimeEntryClosed {
                entry_id,
                machine_id,
                kind,
            } => {
                info!(%entry_id, %machine_id, %kind, "time entry closed");
            }
            Event::OrderCreated(order_id) => info!(%order_id, "order created"),
            Event::OrderUpdated(order_id) => info!(%order_id, "order updated"),
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(%order_id, %old_status, %new_status, "order status changed");
            }
            Event::OrdersImported {
                inserted,
                skipped_existing,
                failed,
            } => {
                info!(inserted, skipped_existing, failed, "orders imported");
            }
        }
    }

    info!("Event processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_reach_the_receiver_in_order() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);
        let order_id = Uuid::new_v4();

        sender.send(Event::OrderCreated(order_id)).await.unwrap();
        sender.send(Event::OrderUpdated(order_id)).await.unwrap();

        assert_eq!(rx.recv().await, Some(Event::OrderCreated(order_id)));
        assert_eq!(rx.recv().await, Some(Event::OrderUpdated(order_id)));
    }

    #[tokio::test]
    async fn sending_after_consumer_stops_is_not_fatal() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);

        assert!(sender.send(Event::OrderCreated(Uuid::new_v4())).await.is_err());
        sender.send_or_log(Event::OrderCreated(Uuid::new_v4())).await;
    }

    #[tokio::test]
    async fn processor_exits_when_senders_drop() {
        let (tx, rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);
        let handle = tokio::spawn(process_events(rx));

        sender
            .send(Event::OrdersImported {
                inserted: 1,
                skipped_existing: 0,
                failed: 0,
            })
            .await
            .unwrap();
        drop(sender);

        handle.await.unwrap();
    }
}
