use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::ledger_transaction::{SourceType, TransactionType};

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

    /// Sends after a commit; a closed channel is logged and otherwise ignored.
    pub async fn send_or_log(&self, event: Event) {
        let name = event.name();
        if let Err(e) = self.send(event).await {
            warn!(event = name, error = %e, "event dropped");
        }
    }
}

/// Domain events emitted after a unit of work commits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    InvoiceCreated {
        invoice_id: Uuid,
        total: Decimal,
    },
    InvoiceUpdated {
        invoice_id: Uuid,
        total: Decimal,
        version: i32,
    },
    InvoiceDeleted {
        invoice_id: Uuid,
    },
    PaymentRecorded {
        invoice_id: Uuid,
        payment_id: Uuid,
        amount: Decimal,
    },
    InvoicePaid {
        invoice_id: Uuid,
    },
    TransactionPosted {
        transaction_id: Uuid,
        transaction_type: TransactionType,
        source_type: SourceType,
        source_id: Option<Uuid>,
        amount: Decimal,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::InvoiceCreated { .. } => "invoice_created",
            Event::InvoiceUpdated { .. } => "invoice_updated",
            Event::InvoiceDeleted { .. } => "invoice_deleted",
            Event::PaymentRecorded { .. } => "payment_recorded",
            Event::InvoicePaid { .. } => "invoice_paid",
            Event::TransactionPosted { .. } => "transaction_posted",
        }
    }
}

/// Channel pair sized from configuration
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EventSender::new(tx), rx)
}

/// Drains the channel, logging each event until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        metrics::counter!("invoice_ledger_events.processed", 1, "event" => event.name());
        match &event {
            Event::InvoiceCreated { invoice_id, total } => {
                info!(%invoice_id, %total, "invoice created");
            }
            Event::InvoiceUpdated {
                invoice_id,
                total,
                version,
            } => {
                info!(%invoice_id, %total, version, "invoice updated");
            }
            Event::InvoiceDeleted { invoice_id } => {
                info!(%invoice_id, "invoice deleted");
            }
            Event::PaymentRecorded {
                invoice_id,
                payment_id,
                amount,
            } => {
                info!(%invoice_id, %payment_id, %amount, "payment recorded");
            }
            Event::InvoicePaid { invoice_id } => {
                info!(%invoice_id, "invoice fully paid");
            }
            Event::TransactionPosted {
                transaction_id,
                transaction_type,
                source_type,
                source_id,
                amount,
            } => {
                info!(
                    %transaction_id,
                    %transaction_type,
                    %source_type,
                    source_id = ?source_id,
                    %amount,
                    "transaction posted"
                );
            }
        }
    }

    info!("Event processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn events_reach_the_receiver_in_order() {
        let (sender, mut rx) = channel(8);
        let invoice_id = Uuid::new_v4();
        sender
            .send_or_log(Event::InvoiceCreated {
                invoice_id,
                total: dec!(27.5),
            })
            .await;
        sender.send_or_log(Event::InvoicePaid { invoice_id }).await;

        assert_eq!(rx.recv().await.map(|e| e.name()), Some("invoice_created"));
        assert_eq!(rx.recv().await, Some(Event::InvoicePaid { invoice_id }));
    }

    #[tokio::test]
    async fn closed_channel_does_not_fail_the_caller() {
        let (sender, rx) = channel(1);
        drop(rx);
        sender
            .send_or_log(Event::InvoiceDeleted {
                invoice_id: Uuid::nil(),
            })
            .await;
        assert!(sender.send(Event::InvoicePaid { invoice_id: Uuid::nil() }).await.is_err());
    }
}
