use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::{ClosedPosition, MonthlyIncome, Position, Withdrawal};

/// Messages broadcast to all connected WebSocket clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    /// Sent after every completed sync cycle, including empty ones.
    PositionsUpdate {
        exchange: String,
        count: usize,
        positions: Vec<ClosedPosition>,
    },

    PositionCreated { position: Position },
    PositionDeleted { id: Uuid },

    WithdrawalCreated { withdrawal: Withdrawal },
    WithdrawalDeleted { id: Uuid },

    IncomeCreated { income: MonthlyIncome },
    IncomeDeleted { id: Uuid },
}

/// Fire-and-forget fan-out. Having no subscribers is not an error.
pub fn broadcast(tx: &broadcast::Sender<WsMessage>, message: WsMessage) {
    match tx.send(message) {
        Ok(receivers) => tracing::trace!(receivers, "Broadcast sent"),
        Err(_) => tracing::trace!("Broadcast dropped, no subscribers"),
    }
}
