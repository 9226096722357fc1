//! In-memory [`EventQueue`] engine with at-least-once semantics: consumed
//! deliveries stay in flight until acknowledged and can be requeued.

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;

use crate::services::queue::{Delivery, EventQueue};

#[derive(Default)]
struct QueueState {
    next_id: u64,
    pending: VecDeque<Delivery>,
    in_flight: HashMap<u64, Delivery>,
}

#[derive(Default)]
pub struct MemoryQueue {
    state: Mutex<QueueState>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every unacknowledged delivery to the pending queue, making it
    /// visible to consumers again.
    pub async fn requeue_unacked(&self) {
        let mut state = self.state.lock().await;
        let mut redelivered: Vec<Delivery> = state.in_flight.drain().map(|(_, d)| d).collect();
        redelivered.sort_by_key(|delivery| delivery.id);
        state.pending.extend(redelivered);
    }

    pub async fn pending_len(&self) -> usize {
        self.state.lock().await.pending.len()
    }
}

#[async_trait]
impl EventQueue for MemoryQueue {
    async fn publish(&self, payload: Bytes) -> Result<()> {
        let mut state = self.state.lock().await;
        let id = state.next_id;
        state.next_id += 1;
        state.pending.push_back(Delivery { id, payload });
        Ok(())
    }

    async fn consume(&self, max: usize) -> Result<Vec<Delivery>> {
        let mut state = self.state.lock().await;
        let mut batch = Vec::new();

        while batch.len() < max {
            let Some(delivery) = state.pending.pop_front() else {
                break;
            };
            state.in_flight.insert(delivery.id, delivery.clone());
            batch.push(delivery);
        }

        Ok(batch)
    }

    async fn ack(&self, delivery_ids: &[u64]) -> Result<()> {
        let mut state = self.state.lock().await;
        for id in delivery_ids {
            state.in_flight.remove(id);
        }
        Ok(())
    }
}
