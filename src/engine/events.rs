// ABOUTME: Progress events emitted on every phase transition.
// ABOUTME: Delivered over an unbounded channel in per-resource phase order.

use chrono::{DateTime, Utc};
use futures::Stream;
use serde::Serialize;
use tokio::sync::mpsc;

use super::phase::Phase;
use crate::types::ResourceId;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub resource_id: ResourceId,
    pub from: Phase,
    pub phase: Phase,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub attempt: u32,
}

pub type EventSender = mpsc::UnboundedSender<ProgressEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<ProgressEvent>;

pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Adapt a receiver into a stream that ends once every sender is gone.
pub fn into_stream(receiver: EventReceiver) -> impl Stream<Item = ProgressEvent> {
    futures::stream::unfold(receiver, |mut rx| async move {
        rx.recv().await.map(|event| (event, rx))
    })
}
