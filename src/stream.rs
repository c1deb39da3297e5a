use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::events::Event;

type Slot = Mutex<Option<UnboundedReceiver<Event>>>;

/// Events reported by the client, in the order they happened.
///
/// The client hands out a single stream at a time. Dropping it puts the
/// receiver back, so events emitted in between are not lost.
pub struct EventStream<'a> {
    slot: &'a Slot,
    receiver: Option<UnboundedReceiver<Event>>
}

impl<'a> EventStream<'a> {
    pub(crate) fn new(slot: &'a Slot) -> Option<Self> {
        let receiver = slot.lock().take()?;

        Some(Self { slot, receiver: Some(receiver) })
    }

    pub async fn recv(&mut self) -> Option<Event> {
        match self.receiver.as_mut() {
            Some(receiver) => receiver.recv().await,
            None => None
        }
    }

    /// Returns an already emitted event without waiting.
    pub fn try_recv(&mut self) -> Option<Event> {
        self.receiver.as_mut()?.try_recv().ok()
    }
}

impl Stream for EventStream<'_> {
    type Item = Event;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Event>> {
        self.receiver
            .as_mut()
            .map_or(Poll::Ready(None), |receiver| receiver.poll_recv(cx))
    }
}

impl Drop for EventStream<'_> {
    fn drop(&mut self) {
        if let Some(receiver) = self.receiver.take() {
            *self.slot.lock() = Some(receiver);
        }
    }
}
