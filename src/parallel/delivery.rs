//! Bounded hand-off from workers to the aggregator
//!
//! A full channel is retried a fixed number of times with a delay in between;
//! after the last attempt the payload is handed back to the caller as dropped.

use crossbeam_channel::{Sender, TrySendError};
use std::thread;
use std::time::Duration;

/// Why a single delivery attempt did not go through; carries the payload back.
#[derive(Debug, PartialEq, Eq)]
pub enum DeliveryError<T> {
    Full(T),
    Closed(T),
}

/// Destination of parsed deltas.
pub trait DeltaSink<T> {
    fn try_deliver(&self, item: T) -> Result<(), DeliveryError<T>>;
}

impl<T> DeltaSink<T> for Sender<T> {
    fn try_deliver(&self, item: T) -> Result<(), DeliveryError<T>> {
        self.try_send(item).map_err(|e| match e {
            TrySendError::Full(item) => DeliveryError::Full(item),
            TrySendError::Disconnected(item) => DeliveryError::Closed(item),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: usize,
    pub delay: Duration,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Delivery<T> {
    /// Accepted on the given 1-based attempt.
    Delivered { attempt: usize },
    /// Still full after every attempt.
    Dropped { item: T, attempts: usize },
    /// The receiving side is gone.
    Closed { item: T },
}

/// Offer `item` to `sink`, sleeping `policy.delay` between attempts while it is full.
pub fn deliver_with_retry<T, S: DeltaSink<T> + ?Sized>(
    sink: &S,
    item: T,
    policy: RetryPolicy,
) -> Delivery<T> {
    let attempts = policy.attempts.max(1);
    let mut item = item;
    for attempt in 1..=attempts {
        match sink.try_deliver(item) {
            Ok(()) => return Delivery::Delivered { attempt },
            Err(DeliveryError::Closed(returned)) => return Delivery::Closed { item: returned },
            Err(DeliveryError::Full(returned)) => {
                item = returned;
                if attempt < attempts {
                    thread::sleep(policy.delay);
                }
            }
        }
    }
    Delivery::Dropped { item, attempts }
}
