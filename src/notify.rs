use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// Fan-out of committed ledger events to collaborators (payments, messaging).
///
/// Delivery is fire-and-forget: a send never fails the caller, and a slow
/// subscriber only lags itself.
pub struct NotifyHub {
    all: broadcast::Sender<Event>,
    per_vehicle: DashMap<Ulid, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            all: broadcast::channel(CHANNEL_CAPACITY).0,
            per_vehicle: DashMap::new(),
        }
    }

    /// Every event, for every vehicle.
    pub fn subscribe_all(&self) -> broadcast::Receiver<Event> {
        self.all.subscribe()
    }

    /// Events for one vehicle. Creates the channel if needed.
    pub fn subscribe(&self, vehicle_id: Ulid) -> broadcast::Receiver<Event> {
        self.per_vehicle
            .entry(vehicle_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    pub fn send(&self, vehicle_id: Ulid, event: &Event) {
        let _ = self.all.send(event.clone());
        if let Some(sender) = self.per_vehicle.get(&vehicle_id) {
            let _ = sender.send(event.clone());
        }
        if matches!(event, Event::VehicleRetired { .. }) {
            self.per_vehicle.remove(&vehicle_id);
        }
    }
}

/// Log booking lifecycle events as they commit. Stands in for the messaging
/// collaborator until a real one subscribes.
pub async fn run_event_logger(mut rx: broadcast::Receiver<Event>) {
    loop {
        match rx.recv().await {
            Ok(Event::BookingCreated { booking }) => {
                tracing::info!(booking_id = %booking.id, renter = %booking.renter_id, "notify: booking requested");
            }
            Ok(Event::BookingStatusChanged { id, status, .. }) => {
                tracing::info!(booking_id = %id, %status, "notify: booking status changed");
            }
            Ok(Event::PaymentStatusChanged { id, payment_status, .. }) => {
                tracing::info!(booking_id = %id, %payment_status, "notify: payment status changed");
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "notify: event logger lagging");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn vehicle_subscriber_receives_its_events() {
        let hub = NotifyHub::new();
        let vid = Ulid::new();
        let mut rx = hub.subscribe(vid);
        let mut all = hub.subscribe_all();

        let event = Event::BookingStatusChanged {
            id: Ulid::new(),
            car_id: vid,
            status: crate::model::BookingStatus::Confirmed,
            at: 1,
        };
        hub.send(vid, &event);

        assert_eq!(rx.recv().await.unwrap(), event);
        assert_eq!(all.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn other_vehicles_are_not_delivered() {
        let hub = NotifyHub::new();
        let mine = Ulid::new();
        let mut rx = hub.subscribe(mine);
        let other = Ulid::new();
        hub.send(other, &Event::VehicleRetired { id: other });
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn send_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        let vid = Ulid::new();
        hub.send(vid, &Event::VehicleRetired { id: vid });
    }
}
