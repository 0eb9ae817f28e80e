//! State the circulation reducer operates on.
//!
//! An [`ItemLedger`] is the unit of serialization: one item, its queue and a
//! version counter. A [`CirculationState`] is the set of ledgers (and closed
//! request records) one operation is allowed to touch. The runtime builds it
//! from locked ledgers, lets the reducer mutate it, and writes it back only if
//! the reducer succeeded.

use crate::error::QueueError;
use crate::queue::RequestQueue;
use crate::types::{Item, ItemId, ItemStatus, Request, RequestId, ServicePointId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// An item together with its request queue.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemLedger {
    /// The item and its derived status
    pub item: Item,
    /// Open requests in queue order
    pub queue: RequestQueue,
    /// Bumped on every committed mutation
    pub version: u64,
}

impl ItemLedger {
    /// Ledger for a freshly registered item
    #[must_use]
    pub const fn new(item: Item) -> Self {
        let queue = RequestQueue::new(item.id);
        Self {
            item,
            queue,
            version: 0,
        }
    }

    /// Item identifier
    #[must_use]
    pub const fn item_id(&self) -> ItemId {
        self.item.id
    }

    /// Set item status and in-transit destination together
    pub fn set_status(&mut self, status: ItemStatus, destination: Option<ServicePointId>) {
        self.item.status = status;
        self.item.in_transit_destination_service_point_id = if status == ItemStatus::InTransit {
            destination
        } else {
            None
        };
    }
}

/// Something that happened while applying an action.
///
/// The runtime logs these and hands them back to callers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum QueueEvent {
    /// A request joined a queue
    RequestQueued {
        /// Request
        request_id: RequestId,
        /// Item
        item_id: ItemId,
        /// Assigned position
        position: u32,
    },
    /// A request left its queue for good (filled or cancelled)
    RequestClosed {
        /// Closed record, without a position
        request: Request,
    },
    /// A request record was deleted
    RequestDeleted {
        /// Request
        request_id: RequestId,
        /// Item it was queued on
        item_id: ItemId,
    },
    /// A request was relocated to another item
    RequestMoved {
        /// Request
        request_id: RequestId,
        /// Source item
        from: ItemId,
        /// Destination item
        to: ItemId,
        /// Position on the destination
        position: u32,
    },
    /// An item's queue was explicitly reordered
    QueueReordered {
        /// Item
        item_id: ItemId,
    },
    /// A request advanced to a new open sub-status
    RequestStatusChanged {
        /// Request
        request_id: RequestId,
        /// New status
        status: crate::types::RequestStatus,
    },
    /// An item's derived status changed
    ItemStatusChanged {
        /// Item
        item_id: ItemId,
        /// Previous status
        from: ItemStatus,
        /// New status
        to: ItemStatus,
    },
}

/// Ledgers and closed records in scope for one operation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CirculationState {
    ledgers: BTreeMap<ItemId, ItemLedger>,
    closed: BTreeMap<RequestId, Request>,
    purged: BTreeSet<RequestId>,
    events: Vec<QueueEvent>,
}

impl CirculationState {
    /// Empty scope
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bring a ledger into scope
    #[must_use]
    pub fn with_ledger(mut self, ledger: ItemLedger) -> Self {
        self.insert_ledger(ledger);
        self
    }

    /// Bring a closed request record into scope
    #[must_use]
    pub fn with_closed(mut self, request: Request) -> Self {
        self.insert_closed(request);
        self
    }

    /// Bring a closed request record into scope
    pub fn insert_closed(&mut self, request: Request) {
        self.closed.insert(request.id, request);
    }

    /// Bring a ledger into scope
    pub fn insert_ledger(&mut self, ledger: ItemLedger) {
        self.ledgers.insert(ledger.item_id(), ledger);
    }

    /// Ledger for `item_id`, or 404
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::NotFound`] if the item is not in scope.
    pub fn ledger(&self, item_id: ItemId) -> Result<&ItemLedger, QueueError> {
        self.ledgers
            .get(&item_id)
            .ok_or_else(|| QueueError::item_not_found(item_id))
    }

    /// Mutable ledger for `item_id`, or 404
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::NotFound`] if the item is not in scope.
    pub fn ledger_mut(&mut self, item_id: ItemId) -> Result<&mut ItemLedger, QueueError> {
        self.ledgers
            .get_mut(&item_id)
            .ok_or_else(|| QueueError::item_not_found(item_id))
    }

    /// All ledgers in scope
    pub fn ledgers(&self) -> impl Iterator<Item = &ItemLedger> {
        self.ledgers.values()
    }

    /// Consume the scope, yielding ledgers, closed records and purged ids
    #[must_use]
    pub fn into_parts(self) -> (Vec<ItemLedger>, Vec<Request>, Vec<RequestId>, Vec<QueueEvent>) {
        (
            self.ledgers.into_values().collect(),
            self.closed.into_values().collect(),
            self.purged.into_iter().collect(),
            self.events,
        )
    }

    /// Item whose queue currently holds `request_id`
    #[must_use]
    pub fn locate_open(&self, request_id: RequestId) -> Option<ItemId> {
        self.ledgers
            .values()
            .find(|ledger| ledger.queue.contains(request_id))
            .map(ItemLedger::item_id)
    }

    /// Open request anywhere in scope
    #[must_use]
    pub fn open_request(&self, request_id: RequestId) -> Option<&Request> {
        self.ledgers
            .values()
            .find_map(|ledger| ledger.queue.get(request_id))
    }

    /// Closed record in scope
    #[must_use]
    pub fn closed_request(&self, request_id: RequestId) -> Option<&Request> {
        self.closed.get(&request_id)
    }

    /// Record a request that just closed
    pub fn record_closed(&mut self, request: Request) {
        self.purged.remove(&request.id);
        self.closed.insert(request.id, request);
    }

    /// Drop a closed record and remember it must be purged
    pub fn purge_closed(&mut self, request_id: RequestId) -> Option<Request> {
        let removed = self.closed.remove(&request_id)?;
        self.purged.insert(request_id);
        Some(removed)
    }

    /// Append to the event journal
    pub fn emit(&mut self, event: QueueEvent) {
        self.events.push(event);
    }

    /// Events recorded so far
    #[must_use]
    pub fn events(&self) -> &[QueueEvent] {
        &self.events
    }
}
