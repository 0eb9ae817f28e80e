//! Explicit staff reordering of an item's queue.
//!
//! A reorder is an administrative override: it may move a request that is
//! already in fulfillment away from the head. The submitted order must name
//! every open request exactly once and use every position `1..=N` exactly once.

use crate::environment::CirculationEnvironment;
use crate::error::{QueueError, Result};
use crate::fulfillment::FulfillmentResolver;
use crate::state::{CirculationState, QueueEvent};
use crate::types::{ItemId, Request, RequestId, ReorderEntry};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Applies explicit queue orders.
pub struct ReorderService<'a> {
    resolver: FulfillmentResolver<'a>,
}

impl<'a> ReorderService<'a> {
    /// Service over an environment's collaborators
    #[must_use]
    pub fn from_env(env: &'a CirculationEnvironment) -> Self {
        Self {
            resolver: FulfillmentResolver::from_env(env),
        }
    }

    /// Replace the order of `item_id`'s queue.
    ///
    /// Returns the queue in its new order.
    ///
    /// # Errors
    ///
    /// - [`QueueError::NotFound`] if the item is not in scope
    /// - [`QueueError::Validation`] naming every mismatch between `entries`
    ///   and the open requests
    pub fn reorder(
        &self,
        state: &mut CirculationState,
        item_id: ItemId,
        entries: &[ReorderEntry],
    ) -> Result<Vec<Request>> {
        let ledger = state.ledger(item_id)?;
        let open: Vec<RequestId> = ledger.queue.requests().iter().map(|r| r.id).collect();
        validate_entries(&open, entries)?;

        let mut ordered = entries.to_vec();
        ordered.sort_by_key(|entry| entry.new_position);
        let ids: Vec<RequestId> = ordered.iter().map(|entry| entry.request_id).collect();

        let ledger = state.ledger_mut(item_id)?;
        if !ledger.queue.apply_order(&ids) {
            return Err(QueueError::validation(
                "Reordered queue must contain exactly the open requests for this item",
            )
            .with_parameter("itemId", item_id));
        }
        let status_change = self.resolver.recompute_item_status(ledger);
        let requests = ledger.queue.requests().to_vec();

        state.emit(QueueEvent::QueueReordered { item_id });
        if let Some(change) = status_change {
            state.emit(QueueEvent::ItemStatusChanged {
                item_id,
                from: change.from,
                to: change.to,
            });
        }
        Ok(requests)
    }
}

fn validate_entries(open: &[RequestId], entries: &[ReorderEntry]) -> Result<()> {
    let open_set: BTreeSet<RequestId> = open.iter().copied().collect();
    let mut seen_ids = HashSet::new();
    let mut position_counts: BTreeMap<u32, usize> = BTreeMap::new();
    let mut error = QueueError::validation(
        "Reordered queue must contain exactly the open requests for this item",
    );
    let mut failed = false;

    for entry in entries {
        if !seen_ids.insert(entry.request_id) {
            error = error.with_parameter("duplicateRequestId", entry.request_id);
            failed = true;
        }
        if !open_set.contains(&entry.request_id) {
            error = error.with_parameter("unexpectedRequestId", entry.request_id);
            failed = true;
        }
        *position_counts.entry(entry.new_position).or_default() += 1;
    }

    for missing in open.iter().filter(|id| !seen_ids.contains(*id)) {
        error = error.with_parameter("missingRequestId", missing);
        failed = true;
    }

    let last = u32::try_from(open.len()).unwrap_or(u32::MAX);
    for (position, count) in position_counts {
        if count > 1 {
            error = error.with_parameter("duplicatePosition", position);
            failed = true;
        }
        if position == 0 || position > last {
            error = error.with_parameter("invalidPosition", position);
            failed = true;
        }
    }

    if failed { Err(error) } else { Ok(()) }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;
    use crate::test_support::{Stubs, hold_shelf, ledger_with};
    use crate::types::{ItemStatus, RequestStatus, RequestType, ServicePointId};

    fn queue_of(len: usize) -> (CirculationState, ItemId, Vec<RequestId>) {
        let desk = ServicePointId::new();
        let requests: Vec<Request> = (0..len).map(|_| hold_shelf(RequestType::Hold, desk)).collect();
        let ids = requests.iter().map(|r| r.id).collect();
        let ledger = ledger_with(ItemStatus::Available, requests);
        let item_id = ledger.item_id();
        (CirculationState::new().with_ledger(ledger), item_id, ids)
    }

    fn entry(request_id: RequestId, new_position: u32) -> ReorderEntry {
        ReorderEntry {
            request_id,
            new_position,
        }
    }

    fn keys(err: &QueueError) -> Vec<&str> {
        err.parameters().iter().map(|p| p.key.as_str()).collect()
    }

    #[test]
    fn applies_a_permutation() {
        let stubs = Stubs::new();
        let (mut state, item_id, ids) = queue_of(3);

        let reordered = ReorderService::from_env(stubs.env())
            .reorder(
                &mut state,
                item_id,
                &[entry(ids[0], 3), entry(ids[1], 1), entry(ids[2], 2)],
            )
            .unwrap();

        let order: Vec<(RequestId, Option<u32>)> =
            reordered.iter().map(|r| (r.id, r.position)).collect();
        assert_eq!(
            order,
            vec![(ids[1], Some(1)), (ids[2], Some(2)), (ids[0], Some(3))]
        );
        assert!(state.ledger(item_id).unwrap().queue.positions_are_contiguous());
    }

    #[test]
    fn rejects_missing_and_unexpected_ids() {
        let stubs = Stubs::new();
        let (mut state, item_id, ids) = queue_of(2);
        let stranger = RequestId::new();
        let before = state.clone();

        let err = ReorderService::from_env(stubs.env())
            .reorder(&mut state, item_id, &[entry(ids[0], 1), entry(stranger, 2)])
            .unwrap_err();

        assert_eq!(err.http_status(), 422);
        assert_eq!(keys(&err), vec!["unexpectedRequestId", "missingRequestId"]);
        assert_eq!(err.parameters()[1].value, ids[1].to_string());
        assert_eq!(state, before);
    }

    #[test]
    fn rejects_duplicate_and_out_of_range_positions() {
        let stubs = Stubs::new();
        let (mut state, item_id, ids) = queue_of(3);
        let service = ReorderService::from_env(stubs.env());

        let err = service
            .reorder(
                &mut state,
                item_id,
                &[entry(ids[0], 1), entry(ids[1], 1), entry(ids[2], 4)],
            )
            .unwrap_err();
        assert_eq!(keys(&err), vec!["duplicatePosition", "invalidPosition"]);

        let err = service
            .reorder(
                &mut state,
                item_id,
                &[entry(ids[0], 0), entry(ids[0], 2), entry(ids[2], 3)],
            )
            .unwrap_err();
        assert_eq!(
            keys(&err),
            vec!["duplicateRequestId", "missingRequestId", "invalidPosition"]
        );
    }

    #[test]
    fn may_displace_an_active_head() {
        let stubs = Stubs::new();
        let desk = ServicePointId::new();
        let mut head = hold_shelf(RequestType::Hold, desk);
        head.status = RequestStatus::OpenAwaitingPickup;
        let head_id = head.id;
        let other = hold_shelf(RequestType::Hold, desk);
        let other_id = other.id;
        let ledger = ledger_with(ItemStatus::AwaitingPickup, vec![head, other]);
        let item_id = ledger.item_id();
        let mut state = CirculationState::new().with_ledger(ledger);

        ReorderService::from_env(stubs.env())
            .reorder(&mut state, item_id, &[entry(other_id, 1), entry(head_id, 2)])
            .unwrap();

        let ledger = state.ledger(item_id).unwrap();
        assert_eq!(ledger.queue.head().map(|r| r.id), Some(other_id));
        assert_eq!(ledger.item.status, ItemStatus::AwaitingPickup);
    }
}
