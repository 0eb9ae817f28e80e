//! Per-item ordered queue of open requests.
//!
//! The queue owns the position invariant: the open requests of an item carry
//! positions `1..=N` in the order they arrived (or were explicitly placed).
//! Every mutation renumbers before returning, so callers never observe gaps.

use crate::types::{ItemId, Request, RequestId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Converts a zero-based slot into a 1-based queue position
#[allow(clippy::cast_possible_truncation)] // Queues never approach u32::MAX entries
const fn position_for(index: usize) -> u32 {
    (index as u32).saturating_add(1)
}

/// Open requests for one item, in queue order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestQueue {
    item_id: ItemId,
    requests: Vec<Request>,
}

impl RequestQueue {
    /// Creates an empty queue for `item_id`
    #[must_use]
    pub const fn new(item_id: ItemId) -> Self {
        Self {
            item_id,
            requests: Vec::new(),
        }
    }

    /// Item this queue belongs to
    #[must_use]
    pub const fn item_id(&self) -> ItemId {
        self.item_id
    }

    /// Open requests ordered by position
    #[must_use]
    pub fn requests(&self) -> &[Request] {
        &self.requests
    }

    /// Number of open requests
    #[must_use]
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Whether nobody is waiting
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Look up an open request
    #[must_use]
    pub fn get(&self, request_id: RequestId) -> Option<&Request> {
        self.requests.iter().find(|r| r.id == request_id)
    }

    /// Mutable access for status changes. Positions stay owned by the queue.
    pub(crate) fn get_mut(&mut self, request_id: RequestId) -> Option<&mut Request> {
        self.requests.iter_mut().find(|r| r.id == request_id)
    }

    /// Whether `request_id` is queued here
    #[must_use]
    pub fn contains(&self, request_id: RequestId) -> bool {
        self.get(request_id).is_some()
    }

    /// Open request placed by `requester_id`, if any
    #[must_use]
    pub fn open_request_by(&self, requester_id: UserId) -> Option<&Request> {
        self.requests.iter().find(|r| r.requester_id == requester_id)
    }

    /// Request at position 1
    #[must_use]
    pub fn head(&self) -> Option<&Request> {
        self.requests.first()
    }

    /// First request that takes part in fulfillment (hold shelf preference).
    ///
    /// Delivery requests are skipped entirely.
    #[must_use]
    pub fn eligible_head(&self) -> Option<&Request> {
        self.requests.iter().find(|r| r.is_eligible_for_fulfillment())
    }

    pub(crate) fn eligible_head_mut(&mut self) -> Option<&mut Request> {
        self.requests
            .iter_mut()
            .find(|r| r.is_eligible_for_fulfillment())
    }

    /// First eligible request already reserved for its requester
    #[must_use]
    pub fn first_in_fulfillment(&self) -> Option<&Request> {
        self.requests
            .iter()
            .find(|r| r.is_eligible_for_fulfillment() && r.status.is_in_fulfillment())
    }

    /// Append at the tail; returns the assigned position
    pub fn add(&mut self, mut request: Request) -> u32 {
        let position = position_for(self.requests.len());
        request.item_id = self.item_id;
        request.position = Some(position);
        self.requests.push(request);
        position
    }

    /// Insert at `position` (clamped to `1..=N+1`), shifting later requests down.
    ///
    /// Returns the position actually assigned.
    pub fn insert_at(&mut self, mut request: Request, position: u32) -> u32 {
        let slot = usize::try_from(position.saturating_sub(1))
            .unwrap_or(usize::MAX)
            .min(self.requests.len());
        request.item_id = self.item_id;
        self.requests.insert(slot, request);
        self.renumber();
        position_for(slot)
    }

    /// Remove a request and close the gap it leaves.
    ///
    /// The returned request no longer carries a position.
    pub fn remove(&mut self, request_id: RequestId) -> Option<Request> {
        let index = self.requests.iter().position(|r| r.id == request_id)?;
        let mut removed = self.requests.remove(index);
        removed.position = None;
        self.renumber();
        Some(removed)
    }

    /// Replace the order wholesale. `ordered` must name every queued request exactly once.
    ///
    /// Returns `false` (leaving the queue untouched) if it does not.
    pub fn apply_order(&mut self, ordered: &[RequestId]) -> bool {
        let unique: HashSet<RequestId> = ordered.iter().copied().collect();
        if unique.len() != ordered.len()
            || ordered.len() != self.requests.len()
            || !ordered.iter().all(|id| self.contains(*id))
        {
            return false;
        }

        let mut remaining = std::mem::take(&mut self.requests);
        for id in ordered {
            if let Some(index) = remaining.iter().position(|r| r.id == *id) {
                self.requests.push(remaining.swap_remove(index));
            }
        }
        self.renumber();
        true
    }

    /// Whether positions are exactly `1..=N` in storage order
    #[must_use]
    pub fn positions_are_contiguous(&self) -> bool {
        self.requests
            .iter()
            .enumerate()
            .all(|(index, r)| r.position == Some(position_for(index)) && r.is_open())
    }

    fn renumber(&mut self) {
        for (index, request) in self.requests.iter_mut().enumerate() {
            request.position = Some(position_for(index));
        }
    }
}
