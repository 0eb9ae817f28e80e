//! Relocating an open request from one item's queue to another's.
//!
//! A move is one unit across both ledgers: every check runs before either
//! queue is touched.

use crate::create::{ensure_not_queued_or_borrowing, ensure_policy_allows, ensure_type_suits_item};
use crate::environment::{CirculationEnvironment, LoanStatusProvider, RequestPolicyResolver};
use crate::error::{QueueError, Result};
use crate::fulfillment::{FulfillmentResolver, StatusChange};
use crate::state::{CirculationState, QueueEvent};
use crate::types::{ItemId, ItemStatus, Loan, Request, RequestId, RequestStatus, RequestType};

/// A request that landed on a new item
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Moved {
    /// The request as it now sits on the destination
    pub request: Request,
    /// Item it left
    pub source_item_id: ItemId,
    /// Active loan on the destination a recall now applies to
    pub recalled_loan: Option<Loan>,
}

/// Moves requests between queues.
pub struct MoveRequestService<'a> {
    resolver: FulfillmentResolver<'a>,
    loans: &'a dyn LoanStatusProvider,
    policies: &'a dyn RequestPolicyResolver,
}

impl<'a> MoveRequestService<'a> {
    /// Service over an environment's collaborators
    #[must_use]
    pub fn from_env(env: &'a CirculationEnvironment) -> Self {
        Self {
            resolver: FulfillmentResolver::from_env(env),
            loans: env.loans.as_ref(),
            policies: env.policies.as_ref(),
        }
    }

    /// Move `request_id` onto `destination_item_id`.
    ///
    /// Without an explicit type the request takes the destination's default:
    /// Page on an available item, Recall kept if it was one, Hold otherwise.
    /// The item and requester summaries travel with the request unchanged.
    ///
    /// # Errors
    ///
    /// - [`QueueError::NotFound`] for an unknown request or destination
    /// - [`QueueError::Validation`] if the request is closed, already on the
    ///   destination, blocked by a duplicate, or its type is not allowed
    /// - [`QueueError::Collaborator`] if policy resolution fails
    pub fn move_request(
        &self,
        state: &mut CirculationState,
        request_id: RequestId,
        destination_item_id: ItemId,
        request_type: Option<RequestType>,
    ) -> Result<Moved> {
        if state.closed_request(request_id).is_some() {
            return Err(QueueError::closed_request(request_id));
        }
        let source_item_id = state
            .locate_open(request_id)
            .ok_or_else(|| QueueError::request_not_found(request_id))?;
        let destination = state.ledger(destination_item_id)?;

        if source_item_id == destination_item_id {
            return Err(
                QueueError::validation("Request is already queued on this item")
                    .with_parameter("destinationItemId", destination_item_id),
            );
        }

        let original = state
            .open_request(request_id)
            .ok_or_else(|| QueueError::request_not_found(request_id))?;
        let requester_id = original.requester_id;
        let effective_type = request_type
            .unwrap_or_else(|| default_type(destination.item.status, original.request_type));

        ensure_not_queued_or_borrowing(
            self.loans,
            &destination.item,
            destination.queue.open_request_by(requester_id),
            requester_id,
        )?;
        ensure_type_suits_item(effective_type, destination.item.status)?;
        ensure_policy_allows(self.policies, requester_id, &destination.item, effective_type)?;

        let source = state.ledger_mut(source_item_id)?;
        let mut request = source
            .queue
            .remove(request_id)
            .ok_or_else(|| QueueError::request_not_found(request_id))?;
        let source_change = self.resolver.recompute_item_status(source);

        request.request_type = effective_type;
        request.status = RequestStatus::OpenNotYetFilled;
        request.hold_shelf_expiration_date = None;

        let destination = state.ledger_mut(destination_item_id)?;
        let behind_active_head = destination
            .queue
            .head()
            .is_some_and(|head| head.status.is_in_fulfillment());
        let position = if behind_active_head {
            destination.queue.insert_at(request, 2)
        } else {
            destination.queue.add(request)
        };
        let destination_change = self.resolver.recompute_item_status(destination);
        let request = destination
            .queue
            .get(request_id)
            .cloned()
            .ok_or_else(|| QueueError::request_not_found(request_id))?;

        state.emit(QueueEvent::RequestMoved {
            request_id,
            from: source_item_id,
            to: destination_item_id,
            position,
        });
        emit_change(state, source_item_id, source_change);
        emit_change(state, destination_item_id, destination_change);

        let recalled_loan = if effective_type == RequestType::Recall {
            self.loans.current_loan(destination_item_id)
        } else {
            None
        };

        Ok(Moved {
            request,
            source_item_id,
            recalled_loan,
        })
    }
}

/// Type a moved request takes when the caller does not pick one
const fn default_type(destination_status: ItemStatus, original: RequestType) -> RequestType {
    match (destination_status, original) {
        (ItemStatus::Available, _) => RequestType::Page,
        (ItemStatus::Missing, _) => RequestType::Hold,
        (_, RequestType::Recall) => RequestType::Recall,
        _ => RequestType::Hold,
    }
}

fn emit_change(state: &mut CirculationState, item_id: ItemId, change: Option<StatusChange>) {
    if let Some(change) = change {
        state.emit(QueueEvent::ItemStatusChanged {
            item_id,
            from: change.from,
            to: change.to,
        });
    }
}
