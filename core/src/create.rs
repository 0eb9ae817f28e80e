//! Placing new requests on an item's queue.

use crate::environment::{CirculationEnvironment, LoanStatusProvider, RequestPolicyResolver};
use crate::error::{QueueError, Result};
use crate::fulfillment::FulfillmentResolver;
use crate::state::{CirculationState, QueueEvent};
use crate::types::{FulfilmentPreference, Item, ItemStatus, Loan, NewRequest, Request, RequestType, UserId};

/// A request that was queued
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Created {
    /// The open request with its assigned position
    pub request: Request,
    /// Active loan a recall now applies to
    pub recalled_loan: Option<Loan>,
}

/// Validates and queues new requests.
pub struct CreateRequestService<'a> {
    resolver: FulfillmentResolver<'a>,
    loans: &'a dyn LoanStatusProvider,
    policies: &'a dyn RequestPolicyResolver,
}

impl<'a> CreateRequestService<'a> {
    /// Service over an environment's collaborators
    #[must_use]
    pub fn from_env(env: &'a CirculationEnvironment) -> Self {
        Self {
            resolver: FulfillmentResolver::from_env(env),
            loans: env.loans.as_ref(),
            policies: env.policies.as_ref(),
        }
    }

    /// Queue `new_request` at the tail of its item's queue.
    ///
    /// # Errors
    ///
    /// - [`QueueError::NotFound`] if the item is not in scope
    /// - [`QueueError::Validation`] if the request breaks a placement rule
    /// - [`QueueError::Collaborator`] if policy resolution fails
    pub fn create(&self, state: &mut CirculationState, new_request: NewRequest) -> Result<Created> {
        let item_id = new_request.item_id;
        let ledger = state.ledger(item_id)?;

        if state.open_request(new_request.id).is_some()
            || state.closed_request(new_request.id).is_some()
        {
            return Err(QueueError::validation("Request with this id already exists")
                .with_parameter("id", new_request.id));
        }

        if new_request.fulfilment_preference == FulfilmentPreference::HoldShelf
            && new_request.pickup_service_point_id.is_none()
        {
            return Err(QueueError::validation(
                "Hold Shelf Fulfillment Requests require a Pickup Service Point",
            )
            .with_parameter("pickupServicePointId", "null"));
        }

        ensure_type_suits_item(new_request.request_type, ledger.item.status)?;
        ensure_not_queued_or_borrowing(
            self.loans,
            &ledger.item,
            ledger.queue.open_request_by(new_request.requester_id),
            new_request.requester_id,
        )?;
        ensure_policy_allows(
            self.policies,
            new_request.requester_id,
            &ledger.item,
            new_request.request_type,
        )?;

        let summary = ledger.item.summary();
        let request_type = new_request.request_type;
        let request = new_request.into_request(summary);
        let request_id = request.id;

        let ledger = state.ledger_mut(item_id)?;
        let position = ledger.queue.add(request);
        let status_change = self.resolver.recompute_item_status(ledger);
        let request = ledger
            .queue
            .get(request_id)
            .cloned()
            .ok_or_else(|| QueueError::request_not_found(request_id))?;

        state.emit(QueueEvent::RequestQueued {
            request_id,
            item_id,
            position,
        });
        if let Some(change) = status_change {
            state.emit(QueueEvent::ItemStatusChanged {
                item_id,
                from: change.from,
                to: change.to,
            });
        }

        let recalled_loan = if request_type == RequestType::Recall {
            self.loans.current_loan(item_id)
        } else {
            None
        };

        Ok(Created {
            request,
            recalled_loan,
        })
    }
}

/// Rejects request types that make no sense for the item's status
pub(crate) fn ensure_type_suits_item(request_type: RequestType, status: ItemStatus) -> Result<()> {
    if request_type.allowed_for(status) {
        Ok(())
    } else {
        Err(QueueError::validation(format!(
            "{request_type} requests are not allowed for {status} item"
        ))
        .with_parameter("requestType", request_type))
    }
}

/// Rejects a requester who already waits for or holds the item
pub(crate) fn ensure_not_queued_or_borrowing(
    loans: &dyn LoanStatusProvider,
    item: &Item,
    existing: Option<&Request>,
    requester_id: UserId,
) -> Result<()> {
    if let Some(existing) = existing {
        return Err(QueueError::validation(
            "This requester already has an open request for this item",
        )
        .with_parameter("requesterId", requester_id)
        .with_parameter("requestId", existing.id));
    }

    if loans
        .current_loan(item.id)
        .is_some_and(|loan| loan.user_id == requester_id)
    {
        return Err(
            QueueError::validation("This requester currently has this item on loan")
                .with_parameter("requesterId", requester_id)
                .with_parameter("itemId", item.id),
        );
    }

    Ok(())
}

/// Asks the circulation rules whether the patron may place this type
pub(crate) fn ensure_policy_allows(
    policies: &dyn RequestPolicyResolver,
    requester_id: UserId,
    item: &Item,
    request_type: RequestType,
) -> Result<()> {
    if policies.is_allowed(requester_id, item, request_type)? {
        Ok(())
    } else {
        Err(QueueError::validation(format!(
            "{request_type} requests are not allowed for this patron and item combination"
        ))
        .with_parameter("requestType", request_type))
    }
}
