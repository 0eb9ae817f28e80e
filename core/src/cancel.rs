//! Cancelling and deleting requests.

use crate::environment::{CirculationEnvironment, Clock};
use crate::error::{QueueError, Result};
use crate::fulfillment::FulfillmentResolver;
use crate::state::{CirculationState, QueueEvent};
use crate::types::{Cancellation, CancellationDetails, ItemId, Request, RequestId, RequestStatus};

/// Closes requests on behalf of patrons and staff.
pub struct CancelService<'a> {
    resolver: FulfillmentResolver<'a>,
    clock: &'a dyn Clock,
}

impl<'a> CancelService<'a> {
    /// Service over an environment's collaborators
    #[must_use]
    pub fn from_env(env: &'a CirculationEnvironment) -> Self {
        Self {
            resolver: FulfillmentResolver::from_env(env),
            clock: env.clock.as_ref(),
        }
    }

    /// Cancel an open request.
    ///
    /// Returns the closed record: status `Closed - Cancelled`, no position,
    /// cancellation metadata stamped with the current time.
    ///
    /// # Errors
    ///
    /// - [`QueueError::Validation`] if the request is already closed
    /// - [`QueueError::NotFound`] if the request is not in scope
    pub fn cancel(
        &self,
        state: &mut CirculationState,
        request_id: RequestId,
        details: CancellationDetails,
    ) -> Result<Request> {
        if state.closed_request(request_id).is_some() {
            return Err(QueueError::closed_request(request_id));
        }
        let item_id = state
            .locate_open(request_id)
            .ok_or_else(|| QueueError::request_not_found(request_id))?;

        let mut request = self.take_open(state, item_id, request_id)?;
        request.status = RequestStatus::ClosedCancelled;
        request.cancellation = Some(Cancellation {
            reason_id: details.reason_id,
            cancelled_by: details.cancelled_by,
            cancelled_date: self.clock.now(),
            additional_information: details.additional_information,
        });

        state.record_closed(request.clone());
        state.emit(QueueEvent::RequestClosed {
            request: request.clone(),
        });
        Ok(request)
    }

    /// Delete a request record.
    ///
    /// Open requests leave their queue; closed records are purged.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::NotFound`] if the request is not in scope.
    pub fn delete(&self, state: &mut CirculationState, request_id: RequestId) -> Result<Request> {
        if let Some(closed) = state.purge_closed(request_id) {
            state.emit(QueueEvent::RequestDeleted {
                request_id,
                item_id: closed.item_id,
            });
            return Ok(closed);
        }

        let item_id = state
            .locate_open(request_id)
            .ok_or_else(|| QueueError::request_not_found(request_id))?;
        let removed = self.take_open(state, item_id, request_id)?;
        state.emit(QueueEvent::RequestDeleted {
            request_id,
            item_id,
        });
        Ok(removed)
    }

    fn take_open(
        &self,
        state: &mut CirculationState,
        item_id: ItemId,
        request_id: RequestId,
    ) -> Result<Request> {
        let ledger = state.ledger_mut(item_id)?;
        let removed = ledger
            .queue
            .remove(request_id)
            .ok_or_else(|| QueueError::request_not_found(request_id))?;
        let status_change = self.resolver.recompute_item_status(ledger);

        if let Some(change) = status_change {
            state.emit(QueueEvent::ItemStatusChanged {
                item_id,
                from: change.from,
                to: change.to,
            });
        }
        Ok(removed)
    }
}
