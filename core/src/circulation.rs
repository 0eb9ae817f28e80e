//! The circulation reducer: one entry point for every queue mutation.
//!
//! Each action runs against a [`CirculationState`] scope holding the ledgers it
//! may touch. Rejected actions leave the scope exactly as it was, so a caller
//! can always commit the scope after `Ok` and drop it after `Err`.

use crate::action::CirculationAction;
use crate::cancel::CancelService;
use crate::create::CreateRequestService;
use crate::effect::{Effect, NoticeKind, PatronNotice};
use crate::environment::CirculationEnvironment;
use crate::error::{QueueError, Result};
use crate::fulfillment::{FulfillmentResolver, Transition};
use crate::move_request::MoveRequestService;
use crate::reducer::Reducer;
use crate::reorder::ReorderService;
use crate::state::{CirculationState, QueueEvent};
use crate::types::{ItemId, Loan, RequestId};
use smallvec::{SmallVec, smallvec};

/// Reducer for request queues and item fulfillment.
#[derive(Clone, Copy, Debug, Default)]
pub struct CirculationReducer;

impl CirculationReducer {
    /// Creates a new reducer
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn apply(
        state: &mut CirculationState,
        action: CirculationAction,
        env: &CirculationEnvironment,
    ) -> Result<SmallVec<[Effect; 4]>> {
        match action {
            CirculationAction::CreateRequest { request } => {
                let created = CreateRequestService::from_env(env).create(state, request)?;
                let mut effects: SmallVec<[Effect; 4]> = SmallVec::new();
                if let Some(loan) = created.recalled_loan {
                    effects.push(recall_effect(loan, created.request.id));
                }
                effects.push(Effect::SendNotice(PatronNotice::new(
                    NoticeKind::RequestCreated,
                    created.request.id,
                    created.request.requester_id,
                    created.request.item_id,
                )));
                Ok(effects)
            },

            CirculationAction::CancelRequest {
                request_id,
                cancellation,
            } => {
                let closed = CancelService::from_env(env).cancel(state, request_id, cancellation)?;
                Ok(smallvec![Effect::SendNotice(PatronNotice::new(
                    NoticeKind::RequestCancelled,
                    closed.id,
                    closed.requester_id,
                    closed.item_id,
                ))])
            },

            CirculationAction::DeleteRequest { request_id } => {
                CancelService::from_env(env).delete(state, request_id)?;
                Ok(SmallVec::new())
            },

            CirculationAction::MoveRequest {
                request_id,
                destination_item_id,
                request_type,
            } => {
                let moved = MoveRequestService::from_env(env).move_request(
                    state,
                    request_id,
                    destination_item_id,
                    request_type,
                )?;
                let mut effects: SmallVec<[Effect; 4]> = SmallVec::new();
                if let Some(loan) = moved.recalled_loan {
                    effects.push(recall_effect(loan, request_id));
                }
                effects.push(Effect::SendNotice(PatronNotice::new(
                    NoticeKind::RequestMoved,
                    request_id,
                    moved.request.requester_id,
                    destination_item_id,
                )));
                Ok(effects)
            },

            CirculationAction::ReorderQueue { item_id, positions } => {
                ReorderService::from_env(env).reorder(state, item_id, &positions)?;
                Ok(SmallVec::new())
            },

            CirculationAction::CheckIn {
                item_id,
                service_point_id,
            } => {
                let ledger = state.ledger_mut(item_id)?;
                let transition =
                    FulfillmentResolver::from_env(env).check_in(ledger, service_point_id)?;
                Ok(record(state, item_id, transition))
            },

            CirculationAction::CheckOut { item_id, user_id } => {
                let ledger = state.ledger_mut(item_id)?;
                let transition = FulfillmentResolver::from_env(env).check_out(ledger, user_id)?;
                Ok(record(state, item_id, transition))
            },

            CirculationAction::MarkMissing { item_id } => {
                let ledger = state.ledger_mut(item_id)?;
                let transition = FulfillmentResolver::from_env(env).mark_missing(ledger)?;
                Ok(record(state, item_id, transition))
            },
        }
    }
}

impl Reducer for CirculationReducer {
    type State = CirculationState;
    type Action = CirculationAction;
    type Environment = CirculationEnvironment;
    type Error = QueueError;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Result<SmallVec<[Effect; 4]>> {
        let snapshot = state.clone();
        let outcome = Self::apply(state, action, env);
        if outcome.is_err() {
            *state = snapshot;
        }
        outcome
    }
}

/// Due date recalculation followed by the borrower's recall notice
fn recall_effect(loan: Loan, recall_request_id: RequestId) -> Effect {
    let notice = PatronNotice::new(
        NoticeKind::ItemRecalled,
        recall_request_id,
        loan.user_id,
        loan.item_id,
    );
    Effect::chain(vec![
        Effect::RecalculateDueDate {
            loan,
            recall_request_id,
        },
        Effect::SendNotice(notice),
    ])
}

/// Journal a fulfillment transition and return its effects
fn record(
    state: &mut CirculationState,
    item_id: ItemId,
    transition: Transition,
) -> SmallVec<[Effect; 4]> {
    for (request_id, status) in transition.advanced {
        state.emit(QueueEvent::RequestStatusChanged { request_id, status });
    }
    if let Some(filled) = transition.filled {
        state.record_closed(filled.clone());
        state.emit(QueueEvent::RequestClosed { request: filled });
    }
    if let Some(change) = transition.item {
        state.emit(QueueEvent::ItemStatusChanged {
            item_id,
            from: change.from,
            to: change.to,
        });
    }
    transition
        .notice
        .map(Effect::SendNotice)
        .into_iter()
        .collect()
}
