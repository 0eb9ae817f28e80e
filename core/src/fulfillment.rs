//! Turns circulation events into queue and item status transitions.
//!
//! Only hold shelf requests take part in deciding who is next. Delivery
//! requests sit in the queue with their positions but never block a checkout
//! and never advance past "not yet filled" here.

use crate::effect::{NoticeKind, PatronNotice};
use crate::environment::{CalendarService, CirculationEnvironment, Clock, LoanStatusProvider};
use crate::error::{QueueError, Result};
use crate::state::ItemLedger;
use crate::types::{ItemStatus, Request, RequestId, RequestStatus, RequestType, ServicePointId, UserId};

/// An item status change
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusChange {
    /// Status before
    pub from: ItemStatus,
    /// Status after
    pub to: ItemStatus,
}

/// Everything a check-in or check-out changed on one ledger.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Transition {
    /// Item status change, if the status moved
    pub item: Option<StatusChange>,
    /// Open requests whose sub-status changed
    pub advanced: Vec<(RequestId, RequestStatus)>,
    /// Request that was filled and left the queue
    pub filled: Option<Request>,
    /// Notice to send once the change is committed
    pub notice: Option<PatronNotice>,
}

/// Applies check-in, check-out and status derivation rules to a ledger.
#[derive(Clone, Copy)]
pub struct FulfillmentResolver<'a> {
    clock: &'a dyn Clock,
    loans: &'a dyn LoanStatusProvider,
    calendar: &'a dyn CalendarService,
}

impl<'a> FulfillmentResolver<'a> {
    /// Resolver over explicit collaborators
    #[must_use]
    pub const fn new(
        clock: &'a dyn Clock,
        loans: &'a dyn LoanStatusProvider,
        calendar: &'a dyn CalendarService,
    ) -> Self {
        Self {
            clock,
            loans,
            calendar,
        }
    }

    /// Resolver over an environment's collaborators
    #[must_use]
    pub fn from_env(env: &'a CirculationEnvironment) -> Self {
        Self::new(env.clock.as_ref(), env.loans.as_ref(), env.calendar.as_ref())
    }

    /// The item was checked in at `service_point_id`.
    ///
    /// # Errors
    ///
    /// Returns a validation error, leaving the ledger untouched, if the next
    /// eligible request has no pickup service point. Calendar failures pass
    /// through.
    pub fn check_in(
        &self,
        ledger: &mut ItemLedger,
        service_point_id: ServicePointId,
    ) -> Result<Transition> {
        let before = ledger.item.status;
        let item_id = ledger.item_id();

        let Some(head) = ledger.queue.eligible_head() else {
            ledger.set_status(ItemStatus::Available, None);
            return Ok(Transition {
                item: change(before, ItemStatus::Available),
                ..Transition::default()
            });
        };

        let Some(pickup) = head.pickup_service_point_id else {
            return Err(QueueError::validation(
                "Hold shelf request at head of queue has no pickup service point",
            )
            .with_parameter("requestId", head.id));
        };

        let already_waiting_here =
            head.status == RequestStatus::OpenAwaitingPickup && pickup == service_point_id;
        let expiration = if pickup != service_point_id {
            None
        } else if already_waiting_here && head.hold_shelf_expiration_date.is_some() {
            head.hold_shelf_expiration_date
        } else {
            Some(
                self.calendar
                    .hold_shelf_expiration(service_point_id, self.clock.now())?,
            )
        };

        let Some(head) = ledger.queue.eligible_head_mut() else {
            return Ok(Transition::default());
        };
        let previous = head.status;
        let (request_status, item_status, destination) = if pickup == service_point_id {
            (RequestStatus::OpenAwaitingPickup, ItemStatus::AwaitingPickup, None)
        } else {
            (RequestStatus::OpenInTransit, ItemStatus::InTransit, Some(pickup))
        };
        head.status = request_status;
        head.hold_shelf_expiration_date = expiration;

        let notice = (request_status == RequestStatus::OpenAwaitingPickup
            && previous != RequestStatus::OpenAwaitingPickup)
            .then(|| {
                PatronNotice::new(
                    NoticeKind::AvailableForPickup,
                    head.id,
                    head.requester_id,
                    item_id,
                )
            });
        let advanced = if previous == request_status {
            Vec::new()
        } else {
            vec![(head.id, request_status)]
        };

        ledger.set_status(item_status, destination);
        Ok(Transition {
            item: change(before, item_status),
            advanced,
            filled: None,
            notice,
        })
    }

    /// The item is being checked out to `user_id`.
    ///
    /// # Errors
    ///
    /// Returns a validation error, leaving the ledger untouched, if the next
    /// eligible request belongs to somebody else.
    pub fn check_out(&self, ledger: &mut ItemLedger, user_id: UserId) -> Result<Transition> {
        let before = ledger.item.status;

        let filled = match ledger.queue.eligible_head() {
            None => None,
            Some(head) if head.requester_id == user_id => {
                let head_id = head.id;
                ledger.queue.remove(head_id).map(|mut request| {
                    request.status = RequestStatus::ClosedFilled;
                    request
                })
            },
            Some(head) => {
                return Err(QueueError::validation(blocked_checkout_message(
                    &ledger.item.barcode,
                    head.status,
                ))
                .with_parameter("itemBarcode", &ledger.item.barcode)
                .with_parameter("userId", user_id));
            },
        };

        ledger.set_status(ItemStatus::CheckedOut, None);
        Ok(Transition {
            item: change(before, ItemStatus::CheckedOut),
            advanced: Vec::new(),
            filled,
            notice: None,
        })
    }

    /// Staff declared the item missing.
    ///
    /// Requests the item was reserved for go back to waiting, since the copy
    /// they were waiting on is gone.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the item is on loan.
    pub fn mark_missing(&self, ledger: &mut ItemLedger) -> Result<Transition> {
        if self.loans.is_on_loan(ledger.item_id()) {
            return Err(
                QueueError::validation("Checked out items cannot be declared missing")
                    .with_parameter("itemId", ledger.item_id()),
            );
        }

        let before = ledger.item.status;
        let ids: Vec<RequestId> = ledger
            .queue
            .requests()
            .iter()
            .filter(|r| r.is_eligible_for_fulfillment() && r.status.is_in_fulfillment())
            .map(|r| r.id)
            .collect();
        let mut advanced = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(request) = ledger.queue.get_mut(id) {
                request.status = RequestStatus::OpenNotYetFilled;
                request.hold_shelf_expiration_date = None;
                advanced.push((id, RequestStatus::OpenNotYetFilled));
            }
        }

        ledger.set_status(ItemStatus::Missing, None);
        Ok(Transition {
            item: change(before, ItemStatus::Missing),
            advanced,
            filled: None,
            notice: None,
        })
    }

    /// Derive the item status from its loan and queue.
    ///
    /// Returns the change if the status moved. The in-transit destination is
    /// refreshed either way.
    pub fn recompute_item_status(&self, ledger: &mut ItemLedger) -> Option<StatusChange> {
        let before = ledger.item.status;
        let (status, destination) = self.derive_status(ledger);
        ledger.set_status(status, destination);
        change(before, status)
    }

    fn derive_status(&self, ledger: &ItemLedger) -> (ItemStatus, Option<ServicePointId>) {
        if self.loans.is_on_loan(ledger.item_id()) {
            return (ItemStatus::CheckedOut, None);
        }

        if let Some(active) = ledger.queue.first_in_fulfillment() {
            if let Some(status) = ItemStatus::for_fulfillment(active.status) {
                let destination = (status == ItemStatus::InTransit)
                    .then_some(active.pickup_service_point_id)
                    .flatten();
                return (status, destination);
            }
        }

        let paged = ledger.queue.eligible_head().is_some_and(|head| {
            head.request_type == RequestType::Page && head.status == RequestStatus::OpenNotYetFilled
        });
        if paged {
            return (ItemStatus::Paged, None);
        }

        if ledger.item.status == ItemStatus::Missing {
            return (ItemStatus::Missing, None);
        }

        (ItemStatus::Available, None)
    }
}

fn change(from: ItemStatus, to: ItemStatus) -> Option<StatusChange> {
    (from != to).then_some(StatusChange { from, to })
}

fn blocked_checkout_message(barcode: &str, head_status: RequestStatus) -> String {
    let reason = match head_status {
        RequestStatus::OpenAwaitingPickup => "is awaiting pickup by another patron",
        RequestStatus::OpenAwaitingDelivery => "is awaiting delivery by another patron",
        RequestStatus::OpenInTransit => "is in transit for another patron",
        _ => "has been requested by another patron",
    };
    format!("Item ({barcode}) {reason}")
}
