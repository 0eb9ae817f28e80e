//! Collaborator stubs for unit tests inside this crate.

#![allow(clippy::unwrap_used)] // Test code

use crate::effect::PatronNotice;
use crate::environment::{
    CalendarService, CirculationEnvironment, Clock, LoanStatusProvider, NoticeDispatcher,
    RecallDueDateCalculator, RequestPolicyResolver,
};
use crate::error::CollaboratorError;
use crate::fulfillment::FulfillmentResolver;
use crate::state::ItemLedger;
use crate::types::{
    Item, ItemId, ItemStatus, ItemSummary, Loan, LoanId, NewRequest, RecallPolicy, Request,
    RequestType, ServicePointId, UserId,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub(crate) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap()
}

pub(crate) struct StubClock;

impl Clock for StubClock {
    fn now(&self) -> DateTime<Utc> {
        now()
    }
}

#[derive(Default)]
pub(crate) struct StubLoans(Mutex<HashMap<ItemId, Loan>>);

impl LoanStatusProvider for StubLoans {
    fn current_loan(&self, item_id: ItemId) -> Option<Loan> {
        self.0.lock().unwrap().get(&item_id).cloned()
    }
}

pub(crate) struct StubCalendar;

impl CalendarService for StubCalendar {
    fn hold_shelf_expiration(
        &self,
        _service_point_id: ServicePointId,
        at: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, CollaboratorError> {
        Ok(at + Duration::days(7))
    }
}

#[derive(Default)]
pub(crate) struct StubPolicies {
    denied: Mutex<Vec<RequestType>>,
    missing: Mutex<bool>,
}

impl RequestPolicyResolver for StubPolicies {
    fn is_allowed(
        &self,
        _patron: UserId,
        _item: &Item,
        request_type: RequestType,
    ) -> Result<bool, CollaboratorError> {
        if *self.missing.lock().unwrap() {
            return Err(CollaboratorError::PolicyNotFound {
                kind: "request",
                id: "default".to_string(),
            });
        }
        Ok(!self.denied.lock().unwrap().contains(&request_type))
    }

    fn recall_policy(&self, _loan: &Loan) -> Result<RecallPolicy, CollaboratorError> {
        Ok(RecallPolicy {
            minimum_guaranteed_loan_period: None,
            recall_return_interval: std::time::Duration::from_secs(86_400),
        })
    }
}

pub(crate) struct StubRecalls;

impl RecallDueDateCalculator for StubRecalls {
    fn recalculate(
        &self,
        loan: &Loan,
        _policy: &RecallPolicy,
    ) -> Result<DateTime<Utc>, CollaboratorError> {
        Ok(loan.due_date)
    }
}

pub(crate) struct StubNotices;

impl NoticeDispatcher for StubNotices {
    fn dispatch(&self, _notice: &PatronNotice) -> Result<(), CollaboratorError> {
        Ok(())
    }
}

/// One set of stubs shared by a test
pub(crate) struct Stubs {
    loans: Arc<StubLoans>,
    policies: Arc<StubPolicies>,
    env: CirculationEnvironment,
}

impl Stubs {
    pub(crate) fn new() -> Self {
        let loans = Arc::new(StubLoans::default());
        let policies = Arc::new(StubPolicies::default());
        let env = CirculationEnvironment::new(
            Arc::new(StubClock),
            loans.clone(),
            Arc::new(StubRecalls),
            policies.clone(),
            Arc::new(StubCalendar),
            Arc::new(StubNotices),
        );
        Self {
            loans,
            policies,
            env,
        }
    }

    pub(crate) fn env(&self) -> &CirculationEnvironment {
        &self.env
    }

    pub(crate) fn resolver(&self) -> FulfillmentResolver<'_> {
        FulfillmentResolver::from_env(&self.env)
    }

    pub(crate) fn expiration(&self) -> DateTime<Utc> {
        now() + Duration::days(7)
    }

    /// Open a loan on `item_id` to a fresh borrower
    pub(crate) fn lend(&self, item_id: ItemId) -> Loan {
        self.lend_to(item_id, UserId::new())
    }

    pub(crate) fn lend_to(&self, item_id: ItemId, user_id: UserId) -> Loan {
        let loan = Loan {
            id: LoanId::new(),
            item_id,
            user_id,
            due_date: now() + Duration::days(21),
        };
        self.loans.0.lock().unwrap().insert(item_id, loan.clone());
        loan
    }

    pub(crate) fn deny(&self, request_type: RequestType) {
        self.policies.denied.lock().unwrap().push(request_type);
    }

    pub(crate) fn lose_policies(&self) {
        *self.policies.missing.lock().unwrap() = true;
    }
}

pub(crate) fn hold_shelf(request_type: RequestType, pickup: ServicePointId) -> Request {
    NewRequest::hold_shelf(ItemId::new(), UserId::new(), request_type, now(), pickup)
        .into_request(ItemSummary::default())
}

pub(crate) fn item(status: ItemStatus) -> Item {
    Item::new(ItemId::new(), "The Left Hand of Darkness", "31234000123456").with_status(status)
}

pub(crate) fn ledger_with(status: ItemStatus, requests: Vec<Request>) -> ItemLedger {
    let mut ledger = ItemLedger::new(item(status));
    for request in requests {
        ledger.queue.add(request);
    }
    ledger
}
