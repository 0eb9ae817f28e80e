//! Environment module - injected collaborators.
//!
//! The queue engine never computes due dates, resolves circulation rules or
//! sends notices itself. It reaches those through the traits below, all of
//! which are synchronous and `Send + Sync` so one environment can be shared by
//! every in-flight operation.

use crate::effect::PatronNotice;
use crate::error::CollaboratorError;
use crate::types::{Item, ItemId, Loan, RecallPolicy, RequestType, ServicePointId, UserId};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Clock trait - abstracts time operations for testability
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Answers whether an item is currently on loan.
pub trait LoanStatusProvider: Send + Sync {
    /// Whether `item_id` has an open loan
    fn is_on_loan(&self, item_id: ItemId) -> bool {
        self.current_loan(item_id).is_some()
    }

    /// The open loan for `item_id`, if any
    fn current_loan(&self, item_id: ItemId) -> Option<Loan>;
}

/// Computes a recalled loan's new due date.
pub trait RecallDueDateCalculator: Send + Sync {
    /// New due date for `loan` under `policy`
    ///
    /// # Errors
    ///
    /// Returns [`CollaboratorError`] if the calculation cannot be made.
    fn recalculate(
        &self,
        loan: &Loan,
        policy: &RecallPolicy,
    ) -> Result<DateTime<Utc>, CollaboratorError>;
}

/// Resolves the circulation rules governing a patron and item.
pub trait RequestPolicyResolver: Send + Sync {
    /// Whether `patron` may place a `request_type` request on `item`
    ///
    /// # Errors
    ///
    /// Returns [`CollaboratorError::PolicyNotFound`] if no policy record applies.
    fn is_allowed(
        &self,
        patron: UserId,
        item: &Item,
        request_type: RequestType,
    ) -> Result<bool, CollaboratorError>;

    /// Recall parameters for the policy governing `loan`
    ///
    /// # Errors
    ///
    /// Returns [`CollaboratorError::PolicyNotFound`] if no policy record applies.
    fn recall_policy(&self, loan: &Loan) -> Result<RecallPolicy, CollaboratorError>;
}

/// Service point calendars.
pub trait CalendarService: Send + Sync {
    /// Last day an item placed on `service_point_id`'s hold shelf at `at` waits there
    ///
    /// # Errors
    ///
    /// Returns [`CollaboratorError`] if the calendar cannot be consulted.
    fn hold_shelf_expiration(
        &self,
        service_point_id: ServicePointId,
        at: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, CollaboratorError>;
}

/// Hands patron notices to whatever delivers them.
pub trait NoticeDispatcher: Send + Sync {
    /// Dispatch one notice
    ///
    /// # Errors
    ///
    /// Returns [`CollaboratorError`] if the notice could not be handed off.
    fn dispatch(&self, notice: &PatronNotice) -> Result<(), CollaboratorError>;
}

/// Every collaborator the circulation reducer and its effects need.
#[derive(Clone)]
pub struct CirculationEnvironment {
    /// Time source
    pub clock: Arc<dyn Clock>,
    /// Loan lookups
    pub loans: Arc<dyn LoanStatusProvider>,
    /// Recall due date calculation
    pub recalls: Arc<dyn RecallDueDateCalculator>,
    /// Request and recall policy resolution
    pub policies: Arc<dyn RequestPolicyResolver>,
    /// Hold shelf expiration dates
    pub calendar: Arc<dyn CalendarService>,
    /// Patron notice delivery
    pub notices: Arc<dyn NoticeDispatcher>,
}

impl CirculationEnvironment {
    /// Create a new environment
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        loans: Arc<dyn LoanStatusProvider>,
        recalls: Arc<dyn RecallDueDateCalculator>,
        policies: Arc<dyn RequestPolicyResolver>,
        calendar: Arc<dyn CalendarService>,
        notices: Arc<dyn NoticeDispatcher>,
    ) -> Self {
        Self {
            clock,
            loans,
            recalls,
            policies,
            calendar,
            notices,
        }
    }

    /// Replace the clock
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

impl std::fmt::Debug for CirculationEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CirculationEnvironment")
            .field("now", &self.clock.now())
            .finish_non_exhaustive()
    }
}
