//! In-memory collaborators with knobs for failure injection.
//!
//! All mocks are cheap to share: wrap them in an `Arc`, keep one clone for
//! assertions and hand the other to the environment.

use chrono::{DateTime, Duration, Utc};
use request_queue_core::{
    CalendarService, Clock, CollaboratorError, Item, ItemId, Loan, LoanId, LoanStatusProvider,
    NoticeDispatcher, NoticeKind, PatronNotice, RecallDueDateCalculator, RecallPolicy,
    RequestPolicyResolver, RequestType, ServicePointId, UserId,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Fixed clock for deterministic tests
///
/// Returns the same time until moved with [`FixedClock::advance`] or
/// [`FixedClock::set`].
///
/// # Example
///
/// ```
/// use request_queue_testing::mocks::FixedClock;
/// use request_queue_core::Clock;
/// use chrono::Utc;
///
/// let clock = FixedClock::new(Utc::now());
/// let time1 = clock.now();
/// let time2 = clock.now();
/// assert_eq!(time1, time2);
/// ```
#[derive(Debug)]
pub struct FixedClock {
    time: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    /// Create a new fixed clock with the given time
    #[must_use]
    pub const fn new(time: DateTime<Utc>) -> Self {
        Self {
            time: Mutex::new(time),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        let mut time = lock(&self.time);
        *time += by;
    }

    /// Jump to `time`
    pub fn set(&self, time: DateTime<Utc>) {
        *lock(&self.time) = time;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *lock(&self.time)
    }
}

/// Loans keyed by item; at most one per item
#[derive(Debug, Default)]
pub struct InMemoryLoans {
    loans: Mutex<HashMap<ItemId, Loan>>,
}

impl InMemoryLoans {
    /// Create an empty loan book
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a loan of `item_id` to `user_id`, replacing any existing one
    pub fn lend(&self, item_id: ItemId, user_id: UserId, due_date: DateTime<Utc>) -> Loan {
        let loan = Loan {
            id: LoanId::new(),
            item_id,
            user_id,
            due_date,
        };
        lock(&self.loans).insert(item_id, loan.clone());
        loan
    }

    /// Close the loan on `item_id`
    pub fn return_item(&self, item_id: ItemId) -> Option<Loan> {
        lock(&self.loans).remove(&item_id)
    }

    /// Number of open loans
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.loans).len()
    }

    /// Whether no loan is open
    #[must_use]
    pub fn is_empty(&self) -> bool {
        lock(&self.loans).is_empty()
    }
}

impl LoanStatusProvider for InMemoryLoans {
    fn current_loan(&self, item_id: ItemId) -> Option<Loan> {
        lock(&self.loans).get(&item_id).cloned()
    }
}

/// Request policy that allows everything unless told otherwise
#[derive(Debug)]
pub struct StaticRequestPolicies {
    denied_types: Mutex<HashSet<RequestType>>,
    denied_patrons: Mutex<HashSet<UserId>>,
    missing: Mutex<bool>,
    recall_policy: RecallPolicy,
}

impl StaticRequestPolicies {
    /// Allow every request type for every patron
    #[must_use]
    pub fn allow_all() -> Self {
        Self {
            denied_types: Mutex::new(HashSet::new()),
            denied_patrons: Mutex::new(HashSet::new()),
            missing: Mutex::new(false),
            recall_policy: RecallPolicy {
                minimum_guaranteed_loan_period: Some(std::time::Duration::from_secs(7 * 86_400)),
                recall_return_interval: std::time::Duration::from_secs(3 * 86_400),
            },
        }
    }

    /// Deny `request_type` for everyone
    pub fn deny_type(&self, request_type: RequestType) {
        lock(&self.denied_types).insert(request_type);
    }

    /// Deny every request for `patron`
    pub fn deny_patron(&self, patron: UserId) {
        lock(&self.denied_patrons).insert(patron);
    }

    /// Make every lookup fail as if the policy record was deleted
    pub fn remove_policies(&self) {
        *lock(&self.missing) = true;
    }

    /// Recall policy handed out for every loan
    #[must_use]
    pub const fn recall_policy(&self) -> &RecallPolicy {
        &self.recall_policy
    }

    fn ensure_present(&self, kind: &'static str) -> Result<(), CollaboratorError> {
        if *lock(&self.missing) {
            return Err(CollaboratorError::PolicyNotFound {
                kind,
                id: "default".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for StaticRequestPolicies {
    fn default() -> Self {
        Self::allow_all()
    }
}

impl RequestPolicyResolver for StaticRequestPolicies {
    fn is_allowed(
        &self,
        patron: UserId,
        _item: &Item,
        request_type: RequestType,
    ) -> Result<bool, CollaboratorError> {
        self.ensure_present("request")?;
        Ok(!lock(&self.denied_types).contains(&request_type)
            && !lock(&self.denied_patrons).contains(&patron))
    }

    fn recall_policy(&self, _loan: &Loan) -> Result<RecallPolicy, CollaboratorError> {
        self.ensure_present("recall")?;
        Ok(self.recall_policy.clone())
    }
}

/// Calendar where every service point keeps items for the same period
#[derive(Debug)]
pub struct FixedCalendar {
    hold_period: Duration,
    unavailable: Mutex<bool>,
}

impl FixedCalendar {
    /// Keep items on the hold shelf for `hold_period`
    #[must_use]
    pub const fn new(hold_period: Duration) -> Self {
        Self {
            hold_period,
            unavailable: Mutex::new(false),
        }
    }

    /// Make every lookup fail
    pub fn go_offline(&self) {
        *lock(&self.unavailable) = true;
    }
}

impl Default for FixedCalendar {
    fn default() -> Self {
        Self::new(Duration::days(7))
    }
}

impl CalendarService for FixedCalendar {
    fn hold_shelf_expiration(
        &self,
        _service_point_id: ServicePointId,
        at: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, CollaboratorError> {
        if *lock(&self.unavailable) {
            return Err(CollaboratorError::Unavailable {
                collaborator: "calendar",
                reason: "offline".to_string(),
            });
        }
        Ok(at + self.hold_period)
    }
}

/// Recall calculator that remembers every loan it was asked about
///
/// The recalled due date is `recalled_at` plus the policy's return interval,
/// never later than the current due date.
#[derive(Debug)]
pub struct RecordingRecallCalculator {
    recalled_at: DateTime<Utc>,
    recalled: Mutex<Vec<Loan>>,
    failing: Mutex<bool>,
}

impl RecordingRecallCalculator {
    /// Create a working calculator that recalls as of `recalled_at`
    #[must_use]
    pub const fn new(recalled_at: DateTime<Utc>) -> Self {
        Self {
            recalled_at,
            recalled: Mutex::new(Vec::new()),
            failing: Mutex::new(false),
        }
    }

    /// Make every recalculation fail
    pub fn fail(&self) {
        *lock(&self.failing) = true;
    }

    /// Loans recalculated so far
    #[must_use]
    pub fn recalled(&self) -> Vec<Loan> {
        lock(&self.recalled).clone()
    }
}

impl Default for RecordingRecallCalculator {
    fn default() -> Self {
        Self::new(crate::test_time())
    }
}

impl RecallDueDateCalculator for RecordingRecallCalculator {
    fn recalculate(
        &self,
        loan: &Loan,
        policy: &RecallPolicy,
    ) -> Result<DateTime<Utc>, CollaboratorError> {
        if *lock(&self.failing) {
            return Err(CollaboratorError::Unavailable {
                collaborator: "recall calculator",
                reason: "injected failure".to_string(),
            });
        }
        lock(&self.recalled).push(loan.clone());
        let interval = Duration::from_std(policy.recall_return_interval)
            .unwrap_or_else(|_| Duration::days(1));
        Ok(loan.due_date.min(self.recalled_at + interval))
    }
}

/// Notice dispatcher that keeps every notice it was given
#[derive(Debug, Default)]
pub struct RecordingNotices {
    sent: Mutex<Vec<PatronNotice>>,
    failing: Mutex<bool>,
}

impl RecordingNotices {
    /// Create a working dispatcher
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every dispatch fail
    pub fn fail(&self) {
        *lock(&self.failing) = true;
    }

    /// Notices dispatched so far
    #[must_use]
    pub fn sent(&self) -> Vec<PatronNotice> {
        lock(&self.sent).clone()
    }

    /// Notices of one kind dispatched so far
    #[must_use]
    pub fn sent_of(&self, kind: NoticeKind) -> Vec<PatronNotice> {
        lock(&self.sent)
            .iter()
            .filter(|notice| notice.kind == kind)
            .cloned()
            .collect()
    }
}

impl NoticeDispatcher for RecordingNotices {
    fn dispatch(&self, notice: &PatronNotice) -> Result<(), CollaboratorError> {
        if *lock(&self.failing) {
            return Err(CollaboratorError::Unavailable {
                collaborator: "notices",
                reason: "injected failure".to_string(),
            });
        }
        lock(&self.sent).push(notice.clone());
        Ok(())
    }
}
