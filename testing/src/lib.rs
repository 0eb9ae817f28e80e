//! # Request Queue Testing
//!
//! Testing utilities for the request queue engine.
//!
//! This crate provides:
//! - In-memory collaborators with failure injection ([`mocks`])
//! - A wired-up [`TestEnvironment`]
//! - Fixtures for items, requests and cancellations ([`fixtures`])
//! - Property-based testing strategies ([`properties`])
//! - Given-When-Then reducer tests ([`ReducerTest`])
//!
//! ## Example
//!
//! ```ignore
//! use request_queue_testing::{TestEnvironment, fixtures};
//! use request_queue_runtime::QueueStore;
//!
//! #[tokio::test]
//! async fn test_hold_flow() {
//!     let env = TestEnvironment::new();
//!     let store = QueueStore::new(env.environment());
//!     let item = store.register_item(fixtures::item("31234000000001")).await.unwrap();
//!
//!     let hold = fixtures::hold(item.item_id(), UserId::new(), fixtures::main_desk());
//!     let created = store.create(hold).await.unwrap();
//!     assert_eq!(created.value.position, Some(1));
//! }
//! ```

use chrono::{DateTime, TimeZone, Utc};
use request_queue_core::CirculationEnvironment;
use std::sync::Arc;

pub mod mocks;

mod reducer_test;

pub use mocks::{
    FixedCalendar, FixedClock, InMemoryLoans, RecordingNotices, RecordingRecallCalculator,
    StaticRequestPolicies,
};
pub use reducer_test::{ReducerTest, assertions};

/// The time every test environment starts at (2025-03-10 09:00:00 UTC)
#[must_use]
pub fn test_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0)
        .single()
        .unwrap_or_default()
}

/// Create a default fixed clock for tests
#[must_use]
pub fn test_clock() -> FixedClock {
    FixedClock::new(test_time())
}

/// Install a test subscriber once per process.
///
/// Honors `RUST_LOG`; silent otherwise. Safe to call from every test.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Every collaborator as a mock, with handles kept for assertions
#[derive(Debug, Clone)]
pub struct TestEnvironment {
    /// Adjustable clock
    pub clock: Arc<FixedClock>,
    /// Loan book
    pub loans: Arc<InMemoryLoans>,
    /// Recall calculator
    pub recalls: Arc<RecordingRecallCalculator>,
    /// Request and recall policies
    pub policies: Arc<StaticRequestPolicies>,
    /// Hold shelf calendar
    pub calendar: Arc<FixedCalendar>,
    /// Notice sink
    pub notices: Arc<RecordingNotices>,
}

impl TestEnvironment {
    /// Fresh mocks starting at [`test_time`]
    #[must_use]
    pub fn new() -> Self {
        Self {
            clock: Arc::new(test_clock()),
            loans: Arc::new(InMemoryLoans::new()),
            recalls: Arc::new(RecordingRecallCalculator::new(test_time())),
            policies: Arc::new(StaticRequestPolicies::allow_all()),
            calendar: Arc::new(FixedCalendar::default()),
            notices: Arc::new(RecordingNotices::new()),
        }
    }

    /// The environment handed to reducers and stores
    #[must_use]
    pub fn environment(&self) -> CirculationEnvironment {
        CirculationEnvironment::new(
            self.clock.clone(),
            self.loans.clone(),
            self.recalls.clone(),
            self.policies.clone(),
            self.calendar.clone(),
            self.notices.clone(),
        )
    }
}

impl Default for TestEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

/// Builders for items, requests and cancellations
pub mod fixtures {
    use super::test_time;
    use request_queue_core::{
        CancellationDetails, Item, ItemId, ItemLedger, ItemStatus, NewRequest, RequestType,
        RequesterSummary, ServicePointId, UserId,
    };
    use uuid::Uuid;

    /// A fixed service point: the main circulation desk
    #[must_use]
    pub const fn main_desk() -> ServicePointId {
        ServicePointId::from_uuid(Uuid::from_u128(0x5e_1000_0000_0000_0000_0000_0000_0001))
    }

    /// A fixed service point: the branch library
    #[must_use]
    pub const fn branch_desk() -> ServicePointId {
        ServicePointId::from_uuid(Uuid::from_u128(0x5e_1000_0000_0000_0000_0000_0000_0002))
    }

    /// Available item with a fresh id
    #[must_use]
    pub fn item(barcode: &str) -> Item {
        Item::new(ItemId::new(), "Smoke and Mirrors", barcode)
    }

    /// Item with a fresh id in `status`
    #[must_use]
    pub fn item_with_status(barcode: &str, status: ItemStatus) -> Item {
        item(barcode).with_status(status)
    }

    /// Empty ledger for an available item
    #[must_use]
    pub fn ledger(barcode: &str) -> ItemLedger {
        ItemLedger::new(item(barcode))
    }

    /// Hold shelf request of `request_type` picked up at `pickup`
    #[must_use]
    pub fn request(
        request_type: RequestType,
        item_id: ItemId,
        requester_id: UserId,
        pickup: ServicePointId,
    ) -> NewRequest {
        NewRequest::hold_shelf(item_id, requester_id, request_type, test_time(), pickup)
            .with_requester(RequesterSummary {
                name: "Jessica Jones".to_string(),
                barcode: "777111".to_string(),
            })
    }

    /// Hold shelf page
    #[must_use]
    pub fn page(item_id: ItemId, requester_id: UserId, pickup: ServicePointId) -> NewRequest {
        request(RequestType::Page, item_id, requester_id, pickup)
    }

    /// Hold shelf hold
    #[must_use]
    pub fn hold(item_id: ItemId, requester_id: UserId, pickup: ServicePointId) -> NewRequest {
        request(RequestType::Hold, item_id, requester_id, pickup)
    }

    /// Hold shelf recall
    #[must_use]
    pub fn recall(item_id: ItemId, requester_id: UserId, pickup: ServicePointId) -> NewRequest {
        request(RequestType::Recall, item_id, requester_id, pickup)
    }

    /// Delivery request
    #[must_use]
    pub fn delivery(item_id: ItemId, requester_id: UserId, request_type: RequestType) -> NewRequest {
        NewRequest::delivery(item_id, requester_id, request_type, test_time())
    }

    /// Cancellation by `cancelled_by` with a fixed reason
    #[must_use]
    pub fn cancellation(cancelled_by: UserId) -> CancellationDetails {
        CancellationDetails {
            reason_id: Uuid::from_u128(0xca_0001),
            cancelled_by,
            additional_information: Some("Patron no longer needs the item".to_string()),
        }
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use proptest::prelude::*;
    use request_queue_core::{ItemStatus, RequestType};

    /// Any request type
    pub fn request_type() -> impl Strategy<Value = RequestType> {
        prop_oneof![
            Just(RequestType::Page),
            Just(RequestType::Hold),
            Just(RequestType::Recall),
        ]
    }

    /// Any item status an item can be registered with
    pub fn item_status() -> impl Strategy<Value = ItemStatus> {
        prop_oneof![
            Just(ItemStatus::Available),
            Just(ItemStatus::CheckedOut),
            Just(ItemStatus::Missing),
            Just(ItemStatus::InTransit),
            Just(ItemStatus::AwaitingPickup),
            Just(ItemStatus::Paged),
        ]
    }

    /// One step of a random circulation session.
    ///
    /// Indices are taken modulo whatever the session has at that point, so
    /// every generated step can be applied.
    #[derive(Clone, Debug)]
    pub enum QueueStep {
        /// Patron `patron` places a request of the given type
        Create {
            /// Patron index
            patron: usize,
            /// Requested type
            request_type: RequestType,
        },
        /// Cancel the n-th open request
        Cancel(usize),
        /// Move the n-th open request to the other item
        Move(usize),
        /// Reverse the queue of the item holding the n-th open request
        Reverse(usize),
        /// Check the item in at the main desk
        CheckIn,
        /// Check the item out to the n-th requester in the queue
        CheckOut(usize),
    }

    /// A single step
    pub fn queue_step(patrons: usize) -> impl Strategy<Value = QueueStep> {
        let patrons = patrons.max(1);
        prop_oneof![
            4 => (0..patrons, request_type())
                .prop_map(|(patron, request_type)| QueueStep::Create { patron, request_type }),
            1 => any::<usize>().prop_map(QueueStep::Cancel),
            1 => any::<usize>().prop_map(QueueStep::Move),
            1 => any::<usize>().prop_map(QueueStep::Reverse),
            1 => Just(QueueStep::CheckIn),
            1 => any::<usize>().prop_map(QueueStep::CheckOut),
        ]
    }

    /// A session of up to `max_steps` steps among `patrons` patrons
    pub fn queue_session(patrons: usize, max_steps: usize) -> impl Strategy<Value = Vec<QueueStep>> {
        prop::collection::vec(queue_step(patrons), 0..=max_steps)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;
    use request_queue_core::{Clock, LoanStatusProvider};

    #[test]
    fn test_environment_shares_mocks() {
        let env = TestEnvironment::new();
        let environment = env.environment();
        let item = fixtures::item("31234000000001");

        env.loans
            .lend(item.id, request_queue_core::UserId::new(), test_time());
        assert!(environment.loans.is_on_loan(item.id));

        env.clock.advance(chrono::Duration::minutes(5));
        assert_eq!(
            environment.clock.now(),
            test_time() + chrono::Duration::minutes(5)
        );
    }

    #[test]
    fn test_fixed_service_points_differ() {
        assert_ne!(fixtures::main_desk(), fixtures::branch_desk());
    }
}
