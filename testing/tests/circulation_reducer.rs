//! Circulation reducer tests built on the testing utilities.

#![allow(clippy::unwrap_used)] // Tests can unwrap

use chrono::Duration;
use proptest::prelude::*;
use request_queue_core::{
    CirculationAction, CirculationReducer, CirculationState, ItemId, ItemLedger, ItemStatus,
    NoticeKind, QueueEvent, Reducer, ReorderEntry, RequestId, RequestStatus, UserId,
};
use request_queue_testing::properties::{QueueStep, queue_session};
use request_queue_testing::{ReducerTest, TestEnvironment, assertions, fixtures, test_time};

fn on_loan(env: &TestEnvironment, barcode: &str) -> ItemLedger {
    let ledger = ItemLedger::new(fixtures::item_with_status(barcode, ItemStatus::CheckedOut));
    env.loans.lend(
        ledger.item_id(),
        UserId::new(),
        test_time() + Duration::days(21),
    );
    ledger
}

fn queued(
    env: &TestEnvironment,
    mut ledger: ItemLedger,
    requesters: &[UserId],
) -> (ItemLedger, Vec<RequestId>) {
    let reducer = CirculationReducer::new();
    let item_id = ledger.item_id();
    let mut state = CirculationState::new().with_ledger(ledger);
    let mut ids = Vec::new();
    for requester in requesters {
        let request = fixtures::hold(item_id, *requester, fixtures::main_desk());
        ids.push(request.id);
        reducer
            .reduce(
                &mut state,
                CirculationAction::CreateRequest { request },
                &env.environment(),
            )
            .unwrap();
    }
    ledger = state.ledger(item_id).unwrap().clone();
    (ledger, ids)
}

#[test]
fn test_create_queues_at_tail_and_notifies_requester() {
    let env = TestEnvironment::new();
    let ledger = on_loan(&env, "31234000000601");
    let item_id = ledger.item_id();
    let (ledger, _) = queued(&env, ledger, &[UserId::new()]);
    let requester = UserId::new();
    let request = fixtures::hold(item_id, requester, fixtures::main_desk());
    let request_id = request.id;

    ReducerTest::new(CirculationReducer::new())
        .with_env(env.environment())
        .given_state(CirculationState::new().with_ledger(ledger))
        .when_action(CirculationAction::CreateRequest { request })
        .then_state(move |state| {
            let queue = &state.ledger(item_id).unwrap().queue;
            assert_eq!(queue.len(), 2);
            assert_eq!(queue.get(request_id).unwrap().position, Some(2));
            assert!(state.events().contains(&QueueEvent::RequestQueued {
                request_id,
                item_id,
                position: 2,
            }));
        })
        .then_effects(move |effects| {
            let notice = assertions::assert_single_notice(effects, NoticeKind::RequestCreated);
            assert_eq!(notice.recipient_id, requester);
        })
        .run();
}

#[test]
fn test_recall_on_loaned_item_describes_recall() {
    let env = TestEnvironment::new();
    let ledger = on_loan(&env, "31234000000602");
    let item_id = ledger.item_id();

    ReducerTest::new(CirculationReducer::new())
        .with_env(env.environment())
        .given_state(CirculationState::new().with_ledger(ledger))
        .when_action(CirculationAction::CreateRequest {
            request: fixtures::recall(item_id, UserId::new(), fixtures::main_desk()),
        })
        .then_effects(|effects| {
            assertions::assert_effects_count(effects, 2);
            assertions::assert_has_recall_effect(effects);
            assertions::assert_single_notice(effects, NoticeKind::ItemRecalled);
        })
        .run();
}

#[test]
fn test_denied_type_leaves_state_untouched() {
    let env = TestEnvironment::new();
    env.policies.deny_type(request_queue_core::RequestType::Hold);
    let ledger = on_loan(&env, "31234000000603");
    let item_id = ledger.item_id();
    let given = CirculationState::new().with_ledger(ledger);
    let expected = given.clone();

    ReducerTest::new(CirculationReducer::new())
        .with_env(env.environment())
        .given_state(given)
        .when_action(CirculationAction::CreateRequest {
            request: fixtures::hold(item_id, UserId::new(), fixtures::main_desk()),
        })
        .then_error(|error| {
            assertions::assert_validation(
                error,
                "Hold requests are not allowed for this patron and item combination",
            );
        })
        .then_state(move |state| assert_eq!(state, &expected))
        .run();
}

#[test]
fn test_check_in_reserves_item_for_head() {
    let env = TestEnvironment::new();
    let head = UserId::new();
    let ledger = on_loan(&env, "31234000000604");
    let item_id = ledger.item_id();
    let (ledger, ids) = queued(&env, ledger, &[head, UserId::new()]);
    env.loans.return_item(item_id);

    ReducerTest::new(CirculationReducer::new())
        .with_env(env.environment())
        .given_state(CirculationState::new().with_ledger(ledger))
        .when_action(CirculationAction::CheckIn {
            item_id,
            service_point_id: fixtures::main_desk(),
        })
        .then_state(move |state| {
            let ledger = state.ledger(item_id).unwrap();
            assert_eq!(ledger.item.status, ItemStatus::AwaitingPickup);
            let queue = ledger.queue.requests();
            assert_eq!(queue[0].id, ids[0]);
            assert_eq!(queue[0].status, RequestStatus::OpenAwaitingPickup);
            assert_eq!(queue[1].status, RequestStatus::OpenNotYetFilled);
        })
        .then_effects(move |effects| {
            let notice = assertions::assert_single_notice(effects, NoticeKind::AvailableForPickup);
            assert_eq!(notice.recipient_id, head);
        })
        .run();
}

#[test]
fn test_reorder_is_an_override_even_over_reserved_head() {
    let env = TestEnvironment::new();
    let ledger = on_loan(&env, "31234000000605");
    let item_id = ledger.item_id();
    let (ledger, ids) = queued(&env, ledger, &[UserId::new(), UserId::new()]);
    env.loans.return_item(item_id);
    let mut state = CirculationState::new().with_ledger(ledger);
    CirculationReducer::new()
        .reduce(
            &mut state,
            CirculationAction::CheckIn {
                item_id,
                service_point_id: fixtures::main_desk(),
            },
            &env.environment(),
        )
        .unwrap();

    ReducerTest::new(CirculationReducer::new())
        .with_env(env.environment())
        .given_state(state)
        .when_action(CirculationAction::ReorderQueue {
            item_id,
            positions: vec![
                ReorderEntry { request_id: ids[1], new_position: 1 },
                ReorderEntry { request_id: ids[0], new_position: 2 },
            ],
        })
        .then_state(move |state| {
            let queue = state.ledger(item_id).unwrap().queue.requests();
            assert_eq!(queue[0].id, ids[1]);
            assert_eq!(queue[1].id, ids[0]);
            assert_eq!(queue[1].status, RequestStatus::OpenAwaitingPickup);
        })
        .then_effects(assertions::assert_no_effects)
        .run();
}

/// A session driver for the property test below
struct Session {
    env: TestEnvironment,
    reducer: CirculationReducer,
    state: CirculationState,
    shelf_item: ItemId,
    loaned_item: ItemId,
    patrons: Vec<UserId>,
}

impl Session {
    fn new(patrons: usize) -> Self {
        let env = TestEnvironment::new();
        let shelf = ItemLedger::new(fixtures::item("31234000000701"));
        let loaned = on_loan(&env, "31234000000702");
        Self {
            shelf_item: shelf.item_id(),
            loaned_item: loaned.item_id(),
            state: CirculationState::new().with_ledger(shelf).with_ledger(loaned),
            reducer: CirculationReducer::new(),
            patrons: (0..patrons).map(|_| UserId::new()).collect(),
            env,
        }
    }

    fn open_requests(&self) -> Vec<(RequestId, ItemId, UserId)> {
        self.state
            .ledgers()
            .flat_map(|ledger| ledger.queue.requests())
            .map(|r| (r.id, r.item_id, r.requester_id))
            .collect()
    }

    fn other(&self, item_id: ItemId) -> ItemId {
        if item_id == self.shelf_item {
            self.loaned_item
        } else {
            self.shelf_item
        }
    }

    fn action(&self, step: &QueueStep) -> Option<CirculationAction> {
        let open = self.open_requests();
        let pick = |n: usize| (!open.is_empty()).then(|| open[n % open.len()]);
        match step {
            QueueStep::Create {
                patron,
                request_type,
            } => {
                let item_id = if patron % 2 == 0 {
                    self.shelf_item
                } else {
                    self.loaned_item
                };
                Some(CirculationAction::CreateRequest {
                    request: fixtures::request(
                        *request_type,
                        item_id,
                        self.patrons[patron % self.patrons.len()],
                        fixtures::main_desk(),
                    ),
                })
            },
            QueueStep::Cancel(n) => pick(*n).map(|(request_id, _, _)| {
                CirculationAction::CancelRequest {
                    request_id,
                    cancellation: fixtures::cancellation(UserId::new()),
                }
            }),
            QueueStep::Move(n) => pick(*n).map(|(request_id, item_id, _)| {
                CirculationAction::MoveRequest {
                    request_id,
                    destination_item_id: self.other(item_id),
                    request_type: None,
                }
            }),
            QueueStep::Reverse(n) => pick(*n).map(|(_, item_id, _)| {
                let ids: Vec<RequestId> = open
                    .iter()
                    .filter(|(_, item, _)| *item == item_id)
                    .map(|(id, _, _)| *id)
                    .rev()
                    .collect();
                CirculationAction::ReorderQueue {
                    item_id,
                    positions: ids
                        .into_iter()
                        .zip(1..)
                        .map(|(request_id, new_position)| ReorderEntry {
                            request_id,
                            new_position,
                        })
                        .collect(),
                }
            }),
            QueueStep::CheckIn => Some(CirculationAction::CheckIn {
                item_id: self.shelf_item,
                service_point_id: fixtures::main_desk(),
            }),
            QueueStep::CheckOut(n) => {
                let user_id = pick(*n).map_or_else(UserId::new, |(_, _, user)| user);
                Some(CirculationAction::CheckOut {
                    item_id: self.shelf_item,
                    user_id,
                })
            },
        }
    }

    fn apply(&mut self, step: &QueueStep) {
        let Some(action) = self.action(step) else {
            return;
        };
        let before = self.state.clone();
        let result = self
            .reducer
            .reduce(&mut self.state, action, &self.env.environment());
        if result.is_err() {
            assert_eq!(self.state, before, "rejected step {step:?} changed state");
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_positions_stay_contiguous(steps in queue_session(6, 40)) {
        let mut session = Session::new(6);
        for step in &steps {
            session.apply(step);
            for ledger in session.state.ledgers() {
                prop_assert!(
                    ledger.queue.positions_are_contiguous(),
                    "positions broke after {:?}: {:?}",
                    step,
                    ledger.queue.requests()
                );
                prop_assert!(ledger
                    .queue
                    .requests()
                    .iter()
                    .all(|r| r.item_id == ledger.item_id()));
            }
        }
    }
}
