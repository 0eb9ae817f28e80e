//! Ergonomic testing utilities for reducers
//!
//! This module provides a fluent API for testing reducers with readable Given-When-Then syntax.

#![allow(clippy::module_name_repetitions)] // ReducerTest is the natural name

use request_queue_core::{Effect, Reducer};

/// Type alias for state assertion functions
type StateAssertion<S> = Box<dyn FnOnce(&S)>;

/// Type alias for effect assertion functions
type EffectAssertion = Box<dyn FnOnce(&[Effect])>;

/// Type alias for error assertion functions
type ErrorAssertion<Err> = Box<dyn FnOnce(&Err)>;

/// Fluent API for testing reducers with Given-When-Then syntax
///
/// When an error assertion is registered the action must be rejected; state
/// assertions then run against the state left behind, which a well-behaved
/// reducer keeps unchanged.
///
/// # Example
///
/// ```ignore
/// use request_queue_testing::ReducerTest;
///
/// ReducerTest::new(CirculationReducer::new())
///     .with_env(env.environment())
///     .given_state(CirculationState::new().with_ledger(ledger))
///     .when_action(CirculationAction::CheckIn { item_id, service_point_id })
///     .then_state(move |state| {
///         assert_eq!(state.ledger(item_id).unwrap().item.status, ItemStatus::AwaitingPickup);
///     })
///     .then_effects(|effects| {
///         assert_eq!(effects.len(), 1);
///     })
///     .run();
/// ```
pub struct ReducerTest<R, S, A, E, Err>
where
    R: Reducer<State = S, Action = A, Environment = E, Error = Err>,
{
    reducer: R,
    environment: Option<E>,
    initial_state: Option<S>,
    action: Option<A>,
    state_assertions: Vec<StateAssertion<S>>,
    effect_assertions: Vec<EffectAssertion>,
    error_assertions: Vec<ErrorAssertion<Err>>,
}

impl<R, S, A, E, Err> ReducerTest<R, S, A, E, Err>
where
    R: Reducer<State = S, Action = A, Environment = E, Error = Err>,
    Err: std::fmt::Debug,
{
    /// Create a new reducer test with the given reducer
    #[must_use]
    pub const fn new(reducer: R) -> Self {
        Self {
            reducer,
            environment: None,
            initial_state: None,
            action: None,
            state_assertions: Vec::new(),
            effect_assertions: Vec::new(),
            error_assertions: Vec::new(),
        }
    }

    /// Set the environment for the test
    #[must_use]
    pub fn with_env(mut self, env: E) -> Self {
        self.environment = Some(env);
        self
    }

    /// Set the initial state (Given)
    #[must_use]
    pub fn given_state(mut self, state: S) -> Self {
        self.initial_state = Some(state);
        self
    }

    /// Set the action to test (When)
    #[must_use]
    pub fn when_action(mut self, action: A) -> Self {
        self.action = Some(action);
        self
    }

    /// Add an assertion about the resulting state (Then)
    #[must_use]
    pub fn then_state<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&S) + 'static,
    {
        self.state_assertions.push(Box::new(assertion));
        self
    }

    /// Add an assertion about the resulting effects (Then)
    #[must_use]
    pub fn then_effects<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&[Effect]) + 'static,
    {
        self.effect_assertions.push(Box::new(assertion));
        self
    }

    /// Expect the action to be rejected and inspect the error (Then)
    #[must_use]
    pub fn then_error<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&Err) + 'static,
    {
        self.error_assertions.push(Box::new(assertion));
        self
    }

    /// Run the test and execute all assertions
    ///
    /// # Panics
    ///
    /// Panics if initial state, action, or environment is not set, if the
    /// outcome (accepted or rejected) is not the expected one, or if any
    /// assertion fails.
    #[allow(clippy::panic)] // Test code can panic
    #[allow(clippy::expect_used)] // Test code can use expect
    pub fn run(self) {
        let mut state = self
            .initial_state
            .expect("Initial state must be set with given_state()");

        let action = self.action.expect("Action must be set with when_action()");

        let env = self
            .environment
            .expect("Environment must be set with with_env()");

        // Execute reducer
        let result = self.reducer.reduce(&mut state, action, &env);

        match result {
            Ok(effects) => {
                assert!(
                    self.error_assertions.is_empty(),
                    "Expected the action to be rejected, but it produced {} effects",
                    effects.len()
                );
                for assertion in self.effect_assertions {
                    assertion(&effects);
                }
            },
            Err(error) => {
                assert!(
                    !self.error_assertions.is_empty(),
                    "Expected the action to be accepted, but it was rejected: {error:?}"
                );
                assert!(
                    self.effect_assertions.is_empty(),
                    "Effect assertions registered for a rejected action: {error:?}"
                );
                for assertion in self.error_assertions {
                    assertion(&error);
                }
            },
        }

        // Run state assertions
        for assertion in self.state_assertions {
            assertion(&state);
        }
    }
}

/// Helper assertions for effects
pub mod assertions {
    use request_queue_core::{Effect, NoticeKind, PatronNotice, QueueError};

    /// Assert that there are no effects
    ///
    /// # Panics
    ///
    /// Panics if effects is not empty.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_no_effects(effects: &[Effect]) {
        assert!(
            effects.iter().all(Effect::is_none),
            "Expected no effects, but found {}: {:?}",
            effects.len(),
            effects
        );
    }

    /// Assert the number of effects
    ///
    /// # Panics
    ///
    /// Panics if the number of effects doesn't match expected.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_effects_count(effects: &[Effect], expected: usize) {
        assert_eq!(
            effects.len(),
            expected,
            "Expected {} effects, but found {}",
            expected,
            effects.len()
        );
    }

    /// Notices of `kind` anywhere in the effect trees
    #[must_use]
    pub fn notices_of(effects: &[Effect], kind: NoticeKind) -> Vec<PatronNotice> {
        effects
            .iter()
            .flat_map(Effect::leaves)
            .filter_map(|effect| match effect {
                Effect::SendNotice(notice) if notice.kind == kind => Some(notice.clone()),
                _ => None,
            })
            .collect()
    }

    /// Assert that effects contain exactly one notice of `kind` and return it
    ///
    /// # Panics
    ///
    /// Panics if there is no such notice or more than one.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_single_notice(effects: &[Effect], kind: NoticeKind) -> PatronNotice {
        let mut notices = notices_of(effects, kind);
        assert_eq!(
            notices.len(),
            1,
            "Expected one {} notice, found {:?}",
            kind.as_str(),
            notices
        );
        notices.remove(0)
    }

    /// Assert that effects contain at least one due date recalculation
    ///
    /// # Panics
    ///
    /// Panics if no `RecalculateDueDate` effect is found.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_has_recall_effect(effects: &[Effect]) {
        assert!(
            effects
                .iter()
                .flat_map(Effect::leaves)
                .any(|e| matches!(e, Effect::RecalculateDueDate { .. })),
            "Expected at least one RecalculateDueDate effect, but none found"
        );
    }

    /// Assert that an error is a 422 whose message contains `fragment`
    ///
    /// # Panics
    ///
    /// Panics on any other error.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_validation(error: &QueueError, fragment: &str) {
        assert_eq!(error.http_status(), 422, "Expected a validation error, got {error:?}");
        assert!(
            error.to_string().contains(fragment),
            "Expected message containing {fragment:?}, got {error}"
        );
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;
    use request_queue_core::{Effect, NoticeKind, PatronNotice, SmallVec, smallvec};

    #[derive(Clone, Debug)]
    struct TestState {
        count: i32,
    }

    #[derive(Clone, Debug)]
    enum TestAction {
        Increment,
        Decrement,
    }

    struct TestReducer;

    struct TestEnv;

    impl Reducer for TestReducer {
        type State = TestState;
        type Action = TestAction;
        type Environment = TestEnv;
        type Error = String;

        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            _env: &Self::Environment,
        ) -> Result<SmallVec<[Effect; 4]>, Self::Error> {
            match action {
                TestAction::Increment => {
                    state.count += 1;
                    Ok(smallvec![Effect::None])
                },
                TestAction::Decrement if state.count == 0 => Err("count is zero".to_string()),
                TestAction::Decrement => {
                    state.count -= 1;
                    Ok(SmallVec::new())
                },
            }
        }
    }

    #[test]
    fn test_reducer_test_increment() {
        ReducerTest::new(TestReducer)
            .with_env(TestEnv)
            .given_state(TestState { count: 0 })
            .when_action(TestAction::Increment)
            .then_state(|state| {
                assert_eq!(state.count, 1);
            })
            .then_effects(|effects| {
                assertions::assert_no_effects(effects);
            })
            .run();
    }

    #[test]
    fn test_reducer_test_rejection() {
        ReducerTest::new(TestReducer)
            .with_env(TestEnv)
            .given_state(TestState { count: 0 })
            .when_action(TestAction::Decrement)
            .then_error(|error| {
                assert_eq!(error, "count is zero");
            })
            .then_state(|state| {
                assert_eq!(state.count, 0);
            })
            .run();
    }

    #[test]
    #[should_panic(expected = "Expected the action to be rejected")]
    fn test_reducer_test_unexpected_success() {
        ReducerTest::new(TestReducer)
            .with_env(TestEnv)
            .given_state(TestState { count: 5 })
            .when_action(TestAction::Decrement)
            .then_error(|_| {})
            .run();
    }

    #[test]
    fn test_notice_assertions_look_inside_composites() {
        let notice = PatronNotice::new(
            NoticeKind::ItemRecalled,
            request_queue_core::RequestId::new(),
            request_queue_core::UserId::new(),
            request_queue_core::ItemId::new(),
        );
        let effects = [Effect::chain(vec![Effect::None, Effect::SendNotice(notice.clone())])];

        assert_eq!(
            assertions::assert_single_notice(&effects, NoticeKind::ItemRecalled),
            notice
        );
        assert!(assertions::notices_of(&effects, NoticeKind::RequestCreated).is_empty());
        assertions::assert_effects_count(&effects, 1);
    }
}
