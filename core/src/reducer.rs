//! Reducer module - the core trait for business logic.
//!
//! Reducers are functions `(State, Action, Environment) → Result<Effects>`.
//! They validate, update state in place and describe side effects; they never
//! perform I/O themselves.

use crate::effect::Effect;
use smallvec::SmallVec;

/// The Reducer trait - core abstraction for business logic
///
/// # Type Parameters
///
/// - `State`: The domain state this reducer operates on
/// - `Action`: The action type this reducer processes
/// - `Environment`: The injected dependencies this reducer needs
/// - `Error`: Why an action was rejected
///
/// A rejected action must leave `state` exactly as it was.
pub trait Reducer {
    /// The state type this reducer operates on
    type State;

    /// The action type this reducer processes
    type Action;

    /// The environment type with injected dependencies
    type Environment;

    /// Why an action was rejected
    type Error;

    /// Reduce an action into state changes and effects
    ///
    /// This function:
    /// 1. Validates the action
    /// 2. Updates state in place
    /// 3. Returns effect descriptions to be executed
    ///
    /// # Errors
    ///
    /// Returns `Self::Error` if the action is rejected. State is unchanged.
    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Result<SmallVec<[Effect; 4]>, Self::Error>;
}
