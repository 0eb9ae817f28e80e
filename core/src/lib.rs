//! # Request Queue Core
//!
//! Domain types and rules for library request queues.
//!
//! Every physical item has an ordered queue of open requests (Page, Hold,
//! Recall). This crate decides who is next when the item comes back, what
//! status the item is in, and how requests are created, cancelled, moved and
//! reordered without breaking the queue's `1..=N` positions.
//!
//! ## Core Concepts
//!
//! - **State**: [`CirculationState`], a scope of [`ItemLedger`]s one action may touch
//! - **Action**: [`CirculationAction`], every mutation the engine accepts
//! - **Reducer**: [`CirculationReducer`], `(State, Action, Environment) → Result<Effects>`
//! - **Effect**: recall due date recalculation and patron notices, described, not run
//! - **Environment**: loans, policies, calendars, notices and time behind traits
//!
//! ## Example
//!
//! ```ignore
//! use request_queue_core::*;
//!
//! let mut state = CirculationState::new().with_ledger(ItemLedger::new(item));
//! let effects = CirculationReducer::new().reduce(
//!     &mut state,
//!     CirculationAction::CheckIn { item_id, service_point_id },
//!     &env,
//! )?;
//! ```

pub mod action;
pub mod cancel;
pub mod circulation;
pub mod create;
pub mod effect;
pub mod environment;
pub mod error;
pub mod fulfillment;
pub mod move_request;
pub mod queue;
pub mod reducer;
pub mod reorder;
pub mod state;
pub mod types;

#[cfg(test)]
mod test_support;

pub use action::CirculationAction;
pub use circulation::CirculationReducer;
pub use effect::{Effect, NoticeKind, PatronNotice};
pub use environment::{
    CalendarService, CirculationEnvironment, Clock, LoanStatusProvider, NoticeDispatcher,
    RecallDueDateCalculator, RequestPolicyResolver, SystemClock,
};
pub use error::{CollaboratorError, EntityKind, ErrorParameter, QueueError};
pub use fulfillment::{FulfillmentResolver, StatusChange, Transition};
pub use queue::RequestQueue;
pub use reducer::Reducer;
pub use state::{CirculationState, ItemLedger, QueueEvent};
pub use types::*;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use smallvec::{SmallVec, smallvec};
