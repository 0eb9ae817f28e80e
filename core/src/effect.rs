//! Side effect descriptions returned by the circulation reducer.
//!
//! Effects are values, not execution. The runtime runs them after the state
//! change they belong to has been committed, and a failing effect never undoes
//! that change.

use crate::types::{ItemId, Loan, RequestId, UserId};
use serde::{Deserialize, Serialize};

/// What a patron notice is about
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    /// A request was placed
    RequestCreated,
    /// A request was cancelled
    RequestCancelled,
    /// The item is on the hold shelf for the requester
    AvailableForPickup,
    /// A request was moved to another item
    RequestMoved,
    /// The borrower must return the item early
    ItemRecalled,
}

impl NoticeKind {
    /// Label used for metrics and logs
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RequestCreated => "request_created",
            Self::RequestCancelled => "request_cancelled",
            Self::AvailableForPickup => "available_for_pickup",
            Self::RequestMoved => "request_moved",
            Self::ItemRecalled => "item_recalled",
        }
    }
}

/// Description of a notice to send to a patron.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatronNotice {
    /// Notice template family
    pub kind: NoticeKind,
    /// Request the notice is about
    pub request_id: RequestId,
    /// Patron to notify
    pub recipient_id: UserId,
    /// Item involved
    pub item_id: ItemId,
}

impl PatronNotice {
    /// Notice addressed to `recipient_id`
    #[must_use]
    pub const fn new(
        kind: NoticeKind,
        request_id: RequestId,
        recipient_id: UserId,
        item_id: ItemId,
    ) -> Self {
        Self {
            kind,
            request_id,
            recipient_id,
            item_id,
        }
    }
}

/// Effect type - describes a side effect to be executed by the runtime
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    /// No-op effect
    None,

    /// Run effects in parallel
    Parallel(Vec<Effect>),

    /// Run effects sequentially
    Sequential(Vec<Effect>),

    /// Shorten an active loan because a recall was placed on its item
    RecalculateDueDate {
        /// Loan to recalculate
        loan: Loan,
        /// Recall that triggered the recalculation
        recall_request_id: RequestId,
    },

    /// Send a patron notice
    SendNotice(PatronNotice),
}

impl Effect {
    /// Combine effects to run in parallel
    #[must_use]
    pub const fn merge(effects: Vec<Self>) -> Self {
        Self::Parallel(effects)
    }

    /// Chain effects to run sequentially
    #[must_use]
    pub const fn chain(effects: Vec<Self>) -> Self {
        Self::Sequential(effects)
    }

    /// Whether this effect does nothing
    #[must_use]
    pub fn is_none(&self) -> bool {
        match self {
            Self::None => true,
            Self::Parallel(effects) | Self::Sequential(effects) => effects.iter().all(Self::is_none),
            Self::RecalculateDueDate { .. } | Self::SendNotice(_) => false,
        }
    }

    /// Leaf effects in execution order, with composition flattened away
    #[must_use]
    pub fn leaves(&self) -> Vec<&Self> {
        match self {
            Self::None => Vec::new(),
            Self::Parallel(effects) | Self::Sequential(effects) => {
                effects.iter().flat_map(Self::leaves).collect()
            },
            Self::RecalculateDueDate { .. } | Self::SendNotice(_) => vec![self],
        }
    }

    /// Label used for metrics and logs
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Parallel(_) => "parallel",
            Self::Sequential(_) => "sequential",
            Self::RecalculateDueDate { .. } => "recalculate_due_date",
            Self::SendNotice(_) => "send_notice",
        }
    }
}
