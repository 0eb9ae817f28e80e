//! Inputs to the circulation reducer.

use crate::types::{
    CancellationDetails, ItemId, NewRequest, ReorderEntry, RequestId, RequestType, ServicePointId,
    UserId,
};
use serde::{Deserialize, Serialize};

/// Every mutation the queue engine accepts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum CirculationAction {
    /// Place a new request at the tail of an item's queue
    CreateRequest {
        /// Request details
        request: NewRequest,
    },
    /// Close an open request as cancelled
    CancelRequest {
        /// Request to cancel
        request_id: RequestId,
        /// Reason and actor
        cancellation: CancellationDetails,
    },
    /// Remove a request record (open or closed)
    DeleteRequest {
        /// Request to delete
        request_id: RequestId,
    },
    /// Move an open request to another item
    MoveRequest {
        /// Request to move
        request_id: RequestId,
        /// Item to move it to
        destination_item_id: ItemId,
        /// Explicit type on the destination
        #[serde(default)]
        request_type: Option<RequestType>,
    },
    /// Replace the order of an item's queue
    ReorderQueue {
        /// Item whose queue is reordered
        item_id: ItemId,
        /// New position of every open request
        positions: Vec<ReorderEntry>,
    },
    /// The item was checked in at a service point
    CheckIn {
        /// Item checked in
        item_id: ItemId,
        /// Where it was checked in
        service_point_id: ServicePointId,
    },
    /// The item is being checked out to a patron
    CheckOut {
        /// Item checked out
        item_id: ItemId,
        /// Borrower
        user_id: UserId,
    },
    /// Staff declared the item missing
    MarkMissing {
        /// Item declared missing
        item_id: ItemId,
    },
}

impl CirculationAction {
    /// Label used for metrics and spans
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::CreateRequest { .. } => "create_request",
            Self::CancelRequest { .. } => "cancel_request",
            Self::DeleteRequest { .. } => "delete_request",
            Self::MoveRequest { .. } => "move_request",
            Self::ReorderQueue { .. } => "reorder_queue",
            Self::CheckIn { .. } => "check_in",
            Self::CheckOut { .. } => "check_out",
            Self::MarkMissing { .. } => "mark_missing",
        }
    }

    /// Item the action names directly, if any
    #[must_use]
    pub const fn item_id(&self) -> Option<ItemId> {
        match self {
            Self::CreateRequest { request } => Some(request.item_id),
            Self::ReorderQueue { item_id, .. }
            | Self::CheckIn { item_id, .. }
            | Self::CheckOut { item_id, .. }
            | Self::MarkMissing { item_id } => Some(*item_id),
            Self::CancelRequest { .. } | Self::DeleteRequest { .. } | Self::MoveRequest { .. } => {
                None
            },
        }
    }

    /// Request the action names directly, if any
    #[must_use]
    pub const fn request_id(&self) -> Option<RequestId> {
        match self {
            Self::CreateRequest { request } => Some(request.id),
            Self::CancelRequest { request_id, .. }
            | Self::DeleteRequest { request_id }
            | Self::MoveRequest { request_id, .. } => Some(*request_id),
            Self::ReorderQueue { .. }
            | Self::CheckIn { .. }
            | Self::CheckOut { .. }
            | Self::MarkMissing { .. } => None,
        }
    }
}
