//! Domain types for library request queues.
//!
//! This module contains the identifiers, value objects and entities shared by
//! the queue, fulfillment and relocation rules. Status and type enums carry
//! their exact wire strings; parsing an unknown string is an error, never a
//! silent fallback.

use crate::error::QueueError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Create an identifier from a `Uuid`
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

define_id!(
    /// Unique identifier for a physical item
    ItemId
);
define_id!(
    /// Unique identifier for a request
    RequestId
);
define_id!(
    /// Unique identifier for a patron (requester or borrower)
    UserId
);
define_id!(
    /// Unique identifier for a service point (circulation desk, hold shelf)
    ServicePointId
);
define_id!(
    /// Unique identifier for a loan
    LoanId
);

// ============================================================================
// Enumerations
// ============================================================================

/// Kind of request a patron places on an item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestType {
    /// Retrieve an available item from the stacks
    Page,
    /// Wait for an item that is currently unavailable
    Hold,
    /// Ask the current borrower to return the item early
    Recall,
}

impl RequestType {
    /// All request types, in wire order
    pub const ALL: [Self; 3] = [Self::Page, Self::Hold, Self::Recall];

    /// Wire representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Page => "Page",
            Self::Hold => "Hold",
            Self::Recall => "Recall",
        }
    }

    /// Whether a request of this type can be placed on an item in `status`.
    ///
    /// Pages target items on the shelf; holds wait for anything that is not;
    /// recalls need an item that somebody else is holding on to.
    #[must_use]
    pub const fn allowed_for(self, status: ItemStatus) -> bool {
        match self {
            Self::Page => matches!(status, ItemStatus::Available),
            Self::Hold => !matches!(status, ItemStatus::Available),
            Self::Recall => !matches!(status, ItemStatus::Available | ItemStatus::Missing),
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestType {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| QueueError::unknown_value("request type", s))
    }
}

/// Lifecycle status of a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestStatus {
    /// Waiting in the queue
    #[serde(rename = "Open - Not yet filled")]
    OpenNotYetFilled,
    /// Item is on the hold shelf for this requester
    #[serde(rename = "Open - Awaiting pickup")]
    OpenAwaitingPickup,
    /// Item is ready to be delivered to this requester
    #[serde(rename = "Open - Awaiting delivery")]
    OpenAwaitingDelivery,
    /// Item is travelling to this requester's pickup point
    #[serde(rename = "Open - In transit")]
    OpenInTransit,
    /// Item was checked out to the requester
    #[serde(rename = "Closed - Filled")]
    ClosedFilled,
    /// Request was cancelled
    #[serde(rename = "Closed - Cancelled")]
    ClosedCancelled,
}

impl RequestStatus {
    /// All request statuses, in wire order
    pub const ALL: [Self; 6] = [
        Self::OpenNotYetFilled,
        Self::OpenAwaitingPickup,
        Self::OpenAwaitingDelivery,
        Self::OpenInTransit,
        Self::ClosedFilled,
        Self::ClosedCancelled,
    ];

    /// Wire representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenNotYetFilled => "Open - Not yet filled",
            Self::OpenAwaitingPickup => "Open - Awaiting pickup",
            Self::OpenAwaitingDelivery => "Open - Awaiting delivery",
            Self::OpenInTransit => "Open - In transit",
            Self::ClosedFilled => "Closed - Filled",
            Self::ClosedCancelled => "Closed - Cancelled",
        }
    }

    /// Open requests hold a queue position
    #[must_use]
    pub const fn is_open(self) -> bool {
        !self.is_closed()
    }

    /// Closed requests never hold a queue position
    #[must_use]
    pub const fn is_closed(self) -> bool {
        matches!(self, Self::ClosedFilled | Self::ClosedCancelled)
    }

    /// The item is already reserved for this request and on its way to the requester
    #[must_use]
    pub const fn is_in_fulfillment(self) -> bool {
        matches!(
            self,
            Self::OpenAwaitingPickup | Self::OpenAwaitingDelivery | Self::OpenInTransit
        )
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| QueueError::unknown_value("request status", s))
    }
}

/// Circulation status of a physical item.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemStatus {
    /// On the shelf
    #[default]
    Available,
    /// On loan to a patron
    #[serde(rename = "Checked out")]
    CheckedOut,
    /// On the hold shelf for the head request
    #[serde(rename = "Awaiting pickup")]
    AwaitingPickup,
    /// Waiting to be delivered for the head request
    #[serde(rename = "Awaiting delivery")]
    AwaitingDelivery,
    /// Travelling to the head request's pickup point
    #[serde(rename = "In transit")]
    InTransit,
    /// Pulled from the stacks for a page request
    Paged,
    /// Declared missing
    Missing,
}

impl ItemStatus {
    /// All item statuses, in wire order
    pub const ALL: [Self; 7] = [
        Self::Available,
        Self::CheckedOut,
        Self::AwaitingPickup,
        Self::AwaitingDelivery,
        Self::InTransit,
        Self::Paged,
        Self::Missing,
    ];

    /// Wire representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Available => "Available",
            Self::CheckedOut => "Checked out",
            Self::AwaitingPickup => "Awaiting pickup",
            Self::AwaitingDelivery => "Awaiting delivery",
            Self::InTransit => "In transit",
            Self::Paged => "Paged",
            Self::Missing => "Missing",
        }
    }

    /// Item status that mirrors a request in active fulfillment
    #[must_use]
    pub const fn for_fulfillment(status: RequestStatus) -> Option<Self> {
        match status {
            RequestStatus::OpenAwaitingPickup => Some(Self::AwaitingPickup),
            RequestStatus::OpenAwaitingDelivery => Some(Self::AwaitingDelivery),
            RequestStatus::OpenInTransit => Some(Self::InTransit),
            _ => None,
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemStatus {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| QueueError::unknown_value("item status", s))
    }
}

/// How the requester wants to receive the item.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FulfilmentPreference {
    /// Pick up at a service point's hold shelf
    #[default]
    #[serde(rename = "Hold Shelf")]
    HoldShelf,
    /// Deliver to the requester's address
    Delivery,
}

impl FulfilmentPreference {
    /// Wire representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HoldShelf => "Hold Shelf",
            Self::Delivery => "Delivery",
        }
    }
}

impl fmt::Display for FulfilmentPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FulfilmentPreference {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Hold Shelf" => Ok(Self::HoldShelf),
            "Delivery" => Ok(Self::Delivery),
            other => Err(QueueError::unknown_value("fulfilment preference", other)),
        }
    }
}

// ============================================================================
// Value Objects
// ============================================================================

/// Denormalized item details shown alongside a request
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemSummary {
    /// Title of the instance the item belongs to
    pub title: String,
    /// Item barcode
    pub barcode: String,
}

/// Denormalized requester details shown alongside a request
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequesterSummary {
    /// Display name
    pub name: String,
    /// Patron barcode
    pub barcode: String,
}

/// Why and by whom a request was cancelled
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cancellation {
    /// Configured cancellation reason
    pub reason_id: Uuid,
    /// Staff member or patron who cancelled
    pub cancelled_by: UserId,
    /// When the cancellation happened
    pub cancelled_date: DateTime<Utc>,
    /// Free-text note
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_information: Option<String>,
}

/// Cancellation details supplied by the caller (the date comes from the clock)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancellationDetails {
    /// Configured cancellation reason
    pub reason_id: Uuid,
    /// Staff member or patron who cancelled
    pub cancelled_by: UserId,
    /// Free-text note
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_information: Option<String>,
}

// ============================================================================
// Entities
// ============================================================================

/// A patron's request for an item.
///
/// `position` is present exactly while the request is open.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    /// Request identifier
    pub id: RequestId,
    /// Item the request is queued on
    pub item_id: ItemId,
    /// Patron who placed the request
    pub requester_id: UserId,
    /// Page, Hold or Recall
    pub request_type: RequestType,
    /// Date the patron asked for the item (does not affect ordering)
    pub request_date: DateTime<Utc>,
    /// Lifecycle status
    pub status: RequestStatus,
    /// Position in the item's queue, 1-based
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
    /// Hold shelf or delivery
    pub fulfilment_preference: FulfilmentPreference,
    /// Where a hold shelf request is picked up
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pickup_service_point_id: Option<ServicePointId>,
    /// Last day the item waits on the hold shelf
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hold_shelf_expiration_date: Option<DateTime<Utc>>,
    /// Date after which the patron no longer needs the item
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_expiration_date: Option<DateTime<Utc>>,
    /// Patron's note to staff
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patron_comments: Option<String>,
    /// Cancellation metadata (closed-cancelled requests only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancellation: Option<Cancellation>,
    /// Denormalized item details
    pub item: ItemSummary,
    /// Denormalized requester details
    pub requester: RequesterSummary,
}

impl Request {
    /// Whether the request is still open
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.status.is_open()
    }

    /// Whether the request takes part in "who is next" decisions
    #[must_use]
    pub fn is_eligible_for_fulfillment(&self) -> bool {
        self.is_open() && self.fulfilment_preference == FulfilmentPreference::HoldShelf
    }
}

/// Everything needed to create a request; the engine assigns status and position.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRequest {
    /// Identifier chosen by the caller
    pub id: RequestId,
    /// Item to queue on
    pub item_id: ItemId,
    /// Patron placing the request
    pub requester_id: UserId,
    /// Page, Hold or Recall
    pub request_type: RequestType,
    /// Date the patron asked for the item
    pub request_date: DateTime<Utc>,
    /// Hold shelf or delivery
    pub fulfilment_preference: FulfilmentPreference,
    /// Pickup point (required for hold shelf requests)
    #[serde(default)]
    pub pickup_service_point_id: Option<ServicePointId>,
    /// Date after which the patron no longer needs the item
    #[serde(default)]
    pub request_expiration_date: Option<DateTime<Utc>>,
    /// Patron's note to staff
    #[serde(default)]
    pub patron_comments: Option<String>,
    /// Denormalized requester details
    pub requester: RequesterSummary,
}

impl NewRequest {
    /// Hold shelf request with a fresh id
    #[must_use]
    pub fn hold_shelf(
        item_id: ItemId,
        requester_id: UserId,
        request_type: RequestType,
        request_date: DateTime<Utc>,
        pickup_service_point_id: ServicePointId,
    ) -> Self {
        Self {
            id: RequestId::new(),
            item_id,
            requester_id,
            request_type,
            request_date,
            fulfilment_preference: FulfilmentPreference::HoldShelf,
            pickup_service_point_id: Some(pickup_service_point_id),
            request_expiration_date: None,
            patron_comments: None,
            requester: RequesterSummary::default(),
        }
    }

    /// Delivery request with a fresh id
    #[must_use]
    pub fn delivery(
        item_id: ItemId,
        requester_id: UserId,
        request_type: RequestType,
        request_date: DateTime<Utc>,
    ) -> Self {
        Self {
            id: RequestId::new(),
            item_id,
            requester_id,
            request_type,
            request_date,
            fulfilment_preference: FulfilmentPreference::Delivery,
            pickup_service_point_id: None,
            request_expiration_date: None,
            patron_comments: None,
            requester: RequesterSummary::default(),
        }
    }

    /// Attach requester display details
    #[must_use]
    pub fn with_requester(mut self, requester: RequesterSummary) -> Self {
        self.requester = requester;
        self
    }

    /// Turn into an open, not yet positioned request on `item`
    #[must_use]
    pub fn into_request(self, item: ItemSummary) -> Request {
        Request {
            id: self.id,
            item_id: self.item_id,
            requester_id: self.requester_id,
            request_type: self.request_type,
            request_date: self.request_date,
            status: RequestStatus::OpenNotYetFilled,
            position: None,
            fulfilment_preference: self.fulfilment_preference,
            pickup_service_point_id: self.pickup_service_point_id,
            hold_shelf_expiration_date: None,
            request_expiration_date: self.request_expiration_date,
            patron_comments: self.patron_comments,
            cancellation: None,
            item,
            requester: self.requester,
        }
    }
}

/// A physical item that patrons can request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    /// Item identifier
    pub id: ItemId,
    /// Derived circulation status
    pub status: ItemStatus,
    /// Service point an in-transit item is travelling to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_transit_destination_service_point_id: Option<ServicePointId>,
    /// Title of the instance the item belongs to
    pub title: String,
    /// Item barcode
    pub barcode: String,
}

impl Item {
    /// Creates an available item
    #[must_use]
    pub fn new(id: ItemId, title: impl Into<String>, barcode: impl Into<String>) -> Self {
        Self {
            id,
            status: ItemStatus::Available,
            in_transit_destination_service_point_id: None,
            title: title.into(),
            barcode: barcode.into(),
        }
    }

    /// Set the initial status (registration only; afterwards status is derived)
    #[must_use]
    pub const fn with_status(mut self, status: ItemStatus) -> Self {
        self.status = status;
        self
    }

    /// Display summary copied onto requests
    #[must_use]
    pub fn summary(&self) -> ItemSummary {
        ItemSummary {
            title: self.title.clone(),
            barcode: self.barcode.clone(),
        }
    }
}

/// A loan as seen by the queue engine (owned by the loan collaborator)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Loan {
    /// Loan identifier
    pub id: LoanId,
    /// Item on loan
    pub item_id: ItemId,
    /// Borrower
    pub user_id: UserId,
    /// Current due date
    pub due_date: DateTime<Utc>,
}

/// Parameters of the recall policy governing a loan.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecallPolicy {
    /// Minimum guaranteed loan period before a recall can shorten the loan
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_guaranteed_loan_period: Option<std::time::Duration>,
    /// Time the borrower has to return a recalled item
    pub recall_return_interval: std::time::Duration,
}

/// One entry of an explicit queue reorder
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderEntry {
    /// Open request on the item
    pub request_id: RequestId,
    /// Requested 1-based position
    pub new_position: u32,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;

    #[test]
    fn request_status_strings_round_trip() {
        for status in RequestStatus::ALL {
            let parsed: RequestStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
    }

    #[test]
    fn item_status_uses_wire_strings() {
        assert_eq!(ItemStatus::CheckedOut.to_string(), "Checked out");
        assert_eq!(ItemStatus::AwaitingPickup.to_string(), "Awaiting pickup");
        assert_eq!("In transit".parse::<ItemStatus>().ok(), Some(ItemStatus::InTransit));
    }

    #[test]
    fn unknown_strings_are_rejected() {
        let err = "Open - Lost".parse::<RequestStatus>().err();
        assert!(matches!(err, Some(QueueError::UnknownValue { .. })));
        assert!("Checked Out".parse::<ItemStatus>().is_err());
        assert!("page".parse::<RequestType>().is_err());
        assert!("Mail".parse::<FulfilmentPreference>().is_err());
        assert!(serde_json::from_str::<RequestType>("\"Borrow\"").is_err());
    }

    #[test]
    fn request_types_follow_item_status() {
        assert!(RequestType::Page.allowed_for(ItemStatus::Available));
        assert!(!RequestType::Page.allowed_for(ItemStatus::CheckedOut));
        assert!(RequestType::Hold.allowed_for(ItemStatus::Missing));
        assert!(!RequestType::Recall.allowed_for(ItemStatus::Missing));
        assert!(RequestType::Recall.allowed_for(ItemStatus::AwaitingPickup));
    }

    #[test]
    fn closed_request_serializes_without_position() {
        let mut request = NewRequest::delivery(
            ItemId::new(),
            UserId::new(),
            RequestType::Hold,
            Utc::now(),
        )
        .into_request(ItemSummary::default());
        request.status = RequestStatus::ClosedCancelled;

        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("position").is_none());
        assert_eq!(value["status"], "Closed - Cancelled");
        assert_eq!(value["fulfilmentPreference"], "Delivery");
    }
}
