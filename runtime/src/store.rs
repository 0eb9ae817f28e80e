//! The queue store: serialized, transactional access to item ledgers.
//!
//! Every item has its own async lock. A mutation locks the ledgers it needs in
//! ascending [`ItemId`] order, copies them into a [`CirculationState`] scope,
//! runs the [`CirculationReducer`] over the copy and writes the copy back only
//! if the reducer accepted the action. Effects are spawned after the locks are
//! released.

use crate::config::StoreConfig;
use crate::effects::{EffectExecutor, EffectHandle};
use crate::error::StoreError;
use crate::health::{HealthCheck, StoreCounters};
use crate::metrics::MutationMetrics;
use request_queue_core::{
    CancellationDetails, CirculationAction, CirculationEnvironment, CirculationReducer,
    CirculationState, Item, ItemId, ItemLedger, NewRequest, QueueError, QueueEvent, Reducer,
    ReorderEntry, Request, RequestId, RequestType, ServicePointId, UserId,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

/// A committed mutation.
#[derive(Debug)]
pub struct Committed<T> {
    /// Operation result read from the committed state
    pub value: T,
    /// What changed, in order
    pub events: Vec<QueueEvent>,
    /// Side effects started after commit
    pub effects: EffectHandle,
}

/// An item's ledger together with the closed requests that were queued on it.
#[derive(Debug)]
struct ItemSlot {
    ledger: ItemLedger,
    closed: BTreeMap<RequestId, Request>,
}

type SlotGuard = OwnedMutexGuard<ItemSlot>;

struct Inner {
    reducer: CirculationReducer,
    environment: CirculationEnvironment,
    config: StoreConfig,
    items: RwLock<HashMap<ItemId, Arc<Mutex<ItemSlot>>>>,
    /// Item each known request (open or closed) belongs to
    index: RwLock<HashMap<RequestId, ItemId>>,
    effects: EffectExecutor,
    open_requests: AtomicUsize,
    shutdown: AtomicBool,
}

/// Request queue store
///
/// Cloning is cheap; clones share the same ledgers.
///
/// # Example
///
/// ```ignore
/// let store = QueueStore::new(environment);
/// store.register_item(item).await?;
/// let created = store.create(new_request).await?;
/// assert_eq!(created.value.position, Some(1));
/// ```
#[derive(Clone)]
pub struct QueueStore {
    inner: Arc<Inner>,
}

impl QueueStore {
    /// Create a store with default configuration
    #[must_use]
    pub fn new(environment: CirculationEnvironment) -> Self {
        Self::with_config(environment, StoreConfig::default())
    }

    /// Create a store with custom configuration
    #[must_use]
    pub fn with_config(environment: CirculationEnvironment, config: StoreConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                reducer: CirculationReducer::new(),
                effects: EffectExecutor::new(environment.clone()),
                environment,
                config,
                items: RwLock::new(HashMap::new()),
                index: RwLock::new(HashMap::new()),
                open_requests: AtomicUsize::new(0),
                shutdown: AtomicBool::new(false),
            }),
        }
    }

    /// Store configuration
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Injected collaborators
    #[must_use]
    pub fn environment(&self) -> &CirculationEnvironment {
        &self.inner.environment
    }

    // ------------------------------------------------------------------
    // Items
    // ------------------------------------------------------------------

    /// Register an item with an empty queue.
    ///
    /// # Errors
    ///
    /// - [`StoreError::ShutdownInProgress`] if the store is shutting down
    /// - [`StoreError::Queue`] (422) if the item is already registered
    #[tracing::instrument(skip(self, item), fields(item_id = %item.id))]
    pub async fn register_item(&self, item: Item) -> Result<ItemLedger, StoreError> {
        self.ensure_running()?;
        let mut items = self.inner.items.write().await;
        if items.contains_key(&item.id) {
            return Err(QueueError::validation("Item is already registered")
                .with_parameter("itemId", item.id)
                .into());
        }

        let ledger = ItemLedger::new(item);
        items.insert(
            ledger.item_id(),
            Arc::new(Mutex::new(ItemSlot {
                ledger: ledger.clone(),
                closed: BTreeMap::new(),
            })),
        );
        tracing::info!(status = %ledger.item.status, "Item registered");
        Ok(ledger)
    }

    /// Current item record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Queue`] (404) for an unknown item.
    pub async fn get_item(&self, item_id: ItemId) -> Result<Item, StoreError> {
        Ok(self.get_ledger(item_id).await?.item)
    }

    /// Item, queue and version as one consistent snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Queue`] (404) for an unknown item.
    pub async fn get_ledger(&self, item_id: ItemId) -> Result<ItemLedger, StoreError> {
        let slot = self
            .slot(item_id)
            .await
            .ok_or_else(|| QueueError::item_not_found(item_id))?;
        let guard = slot.lock().await;
        Ok(guard.ledger.clone())
    }

    /// Open requests for `item_id` ordered by position.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Queue`] (404) for an unknown item.
    pub async fn get_queue(&self, item_id: ItemId) -> Result<Vec<Request>, StoreError> {
        Ok(self.get_ledger(item_id).await?.queue.requests().to_vec())
    }

    /// A request, open or closed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Queue`] (404) for an unknown request.
    pub async fn get_request(&self, request_id: RequestId) -> Result<Request, StoreError> {
        let mut indexed = self.inner.index.read().await.get(&request_id).copied();
        while let Some(item_id) = indexed {
            let Some(slot) = self.slot(item_id).await else {
                break;
            };
            let guard = slot.lock().await;
            if let Some(request) = guard
                .ledger
                .queue
                .get(request_id)
                .or_else(|| guard.closed.get(&request_id))
            {
                return Ok(request.clone());
            }
            drop(guard);

            let current = self.inner.index.read().await.get(&request_id).copied();
            if current == indexed {
                break;
            }
            indexed = current;
        }
        Err(QueueError::request_not_found(request_id).into())
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Queue a new request at the tail of its item's queue.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Queue`] if the request is rejected.
    #[tracing::instrument(skip(self, request), fields(request_id = %request.id, item_id = %request.item_id))]
    pub async fn create(&self, request: NewRequest) -> Result<Committed<Request>, StoreError> {
        self.ensure_running()?;
        let (request_id, item_id) = (request.id, request.item_id);
        self.reserve(request_id, item_id).await?;

        let created = self
            .apply(CirculationAction::CreateRequest { request }, |state| {
                state
                    .open_request(request_id)
                    .cloned()
                    .ok_or_else(|| QueueError::request_not_found(request_id))
            })
            .await;
        if created.is_err() {
            self.release(request_id, item_id).await;
        }
        created
    }

    /// Cancel an open request.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Queue`] with 422 for a closed request and 404 for
    /// an unknown one.
    #[tracing::instrument(skip(self, cancellation))]
    pub async fn cancel(
        &self,
        request_id: RequestId,
        cancellation: CancellationDetails,
    ) -> Result<Committed<Request>, StoreError> {
        self.apply(
            CirculationAction::CancelRequest {
                request_id,
                cancellation,
            },
            |state| {
                state
                    .closed_request(request_id)
                    .cloned()
                    .ok_or_else(|| QueueError::request_not_found(request_id))
            },
        )
        .await
    }

    /// Delete a request record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Queue`] (404) for an unknown request.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, request_id: RequestId) -> Result<Committed<()>, StoreError> {
        self.apply(CirculationAction::DeleteRequest { request_id }, |_| Ok(()))
            .await
    }

    /// Move an open request onto another item.
    ///
    /// Both ledgers are locked for the whole move.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Queue`] if the move is rejected.
    #[tracing::instrument(skip(self))]
    pub async fn move_request(
        &self,
        request_id: RequestId,
        destination_item_id: ItemId,
        request_type: Option<RequestType>,
    ) -> Result<Committed<Request>, StoreError> {
        self.apply(
            CirculationAction::MoveRequest {
                request_id,
                destination_item_id,
                request_type,
            },
            |state| {
                state
                    .open_request(request_id)
                    .cloned()
                    .ok_or_else(|| QueueError::request_not_found(request_id))
            },
        )
        .await
    }

    /// Replace the order of an item's queue.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Queue`] if the order does not match the open
    /// requests.
    #[tracing::instrument(skip(self, positions), fields(entries = positions.len()))]
    pub async fn reorder(
        &self,
        item_id: ItemId,
        positions: Vec<ReorderEntry>,
    ) -> Result<Committed<Vec<Request>>, StoreError> {
        self.apply(
            CirculationAction::ReorderQueue { item_id, positions },
            move |state| Ok(state.ledger(item_id)?.queue.requests().to_vec()),
        )
        .await
    }

    /// The item was checked in at `service_point_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Queue`] if the next request cannot be served.
    #[tracing::instrument(skip(self))]
    pub async fn on_check_in(
        &self,
        item_id: ItemId,
        service_point_id: ServicePointId,
    ) -> Result<Committed<Item>, StoreError> {
        self.apply(
            CirculationAction::CheckIn {
                item_id,
                service_point_id,
            },
            move |state| Ok(state.ledger(item_id)?.item.clone()),
        )
        .await
    }

    /// The item is being checked out to `user_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Queue`] (422) if another patron's request comes
    /// first.
    #[tracing::instrument(skip(self))]
    pub async fn on_check_out(
        &self,
        item_id: ItemId,
        user_id: UserId,
    ) -> Result<Committed<Item>, StoreError> {
        self.apply(
            CirculationAction::CheckOut { item_id, user_id },
            move |state| Ok(state.ledger(item_id)?.item.clone()),
        )
        .await
    }

    /// Staff declared the item missing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Queue`] if the item is unknown or on loan.
    #[tracing::instrument(skip(self))]
    pub async fn mark_missing(&self, item_id: ItemId) -> Result<Committed<Item>, StoreError> {
        self.apply(CirculationAction::MarkMissing { item_id }, move |state| {
            Ok(state.ledger(item_id)?.item.clone())
        })
        .await
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Current health of the store
    #[must_use]
    pub fn health(&self) -> HealthCheck {
        HealthCheck::from_counters(StoreCounters {
            shutting_down: self.inner.shutdown.load(Ordering::Acquire),
            pending_effects: self.inner.effects.pending(),
            failed_effects: usize::try_from(self.inner.effects.failed()).unwrap_or(usize::MAX),
            open_requests: self.inner.open_requests.load(Ordering::Acquire),
        })
    }

    /// Side effects started but not yet finished
    #[must_use]
    pub fn pending_effects(&self) -> usize {
        self.inner.effects.pending()
    }

    /// Initiate graceful shutdown of the store
    ///
    /// New mutations are rejected from now on. Waits for in-flight side
    /// effects to finish.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownTimeout`] if effects are still running
    /// when `timeout` expires.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
        tracing::info!("Initiating graceful shutdown");
        self.inner.shutdown.store(true, Ordering::Release);

        let start = Instant::now();
        let poll_interval = Duration::from_millis(10);
        loop {
            let pending = self.inner.effects.pending();
            if pending == 0 {
                tracing::info!("All effects completed, shutdown successful");
                return Ok(());
            }
            if start.elapsed() >= timeout {
                tracing::error!(pending_effects = pending, "Shutdown timed out");
                return Err(StoreError::ShutdownTimeout(pending));
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Shut down using the configured default timeout
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownTimeout`] if effects are still running
    /// when the timeout expires.
    pub async fn shutdown_default(&self) -> Result<(), StoreError> {
        self.shutdown(self.inner.config.shutdown_timeout).await
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn ensure_running(&self) -> Result<(), StoreError> {
        if self.inner.shutdown.load(Ordering::Acquire) {
            tracing::warn!("Rejected mutation: store is shutting down");
            return Err(StoreError::ShutdownInProgress);
        }
        Ok(())
    }

    /// Claim `request_id` for a create on `item_id` until it commits or is rejected
    async fn reserve(&self, request_id: RequestId, item_id: ItemId) -> Result<(), StoreError> {
        let mut index = self.inner.index.write().await;
        if index.contains_key(&request_id) {
            tracing::warn!(%request_id, "Rejected create: request id already in use");
            MutationMetrics::record_rejection("create_request", "validation");
            return Err(QueueError::validation("Request with this id already exists")
                .with_parameter("id", request_id)
                .into());
        }
        index.insert(request_id, item_id);
        Ok(())
    }

    async fn release(&self, request_id: RequestId, item_id: ItemId) {
        let mut index = self.inner.index.write().await;
        if index.get(&request_id) == Some(&item_id) {
            index.remove(&request_id);
        }
    }

    async fn slot(&self, item_id: ItemId) -> Option<Arc<Mutex<ItemSlot>>> {
        self.inner.items.read().await.get(&item_id).cloned()
    }

    /// Items an action touches, plus the item its request was indexed under
    async fn plan(&self, action: &CirculationAction) -> (Vec<ItemId>, Option<ItemId>) {
        let mut items: Vec<ItemId> = action.item_id().into_iter().collect();
        let indexed = match action {
            CirculationAction::CreateRequest { .. } => None,
            _ => match action.request_id() {
                Some(request_id) => self.inner.index.read().await.get(&request_id).copied(),
                None => None,
            },
        };
        items.extend(indexed);
        if let CirculationAction::MoveRequest {
            destination_item_id,
            ..
        } = action
        {
            items.push(*destination_item_id);
        }
        items.sort_unstable();
        items.dedup();
        (items, indexed)
    }

    /// Lock the slots for `item_ids` in ascending order. Unknown items are skipped.
    async fn lock(&self, item_ids: &[ItemId]) -> Vec<SlotGuard> {
        let slots: Vec<Arc<Mutex<ItemSlot>>> = {
            let items = self.inner.items.read().await;
            item_ids
                .iter()
                .filter_map(|id| items.get(id).cloned())
                .collect()
        };
        let mut guards = Vec::with_capacity(slots.len());
        for slot in slots {
            guards.push(slot.lock_owned().await);
        }
        guards
    }

    async fn apply<T, F>(&self, action: CirculationAction, extract: F) -> Result<Committed<T>, StoreError>
    where
        F: FnOnce(&CirculationState) -> Result<T, QueueError>,
    {
        self.ensure_running()?;
        let tracked_request = match &action {
            CirculationAction::CreateRequest { .. } => None,
            other => other.request_id(),
        };

        loop {
            let (item_ids, indexed) = self.plan(&action).await;
            let guards = self.lock(&item_ids).await;

            // A mismatch implies a move committed in between
            if let Some(request_id) = tracked_request {
                let current = self.inner.index.read().await.get(&request_id).copied();
                if current != indexed {
                    tracing::debug!(%request_id, "Request moved while waiting for locks, re-resolving");
                    drop(guards);
                    continue;
                }
            }

            return self
                .commit(action, guards, tracked_request, extract)
                .await;
        }
    }

    async fn commit<T, F>(
        &self,
        action: CirculationAction,
        mut guards: Vec<SlotGuard>,
        tracked_request: Option<RequestId>,
        extract: F,
    ) -> Result<Committed<T>, StoreError>
    where
        F: FnOnce(&CirculationState) -> Result<T, QueueError>,
    {
        let name = action.name();
        let start = Instant::now();

        let mut state = CirculationState::new();
        for guard in &guards {
            state.insert_ledger(guard.ledger.clone());
            if let Some(closed) = tracked_request.and_then(|id| guard.closed.get(&id)) {
                state.insert_closed(closed.clone());
            }
        }
        let open_before: usize = guards.iter().map(|g| g.ledger.queue.len()).sum();

        let reduced = self
            .inner
            .reducer
            .reduce(&mut state, action, &self.inner.environment)
            .and_then(|effects| extract(&state).map(|value| (effects, value)));
        let (effects, value) = match reduced {
            Ok(reduced) => reduced,
            Err(err) => {
                tracing::warn!(action = name, kind = err.kind(), error = %err, "Mutation rejected");
                MutationMetrics::record_rejection(name, err.kind());
                return Err(err.into());
            },
        };

        let (ledgers, closed, purged, events) = state.into_parts();
        let mut ledgers: HashMap<ItemId, ItemLedger> =
            ledgers.into_iter().map(|l| (l.item_id(), l)).collect();
        for guard in &mut guards {
            if let Some(mut ledger) = ledgers.remove(&guard.ledger.item_id()) {
                if ledger != guard.ledger {
                    ledger.version = guard.ledger.version + 1;
                    guard.ledger = ledger;
                }
            }
        }
        for request in closed {
            match guards
                .iter_mut()
                .find(|g| g.ledger.item_id() == request.item_id)
            {
                Some(guard) => {
                    guard.closed.insert(request.id, request);
                },
                None => {
                    tracing::warn!(request_id = %request.id, "Closed request outside locked scope");
                },
            }
        }
        for request_id in &purged {
            for guard in &mut guards {
                guard.closed.remove(request_id);
            }
        }

        {
            let mut index = self.inner.index.write().await;
            for event in &events {
                match event {
                    QueueEvent::RequestQueued {
                        request_id,
                        item_id,
                        ..
                    } => {
                        index.insert(*request_id, *item_id);
                    },
                    QueueEvent::RequestMoved { request_id, to, .. } => {
                        index.insert(*request_id, *to);
                    },
                    QueueEvent::RequestDeleted { request_id, .. } => {
                        index.remove(request_id);
                    },
                    _ => {},
                }
            }
        }

        let open_after: usize = guards.iter().map(|g| g.ledger.queue.len()).sum();
        let open = if open_after >= open_before {
            self.inner
                .open_requests
                .fetch_add(open_after - open_before, Ordering::AcqRel)
                + (open_after - open_before)
        } else {
            self.inner
                .open_requests
                .fetch_sub(open_before - open_after, Ordering::AcqRel)
                - (open_before - open_after)
        };
        drop(guards);

        MutationMetrics::record_commit(name, start.elapsed());
        MutationMetrics::record_open_requests(open);
        tracing::info!(
            action = name,
            events = events.len(),
            effects = effects.len(),
            "Mutation committed"
        );

        let effects = self.inner.effects.spawn(effects);
        Ok(Committed {
            value,
            events,
            effects,
        })
    }
}

impl std::fmt::Debug for QueueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueStore")
            .field("config", &self.inner.config)
            .field("pending_effects", &self.inner.effects.pending())
            .finish_non_exhaustive()
    }
}
