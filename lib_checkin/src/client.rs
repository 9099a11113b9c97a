//! # Check-in Sync Client
//!
//! Caller-facing facade. One instance owns one connection manager, one
//! subscription registry, one dispatcher and one offline queue; nothing is
//! global, so independent clients never share callbacks or state.
//!
//! ```rust,no_run
//! use lib_checkin::{CheckinSyncClient, SyncConfig};
//!
//! # async fn run() -> lib_checkin::Result<()> {
//! let client = CheckinSyncClient::new(SyncConfig::new("https://api.example.com").with_auth_token("t0k3n"))?;
//! let mut updates = client.child_status_updates();
//!
//! client.subscribe_to_child("c1")?;
//! client.connect("u1").await?;
//!
//! while let Ok(update) = updates.recv().await {
//!     println!("{} -> {:?}", update.child_id, update.new_status);
//! }
//! client.close().await;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tokio::sync::{broadcast, watch};

use crate::configs::SyncConfig;
use crate::core::{ConnectionManager, StatusDispatcher, SubscriptionRegistry};
use crate::error::{Result, SyncError};
use crate::models::{
    ChildStatusUpdate, ConnectionState, OfflineCapabilities, OfflineOperation, PendingOperation,
    ServiceStatusUpdate, StatusNotification, Subscription,
};
use crate::offline::OfflineQueue;

pub struct CheckinSyncClient {
    config: Arc<SyncConfig>,
    registry: Arc<SubscriptionRegistry>,
    dispatcher: Arc<StatusDispatcher>,
    connection: ConnectionManager,
    offline: OfflineQueue,
}

impl CheckinSyncClient {
    /// Builds a client. Nothing connects until [`connect`](Self::connect).
    pub fn new(config: SyncConfig) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let registry = Arc::new(SubscriptionRegistry::new());
        let dispatcher = Arc::new(StatusDispatcher::new(config.event_buffer_size));
        let connection =
            ConnectionManager::new(Arc::clone(&config), Arc::clone(&registry), Arc::clone(&dispatcher));
        Ok(Self {
            config,
            registry,
            dispatcher,
            connection,
            offline: OfflineQueue::new(),
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    // --- Connection ---

    /// Starts connecting as `user_id`. Any existing session is torn down
    /// first. Returns once the attempt is under way; watch
    /// [`subscribe_connection_state`](Self::subscribe_connection_state) for
    /// the outcome.
    pub async fn connect(&self, user_id: &str) -> Result<()> {
        self.connection.connect(user_id).await
    }

    /// Stops the connection and any pending reconnect. Subscriptions and
    /// pending operations are kept.
    pub async fn disconnect(&self) {
        self.connection.disconnect().await;
    }

    /// Disconnects, forgets every subscription and refuses further use.
    pub async fn close(&self) {
        self.connection.close().await;
        self.registry.clear();
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Always true: callers can fall back to polling if push stays down.
    pub fn has_fallback_mechanism(&self) -> bool {
        true
    }

    /// Token for the next handshake. The live connection is not touched.
    pub fn set_auth_token(&self, token: Option<String>) {
        self.connection.set_auth_token(token);
    }

    // --- Subscriptions ---

    pub fn subscribe_to_child(&self, child_id: &str) -> Result<()> {
        self.subscribe(Subscription::child(child_id))
    }

    pub fn subscribe_to_service(&self, service_id: &str) -> Result<()> {
        self.subscribe(Subscription::service(service_id))
    }

    pub fn unsubscribe_from_child(&self, child_id: &str) -> Result<bool> {
        self.unsubscribe(&Subscription::child(child_id))
    }

    pub fn unsubscribe_from_service(&self, service_id: &str) -> Result<bool> {
        self.unsubscribe(&Subscription::service(service_id))
    }

    pub fn unsubscribe_all(&self) -> Result<()> {
        self.ensure_open()?;
        self.registry.unsubscribe_all()
    }

    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.registry.subscriptions()
    }

    fn subscribe(&self, subscription: Subscription) -> Result<()> {
        self.ensure_open()?;
        self.registry.subscribe(subscription)
    }

    fn unsubscribe(&self, subscription: &Subscription) -> Result<bool> {
        self.ensure_open()?;
        self.registry.unsubscribe(subscription)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.connection.is_closed() {
            Err(SyncError::Closed)
        } else {
            Ok(())
        }
    }

    // --- Streams ---

    /// Current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn subscribe_connection_state(&self) -> broadcast::Receiver<ConnectionState> {
        self.connection.subscribe_state()
    }

    pub fn child_status_updates(&self) -> broadcast::Receiver<ChildStatusUpdate> {
        self.dispatcher.subscribe_child_updates()
    }

    pub fn service_status_updates(&self) -> broadcast::Receiver<ServiceStatusUpdate> {
        self.dispatcher.subscribe_service_updates()
    }

    pub fn notifications(&self) -> broadcast::Receiver<StatusNotification> {
        self.dispatcher.subscribe_notifications()
    }

    /// Capacity limit for a service whose updates do not carry `maxCapacity`.
    pub fn set_service_capacity(&self, service_id: &str, max_capacity: u32) {
        self.dispatcher.set_service_capacity(service_id, max_capacity);
    }

    // --- Offline queue ---

    pub fn set_offline_status(&self, offline: bool) {
        self.offline.set_offline_status(offline);
    }

    pub fn is_offline(&self) -> bool {
        self.offline.is_offline()
    }

    pub fn offline_capabilities(&self) -> OfflineCapabilities {
        self.offline.capabilities()
    }

    pub fn is_operation_available_offline(&self, operation: OfflineOperation) -> bool {
        self.offline.is_operation_available_offline(operation)
    }

    pub fn get_offline_message(&self, operation: OfflineOperation) -> String {
        self.offline.get_offline_message(operation)
    }

    pub fn add_pending_operation(&self, operation: PendingOperation) -> Result<()> {
        self.offline.add_pending_operation(operation)
    }

    pub fn remove_pending_operation(&self, id: &str) -> Option<PendingOperation> {
        self.offline.remove_pending_operation(id)
    }

    pub fn clear_pending_operations(&self) {
        self.offline.clear_pending_operations();
    }

    pub fn pending_operations(&self) -> watch::Receiver<Vec<PendingOperation>> {
        self.offline.subscribe_pending_operations()
    }

    pub fn offline_status(&self) -> watch::Receiver<bool> {
        self.offline.subscribe_offline_status()
    }

    pub fn offline_queue(&self) -> &OfflineQueue {
        &self.offline
    }
}
