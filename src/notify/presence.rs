//! Presence tracking for live connections
//!
//! Only the most recent connection of an employee counts as live. The
//! in-process registry is scoped to one running process: another instance
//! holding the employee's socket is invisible here, so live delivery is
//! skipped while push and the inbox record still go out.

use crate::cases::types::EmployeeId;
use crate::realtime::events::ServerEvent;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Sending half of one live connection
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    sender: mpsc::UnboundedSender<ServerEvent>,
}

impl ConnectionHandle {
    /// Opens a handle plus the receiver the transport drains.
    pub fn open() -> (Self, mpsc::UnboundedReceiver<ServerEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                id: ConnectionId::new(),
                sender,
            },
            receiver,
        )
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Fails when the transport side has gone away.
    pub fn emit(&self, event: ServerEvent) -> Result<(), String> {
        self.sender
            .send(event)
            .map_err(|_| format!("connection {} is closed", self.id))
    }
}

#[async_trait]
pub trait PresenceRegistry: Send + Sync {
    /// Replaces any previous handle for the employee.
    async fn join(&self, employee_id: &str, handle: ConnectionHandle);

    /// Removes the entry only if `connection_id` is still the one on record.
    /// Returns the employee that went offline.
    async fn leave(&self, connection_id: ConnectionId) -> Option<EmployeeId>;

    async fn is_present(&self, employee_id: &str) -> Option<ConnectionHandle>;
}

#[derive(Debug, Default)]
struct PresenceMaps {
    by_employee: HashMap<EmployeeId, ConnectionHandle>,
    by_connection: HashMap<ConnectionId, EmployeeId>,
}

/// Process-local presence registry
#[derive(Debug, Default)]
pub struct InProcessPresence {
    maps: RwLock<PresenceMaps>,
}

impl InProcessPresence {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, PresenceMaps> {
        self.maps.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, PresenceMaps> {
        self.maps.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn online_count(&self) -> usize {
        self.read().by_employee.len()
    }
}

#[async_trait]
impl PresenceRegistry for InProcessPresence {
    async fn join(&self, employee_id: &str, handle: ConnectionHandle) {
        let mut maps = self.write();
        let connection_id = handle.id();
        // A connection that re-joins under another employee stops speaking for the first.
        if let Some(previous_owner) = maps.by_connection.get(&connection_id).cloned() {
            let owned_here = maps
                .by_employee
                .get(&previous_owner)
                .is_some_and(|current| current.id() == connection_id);
            if previous_owner != employee_id && owned_here {
                maps.by_employee.remove(&previous_owner);
                debug!(employee_id, previous_owner = %previous_owner, "Connection switched employee");
            }
        }
        if let Some(previous) = maps.by_employee.insert(employee_id.to_string(), handle) {
            maps.by_connection.remove(&previous.id());
            debug!(employee_id, stale = %previous.id(), "Replaced stale connection");
        }
        maps.by_connection
            .insert(connection_id, employee_id.to_string());
    }

    async fn leave(&self, connection_id: ConnectionId) -> Option<EmployeeId> {
        let mut maps = self.write();
        let employee_id = maps.by_connection.remove(&connection_id)?;
        let still_current = maps
            .by_employee
            .get(&employee_id)
            .map(|handle| handle.id() == connection_id)
            .unwrap_or(false);
        if still_current {
            maps.by_employee.remove(&employee_id);
            Some(employee_id)
        } else {
            None
        }
    }

    async fn is_present(&self, employee_id: &str) -> Option<ConnectionHandle> {
        self.read().by_employee.get(employee_id).cloned()
    }
}
