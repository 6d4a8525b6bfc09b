//! Transport-agnostic handling of live connection events
//!
//! A websocket (or any other transport) owns the receiving half of a
//! `ConnectionHandle`, forwards decoded client messages here and calls
//! `disconnect` when the socket goes away.

use crate::cases::types::{EmployeeId, OrganizationId};
use crate::notify::presence::{ConnectionHandle, ConnectionId, PresenceRegistry};
use crate::realtime::events::{ClientEvent, ServerEvent};
use crate::store::{InboxRepository, StoreError};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Connection {connection_id} has not joined")]
    NotJoined { connection_id: ConnectionId },
    #[error("Malformed client message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Inbox error: {0}")]
    Inbox(#[from] StoreError),
    #[error("Connection closed: {0}")]
    Closed(String),
}

#[derive(Debug, Clone)]
struct Session {
    employee_id: EmployeeId,
    organization_id: OrganizationId,
}

pub struct RealtimeGateway {
    presence: Arc<dyn PresenceRegistry>,
    inbox: Arc<dyn InboxRepository>,
    sessions: RwLock<HashMap<ConnectionId, Session>>,
}

impl RealtimeGateway {
    pub fn new(presence: Arc<dyn PresenceRegistry>, inbox: Arc<dyn InboxRepository>) -> Self {
        Self {
            presence,
            inbox,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Decodes a raw JSON message and handles it. Failures are reported back on
    /// the connection as an `error` event as well as returned.
    pub async fn handle_message(
        &self,
        handle: &ConnectionHandle,
        raw: &str,
    ) -> Result<(), GatewayError> {
        let result = match serde_json::from_str::<ClientEvent>(raw) {
            Ok(event) => self.handle_event(handle, event).await,
            Err(e) => Err(GatewayError::Malformed(e)),
        };
        if let Err(e) = &result {
            let _ = handle.emit(ServerEvent::Error {
                message: e.to_string(),
            });
        }
        result
    }

    pub async fn handle_event(
        &self,
        handle: &ConnectionHandle,
        event: ClientEvent,
    ) -> Result<(), GatewayError> {
        match event {
            ClientEvent::Join {
                employee_id,
                organization_id,
            } => self.join(handle, employee_id, organization_id).await,
            ClientEvent::MarkAsRead { notification_id } => {
                self.mark_as_read(handle, notification_id).await
            }
        }
    }

    async fn join(
        &self,
        handle: &ConnectionHandle,
        employee_id: EmployeeId,
        organization_id: OrganizationId,
    ) -> Result<(), GatewayError> {
        self.presence.join(&employee_id, handle.clone()).await;
        self.sessions.write().await.insert(
            handle.id(),
            Session {
                employee_id: employee_id.clone(),
                organization_id: organization_id.clone(),
            },
        );
        info!(
            employee_id = %employee_id,
            organization_id = %organization_id,
            connection = %handle.id(),
            "Employee joined"
        );

        self.send_history(handle, &organization_id, &employee_id)
            .await
    }

    async fn mark_as_read(
        &self,
        handle: &ConnectionHandle,
        notification_id: Uuid,
    ) -> Result<(), GatewayError> {
        let session = self
            .sessions
            .read()
            .await
            .get(&handle.id())
            .cloned()
            .ok_or(GatewayError::NotJoined {
                connection_id: handle.id(),
            })?;

        self.inbox
            .mark_read(notification_id, &session.employee_id)
            .await?;
        debug!(
            employee_id = %session.employee_id,
            notification_id = %notification_id,
            "Notification marked as read"
        );

        self.send_history(handle, &session.organization_id, &session.employee_id)
            .await
    }

    async fn send_history(
        &self,
        handle: &ConnectionHandle,
        organization_id: &str,
        employee_id: &str,
    ) -> Result<(), GatewayError> {
        let history = self
            .inbox
            .notifications_for(organization_id, employee_id)
            .await?;
        handle
            .emit(ServerEvent::AllNotifications(history))
            .map_err(GatewayError::Closed)
    }

    /// Forgets the connection. A stale disconnect leaves a newer connection of
    /// the same employee in place.
    pub async fn disconnect(&self, connection_id: ConnectionId) {
        self.sessions.write().await.remove(&connection_id);
        match self.presence.leave(connection_id).await {
            Some(employee_id) => {
                info!(employee_id = %employee_id, connection = %connection_id, "Employee left")
            }
            None => warn!(connection = %connection_id, "Disconnect for a connection no longer on record"),
        }
    }
}
