//! Instance change events observed from the registration layer.

use serde::{Deserialize, Serialize};

use reach_core::{RegistrationKey, RequestChannel, ServiceInstance};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceChangeKind {
    Registered,
    Deregistered,
}

/// A registration or deregistration of one worker instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceChangedEvent {
    pub kind: InstanceChangeKind,
    pub instance: ServiceInstance,
    pub registration_key: RegistrationKey,
    /// Milliseconds since the epoch, assigned by the accepting member.
    pub register_time: i64,
    /// Member that accepted the registration.
    pub source_id: i64,
    pub channel: RequestChannel,
    /// `{member_id}_{local_sequence}` of the owning connection, if any.
    #[serde(default)]
    pub connection_id: Option<String>,
}

impl InstanceChangedEvent {
    pub fn registered(
        registration_key: RegistrationKey,
        instance: ServiceInstance,
        register_time: i64,
        source_id: i64,
        channel: RequestChannel,
    ) -> Self {
        Self {
            kind: InstanceChangeKind::Registered,
            instance,
            registration_key,
            register_time,
            source_id,
            channel,
            connection_id: None,
        }
    }

    pub fn with_connection_id(mut self, connection_id: impl Into<String>) -> Self {
        self.connection_id = Some(connection_id.into());
        self
    }

    /// The matching deregistration for this event.
    pub fn deregistered(&self) -> Self {
        Self {
            kind: InstanceChangeKind::Deregistered,
            ..self.clone()
        }
    }
}
