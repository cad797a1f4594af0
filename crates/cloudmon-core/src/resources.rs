//! Monitoring resource records and request payloads.
//!
//! Records are plain values owned by the caller once returned. They carry
//! only the identifiers needed to address them again (for checks and alarms
//! that includes the owning entity id); every operation goes through the
//! client, never through the record itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Free-form string metadata attached to most resources.
pub type Metadata = BTreeMap<String, String>;

/// An entity: a monitored host or service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entity {
    /// Entity identifier (e.g. "enAAAAA")
    pub id: String,

    /// Human-readable label
    pub label: String,

    /// IP address aliases: alias -> address
    #[serde(default, deserialize_with = "null_as_default")]
    pub ip_addresses: BTreeMap<String, String>,

    /// Arbitrary metadata
    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: Metadata,

    /// Agent bound to this entity, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,

    /// Creation time, epoch milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,

    /// Last update time, epoch milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

impl Entity {
    /// Look up an address by alias
    pub fn ip_address(&self, alias: &str) -> Option<&str> {
        self.ip_addresses.get(alias).map(String::as_str)
    }

    /// Creation timestamp
    pub fn created(&self) -> Option<DateTime<Utc>> {
        self.created_at.and_then(DateTime::from_timestamp_millis)
    }

    /// Last update timestamp
    pub fn updated(&self) -> Option<DateTime<Utc>> {
        self.updated_at.and_then(DateTime::from_timestamp_millis)
    }
}

/// A check: one probe run against an entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Check {
    /// Check identifier
    pub id: String,

    /// Owning entity. Not part of the wire payload; filled in by the client.
    #[serde(skip)]
    pub entity_id: String,

    /// Human-readable label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Check type, e.g. "remote.http" or "agent.cpu"
    #[serde(rename = "type")]
    pub check_type: String,

    /// Type-specific details
    #[serde(default)]
    pub details: serde_json::Value,

    /// Monitoring zones the check is polled from
    #[serde(default, deserialize_with = "null_as_default")]
    pub monitoring_zones_poll: Vec<String>,

    /// Entity IP alias to target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_alias: Option<String>,

    /// Host name to target instead of an alias
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_hostname: Option<String>,

    /// Resolver used for `target_hostname` ("IPv4" or "IPv6")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_resolver: Option<String>,

    /// Timeout in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u32>,

    /// Polling period in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<u32>,

    /// Whether the check is disabled
    #[serde(default)]
    pub disabled: bool,

    /// Arbitrary metadata
    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: Metadata,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

impl Check {
    /// Creation timestamp
    pub fn created(&self) -> Option<DateTime<Utc>> {
        self.created_at.and_then(DateTime::from_timestamp_millis)
    }

    /// Last update timestamp
    pub fn updated(&self) -> Option<DateTime<Utc>> {
        self.updated_at.and_then(DateTime::from_timestamp_millis)
    }
}

/// An alarm: criteria evaluated over a check's results.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Alarm {
    /// Alarm identifier
    pub id: String,

    /// Owning entity. Not part of the wire payload; filled in by the client.
    #[serde(skip)]
    pub entity_id: String,

    /// Check this alarm evaluates
    pub check_id: String,

    /// Notification plan triggered on state changes
    pub notification_plan_id: String,

    /// Alarm DSL criteria
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub criteria: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(default)]
    pub disabled: bool,

    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: Metadata,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

impl Alarm {
    /// Creation timestamp
    pub fn created(&self) -> Option<DateTime<Utc>> {
        self.created_at.and_then(DateTime::from_timestamp_millis)
    }

    /// Last update timestamp
    pub fn updated(&self) -> Option<DateTime<Utc>> {
        self.updated_at.and_then(DateTime::from_timestamp_millis)
    }
}

/// A notification target (email address, webhook, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Notification type, e.g. "email" or "webhook"
    #[serde(rename = "type")]
    pub notification_type: String,

    /// Type-specific details (e.g. `{"address": "ops@example.com"}`)
    #[serde(default)]
    pub details: serde_json::Value,

    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: Metadata,
}

/// A notification plan: which notifications fire for each alarm state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationPlan {
    pub id: String,

    pub label: String,

    /// Notifications for the critical (error) state
    #[serde(default, alias = "error_state", deserialize_with = "null_as_default")]
    pub critical_state: Vec<String>,

    /// Notifications for the warning state
    #[serde(default, deserialize_with = "null_as_default")]
    pub warning_state: Vec<String>,

    /// Notifications for the ok state
    #[serde(default, deserialize_with = "null_as_default")]
    pub ok_state: Vec<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: Metadata,
}

/// Kinds of monitoring resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Entity,
    Check,
    Alarm,
    Notification,
    NotificationPlan,
}

impl ResourceKind {
    /// Collection segment used in API paths
    pub fn collection(&self) -> &'static str {
        match self {
            Self::Entity => "entities",
            Self::Check => "checks",
            Self::Alarm => "alarms",
            Self::Notification => "notifications",
            Self::NotificationPlan => "notification_plans",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entity => write!(f, "entity"),
            Self::Check => write!(f, "check"),
            Self::Alarm => write!(f, "alarm"),
            Self::Notification => write!(f, "notification"),
            Self::NotificationPlan => write!(f, "notification plan"),
        }
    }
}

/// Any monitoring resource, tagged by kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Resource {
    Entity(Entity),
    Check(Check),
    Alarm(Alarm),
    Notification(Notification),
    NotificationPlan(NotificationPlan),
}

impl Resource {
    /// Kind of this resource
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Entity(_) => ResourceKind::Entity,
            Self::Check(_) => ResourceKind::Check,
            Self::Alarm(_) => ResourceKind::Alarm,
            Self::Notification(_) => ResourceKind::Notification,
            Self::NotificationPlan(_) => ResourceKind::NotificationPlan,
        }
    }

    /// Identifier of this resource
    pub fn id(&self) -> &str {
        match self {
            Self::Entity(e) => &e.id,
            Self::Check(c) => &c.id,
            Self::Alarm(a) => &a.id,
            Self::Notification(n) => &n.id,
            Self::NotificationPlan(p) => &p.id,
        }
    }

    /// Label, if the resource has one
    pub fn label(&self) -> Option<&str> {
        match self {
            Self::Entity(e) => Some(e.label.as_str()),
            Self::Check(c) => c.label.as_deref(),
            Self::Alarm(a) => a.label.as_deref(),
            Self::Notification(n) => n.label.as_deref(),
            Self::NotificationPlan(p) => Some(p.label.as_str()),
        }
    }
}

impl From<Entity> for Resource {
    fn from(value: Entity) -> Self {
        Self::Entity(value)
    }
}

impl From<Check> for Resource {
    fn from(value: Check) -> Self {
        Self::Check(value)
    }
}

impl From<Alarm> for Resource {
    fn from(value: Alarm) -> Self {
        Self::Alarm(value)
    }
}

impl From<Notification> for Resource {
    fn from(value: Notification) -> Self {
        Self::Notification(value)
    }
}

impl From<NotificationPlan> for Resource {
    fn from(value: NotificationPlan) -> Self {
        Self::NotificationPlan(value)
    }
}

/// Payload for creating an entity.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NewEntity {
    pub label: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_addresses: Option<BTreeMap<String, String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
}

impl NewEntity {
    /// Create a payload with just a label
    pub fn new<S: Into<String>>(label: S) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    /// Add an IP address alias
    pub fn with_ip_address<A: Into<String>, I: Into<String>>(mut self, alias: A, ip: I) -> Self {
        self.ip_addresses
            .get_or_insert_with(BTreeMap::new)
            .insert(alias.into(), ip.into());
        self
    }

    /// Add a metadata key
    pub fn with_metadata<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.metadata
            .get_or_insert_with(Metadata::new)
            .insert(key.into(), value.into());
        self
    }
}

/// Partial update of an entity; `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EntityUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_addresses: Option<BTreeMap<String, String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
}

/// Payload for creating a check.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NewCheck {
    #[serde(rename = "type")]
    pub check_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub monitoring_zones_poll: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_alias: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_hostname: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_resolver: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl NewCheck {
    /// Create a payload for the given check type
    pub fn new<S: Into<String>>(check_type: S) -> Self {
        Self {
            check_type: check_type.into(),
            ..Self::default()
        }
    }
}

/// Partial update of a check.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CheckUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub monitoring_zones_poll: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_alias: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

/// Payload for creating an alarm.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NewAlarm {
    pub check_id: String,

    pub notification_plan_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub criteria: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

/// Partial update of an alarm.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AlarmUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_plan_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub criteria: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

/// Payload for creating a notification.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NewNotification {
    #[serde(rename = "type")]
    pub notification_type: String,

    pub details: serde_json::Value,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl NewNotification {
    /// Email notification to a single address
    pub fn email<L: Into<String>, A: Into<String>>(label: L, address: A) -> Self {
        Self {
            notification_type: "email".to_string(),
            details: serde_json::json!({ "address": address.into() }),
            label: Some(label.into()),
            metadata: None,
        }
    }

    /// Webhook notification to a URL
    pub fn webhook<L: Into<String>, U: Into<String>>(label: L, url: U) -> Self {
        Self {
            notification_type: "webhook".to_string(),
            details: serde_json::json!({ "url": url.into() }),
            label: Some(label.into()),
            metadata: None,
        }
    }
}

/// Partial update of a notification.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NotificationUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub notification_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

/// Payload for creating a notification plan.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NewNotificationPlan {
    pub label: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub critical_state: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning_state: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ok_state: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

/// Partial update of a notification plan.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NotificationPlanUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub critical_state: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning_state: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ok_state: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

/// Treat an explicit JSON `null` like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entity_from_wire() {
        let value = json!({
            "id": "enAAAAA",
            "label": "web01",
            "ip_addresses": {"public0": "50.57.61.26", "private0": "10.0.0.1"},
            "metadata": null,
            "agent_id": null,
            "created_at": 1318965367000i64,
            "updated_at": 1318965367000i64
        });

        let entity: Entity = serde_json::from_value(value).unwrap();
        assert_eq!(entity.id, "enAAAAA");
        assert_eq!(entity.label, "web01");
        assert_eq!(entity.ip_address("public0"), Some("50.57.61.26"));
        assert!(entity.metadata.is_empty());
        assert!(entity.agent_id.is_none());
        assert_eq!(
            entity.created().map(|t| t.timestamp()),
            Some(1318965367)
        );
    }

    #[test]
    fn test_check_and_alarm_timestamps() {
        let check: Check = serde_json::from_value(json!({
            "id": "chA",
            "type": "remote.ping",
            "created_at": 1318965367000i64
        }))
        .unwrap();
        assert_eq!(check.created().map(|t| t.timestamp()), Some(1318965367));
        assert!(check.updated().is_none());

        let alarm: Alarm = serde_json::from_value(json!({
            "id": "alA",
            "check_id": "chA",
            "notification_plan_id": "npA",
            "updated_at": 1318965368500i64
        }))
        .unwrap();
        assert_eq!(alarm.updated().map(|t| t.timestamp_millis()), Some(1318965368500));
        assert!(alarm.created().is_none());
    }

    #[test]
    fn test_entity_requires_label() {
        let res: Result<Entity, _> = serde_json::from_value(json!({"id": "en1"}));
        assert!(res.is_err());
    }

    #[test]
    fn test_check_from_wire_leaves_entity_id_empty() {
        let value = json!({
            "id": "chAAAA",
            "label": "Website check",
            "type": "remote.http",
            "details": {"url": "http://www.example.com", "method": "GET"},
            "monitoring_zones_poll": ["mzA", "mzB"],
            "target_alias": "public0",
            "timeout": 30,
            "period": 100,
            "disabled": false
        });

        let check: Check = serde_json::from_value(value).unwrap();
        assert_eq!(check.check_type, "remote.http");
        assert_eq!(check.monitoring_zones_poll.len(), 2);
        assert_eq!(check.details["method"], "GET");
        assert!(check.entity_id.is_empty());

        let out = serde_json::to_value(&check).unwrap();
        assert!(out.get("entity_id").is_none());
        assert_eq!(out["type"], "remote.http");
    }

    #[test]
    fn test_notification_plan_accepts_error_state_alias() {
        let plan: NotificationPlan = serde_json::from_value(json!({
            "id": "npAAAA",
            "label": "ops",
            "error_state": ["ntA"],
            "warning_state": null
        }))
        .unwrap();

        assert_eq!(plan.critical_state, vec!["ntA".to_string()]);
        assert!(plan.warning_state.is_empty());
        assert!(plan.ok_state.is_empty());
    }

    #[test]
    fn test_resource_tagging() {
        let notification = Notification {
            id: "ntA".to_string(),
            label: Some("pager".to_string()),
            notification_type: "webhook".to_string(),
            details: json!({"url": "https://hooks.example.com"}),
            metadata: Metadata::new(),
        };

        let resource = Resource::from(notification);
        assert_eq!(resource.kind(), ResourceKind::Notification);
        assert_eq!(resource.id(), "ntA");
        assert_eq!(resource.label(), Some("pager"));
        assert_eq!(resource.kind().collection(), "notifications");
        assert_eq!(ResourceKind::NotificationPlan.to_string(), "notification plan");
    }

    #[test]
    fn test_new_entity_serialization_omits_unset_fields() {
        let payload = NewEntity::new("db01").with_ip_address("public0", "1.2.3.4");
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["label"], "db01");
        assert_eq!(value["ip_addresses"]["public0"], "1.2.3.4");
        assert!(value.get("metadata").is_none());
        assert!(value.get("agent_id").is_none());
    }

    #[test]
    fn test_notification_constructors() {
        let email = NewNotification::email("ops", "ops@example.com");
        let value = serde_json::to_value(&email).unwrap();
        assert_eq!(value["type"], "email");
        assert_eq!(value["details"]["address"], "ops@example.com");
    }
}
