//! Monitoring API client.
//!
//! Every resource follows the same templates: lazy listing, get (404 is
//! `None`), create (POST, id from `Location`, then re-fetch), update (PUT,
//! then re-fetch) and delete (404 is `false`).

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use cloudmon_config::CloudmonConfig;
use cloudmon_core::{
    Alarm, AlarmUpdate, Check, CheckUpdate, CloudmonError, Entity, EntityUpdate, NewAlarm,
    NewCheck, NewEntity, NewNotification, NewNotificationPlan, Notification, NotificationPlan,
    NotificationPlanUpdate, NotificationUpdate, ResourceKind, Result,
};
use cloudmon_telemetry::{MetricsRecorder, NoopMetricsRecorder};
use futures::stream::{BoxStream, StreamExt};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::connection::{ApiResponse, Connection};
use crate::pagination::{paginate, ListRequest, PageMapper};
use crate::transport::ReqwestTransport;

/// Lazily fetched listing.
pub type ResourceStream<T> = BoxStream<'static, Result<T>>;

/// High-level client over a shared [`Connection`].
#[derive(Debug, Clone)]
pub struct MonitoringClient {
    connection: Arc<Connection>,
    page_limit: Option<u32>,
}

impl MonitoringClient {
    pub fn new(connection: Arc<Connection>) -> Self {
        Self {
            connection,
            page_limit: None,
        }
    }

    /// Request pages of at most `limit` records.
    pub fn with_page_limit(mut self, limit: Option<u32>) -> Self {
        self.page_limit = limit;
        self
    }

    /// Build a client from configuration with a `reqwest` transport.
    pub fn from_config(config: &CloudmonConfig) -> Result<Self> {
        Self::from_config_with_metrics(config, Arc::new(NoopMetricsRecorder))
    }

    /// Same as [`MonitoringClient::from_config`], reporting request metrics
    /// to `metrics`.
    pub fn from_config_with_metrics(
        config: &CloudmonConfig,
        metrics: Arc<dyn MetricsRecorder>,
    ) -> Result<Self> {
        let transport =
            ReqwestTransport::new(Duration::from_secs(config.monitoring.timeout_secs))?;

        let connection = Connection::builder(Arc::new(transport), config.credentials())
            .auth_url(config.auth.url.clone())
            .service(config.monitoring.service.clone())
            .base_url(config.monitoring.base_url.clone())
            .metrics(metrics)
            .build()?;

        Ok(Self::new(Arc::new(connection)).with_page_limit(config.monitoring.page_limit))
    }

    /// Underlying connection
    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    // Entities

    pub fn entities(&self) -> ResourceStream<Entity> {
        self.list(entities_path(), PageMapper::each(decode::<Entity>))
    }

    pub async fn get_entity(&self, entity_id: &str) -> Result<Option<Entity>> {
        self.get_record(&entity_path(entity_id)).await
    }

    pub async fn create_entity(&self, entity: &NewEntity) -> Result<Entity> {
        self.create_record(ResourceKind::Entity, &entities_path(), entity)
            .await
    }

    pub async fn update_entity(&self, entity_id: &str, update: &EntityUpdate) -> Result<Entity> {
        self.update_record(ResourceKind::Entity, &entity_path(entity_id), update)
            .await
    }

    pub async fn delete_entity(&self, entity_id: &str) -> Result<bool> {
        self.delete_record(&entity_path(entity_id)).await
    }

    // Checks

    pub fn checks(&self, entity_id: &str) -> ResourceStream<Check> {
        let owner = entity_id.to_string();
        self.list(
            checks_path(entity_id),
            PageMapper::each(move |value| {
                let mut check: Check = decode(value)?;
                check.entity_id = owner.clone();
                Ok(check)
            }),
        )
    }

    pub async fn get_check(&self, entity_id: &str, check_id: &str) -> Result<Option<Check>> {
        let path = check_path(entity_id, check_id);
        Ok(self.get_record::<Check>(&path).await?.map(|mut check| {
            check.entity_id = entity_id.to_string();
            check
        }))
    }

    pub async fn create_check(&self, entity_id: &str, check: &NewCheck) -> Result<Check> {
        let mut created: Check = self
            .create_record(ResourceKind::Check, &checks_path(entity_id), check)
            .await?;
        created.entity_id = entity_id.to_string();
        Ok(created)
    }

    pub async fn update_check(
        &self,
        entity_id: &str,
        check_id: &str,
        update: &CheckUpdate,
    ) -> Result<Check> {
        let path = check_path(entity_id, check_id);
        let mut updated: Check = self
            .update_record(ResourceKind::Check, &path, update)
            .await?;
        updated.entity_id = entity_id.to_string();
        Ok(updated)
    }

    pub async fn delete_check(&self, entity_id: &str, check_id: &str) -> Result<bool> {
        self.delete_record(&check_path(entity_id, check_id))
            .await
    }

    // Alarms

    pub fn alarms(&self, entity_id: &str) -> ResourceStream<Alarm> {
        let owner = entity_id.to_string();
        self.list(
            alarms_path(entity_id),
            PageMapper::each(move |value| {
                let mut alarm: Alarm = decode(value)?;
                alarm.entity_id = owner.clone();
                Ok(alarm)
            }),
        )
    }

    pub async fn get_alarm(&self, entity_id: &str, alarm_id: &str) -> Result<Option<Alarm>> {
        let path = alarm_path(entity_id, alarm_id);
        Ok(self.get_record::<Alarm>(&path).await?.map(|mut alarm| {
            alarm.entity_id = entity_id.to_string();
            alarm
        }))
    }

    pub async fn create_alarm(&self, entity_id: &str, alarm: &NewAlarm) -> Result<Alarm> {
        let mut created: Alarm = self
            .create_record(ResourceKind::Alarm, &alarms_path(entity_id), alarm)
            .await?;
        created.entity_id = entity_id.to_string();
        Ok(created)
    }

    pub async fn update_alarm(
        &self,
        entity_id: &str,
        alarm_id: &str,
        update: &AlarmUpdate,
    ) -> Result<Alarm> {
        let path = alarm_path(entity_id, alarm_id);
        let mut updated: Alarm = self
            .update_record(ResourceKind::Alarm, &path, update)
            .await?;
        updated.entity_id = entity_id.to_string();
        Ok(updated)
    }

    pub async fn delete_alarm(&self, entity_id: &str, alarm_id: &str) -> Result<bool> {
        self.delete_record(&alarm_path(entity_id, alarm_id))
            .await
    }

    // Notifications

    pub fn notifications(&self) -> ResourceStream<Notification> {
        self.list(
            collection_path(ResourceKind::Notification),
            PageMapper::each(decode::<Notification>),
        )
    }

    pub async fn get_notification(&self, notification_id: &str) -> Result<Option<Notification>> {
        self.get_record(&member_path(ResourceKind::Notification, notification_id))
            .await
    }

    pub async fn create_notification(&self, notification: &NewNotification) -> Result<Notification> {
        self.create_record(
            ResourceKind::Notification,
            &collection_path(ResourceKind::Notification),
            notification,
        )
        .await
    }

    pub async fn update_notification(
        &self,
        notification_id: &str,
        update: &NotificationUpdate,
    ) -> Result<Notification> {
        self.update_record(
            ResourceKind::Notification,
            &member_path(ResourceKind::Notification, notification_id),
            update,
        )
        .await
    }

    pub async fn delete_notification(&self, notification_id: &str) -> Result<bool> {
        self.delete_record(&member_path(ResourceKind::Notification, notification_id))
            .await
    }

    // Notification plans

    pub fn notification_plans(&self) -> ResourceStream<NotificationPlan> {
        self.list(
            collection_path(ResourceKind::NotificationPlan),
            PageMapper::each(decode::<NotificationPlan>),
        )
    }

    pub async fn get_notification_plan(&self, plan_id: &str) -> Result<Option<NotificationPlan>> {
        self.get_record(&member_path(ResourceKind::NotificationPlan, plan_id))
            .await
    }

    pub async fn create_notification_plan(
        &self,
        plan: &NewNotificationPlan,
    ) -> Result<NotificationPlan> {
        self.create_record(
            ResourceKind::NotificationPlan,
            &collection_path(ResourceKind::NotificationPlan),
            plan,
        )
        .await
    }

    pub async fn update_notification_plan(
        &self,
        plan_id: &str,
        update: &NotificationPlanUpdate,
    ) -> Result<NotificationPlan> {
        self.update_record(
            ResourceKind::NotificationPlan,
            &member_path(ResourceKind::NotificationPlan, plan_id),
            update,
        )
        .await
    }

    pub async fn delete_notification_plan(&self, plan_id: &str) -> Result<bool> {
        self.delete_record(&member_path(ResourceKind::NotificationPlan, plan_id))
            .await
    }

    // Templates

    fn list<T: Send + 'static>(&self, path: String, mapper: PageMapper<T>) -> ResourceStream<T> {
        let mut request = ListRequest::new(path);
        if let Some(limit) = self.page_limit {
            request = request.with_param("limit", limit.to_string());
        }
        paginate(Arc::clone(&self.connection), request, mapper).boxed()
    }

    async fn get_record<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let response = self.connection.get(path, &[]).await?;
        let status = response.status;
        match status {
            StatusCode::OK => decode(response.into_json()?).map(Some),
            StatusCode::NOT_FOUND => Ok(None),
            other => Err(CloudmonError::unexpected_status(other.as_u16(), &response.raw)),
        }
    }

    async fn create_record<T, P>(&self, kind: ResourceKind, path: &str, payload: &P) -> Result<T>
    where
        T: DeserializeOwned,
        P: Serialize,
    {
        let body = strip_nulls(serde_json::to_value(payload)?);
        let response = self.connection.post(path, &body).await?;
        if response.status != StatusCode::CREATED && response.status != StatusCode::NO_CONTENT {
            return Err(CloudmonError::unexpected_status(
                response.status.as_u16(),
                &response.raw,
            ));
        }

        let id = created_id(&response)?;
        tracing::info!("created {} '{}'", kind, id);

        self.get_record(&format!("{}/{}", path, id))
            .await?
            .ok_or_else(|| {
                CloudmonError::malformed(format!("created {} '{}' could not be fetched", kind, id), "")
            })
    }

    async fn update_record<T, P>(&self, kind: ResourceKind, path: &str, payload: &P) -> Result<T>
    where
        T: DeserializeOwned,
        P: Serialize,
    {
        let body = strip_nulls(serde_json::to_value(payload)?);
        let response = self.connection.put(path, &body).await?;
        if response.status != StatusCode::NO_CONTENT {
            return Err(CloudmonError::unexpected_status(
                response.status.as_u16(),
                &response.raw,
            ));
        }

        self.get_record(path).await?.ok_or_else(|| {
            CloudmonError::malformed(format!("updated {} at {} could not be fetched", kind, path), "")
        })
    }

    async fn delete_record(&self, path: &str) -> Result<bool> {
        let response = self.connection.delete(path).await?;
        match response.status {
            StatusCode::NO_CONTENT => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            other => Err(CloudmonError::unexpected_status(other.as_u16(), &response.raw)),
        }
    }
}

fn collection_path(kind: ResourceKind) -> String {
    format!("/{}", kind.collection())
}

/// Ids are percent-encoded so they always stay a single path segment.
fn segment(id: &str) -> Cow<'_, str> {
    urlencoding::encode(id)
}

fn member_path(kind: ResourceKind, id: &str) -> String {
    format!("/{}/{}", kind.collection(), segment(id))
}

fn entities_path() -> String {
    collection_path(ResourceKind::Entity)
}

fn entity_path(entity_id: &str) -> String {
    member_path(ResourceKind::Entity, entity_id)
}

fn checks_path(entity_id: &str) -> String {
    format!("{}/{}", entity_path(entity_id), ResourceKind::Check.collection())
}

fn alarms_path(entity_id: &str) -> String {
    format!("{}/{}", entity_path(entity_id), ResourceKind::Alarm.collection())
}

fn check_path(entity_id: &str, check_id: &str) -> String {
    format!("{}/{}", checks_path(entity_id), segment(check_id))
}

fn alarm_path(entity_id: &str, alarm_id: &str) -> String {
    format!("{}/{}", alarms_path(entity_id), segment(alarm_id))
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value.clone()).map_err(|e| {
        CloudmonError::malformed(format!("unexpected record shape: {}", e), &value.to_string())
    })
}

/// Drop top-level keys whose value is null.
fn strip_nulls(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(map.into_iter().filter(|(_, v)| !v.is_null()).collect()),
        other => other,
    }
}

/// Id of a created resource: the last path segment of `Location`.
fn created_id(response: &ApiResponse) -> Result<String> {
    let location = response.location().ok_or_else(|| {
        CloudmonError::malformed("create response has no Location header", &response.raw)
    })?;

    let path = location.split(['?', '#']).next().unwrap_or(location);
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            CloudmonError::malformed(format!("cannot take an id from Location '{}'", location), "")
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{auth_ok, ScriptedTransport};
    use cloudmon_core::{Credentials, HttpResponse};
    use futures::TryStreamExt;
    use reqwest::header::LOCATION;
    use serde_json::json;

    fn client(transport: Arc<ScriptedTransport>) -> MonitoringClient {
        let conn = Connection::builder(transport, Credentials::new("alice", "key"))
            .build()
            .unwrap();
        MonitoringClient::new(Arc::new(conn))
    }

    fn entity_json(id: &str) -> Value {
        json!({"id": id, "label": "web", "ip_addresses": {"default": "10.0.0.1"}, "metadata": null})
    }

    #[test]
    fn strip_nulls_only_touches_top_level() {
        let stripped = strip_nulls(json!({"a": null, "b": {"c": null}, "d": 1}));
        assert_eq!(stripped, json!({"b": {"c": null}, "d": 1}));
    }

    #[test]
    fn ids_are_encoded_as_single_segments() {
        assert_eq!(entity_path("en1"), "/entities/en1");
        assert_eq!(entity_path("a/b?c#d"), "/entities/a%2Fb%3Fc%23d");
        assert_eq!(
            check_path("en 1", "../ch1"),
            "/entities/en%201/checks/..%2Fch1"
        );
        assert_eq!(alarm_path("en1", "al1"), "/entities/en1/alarms/al1");
        assert_eq!(
            member_path(ResourceKind::NotificationPlan, "np/x"),
            "/notification_plans/np%2Fx"
        );
    }

    #[tokio::test]
    async fn delete_with_slash_in_id_stays_on_the_entity() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            auth_ok(),
            HttpResponse::new(StatusCode::NO_CONTENT),
        ]));
        let client = client(transport.clone());

        assert!(client.delete_entity("en1/checks/ch1").await.unwrap());
        assert_eq!(
            transport.requests()[1].url,
            "https://monitoring.example.com/v1.0/123456/entities/en1%2Fchecks%2Fch1"
        );
    }

    #[test]
    fn created_id_takes_last_segment() {
        let resp = |loc: &str| ApiResponse {
            status: StatusCode::CREATED,
            headers: HttpResponse::new(StatusCode::CREATED)
                .with_header(LOCATION, loc)
                .headers,
            body: crate::connection::ResponseBody::Empty,
            raw: String::new(),
        };

        assert_eq!(created_id(&resp("/entities/e1")).unwrap(), "e1");
        assert_eq!(
            created_id(&resp("https://m.example.com/v1.0/1/entities/enAB/")).unwrap(),
            "enAB"
        );
        assert!(created_id(&resp("/")).is_err());
    }

    #[tokio::test]
    async fn create_entity_follows_location() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            auth_ok(),
            HttpResponse::new(StatusCode::CREATED).with_header(
                LOCATION,
                "https://monitoring.example.com/v1.0/123456/entities/e1",
            ),
            HttpResponse::json(StatusCode::OK, &entity_json("e1")),
        ]));
        let client = client(transport.clone());

        let entity = client
            .create_entity(&NewEntity::new("web").with_ip_address("default", "10.0.0.1"))
            .await
            .unwrap();

        assert_eq!(entity.id, "e1");
        assert_eq!(entity.ip_address("default"), Some("10.0.0.1"));

        let sent = transport.requests();
        assert_eq!(sent[1].method, reqwest::Method::POST);
        assert_eq!(sent[2].url, "https://monitoring.example.com/v1.0/123456/entities/e1");
        let body: Value = serde_json::from_str(sent[1].body.as_deref().unwrap()).unwrap();
        assert_eq!(body["label"], "web");
        assert!(body.get("agent_id").is_none());
    }

    #[tokio::test]
    async fn create_without_location_is_malformed() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            auth_ok(),
            HttpResponse::new(StatusCode::CREATED),
        ]));
        let err = client(transport)
            .create_entity(&NewEntity::new("web"))
            .await
            .unwrap_err();
        assert!(matches!(err, CloudmonError::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn get_missing_is_none_and_delete_reports_existence() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            auth_ok(),
            HttpResponse::new(StatusCode::NOT_FOUND),
            HttpResponse::new(StatusCode::NO_CONTENT),
            HttpResponse::new(StatusCode::NOT_FOUND),
        ]));
        let client = client(transport);

        assert!(client.get_entity("gone").await.unwrap().is_none());
        assert!(client.delete_entity("e1").await.unwrap());
        assert!(!client.delete_entity("e1").await.unwrap());
    }

    #[tokio::test]
    async fn update_check_refetches_and_sets_owner() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            auth_ok(),
            HttpResponse::new(StatusCode::NO_CONTENT),
            HttpResponse::json(
                StatusCode::OK,
                &json!({"id": "ch1", "type": "remote.ping", "label": "ping", "details": {}}),
            ),
        ]));
        let client = client(transport.clone());

        let update = CheckUpdate {
            label: Some("ping".to_string()),
            ..Default::default()
        };
        let check = client.update_check("en1", "ch1", &update).await.unwrap();

        assert_eq!(check.entity_id, "en1");
        assert_eq!(check.label.as_deref(), Some("ping"));
        assert_eq!(
            transport.requests()[1].url,
            "https://monitoring.example.com/v1.0/123456/entities/en1/checks/ch1"
        );
    }

    #[tokio::test]
    async fn update_with_wrong_status_fails() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            auth_ok(),
            HttpResponse::json(StatusCode::OK, &json!({})),
        ]));
        let err = client(transport)
            .update_entity("en1", &EntityUpdate::default())
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(200));
    }

    #[tokio::test]
    async fn alarms_listing_sends_limit_and_sets_owner() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            auth_ok(),
            HttpResponse::json(
                StatusCode::OK,
                &json!({
                    "values": [{"id": "al1", "check_id": "ch1", "notification_plan_id": "npTechnicalContactsEmail"}],
                    "metadata": {"next_marker": null}
                }),
            ),
        ]));
        let client = client(transport.clone()).with_page_limit(Some(25));

        let alarms: Vec<Alarm> = client.alarms("en1").try_collect().await.unwrap();
        assert_eq!(alarms.len(), 1);
        assert_eq!(alarms[0].entity_id, "en1");

        let sent = &transport.requests()[1];
        assert!(sent.url.ends_with("/entities/en1/alarms"));
        assert_eq!(sent.query_param("limit"), Some("25"));
    }
}
