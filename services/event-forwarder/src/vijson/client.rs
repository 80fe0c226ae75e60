//! VI/JSON client for the vCenter management API.
//!
//! Every call is a `POST {sdk}/{MoType}/{moId}/{Method}` with a JSON body,
//! authenticated by the `vmware-api-session-id` header returned by `Login`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Url;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, info};
use vcev_vmodl::{Composite, ManagedObjectRef};

use super::decode::{decode_event, decode_moref, decode_update_set, encode_moref};
use super::schema::Schema;
use crate::config::VcenterConfig;
use crate::error::UpstreamError;
use crate::upstream::{FilterSpec, ManagementApi, SubscriptionVersion, UpdateSet, WaitOptions};

/// Header carrying the session token.
pub const SESSION_HEADER: &str = "vmware-api-session-id";

/// Slack added to a long-poll's own timeout before the HTTP request gives up.
const WAIT_REQUEST_SLACK: Duration = Duration::from_secs(30);

fn service_instance() -> ManagedObjectRef {
    ManagedObjectRef::new("ServiceInstance", "ServiceInstance")
}

/// Singleton managers from the service instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceContent {
    pub property_collector: ManagedObjectRef,
    pub event_manager: ManagedObjectRef,
    pub session_manager: ManagedObjectRef,
}

impl ServiceContent {
    fn from_json(value: &Value) -> Result<Self, UpstreamError> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct ContentWire {
            property_collector: Value,
            event_manager: Value,
            session_manager: Value,
        }

        let wire = ContentWire::deserialize(value)
            .map_err(|e| UpstreamError::Decode(format!("invalid service content: {e}")))?;
        Ok(Self {
            property_collector: decode_moref(&wire.property_collector)?,
            event_manager: decode_moref(&wire.event_manager)?,
            session_manager: decode_moref(&wire.session_manager)?,
        })
    }
}

/// An authenticated VI/JSON session.
pub struct VijsonClient {
    http: reqwest::Client,
    base: Url,
    session_id: String,
    content: ServiceContent,
    schema: Schema,
}

impl VijsonClient {
    /// Connect and log in with the built-in event schema.
    pub async fn connect(config: &VcenterConfig) -> Result<Self, UpstreamError> {
        Self::connect_with_schema(config, Schema::builtin()).await
    }

    /// Connect and log in.
    pub async fn connect_with_schema(
        config: &VcenterConfig,
        schema: Schema,
    ) -> Result<Self, UpstreamError> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(config.insecure)
            .connect_timeout(Duration::from_secs(30))
            .build()?;

        let base = Url::parse(&config.sdk_url())
            .map_err(|e| UpstreamError::Decode(format!("invalid vCenter url: {e}")))?;

        let content_url = endpoint(&base, &service_instance(), "content")?;
        debug!(url = %content_url, "Fetching service content");
        let response = http.get(content_url).send().await?;
        let content = read_response(response)
            .await?
            .ok_or_else(|| UpstreamError::Decode("empty service content".to_string()))?;
        let content = ServiceContent::from_json(&content)?;

        let login_url = endpoint(&base, &content.session_manager, "Login")?;
        let response = http
            .post(login_url)
            .json(&json!({"userName": config.user, "password": config.password}))
            .send()
            .await?;
        let session_id = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        read_response(response).await?;
        let session_id = session_id.ok_or_else(|| {
            UpstreamError::Decode("login response carried no session id".to_string())
        })?;

        info!(url = %base, user = %config.user, "Logged in to vCenter");

        Ok(Self {
            http,
            base,
            session_id,
            content,
            schema,
        })
    }

    pub fn content(&self) -> &ServiceContent {
        &self.content
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// End the session.
    pub async fn logout(&self) -> Result<(), UpstreamError> {
        self.invoke(&self.content.session_manager, "Logout", None, None)
            .await?;
        info!("Logged out of vCenter");
        Ok(())
    }

    async fn invoke(
        &self,
        target: &ManagedObjectRef,
        method: &str,
        body: Option<Value>,
        timeout: Option<Duration>,
    ) -> Result<Option<Value>, UpstreamError> {
        let url = endpoint(&self.base, target, method)?;
        debug!(target = %target, method, "Invoking method");

        let mut request = self
            .http
            .post(url)
            .header(SESSION_HEADER, self.session_id.as_str());
        if let Some(body) = body {
            request = request.json(&body);
        }
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await?;
        read_response(response).await
    }

    async fn invoke_moref(
        &self,
        target: &ManagedObjectRef,
        method: &str,
        body: Option<Value>,
    ) -> Result<ManagedObjectRef, UpstreamError> {
        match self.invoke(target, method, body, None).await? {
            Some(value) => decode_moref(&value),
            None => Err(UpstreamError::Decode(format!("{method} returned no reference"))),
        }
    }
}

#[async_trait]
impl ManagementApi for VijsonClient {
    async fn current_time(&self) -> Result<DateTime<Utc>, UpstreamError> {
        let value = self
            .invoke(&service_instance(), "CurrentTime", None, None)
            .await?;
        let text = value
            .as_ref()
            .and_then(Value::as_str)
            .ok_or_else(|| UpstreamError::Decode("CurrentTime returned no time".to_string()))?;
        DateTime::parse_from_rfc3339(text)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| UpstreamError::Decode(format!("invalid server time {text:?}: {e}")))
    }

    async fn create_event_collector(
        &self,
        begin_time: DateTime<Utc>,
    ) -> Result<ManagedObjectRef, UpstreamError> {
        let body = json!({
            "filter": {
                "_typeName": "EventFilterSpec",
                "time": {
                    "_typeName": "EventFilterSpecByTime",
                    "beginTime": begin_time.to_rfc3339_opts(SecondsFormat::Micros, true),
                }
            }
        });
        let collector = self
            .invoke_moref(&self.content.event_manager, "CreateCollectorForEvents", Some(body))
            .await?;
        info!(collector = %collector, begin_time = %begin_time, "Created event collector");
        Ok(collector)
    }

    async fn create_property_collector(&self) -> Result<ManagedObjectRef, UpstreamError> {
        self.invoke_moref(
            &self.content.property_collector,
            "CreatePropertyCollector",
            None,
        )
        .await
    }

    async fn create_filter(
        &self,
        collector: &ManagedObjectRef,
        spec: &FilterSpec,
    ) -> Result<ManagedObjectRef, UpstreamError> {
        let body = json!({
            "spec": {
                "_typeName": "PropertyFilterSpec",
                "propSet": [{
                    "_typeName": "PropertySpec",
                    "type": spec.object.type_name,
                    "all": false,
                    "pathSet": spec.paths,
                }],
                "objectSet": [{
                    "_typeName": "ObjectSpec",
                    "obj": encode_moref(&spec.object),
                }],
            },
            "partialUpdates": spec.partial_updates,
        });
        self.invoke_moref(collector, "CreateFilter", Some(body)).await
    }

    async fn wait_for_updates(
        &self,
        collector: &ManagedObjectRef,
        version: &SubscriptionVersion,
        options: &WaitOptions,
    ) -> Result<Option<UpdateSet>, UpstreamError> {
        let mut wait_options = json!({"_typeName": "WaitOptions"});
        if let Some(secs) = options.max_wait_seconds {
            wait_options["maxWaitSeconds"] = json!(secs);
        }
        let body = json!({"version": version.as_str(), "options": wait_options});
        let timeout = options
            .max_wait_seconds
            .map(|secs| Duration::from_secs(u64::from(secs)) + WAIT_REQUEST_SLACK);

        match self
            .invoke(collector, "WaitForUpdatesEx", Some(body), timeout)
            .await?
        {
            None | Some(Value::Null) => Ok(None),
            Some(value) => decode_update_set(&self.schema, &value).map(Some),
        }
    }

    async fn destroy_filter(&self, filter: &ManagedObjectRef) -> Result<(), UpstreamError> {
        self.invoke(filter, "DestroyPropertyFilter", None, None)
            .await?;
        Ok(())
    }

    async fn destroy_property_collector(
        &self,
        collector: &ManagedObjectRef,
    ) -> Result<(), UpstreamError> {
        self.invoke(collector, "DestroyPropertyCollector", None, None)
            .await?;
        Ok(())
    }

    async fn read_next_events(
        &self,
        collector: &ManagedObjectRef,
        max_count: u32,
    ) -> Result<Vec<Composite>, UpstreamError> {
        let body = json!({"maxCount": max_count});
        match self
            .invoke(collector, "ReadNextEvents", Some(body), None)
            .await?
        {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| decode_event(&self.schema, item))
                .collect(),
            Some(other) => Err(UpstreamError::Decode(format!(
                "ReadNextEvents returned a non-array: {other}"
            ))),
        }
    }

    async fn destroy_event_collector(
        &self,
        collector: &ManagedObjectRef,
    ) -> Result<(), UpstreamError> {
        self.invoke(collector, "DestroyCollector", None, None)
            .await?;
        Ok(())
    }
}

/// `{base}/{type}/{moId}/{method}`, with each segment percent-encoded.
fn endpoint(base: &Url, target: &ManagedObjectRef, method: &str) -> Result<Url, UpstreamError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| UpstreamError::Decode(format!("vCenter url cannot be a base: {base}")))?
        .pop_if_empty()
        .extend([target.type_name.as_str(), target.value.as_str(), method]);
    Ok(url)
}

async fn read_response(response: reqwest::Response) -> Result<Option<Value>, UpstreamError> {
    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
        let message = fault_message(&text);
        error!(status = %status, message = %message, "vCenter returned a fault");
        return Err(UpstreamError::Fault {
            status: status.as_u16(),
            message,
        });
    }

    if text.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|e| UpstreamError::Decode(format!("invalid JSON response: {e}")))
}

/// Fault type, plus its message when the fault carries one.
fn fault_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return body.chars().take(512).collect();
    };

    let fault_type = value
        .get("_typeName")
        .and_then(Value::as_str)
        .unwrap_or("UnknownFault");
    let message = value
        .get("message")
        .or_else(|| value.get("localizedMessage"))
        .and_then(Value::as_str)
        .or_else(|| {
            value
                .get("faultMessage")
                .and_then(Value::as_array)
                .and_then(|messages| messages.first())
                .and_then(|m| m.get("message"))
                .and_then(Value::as_str)
        });

    match message {
        Some(message) => format!("{fault_type}: {message}"),
        None => fault_type.to_string(),
    }
}
