//! VI/JSON client tests against a stub vCenter.

use chrono::{TimeZone, Utc};
use serde_json::json;
use vcev_forwarder::config::VcenterConfig;
use vcev_forwarder::error::UpstreamError;
use vcev_forwarder::upstream::{FilterSpec, ManagementApi, SubscriptionVersion, WaitOptions};
use vcev_forwarder::vijson::SESSION_HEADER;
use vcev_forwarder::VijsonClient;
use vcev_vmodl::{ManagedObjectRef, TypedNode};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SDK: &str = "/sdk/vim25/8.0.1.0";
const SESSION: &str = "52b0e3a1-session";

fn moref(type_name: &str, value: &str) -> serde_json::Value {
    json!({"_typeName": "ManagedObjectReference", "type": type_name, "value": value})
}

fn vcenter_config(server: &MockServer) -> VcenterConfig {
    VcenterConfig {
        host: server.uri(),
        user: "svc-events@vsphere.local".to_string(),
        password: "secret".to_string(),
        insecure: false,
        api_release: "8.0.1.0".to_string(),
    }
}

async fn stub_login(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(format!("{SDK}/ServiceInstance/ServiceInstance/content")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_typeName": "ServiceContent",
            "propertyCollector": moref("PropertyCollector", "propertyCollector"),
            "eventManager": moref("EventManager", "EventManager"),
            "sessionManager": moref("SessionManager", "SessionManager"),
        })))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("{SDK}/SessionManager/SessionManager/Login")))
        .and(body_partial_json(json!({"userName": "svc-events@vsphere.local"})))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header(SESSION_HEADER, SESSION)
                .set_body_json(json!({"_typeName": "UserSession", "key": "52b0"})),
        )
        .expect(1)
        .mount(server)
        .await;
}

async fn connected() -> (MockServer, VijsonClient) {
    let server = MockServer::start().await;
    stub_login(&server).await;
    let client = VijsonClient::connect(&vcenter_config(&server)).await.unwrap();
    (server, client)
}

#[tokio::test]
async fn test_connect_reads_service_content() {
    let (_server, client) = connected().await;

    assert_eq!(
        client.content().event_manager,
        ManagedObjectRef::new("EventManager", "EventManager")
    );
}

#[tokio::test]
async fn test_login_without_session_header_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{SDK}/ServiceInstance/ServiceInstance/content")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "propertyCollector": moref("PropertyCollector", "propertyCollector"),
            "eventManager": moref("EventManager", "EventManager"),
            "sessionManager": moref("SessionManager", "SessionManager"),
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{SDK}/SessionManager/SessionManager/Login")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"_typeName": "UserSession"})))
        .mount(&server)
        .await;

    let result = VijsonClient::connect(&vcenter_config(&server)).await;
    assert!(matches!(result, Err(UpstreamError::Decode(_))));
}

#[tokio::test]
async fn test_login_fault() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{SDK}/ServiceInstance/ServiceInstance/content")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "propertyCollector": moref("PropertyCollector", "propertyCollector"),
            "eventManager": moref("EventManager", "EventManager"),
            "sessionManager": moref("SessionManager", "SessionManager"),
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{SDK}/SessionManager/SessionManager/Login")))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "_typeName": "InvalidLogin",
            "faultMessage": [{"_typeName": "LocalizableMessage", "key": "x", "message": "Cannot complete login"}]
        })))
        .mount(&server)
        .await;

    let Err(UpstreamError::Fault { status, message }) =
        VijsonClient::connect(&vcenter_config(&server)).await
    else {
        panic!("expected a fault");
    };
    assert_eq!(status, 500);
    assert_eq!(message, "InvalidLogin: Cannot complete login");
}

#[tokio::test]
async fn test_current_time_sends_session() {
    let (server, client) = connected().await;
    Mock::given(method("POST"))
        .and(path(format!("{SDK}/ServiceInstance/ServiceInstance/CurrentTime")))
        .and(header(SESSION_HEADER, SESSION))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!("2024-05-01T12:00:00.25Z")))
        .expect(1)
        .mount(&server)
        .await;

    let now = client.current_time().await.unwrap();
    assert_eq!(
        now,
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + chrono::Duration::milliseconds(250)
    );
}

#[tokio::test]
async fn test_create_event_collector_filters_by_time() {
    let (server, client) = connected().await;
    Mock::given(method("POST"))
        .and(path(format!("{SDK}/EventManager/EventManager/CreateCollectorForEvents")))
        .and(body_partial_json(json!({
            "filter": {"time": {"beginTime": "2024-05-01T12:00:00.000000Z"}}
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(moref("EventHistoryCollector", "session-collector-1")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let collector = client
        .create_event_collector(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap())
        .await
        .unwrap();
    assert_eq!(
        collector,
        ManagedObjectRef::new("EventHistoryCollector", "session-collector-1")
    );
}

#[tokio::test]
async fn test_create_filter_watches_paths() {
    let (server, client) = connected().await;
    Mock::given(method("POST"))
        .and(path(format!("{SDK}/PropertyCollector/session-pc-1/CreateFilter")))
        .and(body_partial_json(json!({
            "spec": {
                "propSet": [{"type": "EventHistoryCollector", "pathSet": ["latestPage"]}],
                "objectSet": [{"obj": moref("EventHistoryCollector", "session-collector-1")}]
            },
            "partialUpdates": false
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(moref("PropertyFilter", "session-filter-1")))
        .expect(1)
        .mount(&server)
        .await;

    let spec = FilterSpec::new(
        ManagedObjectRef::new("EventHistoryCollector", "session-collector-1"),
        &["latestPage"],
    );
    let filter = client
        .create_filter(&ManagedObjectRef::new("PropertyCollector", "session-pc-1"), &spec)
        .await
        .unwrap();
    assert_eq!(filter.value, "session-filter-1");
}

#[tokio::test]
async fn test_wait_for_updates() {
    let (server, client) = connected().await;
    Mock::given(method("POST"))
        .and(path(format!("{SDK}/PropertyCollector/session-pc-1/WaitForUpdatesEx")))
        .and(body_partial_json(json!({"version": "4", "options": {"maxWaitSeconds": 60}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_typeName": "UpdateSet",
            "version": "5",
            "filterSet": [{
                "_typeName": "PropertyFilterUpdate",
                "filter": moref("PropertyFilter", "session-filter-1"),
                "objectSet": [{
                    "_typeName": "ObjectUpdate",
                    "kind": "modify",
                    "obj": moref("EventHistoryCollector", "session-collector-1"),
                    "changeSet": [{"_typeName": "PropertyChange", "name": "latestPage", "op": "assign"}]
                }]
            }]
        })))
        .mount(&server)
        .await;

    let update = client
        .wait_for_updates(
            &ManagedObjectRef::new("PropertyCollector", "session-pc-1"),
            &SubscriptionVersion::new("4"),
            &WaitOptions {
                max_wait_seconds: Some(60),
            },
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(update.version.as_str(), "5");
    assert_eq!(update.changes.len(), 1);
    assert_eq!(update.changes[0].path, "latestPage");
}

#[tokio::test]
async fn test_wait_timeout_returns_none() {
    let (server, client) = connected().await;
    Mock::given(method("POST"))
        .and(path(format!("{SDK}/PropertyCollector/session-pc-1/WaitForUpdatesEx")))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let update = client
        .wait_for_updates(
            &ManagedObjectRef::new("PropertyCollector", "session-pc-1"),
            &SubscriptionVersion::new("5"),
            &WaitOptions {
                max_wait_seconds: Some(1),
            },
        )
        .await
        .unwrap();
    assert!(update.is_none());
}

#[tokio::test]
async fn test_read_next_events_decodes_page() {
    let (server, client) = connected().await;
    Mock::given(method("POST"))
        .and(path(format!("{SDK}/EventHistoryCollector/session-collector-1/ReadNextEvents")))
        .and(body_partial_json(json!({"maxCount": 100})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "_typeName": "VmPoweredOnEvent",
                "key": 4211,
                "createdTime": "2024-05-01T12:00:00Z",
                "vm": {
                    "_typeName": "VmEventArgument",
                    "name": "web-01",
                    "vm": moref("VirtualMachine", "vm-42")
                },
                "fullFormattedMessage": "web-01 is powered on"
            },
            {
                "_typeName": "EventEx",
                "key": 4212,
                "eventTypeId": "com.vmware.vc.HA.ClusterFailoverActionTriggeredEvent"
            }
        ])))
        .mount(&server)
        .await;

    let events = client
        .read_next_events(
            &ManagedObjectRef::new("EventHistoryCollector", "session-collector-1"),
            100,
        )
        .await
        .unwrap();

    assert_eq!(events.len(), 2);
    assert_eq!(events[0].type_name(), "VmPoweredOnEvent");
    assert_eq!(events[0].field("key"), Some(&TypedNode::from(4211i64)));
    assert_eq!(vcev_events::event_id(&events[1]), "com.vmware.vc.HA.ClusterFailoverActionTriggeredEvent");
}

#[tokio::test]
async fn test_read_next_events_empty() {
    let (server, client) = connected().await;
    Mock::given(method("POST"))
        .and(path(format!("{SDK}/EventHistoryCollector/session-collector-1/ReadNextEvents")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let events = client
        .read_next_events(
            &ManagedObjectRef::new("EventHistoryCollector", "session-collector-1"),
            100,
        )
        .await
        .unwrap();
    assert!(events.is_empty());
}

#[tokio::test]
async fn test_fault_is_reported() {
    let (server, client) = connected().await;
    Mock::given(method("POST"))
        .and(path(format!("{SDK}/EventHistoryCollector/session-collector-1/DestroyCollector")))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "_typeName": "ManagedObjectNotFound",
            "message": "The object has already been deleted"
        })))
        .mount(&server)
        .await;

    let err = client
        .destroy_event_collector(&ManagedObjectRef::new(
            "EventHistoryCollector",
            "session-collector-1",
        ))
        .await
        .unwrap_err();

    let UpstreamError::Fault { status, message } = err else {
        panic!("expected a fault, got {err:?}");
    };
    assert_eq!(status, 500);
    assert!(message.starts_with("ManagedObjectNotFound"));
}

#[tokio::test]
async fn test_logout() {
    let (server, client) = connected().await;
    Mock::given(method("POST"))
        .and(path(format!("{SDK}/SessionManager/SessionManager/Logout")))
        .and(header(SESSION_HEADER, SESSION))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    client.logout().await.unwrap();
}
