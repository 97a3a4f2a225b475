// libs/shared/store/tests/postgrest_test.rs
use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use shared_config::AppConfig;
use shared_models::SlotLock;
use shared_store::{DirectoryStore, PostgrestStore, SlotLockStore, StoreError};

fn store_for(server: &MockServer) -> PostgrestStore {
    let config = AppConfig {
        store_url: server.uri(),
        store_anon_key: "test-anon-key".to_string(),
    };
    PostgrestStore::new(&config)
}

fn lock() -> SlotLock {
    let start = Utc::now() + Duration::days(1);
    SlotLock {
        provider_id: Uuid::new_v4(),
        slot_start: start,
        slot_end: start + Duration::minutes(30),
        locked_by: Uuid::new_v4(),
        expires_at: Utc::now() + Duration::seconds(30),
    }
}

#[tokio::test]
async fn find_party_decodes_a_directory_record() {
    let mock_server = MockServer::start().await;
    let party_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/parties"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![serde_json::json!({
            "id": party_id,
            "role": "provider",
            "timezone": "Europe/Berlin",
            "has_completed_profile": true,
            "provider_profile": {
                "approval_status": "approved",
                "consultation_fee": 120.0
            }
        })]))
        .mount(&mock_server)
        .await;

    let store = store_for(&mock_server);
    let party = store.find_party(party_id).await.unwrap().unwrap();

    assert_eq!(party.id, party_id);
    assert_eq!(party.timezone, "Europe/Berlin");
    assert!(party.is_bookable_provider());
}

#[tokio::test]
async fn find_party_returns_none_for_an_empty_result() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/parties"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<serde_json::Value>::new()))
        .mount(&mock_server)
        .await;

    let store = store_for(&mock_server);
    assert!(store.find_party(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn lock_insert_succeeds_on_a_free_key() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/slot_locks"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&mock_server)
        .await;

    let store = store_for(&mock_server);
    assert!(store.try_insert(&lock()).await.unwrap());
}

#[tokio::test]
async fn lock_insert_maps_unique_violation_to_busy() {
    let mock_server = MockServer::start().await;

    // The unique key on (provider_id, slot_start) answers 409 when taken.
    Mock::given(method("POST"))
        .and(path("/rest/v1/slot_locks"))
        .respond_with(ResponseTemplate::new(409).set_body_json(serde_json::json!({
            "message": "duplicate key value violates unique constraint"
        })))
        .mount(&mock_server)
        .await;

    let store = store_for(&mock_server);
    assert!(!store.try_insert(&lock()).await.unwrap());
}

#[tokio::test]
async fn purge_counts_the_returned_rows() {
    let mock_server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/slot_locks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![
            serde_json::json!({"provider_id": Uuid::new_v4()}),
            serde_json::json!({"provider_id": Uuid::new_v4()}),
        ]))
        .mount(&mock_server)
        .await;

    let store = store_for(&mock_server);
    assert_eq!(store.purge_expired(Utc::now()).await.unwrap(), 2);
}

#[tokio::test]
async fn server_errors_surface_with_their_status() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/parties"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&mock_server)
        .await;

    let store = store_for(&mock_server);
    let err = store.find_party(Uuid::new_v4()).await.unwrap_err();
    assert_matches!(err, StoreError::Api { status: 500, .. });
}
