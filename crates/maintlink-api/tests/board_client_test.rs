// Integration tests for `BoardClient` using wiremock.

use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use maintlink_api::{Board, BoardClient, Error, TransportConfig};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, BoardClient) {
    let server = MockServer::start().await;
    let base = format!("{}/api/v1", server.uri());
    let client = BoardClient::from_reqwest(&base, reqwest::Client::new()).unwrap();
    (server, client)
}

// ── Commands ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_invoke_motor_command() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/motor/konveyor-ileri"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "message": "Konveyör ileri hareket başlatıldı"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let reply = client
        .invoke(Board::Motor, "konveyor-ileri", None)
        .await
        .unwrap();

    assert!(reply.is_success());
    assert_eq!(
        reply.message.as_deref(),
        Some("Konveyör ileri hareket başlatıldı")
    );
}

#[tokio::test]
async fn test_invoke_with_payload() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/motor/hiz-ayarla"))
        .and(body_json(json!({ "motor": "konveyor", "hiz": 60 })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "status": "success" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let payload = json!({ "motor": "konveyor", "hiz": 60 });
    let reply = client
        .invoke(Board::Motor, "hiz-ayarla", Some(&payload))
        .await
        .unwrap();

    assert!(reply.is_success());
    assert!(reply.message.is_none());
}

#[tokio::test]
async fn test_system_board_routes_to_sistem() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/sistem/reset"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "message": "Sistem resetlendi"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let reply = client.invoke(Board::System, "reset", None).await.unwrap();
    assert!(reply.is_success());
}

#[tokio::test]
async fn test_error_status_in_body_is_not_an_err() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/sensor/teach"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "error",
            "message": "Sensör kartı bağlantısı yok"
        })))
        .mount(&server)
        .await;

    let reply = client.invoke(Board::Sensor, "teach", None).await.unwrap();
    assert!(!reply.is_success());
    assert_eq!(reply.message.as_deref(), Some("Sensör kartı bağlantısı yok"));
}

#[tokio::test]
async fn test_http_500_detail_becomes_board_error() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/sensor/agirlik-olc"))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(json!({ "detail": "Sensör kartı bulunamadı" })),
        )
        .mount(&server)
        .await;

    let err = client
        .invoke(Board::Sensor, "agirlik-olc", None)
        .await
        .unwrap_err();

    match err {
        Error::Board { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "Sensör kartı bulunamadı");
        }
        other => panic!("expected Board error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_non_json_body_is_deserialization_error() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/motor/konveyor-dur"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let err = client
        .invoke(Board::Motor, "konveyor-dur", None)
        .await
        .unwrap_err();

    match err {
        Error::Deserialization { body, .. } => assert_eq!(body, "<html>oops</html>"),
        other => panic!("expected Deserialization error, got {other:?}"),
    }
}

// ── Ping ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_ping_reports_board_health() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/sensor/ping"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "message": "Ping tamamlandı",
            "saglikli": true
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/v1/motor/ping"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "message": "Ping tamamlandı",
            "saglikli": false
        })))
        .mount(&server)
        .await;

    assert!(client.ping(Board::Sensor).await.unwrap().healthy);
    assert!(!client.ping(Board::Motor).await.unwrap().healthy);
}

#[tokio::test]
async fn test_ping_times_out() {
    let server = MockServer::start().await;
    let transport = TransportConfig::default().with_timeout(Duration::from_millis(100));
    let client = BoardClient::new(&format!("{}/api/v1", server.uri()), &transport).unwrap();

    Mock::given(method("POST"))
        .and(path("/api/v1/sensor/ping"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "status": "success", "saglikli": true }))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let err = client.ping(Board::Sensor).await.unwrap_err();
    assert!(err.is_timeout());
    assert!(err.is_transient());
}

// ── System ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_system_status() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/sistem/durum"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "durum": "oturum_yok",
            "motor_baglanti": true,
            "sensor_baglanti": true,
            "mesaj": "Sistem durumu alındı"
        })))
        .mount(&server)
        .await;

    let status = client.system_status().await.unwrap();
    assert_eq!(status.state, "oturum_yok");
    assert!(!status.is_maintenance());
    assert!(status.motor_connected);
}

#[tokio::test]
async fn test_set_maintenance_mode() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/bakim/modu-ayarla"))
        .and(body_json(json!({ "aktif": true })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "message": "Bakım modu aktif edildi"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let reply = client.set_maintenance_mode(true).await.unwrap();
    assert!(reply.is_success());
}

#[tokio::test]
async fn test_fetch_raw_resource() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/hazne/doluluk"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "data": { "plastik": 42.5, "metal": 10.0, "cam": 77.0 }
        })))
        .mount(&server)
        .await;

    let value = client.fetch("hazne/doluluk").await.unwrap();
    assert_eq!(value["data"]["plastik"], 42.5);
    assert_eq!(value["data"]["cam"], 77.0);
}
