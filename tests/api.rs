mod common;

use actix_web::{test, web, App};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use common::{Ending, FakeFactory};
use sniffsight::api::routes;
use sniffsight::api::websocket::{pump_events, EventFeed, EVENT_BUFFER};

macro_rules! app {
    ($factory:expr) => {{
        let (dispatcher, events) = common::dispatcher($factory);
        let dispatcher = Arc::new(dispatcher);
        let (feed, _): (EventFeed, _) = broadcast::channel(EVENT_BUFFER);
        actix_web::rt::spawn(pump_events(events, dispatcher.clone(), feed.clone()));
        test::init_service(
            App::new()
                .app_data(web::Data::new(dispatcher))
                .app_data(web::Data::new(feed))
                .configure(routes::configure),
        )
        .await
    }};
}

macro_rules! get_json {
    ($app:expr, $uri:expr) => {{
        let req = test::TestRequest::get().uri($uri).to_request();
        let resp = test::call_service(&$app, req).await;
        let status = resp.status().as_u16();
        let body: Value = test::read_body_json(resp).await;
        (status, body)
    }};
}

#[actix_web::test]
async fn index_lists_endpoints() {
    let app = app!(Arc::new(FakeFactory::default()));
    let (status, body) = get_json!(app, "/");
    assert_eq!(status, 200);
    assert_eq!(body["name"], "sniffsight API");
    assert!(body["endpoints"].as_array().unwrap().len() > 10);
}

#[actix_web::test]
async fn status_starts_idle() {
    let app = app!(Arc::new(FakeFactory::default()));
    let (status, body) = get_json!(app, "/api/capture/status");
    assert_eq!(status, 200);
    assert_eq!(body["state"], "idle");
    assert_eq!(body["conversations"], 0);
    assert_eq!(body["pending_details"], 0);
}

#[actix_web::test]
async fn state_conflicts_and_unknown_ids_are_reported() {
    let app = app!(Arc::new(FakeFactory::default()));

    let req = test::TestRequest::post().uri("/api/capture/stop").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 409);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "error");

    let (status, _) = get_json!(app, "/api/packets/999");
    assert_eq!(status, 404);

    let (status, _) = get_json!(app, "/api/details/6f1c1f0e-4f0e-4a8b-9d43-0c1b2f3e4d5a");
    assert_eq!(status, 404);

    let req = test::TestRequest::post()
        .uri("/api/capture/start")
        .set_json(json!({ "interface": "missing0" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 400);
}

#[actix_web::test]
async fn captured_packet_can_be_described() {
    let factory = Arc::new(FakeFactory::default()).scripted(vec![common::http_request()], Ending::Exhausted);
    let app = app!(factory);

    let req = test::TestRequest::post()
        .uri("/api/capture/start")
        .set_json(json!({ "interface": "fake0" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    let mut idle = false;
    for _ in 0..200 {
        let (_, body) = get_json!(app, "/api/capture/status");
        if body["state"] == "idle" {
            idle = true;
            break;
        }
        actix_web::rt::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(idle, "capture never returned to idle");

    let (status, body) = get_json!(app, "/api/conversations/readable");
    assert_eq!(status, 200);
    assert_eq!(body[0]["label"], "10.0.0.1(Unknown) <-> 10.0.0.2(Unknown)");
    assert_eq!(body[0]["readable_ids"], json!([1]));

    let (status, body) = get_json!(app, "/api/conversations/encrypted");
    assert_eq!(status, 200);
    assert_eq!(body, json!([]));

    let (status, body) = get_json!(app, "/api/conversations/10.0.0.1/10.0.0.2");
    assert_eq!(status, 200);
    assert_eq!(body["readable"][0]["id"], 1);
    assert_eq!(body["readable"][0]["source"], "10.0.0.1:1234");
    assert_eq!(body["readable"][0]["destination_hostname"], "Unknown");
    assert_eq!(body["encrypted"], json!([]));

    let (status, _) = get_json!(app, "/api/conversations/10.0.0.2/10.0.0.1");
    assert_eq!(status, 404);

    let (status, body) = get_json!(app, "/api/packets/1");
    assert_eq!(status, 200);
    assert_eq!(body["payload_text"], "GET / HTTP/1.1");
    assert_eq!(body["destination_port"], 80);

    let req = test::TestRequest::post().uri("/api/packets/1/detail").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 200);
    let ticket: Value = test::read_body_json(resp).await;
    assert_eq!(ticket["packet_id"], 1);
    let uri = format!("/api/details/{}", ticket["request_id"].as_str().unwrap());

    let mut description = None;
    for _ in 0..200 {
        let (status, body) = get_json!(app, &uri);
        assert_eq!(status, 200);
        if body["status"] == "ready" {
            description = Some(body);
            break;
        }
        actix_web::rt::time::sleep(Duration::from_millis(10)).await;
    }
    let description = description.expect("detail never became ready");
    assert_eq!(description["outcome"]["kind"], "description");
    let text = description["outcome"]["text"].as_str().unwrap();
    assert!(text.contains("Source IP: 10.0.0.1 (Unknown)"));
    assert!(text.contains("Destination Port 80 is used for: http"));
    assert!(text.contains("ai says: A plain HTTP GET request"));

    // Handed out once, then forgotten
    let (status, _) = get_json!(app, &uri);
    assert_eq!(status, 404);
    let (_, body) = get_json!(app, "/api/capture/status");
    assert_eq!(body["unread_details"], 0);

    // Already delivered, nothing left to cancel
    let req = test::TestRequest::delete().uri(&uri).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 404);
}
