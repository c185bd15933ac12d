//! GET /qr and GET / against a gateway on an ephemeral port.

mod common;

use common::{start_gateway, FakeProvider};
use lib::qr::encode_png;
use lib::session::{SessionEvent, SessionStatus};
use std::sync::Arc;

#[tokio::test]
async fn qr_is_not_found_until_a_challenge_is_issued() {
    let gw = start_gateway(Arc::new(FakeProvider::default()), None, None).await;
    let url = format!("{}/qr", gw.base_url);

    let res = gw.client.get(&url).send().await.unwrap();
    assert_eq!(res.status(), 404);

    gw.publisher.publish("2@challenge-one").unwrap();
    let res = gw.client.get(&url).send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["content-type"], "image/png");
    let body = res.bytes().await.unwrap();
    assert_eq!(body.as_ref(), encode_png("2@challenge-one").unwrap().as_slice());
}

#[tokio::test]
async fn newer_challenge_replaces_older_one() {
    let gw = start_gateway(Arc::new(FakeProvider::default()), None, None).await;
    gw.publisher.publish("first").unwrap();
    gw.publisher.publish("second").unwrap();
    let body = gw
        .client
        .get(format!("{}/qr", gw.base_url))
        .send()
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    assert_eq!(body.as_ref(), encode_png("second").unwrap().as_slice());
}

#[tokio::test]
async fn qr_token_accepts_query_or_bearer() {
    let gw = start_gateway(Arc::new(FakeProvider::default()), None, Some("peek")).await;
    gw.publisher.publish("challenge").unwrap();
    let url = format!("{}/qr", gw.base_url);

    let res = gw.client.get(&url).send().await.unwrap();
    assert_eq!(res.status(), 401);
    assert_eq!(res.text().await.unwrap(), "Unauthorized");

    let res = gw
        .client
        .get(format!("{}?token=wrong", url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 401);

    let res = gw
        .client
        .get(format!("{}?token=peek", url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);

    let res = gw.client.get(&url).bearer_auth("peek").send().await.unwrap();
    assert_eq!(res.status(), 200);
}

#[tokio::test]
async fn unauthorized_is_checked_before_missing_qr() {
    let gw = start_gateway(Arc::new(FakeProvider::default()), None, Some("peek")).await;
    let res = gw
        .client
        .get(format!("{}/qr", gw.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 401);
}

#[tokio::test]
async fn health_reports_session_status() {
    let gw = start_gateway(Arc::new(FakeProvider::default()), None, None).await;
    let url = format!("{}/", gw.base_url);

    let json: serde_json::Value = gw.client.get(&url).send().await.unwrap().json().await.unwrap();
    assert_eq!(json["runtime"], "running");
    assert_eq!(json["session"], "starting");

    gw.status_tx
        .send_modify(|s| *s = s.after(&SessionEvent::Ready));
    let json: serde_json::Value = gw.client.get(&url).send().await.unwrap().json().await.unwrap();
    assert_eq!(json["session"], SessionStatus::Ready.as_str());
}
