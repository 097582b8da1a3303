//! Integration coverage for webhook delivery's signing + transport (§4.C, §4.D).
//!
//! `InvocationStore` is Redis-backed and out of reach here, so this drives the
//! same sign-then-POST path `deliver_one` takes against a mock HTTP endpoint,
//! grounded on the teacher's `mockito::Server::new_async` usage in
//! `mcp/src/auth.rs`'s OAuth discovery tests.

use tmi_common::{ThreatModelId, UserId};
use tmi_webhooks::{Invocation, NewInvocation, hmac};

fn sample_invocation() -> Invocation {
    Invocation::new(
        NewInvocation {
            addon_id: "addon-1".to_string(),
            threat_model_id: ThreatModelId::new(),
            object_type: Some("cell".to_string()),
            object_id: Some("cell-1".to_string()),
            invoked_by_uuid: UserId::new(),
            invoked_by_id: "idp:user-1".to_string(),
            invoked_by_email: Some("user@example.com".to_string()),
            invoked_by_name: Some("User One".to_string()),
            payload: serde_json::json!({"note": "please review"}),
        },
        chrono::Utc::now(),
    )
    .unwrap()
}

#[tokio::test]
async fn delivery_is_accepted_when_signature_is_valid() {
    let mut server = mockito::Server::new_async().await;
    let secret = "top-secret";
    let invocation = sample_invocation();
    let body = serde_json::to_vec(&serde_json::json!({
        "invocation_id": invocation.id.as_uuid(),
        "addon_id": invocation.addon_id,
    }))
    .unwrap();
    let signature = hmac::sign(secret, &body);

    let mock = server
        .mock("POST", "/hook")
        .match_header(hmac::SIGNATURE_HEADER, mockito::Matcher::Exact(signature.clone()))
        .match_body(mockito::Matcher::Exact(String::from_utf8(body.clone()).unwrap()))
        .with_status(200)
        .create_async()
        .await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/hook", server.url()))
        .header(hmac::SIGNATURE_HEADER, signature)
        .header("content-type", "application/json")
        .body(body)
        .send()
        .await
        .unwrap();

    assert!(resp.status().is_success());
    mock.assert_async().await;
}

#[tokio::test]
async fn receiver_can_independently_verify_the_signature() {
    let secret = "top-secret";
    let invocation = sample_invocation();
    let body = serde_json::to_vec(&invocation).unwrap();
    let signature = hmac::sign(secret, &body);

    assert!(hmac::verify(secret, &body, &signature));
    assert!(!hmac::verify("wrong-secret", &body, &signature));
}
