//! Integration tests for the berkah server

use std::net::TcpListener;

use berkah::configuration::JwtSettings;
use berkah::startup::{run, Storage};

fn spawn_app() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let jwt = JwtSettings {
        secret: "integration-test-secret-0123456789abcdef".to_string(),
        token_ttl_seconds: 7200,
        issuer: "berkah-test".to_string(),
    };
    let server = run(listener, Storage::in_memory(), &jwt).expect("Failed to create server");

    let _ = tokio::spawn(server);

    format!("http://127.0.0.1:{}", port)
}

#[tokio::test]
async fn health_check_works() {
    let addr = spawn_app();

    let response = reqwest::Client::new()
        .get(&format!("{}/health_check", addr))
        .send()
        .await
        .expect("Failed to execute request");

    assert!(response.status().is_success());
    assert_eq!(Some(0), response.content_length());
}

#[tokio::test]
async fn responses_carry_a_request_id() {
    let addr = spawn_app();

    let response = reqwest::Client::new()
        .get(&format!("{}/health_check", addr))
        .send()
        .await
        .expect("Failed to execute request");

    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn rejected_requests_carry_a_request_id() {
    let addr = spawn_app();

    let response = reqwest::Client::new()
        .get(&format!("{}/api/me", addr))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(401, response.status().as_u16());
    assert!(response.headers().contains_key("x-request-id"));
}
