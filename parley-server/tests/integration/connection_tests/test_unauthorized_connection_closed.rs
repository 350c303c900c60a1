use parley_core::CLOSE_UNAUTHORIZED;

use crate::integration::{init_tracing, spawn_test_server};
use crate::utils::TestClient;

#[tokio::test]
async fn test_wrong_token_is_closed_as_unauthorized() {
    init_tracing();

    let (addr, _state) = spawn_test_server(Some("secret")).await;

    let mut intruder = TestClient::connect(addr, "mallory", Some("guess"))
        .await
        .expect("Handshake should still succeed");
    let code = intruder.expect_close().await.expect("Expected a close frame");
    assert_eq!(code, CLOSE_UNAUTHORIZED);

    let mut missing = TestClient::connect(addr, "mallory", None)
        .await
        .expect("Handshake should still succeed");
    let code = missing.expect_close().await.expect("Expected a close frame");
    assert_eq!(code, CLOSE_UNAUTHORIZED);
}

#[tokio::test]
async fn test_valid_token_is_accepted() {
    init_tracing();

    let (addr, _state) = spawn_test_server(Some("secret")).await;

    let mut alice = TestClient::connect(addr, "alice", Some("secret"))
        .await
        .expect("Failed to connect");
    alice.join("lesson-1").await.expect("No participant list");
}
