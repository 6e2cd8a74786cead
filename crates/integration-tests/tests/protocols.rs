mod harness;

use harness::config::ConfigBuilder;
use harness::mock_upstream::{MockUpstream, Scripted};
use harness::server::TestServer;
use switchboard_channel::ChannelId;
use switchboard_config::ChannelKind;

#[tokio::test]
async fn claude_messages_fail_over_and_render_claude_errors() {
    let primary = MockUpstream::start_scripted(vec![Scripted::claude_error(529, "overloaded_error", "overloaded")])
        .await
        .unwrap();
    let backup = MockUpstream::start_with_response("from claude").await.unwrap();

    let config = ConfigBuilder::new()
        .with_channel_config(1, &primary.base_url(), |channel| channel.kind = ChannelKind::Anthropic)
        .with_channel_config(2, &backup.base_url(), |channel| channel.kind = ChannelKind::Anthropic)
        .build();

    let server = TestServer::start(config).await.unwrap();

    let resp = server
        .client()
        .post(server.url("/v1/messages"))
        .json(&serde_json::json!({"model": "mock-model", "max_tokens": 16, "messages": []}))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);

    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["content"][0]["text"], "from claude");

    server.settle().await;
    let slot = server.services().registry().get(ChannelId::new(2)).unwrap();
    assert_eq!(slot.used_quota(), 10);
    assert_eq!(slot.used_count(), 1);
}

#[tokio::test]
async fn claude_terminal_error_uses_claude_envelope() {
    let only = MockUpstream::start_failing(Scripted::claude_error(400, "invalid_request_error", "bad prompt"))
        .await
        .unwrap();

    let config = ConfigBuilder::new()
        .with_channel_config(1, &only.base_url(), |channel| channel.kind = ChannelKind::Anthropic)
        .with_relay(|relay| relay.retry_times = 0)
        .build();

    let server = TestServer::start(config).await.unwrap();

    let resp = server
        .client()
        .post(server.url("/v1/messages"))
        .json(&serde_json::json!({"model": "mock-model", "messages": []}))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 400);

    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["type"], "error");
    assert_eq!(json["error"]["type"], "invalid_request_error");
    assert!(json["error"]["message"].as_str().unwrap().contains("bad prompt"));
}

#[tokio::test]
async fn task_submission_charges_reported_quota() {
    let mock = MockUpstream::start().await.unwrap();
    let config = ConfigBuilder::new()
        .with_channel_config(1, &mock.base_url(), |channel| channel.kind = ChannelKind::Task)
        .build();

    let server = TestServer::start(config).await.unwrap();

    let resp = server
        .client()
        .post(server.url("/v1/tasks/video"))
        .json(&serde_json::json!({"model": "mock-model", "prompt": "a cat"}))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);

    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["task_id"], "video-1");

    server.settle().await;
    let slot = server.services().registry().get(ChannelId::new(1)).unwrap();
    assert_eq!(slot.used_quota(), 50);
}

#[tokio::test]
async fn task_failure_renders_task_envelope() {
    let mock = MockUpstream::start_failing(Scripted {
        status: 400,
        body: serde_json::json!({"code": "invalid_prompt", "message": "prompt rejected"}),
    })
    .await
    .unwrap();

    let config = ConfigBuilder::new()
        .with_channel_config(1, &mock.base_url(), |channel| channel.kind = ChannelKind::Task)
        .with_relay(|relay| relay.retry_times = 0)
        .build();

    let server = TestServer::start(config).await.unwrap();

    let resp = server
        .client()
        .post(server.url("/v1/tasks/video"))
        .json(&serde_json::json!({"model": "mock-model"}))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 400);

    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["code"], "invalid_prompt");
    assert!(json["data"].is_null());
}
