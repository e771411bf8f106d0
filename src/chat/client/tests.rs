use super::*;
use std::io::Cursor;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn stream_of(body: &str) -> ChatStream<Cursor<Vec<u8>>> {
    ChatStream::new(Cursor::new(body.as_bytes().to_vec()))
}

fn test_client(base_url: &str) -> ChatClient {
    let config = ProviderConfig {
        base_url: base_url.to_string(),
        retry_attempts: 2,
        ..ProviderConfig::default()
    };
    let provider = ProviderClient::with_api_key(&config, "test-key".to_string())
        .expect("client should build")
        .with_backoff(Duration::from_millis(1));
    ChatClient::from_provider(provider, &config)
}

fn delta(text: &str) -> String {
    format!(
        "data: {}\n\n",
        serde_json::json!({"choices": [{"index": 0, "delta": {"content": text}}]})
    )
}

#[test]
fn stream_yields_deltas_until_done() {
    let body = format!(
        "{}{}data: [DONE]\n\n{}",
        delta("Check "),
        delta("the fuse."),
        delta("ignored")
    );

    let tokens: Vec<String> = stream_of(&body)
        .collect::<Result<_>>()
        .expect("stream should parse");
    assert_eq!(tokens, vec!["Check ", "the fuse."]);
}

#[test]
fn stream_skips_comments_and_empty_deltas() {
    let body = format!(
        ": keep-alive\n\nevent: message\n{}data: {}\n\n{}data: [DONE]\n",
        delta("A"),
        serde_json::json!({"choices": [{"delta": {"role": "assistant"}}]}),
        delta("B")
    );

    let tokens: Vec<String> = stream_of(&body)
        .collect::<Result<_>>()
        .expect("stream should parse");
    assert_eq!(tokens, vec!["A", "B"]);
}

#[test]
fn stream_ends_without_done_marker() {
    let tokens: Vec<String> = stream_of(&delta("only"))
        .collect::<Result<_>>()
        .expect("stream should parse");
    assert_eq!(tokens, vec!["only"]);
}

#[test]
fn stream_error_object_ends_stream() {
    let body = format!(
        "{}data: {}\n\n{}",
        delta("partial"),
        serde_json::json!({"error": {"code": "1301", "message": "content filtered"}}),
        delta("never")
    );

    let mut stream = stream_of(&body);
    assert_eq!(
        stream
            .next()
            .expect("should yield a delta")
            .expect("delta should be ok"),
        "partial"
    );
    let error = stream
        .next()
        .expect("should yield the error")
        .expect_err("error object should become Err");
    assert!(error.to_string().contains("content filtered"));
    assert!(stream.next().is_none());
}

#[test]
fn malformed_event_is_an_error() {
    let mut stream = stream_of("data: {not json}\n\n");
    assert!(stream.next().expect("should yield").is_err());
    assert!(stream.next().is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn stream_chat_posts_streaming_request() {
    let server = MockServer::start().await;
    let body = format!("{}{}data: [DONE]\n\n", delta("Hello"), delta(", technician"));
    Mock::given(method("POST"))
        .and(path("/v4/chat/completions"))
        .and(body_partial_json(serde_json::json!({
            "model": "glm-4-flash",
            "stream": true,
            "messages": [{"role": "user", "content": "hi"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&format!("{}/v4/", server.uri()));
    let text: String = client
        .stream_chat(&[Message::user("hi")])
        .expect("stream should open")
        .collect::<Result<String>>()
        .expect("stream should complete");

    assert_eq!(text, "Hello, technician");
}

#[tokio::test(flavor = "multi_thread")]
async fn stream_chat_surfaces_http_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v4/chat/completions"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&format!("{}/v4/", server.uri()));
    assert!(client.stream_chat(&[Message::user("hi")]).is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn complete_returns_tool_calls() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v4/chat/completions"))
        .and(body_partial_json(serde_json::json!({
            "stream": false,
            "tool_choice": "auto"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {
                            "name": "emergency_stop",
                            "arguments": "{\"robot_id\": 2}"
                        }
                    }]
                }
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&format!("{}/v4/", server.uri()));
    let tools = serde_json::json!([{"type": "function", "function": {"name": "emergency_stop"}}]);
    let completion = client
        .complete(&[Message::user("stop robot 2")], Some(&tools))
        .expect("completion should succeed");

    assert_eq!(completion.content, "");
    assert_eq!(completion.tool_calls.len(), 1);
    assert_eq!(completion.tool_calls[0].id, "call_1");
    assert_eq!(completion.tool_calls[0].function.name, "emergency_stop");
}

#[tokio::test(flavor = "multi_thread")]
async fn complete_without_choices_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v4/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})))
        .mount(&server)
        .await;

    let client = test_client(&format!("{}/v4/", server.uri()));
    assert!(client.complete(&[Message::user("hi")], None).is_err());
}

#[test]
fn request_omits_tools_when_absent() {
    let client = test_client("http://localhost:9/v4/");
    let body = client
        .request_body(&[Message::system("persona"), Message::user("hi")], true, None)
        .expect("should serialize");
    let value: serde_json::Value = serde_json::from_str(&body).expect("should be json");

    assert!(value.get("tools").is_none());
    assert!(value.get("tool_choice").is_none());
    assert_eq!(value["messages"][0]["role"], "system");
    assert!(value["messages"][1].get("tool_calls").is_none());
}
