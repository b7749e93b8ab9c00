//! E2E tests for the prompt pipeline against a mock backend.
//!
//! The mock server stands in for the OpenAI-compatible endpoint via a
//! `providers.openai.apiBase` override, so the full binary path (settings,
//! cache, budget, retries, sessions) runs without real network access.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn quill(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("quill").unwrap();
    cmd.env("QUILL_CONFIG_DIR", dir.path());
    cmd.env("OPENAI_API_KEY", "sk-test");
    for var in ["ANTHROPIC_API_KEY", "GEMINI_API_KEY", "MISTRAL_API_KEY", "QUILL_LOG"] {
        cmd.env_remove(var);
    }
    cmd
}

/// Point the openai provider at the mock server.
fn write_settings(dir: &TempDir, api_base: &str) {
    let settings = json!({
        "model": "openai/gpt-4o-mini",
        "providers": { "openai": { "apiBase": api_base } }
    });
    std::fs::write(
        dir.path().join("settings.json"),
        serde_json::to_string_pretty(&settings).unwrap(),
    )
    .unwrap();
}

fn completion(text: &str) -> serde_json::Value {
    json!({
        "choices": [{
            "message": { "role": "assistant", "content": text },
            "finish_reason": "stop"
        }],
        "usage": { "prompt_tokens": 6, "completion_tokens": 3 }
    })
}

#[tokio::test(flavor = "multi_thread")]
async fn buffered_ask_prints_the_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("mock reply")))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    write_settings(&dir, &server.uri());

    quill(&dir)
        .args(["--no-stream", "hello", "there"])
        .assert()
        .success()
        .stdout(predicate::str::contains("mock reply"));
}

#[tokio::test(flavor = "multi_thread")]
async fn system_prompt_alone_reaches_the_backend() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({
            "messages": [
                { "role": "system", "content": "tell me a joke" },
                { "role": "user", "content": "" }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("why did the crab")))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    write_settings(&dir, &server.uri());

    quill(&dir)
        .args(["--no-stream", "-s", "tell me a joke"])
        .write_stdin("")
        .assert()
        .success()
        .stdout(predicate::str::contains("why did the crab"));
}

#[tokio::test(flavor = "multi_thread")]
async fn identical_request_is_served_from_cache() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("cached reply")))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    write_settings(&dir, &server.uri());

    for _ in 0..2 {
        quill(&dir)
            .args(["--no-stream", "same", "question"])
            .assert()
            .success()
            .stdout(predicate::str::contains("cached reply"));
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn no_cache_flag_always_hits_the_backend() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("fresh reply")))
        .expect(2)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    write_settings(&dir, &server.uri());

    for _ in 0..2 {
        quill(&dir)
            .args(["--no-cache", "--no-stream", "same", "question"])
            .assert()
            .success();
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn transient_failures_are_retried_to_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("third time lucky")))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    write_settings(&dir, &server.uri());

    quill(&dir)
        .args(["--retries", "3", "--no-stream", "flaky"])
        .assert()
        .success()
        .stdout(predicate::str::contains("third time lucky"));
}

#[tokio::test(flavor = "multi_thread")]
async fn fatal_backend_rejection_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({ "error": { "message": "invalid api key" } })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    write_settings(&dir, &server.uri());

    quill(&dir)
        .args(["--retries", "3", "--no-stream", "hello"])
        .assert()
        .failure()
        .code(4)
        .stderr(predicate::str::contains("invalid api key"));
}

#[tokio::test(flavor = "multi_thread")]
async fn exhausted_retries_report_the_attempt_count() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    write_settings(&dir, &server.uri());

    quill(&dir)
        .args(["--retries", "2", "--no-stream", "hopeless"])
        .assert()
        .failure()
        .code(4)
        .stderr(predicate::str::contains("3 attempt(s)"));
}

#[tokio::test(flavor = "multi_thread")]
async fn budget_rejection_happens_before_any_network_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("never sent")))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    write_settings(&dir, &server.uri());

    quill(&dir)
        .args(["--budget", "0.0000001", "--no-stream", "too", "expensive"])
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("budget exceeded"));
}

#[tokio::test(flavor = "multi_thread")]
async fn json_output_carries_usage_and_model() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("structured")))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    write_settings(&dir, &server.uri());

    let output = quill(&dir)
        .args(["--json", "hello"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let payload: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(payload["text"], "structured");
    assert_eq!(payload["model"], "openai/gpt-4o-mini");
    assert_eq!(payload["usage"]["output_tokens"], 3);
    assert_eq!(payload["cached"], false);
}

#[tokio::test(flavor = "multi_thread")]
async fn streaming_prints_deltas_in_order() {
    let sse = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"str\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"eamed\"},\"finish_reason\":\"stop\"}]}\n\n",
        "data: [DONE]\n\n",
    );
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({ "stream": true })))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    write_settings(&dir, &server.uri());

    quill(&dir)
        .args(["--stream", "hello"])
        .assert()
        .success()
        .stdout(predicate::str::contains("streamed"));
}

#[tokio::test(flavor = "multi_thread")]
async fn session_accumulates_turns_and_history_is_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("first answer")))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    write_settings(&dir, &server.uri());

    quill(&dir)
        .args(["--session", "chat", "--no-stream", "first", "question"])
        .assert()
        .success();

    // The second request must carry the first exchange as history.
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({
            "messages": [
                { "role": "user", "content": "first question" },
                { "role": "assistant", "content": "first answer" },
                { "role": "user", "content": "second question" }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("second answer")))
        .expect(1)
        .mount(&server)
        .await;

    quill(&dir)
        .args(["--session", "chat", "--no-stream", "second", "question"])
        .assert()
        .success()
        .stdout(predicate::str::contains("second answer"));

    let content =
        std::fs::read_to_string(dir.path().join("data/sessions/chat.json")).unwrap();
    let session: serde_json::Value = serde_json::from_str(&content).unwrap();
    assert_eq!(session["messages"].as_array().unwrap().len(), 4);
    assert!(session["cumulative_cost"].as_f64().unwrap() > 0.0);
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_request_leaves_session_untouched() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "message": "bad request" }
        })))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    write_settings(&dir, &server.uri());

    quill(&dir)
        .args(["--session", "doomed", "--no-stream", "hello"])
        .assert()
        .failure()
        .code(4);

    assert!(!dir.path().join("data/sessions/doomed.json").exists());
}
