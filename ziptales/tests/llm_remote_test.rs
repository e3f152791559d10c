use mockito::Matcher;
use serde_json::json;
use ziptales::llm::remote::RemoteLlmProvider;
use ziptales::llm::{extract_first_integer, LlmProvider, LlmRequest};

fn scoring_request(timeout_seconds: u64) -> LlmRequest {
    LlmRequest {
        prompt: "Rate the credibility of: The council confirmed the budget.".to_string(),
        max_tokens: Some(10),
        temperature: Some(0.0),
        timeout_seconds: Some(timeout_seconds),
    }
}

#[tokio::test]
async fn scoring_call_sends_model_and_key_and_reads_usage() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/")
        .match_header("authorization", "Bearer fake-api-key")
        .match_body(Matcher::PartialJson(json!({
            "model": "gpt-4o-mini",
            "max_tokens": 10,
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "model": "gpt-4o-mini-2024-07-18",
                "choices": [{ "message": { "role": "assistant", "content": "Score: 72/100" } }],
                "usage": { "prompt_tokens": 61, "completion_tokens": 4, "total_tokens": 65 },
            })
            .to_string(),
        )
        .create_async()
        .await;

    let provider = RemoteLlmProvider::new(server.url(), "fake-api-key", "gpt-4o-mini");
    let response = provider.generate(scoring_request(5)).await.unwrap();

    assert_eq!(extract_first_integer(&response.content), Some(72));
    assert_eq!(response.usage.total_tokens, 65);
    assert_eq!(response.model, "gpt-4o-mini-2024-07-18");

    mock.assert_async().await;
}

#[tokio::test]
async fn bare_number_reply_without_usage() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"choices": [{"message": {"role": "assistant", "content": "64"}}]}"#)
        .create_async()
        .await;

    let provider = RemoteLlmProvider::new(server.url(), "fake-api-key", "local-model");
    let response = provider.generate(scoring_request(5)).await.unwrap();

    assert_eq!(extract_first_integer(&response.content), Some(64));
    assert_eq!(response.usage.total_tokens, 0);
    // falls back to the configured model name
    assert_eq!(response.model, "local-model");
}

#[tokio::test]
async fn rate_limit_and_empty_choices_are_errors() {
    let mut server = mockito::Server::new_async().await;
    let _limited = server
        .mock("POST", "/limited")
        .with_status(429)
        .with_body(r#"{"error": {"message": "Rate limit exceeded"}}"#)
        .create_async()
        .await;
    let _empty = server
        .mock("POST", "/empty")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"choices": []}"#)
        .create_async()
        .await;

    let limited = RemoteLlmProvider::new(format!("{}/limited", server.url()), "k", "m");
    let err = limited.generate(scoring_request(5)).await.unwrap_err();
    assert!(err.to_string().contains("429"));

    let empty = RemoteLlmProvider::new(format!("{}/empty", server.url()), "k", "m");
    let err = empty.generate(scoring_request(5)).await.unwrap_err();
    assert!(err.to_string().contains("no choices"));
}

#[tokio::test]
async fn stalled_reply_times_out() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/")
        .with_status(200)
        .with_chunked_body(|w| {
            std::thread::sleep(std::time::Duration::from_secs(3));
            w.write_all(b"{\"choices\": []}")
        })
        .create_async()
        .await;

    let provider = RemoteLlmProvider::new(server.url(), "fake-api-key", "gpt-4o-mini");
    let err = provider.generate(scoring_request(1)).await.unwrap_err();
    assert!(err.to_string().contains("timed out"));
}
