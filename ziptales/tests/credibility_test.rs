use std::sync::Arc;
use std::time::Duration;

use ziptales::credibility::{CredibilityAnalyzer, ScoreMethod};
use ziptales::llm::remote::RemoteLlmProvider;
use ziptales::news::NewsService;
use ziptales::store::MemoryArticleStore;

const TEXT: &str = "Breaking: anonymous official confirmed a university study";

fn completion(content: &str) -> String {
    serde_json::json!({
        "model": "gpt-4o-mini",
        "choices": [{ "message": { "role": "assistant", "content": content } }],
    })
    .to_string()
}

fn analyzer_for(server: &mockito::ServerGuard) -> CredibilityAnalyzer {
    let provider = RemoteLlmProvider::new(server.url(), "fake-api-key", "gpt-4o-mini");
    CredibilityAnalyzer::new(Some(Arc::new(provider))).with_timeout(Duration::from_secs(2))
}

#[tokio::test]
async fn remote_reply_sets_the_score() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(completion("Credibility: 77 out of 100"))
        .expect(1)
        .create_async()
        .await;

    let assessment = analyzer_for(&server).analyze(TEXT).await;
    assert_eq!(assessment.score, 77);
    assert_eq!(assessment.method, ScoreMethod::Remote);
    assert_eq!(assessment.model.as_deref(), Some("gpt-4o-mini"));

    mock.assert_async().await;
}

#[tokio::test]
async fn server_error_falls_back_without_retry() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/")
        .with_status(500)
        .with_body("upstream exploded")
        .expect(2)
        .create_async()
        .await;

    let analyzer = analyzer_for(&server);
    assert!(analyzer.remote_score(TEXT).await.is_err());

    let assessment = analyzer.analyze(TEXT).await;
    assert_eq!(assessment.score, 60);
    assert_eq!(assessment.method, ScoreMethod::Heuristic);

    // one call from remote_score, one from analyze
    mock.assert_async().await;
}

#[tokio::test]
async fn garbage_reply_falls_back() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body("<html>not json</html>")
        .create_async()
        .await;

    let assessment = analyzer_for(&server)
        .analyze("Scientists at the university published new research")
        .await;
    assert_eq!(assessment.method, ScoreMethod::Heuristic);
    assert_eq!(assessment.score, 80);
}

#[tokio::test]
async fn short_text_never_reaches_the_model() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(completion("99"))
        .expect(0)
        .create_async()
        .await;

    let service = NewsService::new(Arc::new(MemoryArticleStore::new()), analyzer_for(&server));
    let assessment = service.analyze_text("rumor").await;
    assert_eq!(assessment.score, 30);
    assert_eq!(assessment.method, ScoreMethod::Heuristic);

    mock.assert_async().await;
}
