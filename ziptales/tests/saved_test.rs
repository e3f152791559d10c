use std::sync::Arc;

use ziptales::article::NewArticle;
use ziptales::credibility::CredibilityAnalyzer;
use ziptales::news::{NewsService, SaveOutcome, Submission};
use ziptales::store::SqliteArticleStore;

async fn setup() -> (NewsService, i64) {
    let store = SqliteArticleStore::in_memory().await.expect("store");
    let user = sqlx::query_scalar::<_, i64>("INSERT INTO users (username) VALUES ('reader') RETURNING id")
        .fetch_one(store.pool())
        .await
        .expect("insert user");
    let service = NewsService::new(Arc::new(store), CredibilityAnalyzer::heuristic_only());
    (service, user)
}

async fn submit(service: &NewsService, user: i64, title: &str) -> String {
    let new = NewArticle {
        title: title.into(),
        content: format!("{} was confirmed by the city office.", title),
        category: "Local".into(),
        ..Default::default()
    };
    match service.submit_article(Some(user), new).await.expect("submit") {
        Submission::Accepted { article, .. } => article.id,
        other => panic!("submission rejected: {:?}", other),
    }
}

#[tokio::test]
async fn toggling_twice_restores_saved_set() {
    let (service, user) = setup().await;
    let first = submit(&service, user, "Bridge reopens").await;
    let second = submit(&service, user, "Library extends hours").await;

    assert_eq!(
        service.toggle_saved(Some(user), &first).await.unwrap(),
        SaveOutcome::Toggled { saved: true }
    );
    let before: Vec<String> = service
        .saved_articles(user)
        .await
        .unwrap()
        .into_iter()
        .map(|a| a.id)
        .collect();
    assert_eq!(before, vec![first.clone()]);

    service.toggle_saved(Some(user), &second).await.unwrap();
    assert_eq!(
        service.toggle_saved(Some(user), &second).await.unwrap(),
        SaveOutcome::Toggled { saved: false }
    );

    let after: Vec<String> = service
        .saved_articles(user)
        .await
        .unwrap()
        .into_iter()
        .map(|a| a.id)
        .collect();
    assert_eq!(after, before);
}

#[tokio::test]
async fn saving_needs_identity_and_a_real_article() {
    let (service, user) = setup().await;
    let id = submit(&service, user, "Market day moves").await;

    assert_eq!(
        service.toggle_saved(None, &id).await.unwrap(),
        SaveOutcome::Unauthenticated
    );
    assert_eq!(
        service.toggle_saved(Some(user), "missing").await.unwrap(),
        SaveOutcome::UnknownArticle
    );
    assert!(service.saved_articles(user).await.unwrap().is_empty());
}

#[tokio::test]
async fn clear_removes_everything_saved() {
    let (service, user) = setup().await;
    for title in ["One", "Two", "Three"] {
        let id = submit(&service, user, title).await;
        service.toggle_saved(Some(user), &id).await.unwrap();
    }

    assert_eq!(service.clear_saved(user).await.unwrap(), 3);
    assert!(service.saved_articles(user).await.unwrap().is_empty());
    assert_eq!(service.clear_saved(user).await.unwrap(), 0);
}
