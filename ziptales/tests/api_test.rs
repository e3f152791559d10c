use std::sync::Arc;

use rocket::http::{ContentType, Status};
use rocket::local::asynchronous::Client;
use serde_json::{json, Value};
use ziptales::credibility::CredibilityAnalyzer;
use ziptales::news::NewsService;
use ziptales::server::{build_rocket, AppState, AuthSettings};
use ziptales::store::SqliteArticleStore;

async fn client() -> Client {
    let store = SqliteArticleStore::in_memory().await.expect("store");
    let pool = store.pool().clone();
    let news = NewsService::new(Arc::new(store), CredibilityAnalyzer::heuristic_only());
    let mut state = AppState::new(pool, news, None);
    state.auth = AuthSettings::new("test-secret", 1);
    Client::tracked(build_rocket(state)).await.expect("rocket client")
}

async fn post_json(client: &Client, uri: &str, body: Value) -> (Status, Value) {
    let response = client
        .post(uri)
        .header(ContentType::JSON)
        .body(body.to_string())
        .dispatch()
        .await;
    let status = response.status();
    let value = response.into_json::<Value>().await.unwrap_or(Value::Null);
    (status, value)
}

async fn register(client: &Client, username: &str) -> String {
    let (status, body) = post_json(
        client,
        "/api/v1/register",
        json!({ "username": username, "password": "correct horse" }),
    )
    .await;
    assert_eq!(status, Status::Ok);
    body["token"].as_str().expect("token").to_string()
}

#[tokio::test]
async fn submit_vote_and_list_over_http() {
    let client = client().await;
    let token = register(&client, "alice").await;

    let (status, anon) = post_json(
        &client,
        "/api/v1/articles",
        json!({ "title": "Anon", "content": "Nobody signed this." }),
    )
    .await;
    assert_eq!(status, Status::Ok);
    assert_eq!(anon["applied"], false);
    assert_eq!(anon["reason"], "unauthenticated");

    let (status, created) = post_json(
        &client,
        "/api/v1/articles",
        json!({
            "token": token,
            "title": "Water main repaired",
            "content": "Crews repaired the water main on Elm Street overnight.",
            "category": "Local",
        }),
    )
    .await;
    assert_eq!(status, Status::Ok);
    assert_eq!(created["applied"], true);
    assert_eq!(created["article"]["credibility_score"], 50);
    assert_eq!(created["article"]["tier"], "pending");
    let id = created["article"]["id"].as_str().expect("id").to_string();

    let vote_uri = format!("/api/v1/articles/{}/vote", id);
    let (_, voted) = post_json(&client, &vote_uri, json!({ "token": token, "direction": "up" })).await;
    assert_eq!(voted["applied"], true);
    assert_eq!(voted["article"]["credibility_score"], 70);
    assert_eq!(voted["article"]["verified"], true);
    assert_eq!(voted["article"]["votes"]["upvotes"], 1);

    let (status, again) = post_json(&client, &vote_uri, json!({ "token": token, "direction": "down" })).await;
    assert_eq!(status, Status::Ok);
    assert_eq!(again["applied"], false);
    assert_eq!(again["reason"], "already_voted");

    let listed = client
        .get("/api/v1/articles?category=local&filter=trusted")
        .dispatch()
        .await
        .into_json::<Value>()
        .await
        .expect("list body");
    assert_eq!(listed.as_array().map(Vec::len), Some(1));
    assert_eq!(listed[0]["votes"]["downvotes"], 0);

    let detail_uri = format!("/api/v1/articles/{}", id);
    let detail = client.get(detail_uri.as_str()).dispatch().await;
    assert_eq!(detail.status(), Status::Ok);
    let detail = detail.into_json::<Value>().await.expect("detail body");
    assert_eq!(detail["analyses"][0]["method"], "heuristic");

    let missing = client.get("/api/v1/articles/nope").dispatch().await;
    assert_eq!(missing.status(), Status::NotFound);
}

#[tokio::test]
async fn login_and_saved_articles() {
    let client = client().await;
    register(&client, "bob").await;

    let (status, _) = post_json(
        &client,
        "/api/v1/login",
        json!({ "username": "bob", "password": "wrong" }),
    )
    .await;
    assert_eq!(status, Status::Unauthorized);

    let (status, login) = post_json(
        &client,
        "/api/v1/login",
        json!({ "username": "bob", "password": "correct horse" }),
    )
    .await;
    assert_eq!(status, Status::Ok);
    let token = login["token"].as_str().expect("token").to_string();

    let (_, created) = post_json(
        &client,
        "/api/v1/articles",
        json!({ "token": token, "title": "Park opens", "content": "The new park opens Saturday." }),
    )
    .await;
    let id = created["article"]["id"].as_str().expect("id").to_string();

    let save_uri = format!("/api/v1/articles/{}/save", id);
    let (_, saved) = post_json(&client, &save_uri, json!({ "token": token })).await;
    assert_eq!(saved["saved"], true);

    let saved_uri = format!("/api/v1/saved?token={}", token);
    let list = client
        .get(saved_uri.as_str())
        .dispatch()
        .await
        .into_json::<Value>()
        .await
        .expect("saved body");
    assert_eq!(list[0]["id"], id.as_str());

    let anonymous = client.get("/api/v1/saved").dispatch().await;
    assert_eq!(anonymous.status(), Status::Unauthorized);

    let cleared = client
        .delete(saved_uri.as_str())
        .dispatch()
        .await
        .into_json::<Value>()
        .await
        .expect("clear body");
    assert_eq!(cleared["cleared"], 1);

    let (status, _) = post_json(
        &client,
        "/api/v1/register",
        json!({ "username": "bob", "password": "another" }),
    )
    .await;
    assert_eq!(status, Status::Conflict);
}

#[tokio::test]
async fn analyze_and_stats() {
    let client = client().await;

    let (status, analysis) = post_json(
        &client,
        "/api/v1/analyze",
        json!({ "text": "Breaking: anonymous official confirmed a university study" }),
    )
    .await;
    assert_eq!(status, Status::Ok);
    assert_eq!(analysis["score"], 60);
    assert_eq!(analysis["method"], "heuristic");
    assert_eq!(analysis["verdict"], "Requires Verification");

    let stats = client
        .get("/api/v1/stats")
        .dispatch()
        .await
        .into_json::<Value>()
        .await
        .expect("stats body");
    assert_eq!(stats["articles"], 0);
    assert_eq!(stats["average_score"], 0);

    let health = client.get("/health").dispatch().await;
    assert_eq!(health.into_string().await.as_deref(), Some("OK"));
}

#[tokio::test]
async fn duplicate_url_is_not_applied() {
    let client = client().await;
    let token = register(&client, "erin").await;
    let body = json!({
        "token": token,
        "title": "Harbor dredging starts",
        "content": "The port confirmed dredging starts Monday.",
        "url": "https://port.example.com/dredging",
        "image_url": "https://port.example.com/dredging.jpg",
    });

    let (_, first) = post_json(&client, "/api/v1/articles", body.clone()).await;
    assert_eq!(first["applied"], true);
    assert_eq!(first["article"]["image_url"], "https://port.example.com/dredging.jpg");

    let (status, second) = post_json(&client, "/api/v1/articles", body).await;
    assert_eq!(status, Status::Ok);
    assert_eq!(second["applied"], false);
    assert_eq!(second["reason"], "duplicate");
    assert_eq!(second["article_id"], first["article"]["id"]);
}

#[tokio::test]
async fn profile_shows_reputation_and_accepts_updates() {
    let client = client().await;
    let token = register(&client, "frank").await;

    let profile_uri = format!("/api/v1/profile?token={}", token);
    let profile = client
        .get(profile_uri.as_str())
        .dispatch()
        .await
        .into_json::<Value>()
        .await
        .expect("profile body");
    assert_eq!(profile["username"], "frank");
    assert_eq!(profile["reputation"], 50);
    assert_eq!(profile["level"], "newcomer");

    let (_, rejected) = post_json(
        &client,
        "/api/v1/profile",
        json!({ "token": token, "avatar_url": "not a url" }),
    )
    .await;
    assert_eq!(rejected["applied"], false);
    assert_eq!(rejected["reason"], "invalid");

    let (status, updated) = post_json(
        &client,
        "/api/v1/profile",
        json!({
            "token": token,
            "bio": "Covers city hall",
            "location": "Springfield",
            "interests": ["Politics", "Local"],
        }),
    )
    .await;
    assert_eq!(status, Status::Ok);
    assert_eq!(updated["applied"], true);
    assert_eq!(updated["profile"]["bio"], "Covers city hall");
    assert_eq!(updated["profile"]["interests"], json!(["Politics", "Local"]));

    let (_, anon) = post_json(&client, "/api/v1/profile", json!({ "bio": "x" })).await;
    assert_eq!(anon["reason"], "unauthenticated");
    let anonymous = client.get("/api/v1/profile").dispatch().await;
    assert_eq!(anonymous.status(), Status::Unauthorized);
}
