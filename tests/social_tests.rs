// tests/social_tests.rs

mod common;

use common::{TestApp, TestUser, recipe_body, spawn_app};
use serde_json::{Value, json};

async fn follow(app: &TestApp, user: &TestUser, target: i64) -> reqwest::Response {
    app.client
        .post(app.url(&format!("/api/users/{}/follow", target)))
        .bearer_auth(&user.token)
        .send()
        .await
        .unwrap()
}

async fn get_json(app: &TestApp, user: Option<&TestUser>, path: &str) -> Value {
    let mut request = app.client.get(app.url(path));
    if let Some(user) = user {
        request = request.bearer_auth(&user.token);
    }
    let response = request.send().await.unwrap();
    assert_eq!(response.status().as_u16(), 200, "GET {}", path);
    response.json().await.unwrap()
}

#[tokio::test]
async fn me_shows_email_but_public_profile_does_not() {
    let app = spawn_app().await;
    let user = app.signup("private").await;

    let me = get_json(&app, Some(&user), "/api/users/me").await;
    assert_eq!(me["email"], "private@example.com");
    assert_eq!(me["follower_count"], 0);

    let public = get_json(&app, None, &format!("/api/users/{}", user.id)).await;
    assert_eq!(public["username"], "private");
    assert!(public.get("email").is_none());
}

#[tokio::test]
async fn update_profile_validates_picture_url() {
    let app = spawn_app().await;
    let user = app.signup("painter").await;

    let response = app
        .client
        .put(app.url("/api/users/me"))
        .bearer_auth(&user.token)
        .json(&json!({ "profile_picture": "not a url" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    let response = app
        .client
        .put(app.url("/api/users/me"))
        .bearer_auth(&user.token)
        .json(&json!({
            "bio": "Home cook",
            "profile_picture": "https://img.example.com/me.png"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["bio"], "Home cook");
    assert_eq!(body["profile_picture"], "https://img.example.com/me.png");
}

#[tokio::test]
async fn follow_is_idempotent_and_counted() {
    let app = spawn_app().await;
    let fan = app.signup("fan").await;
    let star = app.signup("star").await;

    assert_eq!(follow(&app, &fan, star.id).await.status().as_u16(), 200);
    assert_eq!(follow(&app, &fan, star.id).await.status().as_u16(), 200);

    let profile = get_json(&app, None, &format!("/api/users/{}", star.id)).await;
    assert_eq!(profile["follower_count"], 1);

    let followers = get_json(&app, None, &format!("/api/users/{}/followers", star.id)).await;
    assert_eq!(followers[0]["username"], "fan");

    let following = get_json(&app, None, &format!("/api/users/{}/following", fan.id)).await;
    assert_eq!(following[0]["username"], "star");

    let response = app
        .client
        .delete(app.url(&format!("/api/users/{}/follow", star.id)))
        .bearer_auth(&fan.token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let profile = get_json(&app, None, &format!("/api/users/{}", star.id)).await;
    assert_eq!(profile["follower_count"], 0);
}

#[tokio::test]
async fn cannot_follow_yourself_or_ghosts() {
    let app = spawn_app().await;
    let user = app.signup("lonely").await;

    assert_eq!(follow(&app, &user, user.id).await.status().as_u16(), 400);
    assert_eq!(follow(&app, &user, 9999).await.status().as_u16(), 404);
}

#[tokio::test]
async fn activity_stream_shows_followed_users_only() {
    let app = spawn_app().await;
    let reader = app.signup("reader").await;
    let chef = app.signup("chef").await;
    let stranger = app.signup("stranger").await;

    follow(&app, &reader, chef.id).await;

    let recipe = app.create_recipe(&chef, recipe_body("Shakshuka", json!([]))).await;
    app.create_recipe(&stranger, recipe_body("Secret stew", json!([]))).await;

    app.client
        .post(app.url("/api/forum/posts"))
        .bearer_auth(&chef.token)
        .json(&json!({ "title": "New recipe up", "body": "Try my shakshuka" }))
        .send()
        .await
        .unwrap();

    let stream = get_json(&app, Some(&reader), "/api/activity-stream").await;
    let stream = stream.as_array().unwrap();
    assert_eq!(stream.len(), 2);
    assert_eq!(stream[0]["verb"], "created_post");
    assert_eq!(stream[1]["verb"], "created_recipe");
    assert_eq!(stream[1]["object_id"], recipe["id"]);
    assert!(stream.iter().all(|a| a["actor_username"] == "chef"));

    let response = app.client.get(app.url("/api/activity-stream")).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn activity_stream_drops_deleted_content() {
    let app = spawn_app().await;
    let reader = app.signup("reader").await;
    let chef = app.signup("chef").await;
    follow(&app, &reader, chef.id).await;

    let recipe = app.create_recipe(&chef, recipe_body("Short-lived stew", json!([]))).await;
    let post: Value = app
        .client
        .post(app.url("/api/qa/questions"))
        .bearer_auth(&chef.token)
        .json(&json!({ "title": "Stew too salty?", "body": "Help" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let response = app
        .client
        .delete(app.url(&format!("/api/recipes/{}", recipe["id"])))
        .bearer_auth(&chef.token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 204);

    let stream = get_json(&app, Some(&reader), "/api/activity-stream").await;
    let stream = stream.as_array().unwrap();
    assert_eq!(stream.len(), 1);
    assert_eq!(stream[0]["verb"], "asked_question");
    assert_eq!(stream[0]["object_id"], post["id"]);

    app.client
        .delete(app.url(&format!("/api/qa/questions/{}", post["id"])))
        .bearer_auth(&chef.token)
        .send()
        .await
        .unwrap();

    let stream = get_json(&app, Some(&reader), "/api/activity-stream").await;
    assert!(stream.as_array().unwrap().is_empty());
}
