// tests/report_tests.rs

mod common;

use common::{TestApp, TestUser, recipe_body, spawn_app};
use serde_json::{Value, json};

async fn report(app: &TestApp, user: &TestUser, content_type: &str, object_id: i64) -> reqwest::Response {
    app.client
        .post(app.url("/reports/"))
        .bearer_auth(&user.token)
        .json(&json!({
            "content_type": content_type,
            "object_id": object_id,
            "reason": "spam",
            "description": "Buy my pills"
        }))
        .send()
        .await
        .unwrap()
}

async fn resolve(app: &TestApp, admin: &TestUser, report_id: i64, action: &str) -> reqwest::Response {
    app.client
        .post(app.url(&format!("/reports/admin/{}/resolve", report_id)))
        .bearer_auth(&admin.token)
        .json(&json!({ "action": action }))
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn one_pending_report_per_target() {
    let app = spawn_app().await;
    let chef = app.signup("chef").await;
    let reporter = app.signup("reporter").await;
    let recipe = app.create_recipe(&chef, recipe_body("Spam salad", json!([]))).await;
    let id = recipe["id"].as_i64().unwrap();

    let response = report(&app, &reporter, "recipe", id).await;
    assert_eq!(response.status().as_u16(), 201);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "pending");

    let response = report(&app, &reporter, "recipe", id).await;
    assert_eq!(response.status().as_u16(), 409);

    let response = report(&app, &reporter, "forum_post", 4242).await;
    assert_eq!(response.status().as_u16(), 404);

    let mine: Value = app
        .client
        .get(app.url("/reports/mine"))
        .bearer_auth(&reporter.token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(mine.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn moderation_queue_is_admin_only() {
    let app = spawn_app().await;
    let user = app.signup("plain").await;

    let response = app
        .client
        .get(app.url("/reports/admin"))
        .bearer_auth(&user.token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);

    let response = app.client.get(app.url("/reports/admin")).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn dismissing_keeps_the_content() {
    let app = spawn_app().await;
    let chef = app.signup("chef").await;
    let reporter = app.signup("reporter").await;
    let admin = app.signup_as("boss", "admin").await;
    let id = app.create_recipe(&chef, recipe_body("Fine soup", json!([]))).await["id"]
        .as_i64()
        .unwrap();

    let report_id = report(&app, &reporter, "recipe", id).await.json::<Value>().await.unwrap()["id"]
        .as_i64()
        .unwrap();

    let response = resolve(&app, &admin, report_id, "dismiss").await;
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "resolved");
    assert_eq!(body["resolution"], "dismissed");
    assert_eq!(body["resolved_by"], admin.id);

    // Resolved is final.
    let response = resolve(&app, &admin, report_id, "remove_content").await;
    assert_eq!(response.status().as_u16(), 409);

    let response = app.client.get(app.url(&format!("/api/recipes/{}", id))).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 200);

    // Once resolved, the same reporter may report again.
    let response = report(&app, &reporter, "recipe", id).await;
    assert_eq!(response.status().as_u16(), 201);
}

#[tokio::test]
async fn removing_content_soft_deletes_and_closes_sibling_reports() {
    let app = spawn_app().await;
    let author = app.signup("author").await;
    let first = app.signup("first").await;
    let second = app.signup("second").await;
    let admin = app.signup_as("boss", "admin").await;

    let post: Value = app
        .client
        .post(app.url("/api/forum/posts"))
        .bearer_auth(&author.token)
        .json(&json!({ "title": "Cheap pills", "body": "Visit my site" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let post_id = post["id"].as_i64().unwrap();

    let first_report = report(&app, &first, "forum_post", post_id).await.json::<Value>().await.unwrap();
    report(&app, &second, "forum_post", post_id).await;

    let pending: Value = app
        .client
        .get(app.url("/reports/admin?status=pending"))
        .bearer_auth(&admin.token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(pending.as_array().unwrap().len(), 2);

    let response = resolve(&app, &admin, first_report["id"].as_i64().unwrap(), "remove_content").await;
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["resolution"], "content_removed");

    let response = app
        .client
        .get(app.url(&format!("/api/forum/posts/{}", post_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);

    let pending: Value = app
        .client
        .get(app.url("/reports/admin?status=pending"))
        .bearer_auth(&admin.token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(pending.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn admin_changes_roles() {
    let app = spawn_app().await;
    let user = app.signup("promote_me").await;
    let admin = app.signup_as("boss", "admin").await;

    let response = app
        .client
        .put(app.url(&format!("/api/admin/users/{}/role", user.id)))
        .bearer_auth(&admin.token)
        .json(&json!({ "role": "dietitian" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["role"], "dietitian");

    let response = app
        .client
        .put(app.url(&format!("/api/admin/users/{}/role", admin.id)))
        .bearer_auth(&admin.token)
        .json(&json!({ "role": "user" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    let response = app
        .client
        .put(app.url("/api/admin/users/9999/role"))
        .bearer_auth(&admin.token)
        .json(&json!({ "role": "user" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn demoted_admin_loses_access_before_token_expires() {
    let app = spawn_app().await;
    let boss = app.signup_as("boss", "admin").await;
    let deputy = app.signup_as("deputy", "admin").await;

    let response = app
        .client
        .get(app.url("/reports/admin"))
        .bearer_auth(&deputy.token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let response = app
        .client
        .put(app.url(&format!("/api/admin/users/{}/role", deputy.id)))
        .bearer_auth(&boss.token)
        .json(&json!({ "role": "user" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    // Same token as before the demotion.
    let response = app
        .client
        .get(app.url("/reports/admin"))
        .bearer_auth(&deputy.token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);

    let response = app
        .client
        .put(app.url(&format!("/api/admin/users/{}/role", boss.id)))
        .bearer_auth(&deputy.token)
        .json(&json!({ "role": "user" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);
}
