// tests/common/mod.rs
#![allow(dead_code)]

use std::str::FromStr;
use std::sync::Arc;

use fithub::{
    config::Config,
    routes,
    state::AppState,
    utils::mail::{Mailer, MemoryMailer},
};
use serde_json::{Value, json};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

pub struct TestApp {
    pub address: String,
    pub pool: SqlitePool,
    pub mailer: MemoryMailer,
    pub client: reqwest::Client,
}

/// A signed-in test user.
pub struct TestUser {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub token: String,
}

/// App state over a fresh in-memory database, plus the mailer it records to.
pub async fn test_state() -> (AppState, MemoryMailer) {
    let mailer = MemoryMailer::new();
    let state = state_with_mailer(Arc::new(mailer.clone())).await;
    (state, mailer)
}

/// App state over a fresh in-memory database sending mail through `mailer`.
pub async fn state_with_mailer(mailer: Arc<dyn Mailer>) -> AppState {
    // One connection that never recycles: the in-memory database lives
    // exactly as long as that connection.
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .expect("Invalid SQLite URL")
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .expect("Failed to open in-memory SQLite");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    let config = Config {
        database_url: "sqlite::memory:".to_string(),
        jwt_secret: "test_secret_for_integration_tests".to_string(),
        jwt_expiration: 600,
        rust_log: "error".to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
        admin_username: None,
        admin_password: None,
        admin_email: None,
        login_max_attempts: 3,
        login_lockout_seconds: 900,
        reset_code_ttl_seconds: 600,
        reset_token_ttl_seconds: 900,
        smtp: None,
    };

    AppState {
        pool,
        config,
        mailer,
    }
}

/// Spawns the app on a random port over a fresh in-memory database.
pub async fn spawn_app() -> TestApp {
    let (state, mailer) = test_state().await;
    serve(state, mailer).await
}

/// Like `spawn_app`, but mail goes through `mailer`; `TestApp::mailer` stays empty.
pub async fn spawn_app_with_mailer(mailer: Arc<dyn Mailer>) -> TestApp {
    let state = state_with_mailer(mailer).await;
    serve(state, MemoryMailer::new()).await
}

async fn serve(state: AppState, mailer: MemoryMailer) -> TestApp {
    let pool = state.pool.clone();

    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        address,
        pool,
        mailer,
        client: reqwest::Client::new(),
    }
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub async fn login(&self, username: &str, password: &str) -> reqwest::Response {
        self.client
            .post(self.url("/api/auth/login"))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Registers a plain user, gives it `role` directly in the database and
    /// logs in so the token carries that role.
    pub async fn signup_as(&self, username: &str, role: &str) -> TestUser {
        let email = format!("{}@example.com", username.to_lowercase());
        let response = self
            .client
            .post(self.url("/api/auth/register"))
            .json(&json!({
                "username": username,
                "email": email,
                "password": "password123"
            }))
            .send()
            .await
            .expect("Failed to execute request");
        assert_eq!(response.status().as_u16(), 201, "register {}", username);
        let body: Value = response.json().await.unwrap();
        let id = body["id"].as_i64().unwrap();

        if role != "user" {
            sqlx::query("UPDATE users SET role = $1 WHERE id = $2")
                .bind(role)
                .bind(id)
                .execute(&self.pool)
                .await
                .unwrap();
        }

        let response = self.login(username, "password123").await;
        assert_eq!(response.status().as_u16(), 200);
        let body: Value = response.json().await.unwrap();

        TestUser {
            id,
            username: username.to_string(),
            email,
            token: body["token"].as_str().unwrap().to_string(),
        }
    }

    pub async fn signup(&self, username: &str) -> TestUser {
        self.signup_as(username, "user").await
    }

    /// Adds a catalogue entry priced per 100 g.
    pub async fn seed_ingredient(
        &self,
        name: &str,
        macros: [f64; 4],
        prices: Value,
        allergens: Value,
    ) -> i64 {
        sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO ingredients
                (name, category, allergens, dietary_info, base_quantity, base_unit,
                 calories, protein, fat, carbs, prices, created_at)
            VALUES ($1, 'pantry', $2, '[]', 100, 'g', $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(name)
        .bind(allergens.to_string())
        .bind(macros[0])
        .bind(macros[1])
        .bind(macros[2])
        .bind(macros[3])
        .bind(prices.to_string())
        .bind(chrono::Utc::now())
        .fetch_one(&self.pool)
        .await
        .unwrap()
    }

    /// Creates a recipe through the API and returns its JSON.
    pub async fn create_recipe(&self, user: &TestUser, body: Value) -> Value {
        let response = self
            .client
            .post(self.url("/api/recipes"))
            .bearer_auth(&user.token)
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request");
        assert_eq!(response.status().as_u16(), 201);
        response.json().await.unwrap()
    }
}

/// Minimal valid recipe body.
pub fn recipe_body(name: &str, lines: Value) -> Value {
    json!({
        "name": name,
        "steps": ["Mix everything", "Serve"],
        "prep_time": 5,
        "cook_time": 10,
        "meal_type": "breakfast",
        "servings": 2,
        "ingredients": lines
    })
}
