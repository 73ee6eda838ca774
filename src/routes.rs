// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{delete, get, post, put},
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    docs,
    handlers::{activity, admin, auth, board, ingredient, profile, recipe, report},
    models::board::{Board, Forum, Qa},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Thread, reply and vote routes of one board.
///
/// `threads` and `replies` are the path segments, e.g. `posts`/`comments`.
fn board_routes<B: Board>(threads: &str, replies: &str) -> Router<AppState> {
    Router::new()
        .route(
            &format!("/{threads}"),
            get(board::list_threads::<B>).post(board::create_thread::<B>),
        )
        .route(
            &format!("/{threads}/{{id}}"),
            get(board::get_thread::<B>)
                .put(board::update_thread::<B>)
                .delete(board::delete_thread::<B>),
        )
        .route(
            &format!("/{threads}/{{id}}/vote"),
            post(board::vote_thread::<B>).delete(board::unvote_thread::<B>),
        )
        .route(
            &format!("/{threads}/{{id}}/{replies}"),
            get(board::list_replies::<B>).post(board::create_reply::<B>),
        )
        .route(
            &format!("/{replies}/{{id}}"),
            put(board::update_reply::<B>).delete(board::delete_reply::<B>),
        )
        .route(
            &format!("/{replies}/{{id}}/vote"),
            post(board::vote_reply::<B>).delete(board::unvote_reply::<B>),
        )
}

/// Assembles the main application router.
///
/// * Merges all sub-routers (auth, users, recipes, boards, reports, admin).
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (pool, config, mailer).
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin([
            HeaderValue::from_static("http://localhost:3000"),
            HeaderValue::from_static("http://127.0.0.1:3000"),
        ])
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login));

    let password_reset_routes = Router::new()
        .route("/request", post(auth::request_password_reset))
        .route("/verify", post(auth::verify_reset_code))
        .route("/confirm", post(auth::confirm_password_reset));

    let user_routes = Router::new()
        .route("/me", get(profile::get_me).put(profile::update_me))
        .route("/me/bookmarks", get(profile::list_my_bookmarks))
        .route("/me/likes", get(profile::list_my_likes))
        .route("/{id}", get(profile::get_user))
        .route(
            "/{id}/follow",
            post(profile::follow_user).delete(profile::unfollow_user),
        )
        .route("/{id}/followers", get(profile::list_followers))
        .route("/{id}/following", get(profile::list_following));

    let ingredient_routes = Router::new()
        .route("/", get(ingredient::list_ingredients))
        .route("/{id}", get(ingredient::get_ingredient));

    let recipe_routes = Router::new()
        .route("/", get(recipe::list_recipes).post(recipe::create_recipe))
        .route(
            "/{id}",
            get(recipe::get_recipe)
                .put(recipe::update_recipe)
                .delete(recipe::delete_recipe),
        )
        .route("/{id}/ingredients", post(recipe::add_ingredient))
        .route(
            "/{id}/ingredients/{ingredient_id}",
            delete(recipe::remove_ingredient),
        )
        .route("/{id}/costs", get(recipe::recipe_costs))
        .route(
            "/{id}/like",
            post(recipe::like_recipe).delete(recipe::unlike_recipe),
        )
        .route(
            "/{id}/bookmark",
            post(recipe::bookmark_recipe).delete(recipe::unbookmark_recipe),
        )
        .route(
            "/{id}/rating",
            put(recipe::rate_recipe).delete(recipe::delete_rating),
        )
        .route(
            "/{id}/health-rating",
            put(recipe::rate_health).delete(recipe::delete_health_rating),
        );

    // Auth first, then the admin check.
    let admin_guard = ServiceBuilder::new()
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .layer(middleware::from_fn(admin_middleware));

    let report_routes = Router::new()
        .route("/reports", post(report::create_report))
        .route("/reports/", post(report::create_report))
        .route("/reports/mine", get(report::list_my_reports))
        .merge(
            Router::new()
                .route("/reports/admin", get(report::list_reports))
                .route("/reports/admin/{id}/resolve", post(report::resolve_report))
                .layer(admin_guard.clone()),
        );

    let admin_routes = Router::new()
        .route("/users", get(admin::list_users))
        .route("/users/{id}/role", put(admin::update_user_role))
        .route("/ingredients", post(ingredient::create_ingredient))
        .route("/ingredients/{id}", put(ingredient::update_ingredient))
        .layer(admin_guard);

    Router::new()
        .nest("/api/auth", auth_routes)
        // Short aliases kept for existing clients.
        .route("/api/register/", post(auth::register))
        .route("/api/login/", post(auth::login))
        .nest("/api/password-reset", password_reset_routes)
        .nest("/api/users", user_routes)
        .nest("/api/ingredients", ingredient_routes)
        .nest("/api/recipes", recipe_routes)
        .nest("/api/forum", board_routes::<Forum>("posts", "comments"))
        .nest("/api/qa", board_routes::<Qa>("questions", "answers"))
        .route("/api/activity-stream", get(activity::activity_stream))
        .merge(report_routes)
        .nest("/api/admin", admin_routes)
        .route("/api-docs/openapi.json", get(docs::openapi_json))
        // Global Middleware (applied from outside in)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
