// routes.rs
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::{
    handlers::{accounts, polls},
    state::AppState,
};

pub fn create_routes(state: AppState) -> Router {
    let account_routes = Router::new()
        .route("/register/", get(accounts::register_form).post(accounts::register))
        .route("/login/", get(accounts::login_form).post(accounts::login))
        .route("/logout/", get(accounts::logout).post(accounts::logout))
        .route("/profile/", get(accounts::profile))
        .route(
            "/profile/edit/",
            get(accounts::profile_edit_form).post(accounts::profile_edit),
        )
        .route(
            "/profile/delete/",
            get(accounts::profile_delete_form).post(accounts::profile_delete),
        );

    Router::new()
        .route("/", get(polls::index))
        .route("/question/{id}/", get(polls::detail))
        .route("/question/{id}/vote/", post(polls::vote))
        .route("/propose/", get(polls::propose_form).post(polls::propose))
        .route("/proposed/", get(polls::proposed_list))
        .nest("/accounts", account_routes)
        .nest_service("/media", ServeDir::new(state.media.root()))
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
