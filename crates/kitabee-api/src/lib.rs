//! HTTP surface of the book-club service: JSON handlers over [`kitabee_db::Database`].

pub mod auth;
pub mod badges;
pub mod books;
pub mod clubs;
pub mod convert;
pub mod error;
pub mod friends;
pub mod library;
pub mod middleware;
pub mod notifications;
pub mod profile;
pub mod state;

use axum::{
    Router, middleware as axum_middleware,
    routing::{delete, get, post, put},
};

pub use error::{ApiError, ApiResult};
pub use state::{AppState, AppStateInner};

pub async fn health() -> &'static str {
    "ok"
}

/// All routes with their state. Transport layers (CORS, tracing) are added by the binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/activate", post(auth::activate))
        .route("/auth/password-reset", post(auth::request_password_reset))
        .route("/auth/password-reset/confirm", post(auth::confirm_password_reset));

    let protected_routes = Router::new()
        .route("/me", get(profile::get_me).delete(profile::delete_me))
        .route("/me/avatar", put(profile::set_avatar))
        .route("/me/badges", get(badges::my_badges))
        .route("/library", get(library::list_library).post(library::add_to_library))
        .route(
            "/library/{book_id}",
            put(library::update_library_entry).delete(library::remove_from_library),
        )
        .route("/wishlist", get(library::list_wishlist).post(library::add_to_wishlist))
        .route("/wishlist/{book_id}", delete(library::remove_from_wishlist))
        .route("/books/search", get(books::search))
        .route("/books/{book_id}", get(books::get_book))
        .route("/friends", get(friends::list_friends))
        .route("/friends/requests", get(friends::list_requests))
        .route(
            "/friends/{user_id}",
            get(friends::friend_status).delete(friends::remove_friend),
        )
        .route("/friends/{user_id}/request", post(friends::send_request))
        .route("/friends/{user_id}/accept", post(friends::accept_request))
        .route("/friends/{user_id}/decline", post(friends::decline_request))
        .route("/friends/{user_id}/cancel", post(friends::cancel_request))
        .route("/clubs", get(clubs::list_clubs).post(clubs::create_club))
        .route("/clubs/{club_id}", get(clubs::get_club).delete(clubs::delete_club))
        .route("/clubs/{club_id}/members", get(clubs::list_members).post(clubs::add_member))
        .route("/clubs/{club_id}/members/{user_id}", delete(clubs::remove_member))
        .route("/clubs/{club_id}/leave", post(clubs::leave_club))
        .route("/clubs/{club_id}/invites", post(clubs::invite))
        .route("/clubs/{club_id}/books", get(clubs::list_books).post(clubs::add_book))
        .route("/clubs/{club_id}/books/{book_id}", delete(clubs::remove_book))
        .route(
            "/clubs/{club_id}/messages",
            get(clubs::list_messages).post(clubs::post_message),
        )
        .route("/notifications", get(notifications::list_notifications))
        .route("/notifications/{id}/read", post(notifications::mark_read))
        .route("/invites", get(notifications::list_invites))
        .route("/invites/{club_id}/accept", post(notifications::accept_invite))
        .route("/invites/{club_id}/decline", post(notifications::decline_invite))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
