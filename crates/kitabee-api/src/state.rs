use std::sync::Arc;

use kitabee_db::Database;

use crate::books::BookClient;
use crate::error::ApiResult;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub books: BookClient,
}

impl AppStateInner {
    pub fn new(db: Database, jwt_secret: String, books: BookClient) -> AppState {
        Arc::new(Self {
            db,
            jwt_secret,
            books,
        })
    }
}

/// Runs blocking datastore work off the async runtime.
pub(crate) async fn blocking<F, T>(state: &AppState, f: F) -> ApiResult<T>
where
    F: FnOnce(&Database) -> ApiResult<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db)).await?
}
