use std::time::Duration;

use anyhow::bail;
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::{debug, warn};

use kitabee_types::api::Claims;
use kitabee_types::models::{BookMetadata, BookSnapshot};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const MAX_SEARCH_RESULTS: u32 = 40;
const MAX_BOOK_ID_CHARS: usize = 64;

/// Volume ids are short ASCII tokens of letters, digits, `_` and `-`.
pub fn valid_book_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_BOOK_ID_CHARS
        && id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Client for the Google Books volumes API.
///
/// Lookups are best effort: transport errors, bad statuses and undecodable
/// bodies are logged and come back as `None` or an empty list.
#[derive(Debug, Clone)]
pub struct BookClient {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
}

impl BookClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let base_url = Url::parse(&base_url.into())?;
        if base_url.cannot_be_a_base() {
            bail!("book API URL '{}' cannot hold a path", base_url);
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    /// `base_url` with `segments` appended, each one percent-encoded as a
    /// single path segment.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Looks up one volume. Ids that are not plain volume ids are refused
    /// without a request.
    pub async fn volume(&self, google_book_id: &str) -> Option<BookMetadata> {
        if !valid_book_id(google_book_id) {
            debug!(google_book_id, "Refusing book lookup for malformed id");
            return None;
        }
        let url = self.endpoint(&["volumes", google_book_id]);
        let volume: Volume = self.get_json(url, &[]).await?;
        Some(volume.into_metadata())
    }

    pub async fn search(&self, query: &str, limit: u32) -> Vec<BookMetadata> {
        let url = self.endpoint(&["volumes"]);
        let max = limit.clamp(1, MAX_SEARCH_RESULTS).to_string();
        let list: Option<VolumeList> = self
            .get_json(url, &[("q", query), ("maxResults", max.as_str())])
            .await;
        list.and_then(|l| l.items)
            .unwrap_or_default()
            .into_iter()
            .map(Volume::into_metadata)
            .collect()
    }

    /// Fills the fields a client left out from the API. The caller's values win.
    pub async fn complete(&self, mut snapshot: BookSnapshot) -> BookSnapshot {
        if snapshot.title.is_some()
            && snapshot.authors.is_some()
            && snapshot.thumbnail.is_some()
        {
            return snapshot;
        }
        if let Some(found) = self.volume(&snapshot.google_book_id).await {
            let found = found.snapshot();
            snapshot.title = snapshot.title.or(found.title);
            snapshot.authors = snapshot.authors.or(found.authors);
            snapshot.thumbnail = snapshot.thumbnail.or(found.thumbnail);
        }
        snapshot
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: Url,
        query: &[(&str, &str)],
    ) -> Option<T> {
        let url = endpoint.as_str();
        let mut request = self.client.get(endpoint.clone()).query(query);
        if let Some(key) = &self.api_key {
            request = request.query(&[("key", key.as_str())]);
        }

        debug!(url, "Book API request");
        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(url, "Book API unreachable: {}", e);
                return None;
            }
        };
        if !response.status().is_success() {
            warn!(url, status = %response.status(), "Book API returned error");
            return None;
        }
        match response.json::<T>().await {
            Ok(body) => Some(body),
            Err(e) => {
                warn!(url, "Book API response not decodable: {}", e);
                None
            }
        }
    }
}

// -- Wire format --

#[derive(Debug, Deserialize)]
struct VolumeList {
    items: Option<Vec<Volume>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Volume {
    id: String,
    #[serde(default)]
    volume_info: VolumeInfo,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VolumeInfo {
    title: Option<String>,
    #[serde(default)]
    authors: Vec<String>,
    description: Option<String>,
    #[serde(default)]
    categories: Vec<String>,
    image_links: Option<ImageLinks>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageLinks {
    thumbnail: Option<String>,
    small_thumbnail: Option<String>,
}

impl Volume {
    fn into_metadata(self) -> BookMetadata {
        let info = self.volume_info;
        let thumbnail = info
            .image_links
            .and_then(|l| l.thumbnail.or(l.small_thumbnail))
            .map(|url| secure_url(&url));
        BookMetadata {
            google_book_id: self.id,
            title: info.title,
            authors: info.authors,
            thumbnail,
            description: info.description,
            categories: info.categories,
        }
    }
}

fn secure_url(url: &str) -> String {
    match url.strip_prefix("http://") {
        Some(rest) => format!("https://{rest}"),
        None => url.to_string(),
    }
}

// -- Handlers --

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    10
}

/// Title autocomplete. Blank queries return nothing without calling out.
pub async fn search(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
    Query(query): Query<SearchQuery>,
) -> Json<Vec<BookMetadata>> {
    let q = query.q.trim();
    if q.is_empty() {
        return Json(Vec::new());
    }
    Json(state.books.search(q, query.limit).await)
}

pub async fn get_book(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
    Path(book_id): Path<String>,
) -> ApiResult<Json<BookMetadata>> {
    if !valid_book_id(&book_id) {
        return Err(ApiError::invalid("malformed book id"));
    }
    state
        .books
        .volume(&book_id)
        .await
        .map(Json)
        .ok_or(ApiError::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// One-shot HTTP server: answers the first request with `response` and
    /// yields that request's first line.
    async fn serve_once(response: String) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}/books/v1/", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let n = socket.read(&mut buf).await.unwrap();
            socket.write_all(response.as_bytes()).await.unwrap();
            let request = String::from_utf8_lossy(&buf[..n]).into_owned();
            request.lines().next().unwrap_or_default().to_string()
        });
        (base, handle)
    }

    #[test]
    fn volume_json_maps_to_metadata() {
        let raw = r#"{
            "id": "abc123",
            "volumeInfo": {
                "title": "Dune",
                "authors": ["Frank Herbert"],
                "categories": ["Fiction"],
                "imageLinks": { "smallThumbnail": "http://books.example/s.jpg" }
            }
        }"#;
        let volume: Volume = serde_json::from_str(raw).unwrap();
        let meta = volume.into_metadata();
        assert_eq!(meta.google_book_id, "abc123");
        assert_eq!(meta.title.as_deref(), Some("Dune"));
        assert_eq!(meta.thumbnail.as_deref(), Some("https://books.example/s.jpg"));
        assert!(meta.description.is_none());
    }

    #[test]
    fn empty_search_result_has_no_items() {
        let raw = r#"{"kind": "books#volumes", "totalItems": 0}"#;
        let list: VolumeList = serde_json::from_str(raw).unwrap();
        assert!(list.items.is_none());
    }

    #[tokio::test]
    async fn unreachable_api_degrades_to_nothing() {
        let client = BookClient::new("http://127.0.0.1:9", None, Duration::from_secs(1)).unwrap();
        assert!(client.volume("abc").await.is_none());
        assert!(client.search("dune", 5).await.is_empty());

        let snapshot = BookSnapshot {
            google_book_id: "abc".into(),
            title: Some("Kept".into()),
            ..Default::default()
        };
        assert_eq!(client.complete(snapshot.clone()).await, snapshot);
    }

    #[test]
    fn book_ids_are_plain_tokens() {
        assert!(valid_book_id("zyTCAlFPjgYC"));
        assert!(valid_book_id("a_b-9"));
        assert!(!valid_book_id(""));
        assert!(!valid_book_id("../../admin/users"));
        assert!(!valid_book_id("abc?q=injected&"));
        assert!(!valid_book_id("abc#frag"));
        assert!(!valid_book_id(&"a".repeat(MAX_BOOK_ID_CHARS + 1)));
    }

    #[tokio::test]
    async fn lookup_stays_under_the_volumes_path() {
        let body = r#"{"id": "abc123", "volumeInfo": {"title": "Dune"}}"#;
        let response = format!(
            "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\n\
             content-length: {}\r\nconnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        let (base, server) = serve_once(response).await;
        let client = BookClient::new(base, Some("SECRET".into()), Duration::from_secs(2)).unwrap();

        let found = client.volume("abc123").await.unwrap();
        assert_eq!(found.title.as_deref(), Some("Dune"));
        let request_line = server.await.unwrap();
        assert!(
            request_line.starts_with("GET /books/v1/volumes/abc123?key=SECRET "),
            "{request_line}"
        );
    }

    #[tokio::test]
    async fn malformed_ids_never_reach_the_api() {
        let not_found = "HTTP/1.1 404 Not Found\r\ncontent-length: 0\r\nconnection: close\r\n\r\n";
        let (base, server) = serve_once(not_found.to_string()).await;
        let client = BookClient::new(base, Some("SECRET".into()), Duration::from_secs(2)).unwrap();

        assert!(client.volume("../../admin/users?x=1").await.is_none());
        assert!(client.volume("abc?q=injected&").await.is_none());
        assert!(!server.is_finished());

        // the listener still sees a well-formed search as the first request
        assert!(client.search("dune", 5).await.is_empty());
        let request_line = server.await.unwrap();
        assert!(
            request_line.starts_with("GET /books/v1/volumes?q=dune&maxResults=5&key=SECRET "),
            "{request_line}"
        );
    }

    #[test]
    fn endpoint_encodes_each_segment() {
        let client = BookClient::new(
            "https://books.example/books/v1/",
            None,
            Duration::from_secs(1),
        )
        .unwrap();
        let url = client.endpoint(&["volumes", "a/b?c"]);
        assert_eq!(url.as_str(), "https://books.example/books/v1/volumes/a%2Fb%3Fc");
    }
}
