use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use url::Url;

/// Select clause for feed items: an answer with its parent question and
/// author profile embedded, mirroring the foreign-key joins the backend
/// exposes.
pub const FEED_SELECT: &str = "*,question:questions(*),user:profiles(*)";
pub const COMMENT_SELECT: &str = "*,user:profiles(*)";
pub const QUESTION_SELECT: &str = "*,user:profiles(*)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    #[default]
    Text,
    Image,
    Video,
    Audio,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Text => "text",
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
        }
    }

    /// Classify a MIME type by its prefix; anything unrecognized is text.
    pub fn from_mime(mime: &str) -> Self {
        let mime = mime.trim().to_ascii_lowercase();
        if mime.starts_with("image/") {
            MediaKind::Image
        } else if mime.starts_with("video/") {
            MediaKind::Video
        } else if mime.starts_with("audio/") {
            MediaKind::Audio
        } else {
            MediaKind::Text
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Profile {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Profile {
    pub fn display(&self) -> &str {
        match self.display_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => &self.username,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Question {
    pub id: String,
    pub user_id: String,
    pub content: String,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// An answer joined with its parent question and author. The embedded rows
/// are optional on the wire but required for feed display; `question` and
/// `user` fall back to defaults only for rows fetched without embeds.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FeedItem {
    pub id: String,
    pub question_id: String,
    pub user_id: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub media_type: Option<MediaKind>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub question: Question,
    #[serde(default)]
    pub user: Profile,
}

impl FeedItem {
    pub fn media_kind(&self) -> MediaKind {
        match self.media_type {
            Some(kind) if self.media_url.is_some() => kind,
            _ => MediaKind::Text,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Comment {
    pub id: String,
    pub answer_id: String,
    pub user_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub user: Profile,
}

/// A question with its author and answer count, as listed on the browse
/// screen.
#[derive(Debug, Clone, Deserialize)]
pub struct QuestionSummary {
    pub id: String,
    pub user_id: String,
    pub content: String,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub user: Profile,
    #[serde(default)]
    pub answers: Vec<CountRow>,
}

impl QuestionSummary {
    pub fn answer_count(&self) -> i64 {
        self.answers.first().map(|row| row.count).unwrap_or(0)
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CountRow {
    pub count: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: i64,
    pub user: AuthUser,
}

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub base_url: String,
    pub anon_key: String,
    pub user_agent: String,
    pub http_client: Option<HttpClient>,
}

/// Blocking client for the managed backend: row reads and writes against
/// the REST surface, password auth, and object-storage uploads. Handed
/// around as `Arc<Client>`; the bearer token is swapped on login/logout.
pub struct Client {
    http: HttpClient,
    base_url: Url,
    anon_key: String,
    user_agent: String,
    bearer: RwLock<Option<String>>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.base_url.trim().is_empty() {
            bail!("backend client base url required");
        }
        if config.anon_key.trim().is_empty() {
            bail!("backend client anon key required");
        }
        if config.user_agent.trim().is_empty() {
            bail!("backend client user agent required");
        }

        let base_url = Url::parse(config.base_url.trim())
            .with_context(|| format!("backend: invalid base url {}", config.base_url))?;

        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder()
                .timeout(Duration::from_secs(20))
                .build()?,
        };

        Ok(Client {
            http,
            base_url,
            anon_key: config.anon_key,
            user_agent: config.user_agent,
            bearer: RwLock::new(None),
        })
    }

    pub fn set_bearer(&self, token: Option<String>) {
        *self.bearer.write() = token;
    }

    fn auth_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&self.anon_key) {
            headers.insert("apikey", value);
        }
        let bearer = self.bearer.read();
        let token = bearer.as_deref().unwrap_or(&self.anon_key);
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", token)) {
            headers.insert(AUTHORIZATION, value);
        }
        headers
    }

    fn rest_url(&self, table: &str) -> Result<Url> {
        self.base_url
            .join(&format!("rest/v1/{}", table))
            .with_context(|| format!("backend: build url for table {}", table))
    }

    /// Filtered, ordered, limited row read. Query pairs are raw PostgREST
    /// operators, e.g. `("user_id", "eq.abc")` or `("created_at", "lt.…")`.
    pub fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>> {
        let mut url = self.rest_url(table)?;
        for (key, value) in query {
            url.query_pairs_mut().append_pair(key, value);
        }

        let response = self
            .http
            .get(url)
            .headers(self.auth_headers())
            .header(USER_AGENT, &self.user_agent)
            .send()
            .with_context(|| format!("backend: read {}", table))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(anyhow!("backend: read {} failed: {} - {}", table, status, body));
        }

        response
            .json()
            .with_context(|| format!("backend: decode {} rows", table))
    }

    /// At most one row; tolerates duplicates by taking the first. The
    /// backend enforces no composite uniqueness for likes/follows, so this
    /// must not error on multiple matches.
    pub fn maybe_single<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>> {
        let mut query = query.to_vec();
        query.push(("limit", "1".to_string()));
        let mut rows: Vec<T> = self.select(table, &query)?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.swap_remove(0))
        })
    }

    /// Exact row count via a HEAD request; the total comes back in the
    /// Content-Range header as `*/N`.
    pub fn count(&self, table: &str, query: &[(&str, String)]) -> Result<i64> {
        let mut url = self.rest_url(table)?;
        url.query_pairs_mut().append_pair("select", "id");
        for (key, value) in query {
            url.query_pairs_mut().append_pair(key, value);
        }

        let response = self
            .http
            .head(url)
            .headers(self.auth_headers())
            .header(USER_AGENT, &self.user_agent)
            .header("Prefer", "count=exact")
            .header("Range-Unit", "items")
            .send()
            .with_context(|| format!("backend: count {}", table))?;

        if !response.status().is_success() {
            bail!("backend: count {} failed: {}", table, response.status());
        }

        let range = response
            .headers()
            .get("content-range")
            .and_then(|val| val.to_str().ok())
            .ok_or_else(|| anyhow!("backend: count {} missing content-range", table))?;
        parse_content_range_total(range)
            .ok_or_else(|| anyhow!("backend: count {} bad content-range {}", table, range))
    }

    /// Insert a single row and return its representation (with embeds when
    /// `select` names them).
    pub fn insert_returning<T: DeserializeOwned, B: Serialize>(
        &self,
        table: &str,
        body: &B,
        select: Option<&str>,
    ) -> Result<T> {
        let mut url = self.rest_url(table)?;
        if let Some(select) = select {
            url.query_pairs_mut().append_pair("select", select);
        }

        let response = self
            .http
            .post(url)
            .headers(self.auth_headers())
            .header(USER_AGENT, &self.user_agent)
            .header(CONTENT_TYPE, "application/json")
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .with_context(|| format!("backend: insert into {}", table))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().unwrap_or_default();
            return Err(anyhow!("backend: insert into {} failed: {} - {}", table, status, text));
        }

        let mut rows: Vec<T> = response
            .json()
            .with_context(|| format!("backend: decode inserted {} row", table))?;
        if rows.is_empty() {
            bail!("backend: insert into {} returned no rows", table);
        }
        Ok(rows.swap_remove(0))
    }

    /// Insert without asking for the row back (likes, follows).
    pub fn insert<B: Serialize>(&self, table: &str, body: &B) -> Result<()> {
        let url = self.rest_url(table)?;
        let response = self
            .http
            .post(url)
            .headers(self.auth_headers())
            .header(USER_AGENT, &self.user_agent)
            .header(CONTENT_TYPE, "application/json")
            .header("Prefer", "return=minimal")
            .json(body)
            .send()
            .with_context(|| format!("backend: insert into {}", table))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().unwrap_or_default();
            return Err(anyhow!("backend: insert into {} failed: {} - {}", table, status, text));
        }
        Ok(())
    }

    pub fn update<B: Serialize>(
        &self,
        table: &str,
        query: &[(&str, String)],
        body: &B,
    ) -> Result<()> {
        let mut url = self.rest_url(table)?;
        for (key, value) in query {
            url.query_pairs_mut().append_pair(key, value);
        }

        let response = self
            .http
            .patch(url)
            .headers(self.auth_headers())
            .header(USER_AGENT, &self.user_agent)
            .header(CONTENT_TYPE, "application/json")
            .header("Prefer", "return=minimal")
            .json(body)
            .send()
            .with_context(|| format!("backend: update {}", table))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().unwrap_or_default();
            return Err(anyhow!("backend: update {} failed: {} - {}", table, status, text));
        }
        Ok(())
    }

    /// Delete every row matching the filters. Deliberately not limited to
    /// one row so duplicate like/follow rows are cleared in one call.
    pub fn delete(&self, table: &str, query: &[(&str, String)]) -> Result<()> {
        if query.is_empty() {
            bail!("backend: refusing unfiltered delete on {}", table);
        }
        let mut url = self.rest_url(table)?;
        for (key, value) in query {
            url.query_pairs_mut().append_pair(key, value);
        }

        let response = self
            .http
            .delete(url)
            .headers(self.auth_headers())
            .header(USER_AGENT, &self.user_agent)
            .send()
            .with_context(|| format!("backend: delete from {}", table))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().unwrap_or_default();
            return Err(anyhow!("backend: delete from {} failed: {} - {}", table, status, text));
        }
        Ok(())
    }

    pub fn sign_up(&self, email: &str, password: &str, username: &str) -> Result<TokenGrant> {
        let url = self
            .base_url
            .join("auth/v1/signup")
            .context("backend: build signup url")?;
        let body = json!({
            "email": email,
            "password": password,
            "data": { "username": username },
        });
        self.auth_request(url, &body, "sign up")
    }

    pub fn sign_in(&self, email: &str, password: &str) -> Result<TokenGrant> {
        let mut url = self
            .base_url
            .join("auth/v1/token")
            .context("backend: build token url")?;
        url.query_pairs_mut().append_pair("grant_type", "password");
        let body = json!({ "email": email, "password": password });
        self.auth_request(url, &body, "sign in")
    }

    pub fn refresh_session(&self, refresh_token: &str) -> Result<TokenGrant> {
        let mut url = self
            .base_url
            .join("auth/v1/token")
            .context("backend: build token url")?;
        url.query_pairs_mut()
            .append_pair("grant_type", "refresh_token");
        let body = json!({ "refresh_token": refresh_token });
        self.auth_request(url, &body, "refresh session")
    }

    fn auth_request(&self, url: Url, body: &serde_json::Value, action: &str) -> Result<TokenGrant> {
        let response = self
            .http
            .post(url)
            .header("apikey", &self.anon_key)
            .header(USER_AGENT, &self.user_agent)
            .header(CONTENT_TYPE, "application/json")
            .json(body)
            .send()
            .with_context(|| format!("backend: {}", action))?;

        if !response.status().is_success() {
            let status = response.status();
            let message = response
                .json::<AuthErrorBody>()
                .ok()
                .and_then(|body| body.message())
                .unwrap_or_else(|| status.to_string());
            return Err(anyhow!("backend: {} failed: {}", action, message));
        }

        response
            .json()
            .with_context(|| format!("backend: decode {} response", action))
    }

    /// Upload bytes into the public bucket and return the resolvable URL.
    pub fn upload_object(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String> {
        let url = self
            .base_url
            .join(&format!(
                "storage/v1/object/{}/{}",
                encode_path(bucket),
                encode_path(path)
            ))
            .context("backend: build upload url")?;

        let response = self
            .http
            .post(url)
            .headers(self.auth_headers())
            .header(USER_AGENT, &self.user_agent)
            .header(CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .context("backend: upload object")?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().unwrap_or_default();
            return Err(anyhow!("backend: upload failed: {} - {}", status, text));
        }

        self.public_object_url(bucket, path)
    }

    pub fn public_object_url(&self, bucket: &str, path: &str) -> Result<String> {
        let url = self
            .base_url
            .join(&format!(
                "storage/v1/object/public/{}/{}",
                encode_path(bucket),
                encode_path(path)
            ))
            .context("backend: build public url")?;
        Ok(url.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct AuthErrorBody {
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl AuthErrorBody {
    fn message(self) -> Option<String> {
        self.msg.or(self.error_description).or(self.message)
    }
}

/// Percent-encode a storage path, keeping `/` as a segment separator.
fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| utf8_percent_encode(segment, NON_ALPHANUMERIC).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

fn parse_content_range_total(range: &str) -> Option<i64> {
    let total = range.rsplit('/').next()?;
    if total == "*" {
        return None;
    }
    total.trim().parse().ok()
}

/// PostgREST filter helpers.
pub fn eq(value: &str) -> String {
    format!("eq.{}", value)
}

pub fn lt(value: &DateTime<Utc>) -> String {
    format!("lt.{}", value.to_rfc3339())
}

pub fn order_desc(column: &str) -> (&'static str, String) {
    ("order", format!("{}.desc", column))
}

pub fn limit(n: usize) -> (&'static str, String) {
    ("limit", n.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_kind_from_mime_prefix() {
        assert_eq!(MediaKind::from_mime("image/png"), MediaKind::Image);
        assert_eq!(MediaKind::from_mime("video/mp4"), MediaKind::Video);
        assert_eq!(MediaKind::from_mime("audio/webm"), MediaKind::Audio);
        assert_eq!(MediaKind::from_mime("text/plain"), MediaKind::Text);
        assert_eq!(MediaKind::from_mime("application/pdf"), MediaKind::Text);
    }

    #[test]
    fn content_range_total() {
        assert_eq!(parse_content_range_total("0-9/57"), Some(57));
        assert_eq!(parse_content_range_total("*/3"), Some(3));
        assert_eq!(parse_content_range_total("*/*"), None);
    }

    #[test]
    fn encode_path_keeps_segments() {
        assert_eq!(
            encode_path("user-1/clip one.mp4"),
            "user%2D1/clip%20one%2Emp4"
        );
    }

    #[test]
    fn filter_helpers() {
        assert_eq!(eq("abc"), "eq.abc");
        let ts = DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert!(lt(&ts).starts_with("lt.2024-05-01T10:00:00"));
        assert_eq!(order_desc("created_at").1, "created_at.desc");
    }
}
