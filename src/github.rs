use async_trait::async_trait;
use chrono::DateTime;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_API_URL: &str = "https://api.github.com";

// GitHub only includes starred_at when asked for the star media type.
const STAR_ACCEPT: &str = "application/vnd.github.v3.star+json";

#[derive(Debug, Error)]
pub enum FetchError {
  #[error("request failed: {0}")]
  Http(#[from] reqwest::Error),
  #[error("unexpected status {status} from {url}")]
  Status { status: StatusCode, url: String },
  #[error("bad starred_at timestamp {raw:?}: {source}")]
  Timestamp {
    raw: String,
    #[source]
    source: chrono::ParseError,
  },
}

/// Metadata about a repository as GitHub reports it.
#[derive(Debug, Clone, Deserialize)]
pub struct GithubRepoInfo {
  pub id: i64,
  pub full_name: String,
  pub stargazers_count: i64,
  pub created_at: String,
}

#[derive(Debug, Deserialize)]
struct Stargazer {
  starred_at: String,
}

/// Looks up repository metadata. A missing repository is `Ok(None)`,
/// not an error.
#[async_trait]
pub trait RepoInfoSource: Send + Sync {
  async fn repo_info(&self, token: &str, repo: &str) -> Result<Option<GithubRepoInfo>, FetchError>;
}

/// Fetches one stargazers page and returns its star timestamps in epoch
/// seconds, in the order GitHub lists them.
#[async_trait]
pub trait StarPageFetcher: Send + Sync {
  async fn fetch_page(&self, url: &str, page: usize, token: &str) -> Result<Vec<i64>, FetchError>;
}

#[derive(Debug, Clone)]
pub struct GithubClient {
  http: reqwest::Client,
  base_url: String,
}

impl GithubClient {
  pub fn new(base_url: &str) -> Result<Self, reqwest::Error> {
    let http = reqwest::Client::builder()
      .user_agent(concat!("stargraph/", env!("CARGO_PKG_VERSION")))
      .timeout(Duration::from_secs(30))
      .build()?;
    Ok(Self { http, base_url: base_url.trim_end_matches('/').to_string() })
  }

  pub fn stargazers_url(&self, repo_id: i64) -> String {
    stargazers_url(&self.base_url, repo_id)
  }

  fn authorized(&self, url: &str, token: &str) -> reqwest::RequestBuilder {
    let mut req = self.http.get(url);
    if !token.is_empty() {
      req = req.header("Authorization", format!("token {token}"));
    }
    req
  }
}

/// Listing endpoint for a repository's stargazers. Built from the numeric
/// repository id, which is stable across renames.
pub fn stargazers_url(api_base: &str, repo_id: i64) -> String {
  format!("{}/repositories/{}/stargazers", api_base.trim_end_matches('/'), repo_id)
}

/// Appends the page query parameter, using `&` when the URL already
/// carries a query string.
pub fn page_url(base: &str, page: usize) -> String {
  if base.contains('?') {
    format!("{base}&page={page}")
  } else {
    format!("{base}?page={page}")
  }
}

#[async_trait]
impl RepoInfoSource for GithubClient {
  async fn repo_info(&self, token: &str, repo: &str) -> Result<Option<GithubRepoInfo>, FetchError> {
    let url = format!("{}/repos/{}", self.base_url, repo);
    let resp = self.authorized(&url, token).send().await?;
    if resp.status() == StatusCode::NOT_FOUND {
      return Ok(None);
    }
    if !resp.status().is_success() {
      return Err(FetchError::Status { status: resp.status(), url });
    }
    let info = resp.json::<GithubRepoInfo>().await?;
    Ok(Some(info))
  }
}

#[async_trait]
impl StarPageFetcher for GithubClient {
  async fn fetch_page(&self, url: &str, page: usize, token: &str) -> Result<Vec<i64>, FetchError> {
    let url = page_url(url, page);
    let resp = self
      .authorized(&url, token)
      .header("Accept", STAR_ACCEPT)
      .send()
      .await?;
    if !resp.status().is_success() {
      return Err(FetchError::Status { status: resp.status(), url });
    }
    let stars = resp.json::<Vec<Stargazer>>().await?;
    stars
      .into_iter()
      .map(|star| {
        DateTime::parse_from_rfc3339(&star.starred_at)
          .map(|t| t.timestamp())
          .map_err(|source| FetchError::Timestamp { raw: star.starred_at, source })
      })
      .collect()
  }
}
