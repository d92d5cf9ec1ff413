use lapin::Channel;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{error, info};
use warp::Filter;
use warp::http::StatusCode;
use warp::reply::Reply;

use crate::database::PgStore;
use crate::github::{GithubClient, RepoInfoSource};
use crate::messaging::{ADD_QUEUE, UPDATE_QUEUE, publish_message};
use crate::models::{CrawlJob, RepoRecord};
use crate::store::Store;
use crate::trace::TraceBuffer;

#[derive(Deserialize)]
pub struct CrawlRequest {
  pub repo: String,
}

#[derive(Serialize)]
pub struct CrawlResponse {
  pub repo: String,
  pub status: String,
  pub action: String,
}

#[derive(Serialize)]
pub(crate) struct ErrorMessage {
  pub(crate) error: String,
}

/// Caller mistakes; recovered as 400 with a JSON body.
#[derive(Debug)]
pub(crate) struct BadRequest {
  pub(crate) message: String,
}
impl warp::reject::Reject for BadRequest {}

/// Failures on our side; recovered as 500.
#[derive(Debug)]
pub(crate) struct InternalError {
  pub(crate) message: String,
}
impl warp::reject::Reject for InternalError {}

fn valid_repo_name(repo: &str) -> bool {
  let re = Regex::new(r"^[\w.-]+/[\w.-]+$").unwrap();
  re.is_match(repo)
}

// Authorization header arrives as "token <value>" or "Bearer <value>".
fn parse_token(header: &str) -> Option<String> {
  let mut parts = header.splitn(2, ' ');
  let _scheme = parts.next()?;
  let token = parts.next()?.trim();
  (!token.is_empty()).then(|| token.to_string())
}

pub fn submit_route(
  store: PgStore,
  rabbit_channel: Channel,
  github: GithubClient,
  trace: Arc<TraceBuffer>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
  warp::path("repos")
    .and(warp::post())
    .and(warp::body::json())
    .and(warp::header::optional::<String>("authorization"))
    .and(with_store(store))
    .and(with_channel(rabbit_channel))
    .and(with_github(github))
    .and(with_trace(trace))
    .and_then(handle_submit)
}

fn with_store(store: PgStore) -> impl Filter<Extract = (PgStore,), Error = Infallible> + Clone {
  warp::any().map(move || store.clone())
}

fn with_channel(channel: Channel) -> impl Filter<Extract = (Channel,), Error = Infallible> + Clone {
  warp::any().map(move || channel.clone())
}

fn with_github(github: GithubClient) -> impl Filter<Extract = (GithubClient,), Error = Infallible> + Clone {
  warp::any().map(move || github.clone())
}

fn with_trace(trace: Arc<TraceBuffer>) -> impl Filter<Extract = (Arc<TraceBuffer>,), Error = Infallible> + Clone {
  warp::any().map(move || trace.clone())
}

async fn handle_submit(
  request: CrawlRequest,
  authorization: Option<String>,
  store: PgStore,
  channel: Channel,
  github: GithubClient,
  trace: Arc<TraceBuffer>,
) -> Result<warp::reply::Response, warp::Rejection> {
  if !valid_repo_name(&request.repo) {
    return Err(warp::reject::custom(BadRequest { message: "Invalid repo name".into() }));
  }
  let token = authorization
    .as_deref()
    .and_then(parse_token)
    .ok_or_else(|| warp::reject::custom(BadRequest { message: "Token header missing".into() }))?;

  let stored = store.get_by_name(&request.repo).await.map_err(|e| {
    error!("store lookup failed: {e:?}");
    warp::reject::custom(InternalError { message: "Internal error".into() })
  })?;

  let (record, queue, action) = match stored {
    Some(record) => (record, UPDATE_QUEUE, "update"),
    None => {
      let info = github.repo_info(&token, &request.repo).await.map_err(|e| {
        error!("GitHub lookup failed: {e:?}");
        warp::reject::custom(InternalError { message: "Internal error".into() })
      })?;
      let Some(info) = info else {
        let reply = warp::reply::json(&ErrorMessage { error: "Repo not on GitHub".into() });
        return Ok(warp::reply::with_status(reply, StatusCode::NOT_FOUND).into_response());
      };
      let record = RepoRecord::new(info.id, info.full_name, info.stargazers_count, info.created_at);
      (record, ADD_QUEUE, "create")
    }
  };

  let job = CrawlJob::new(&record, token);
  let payload = serde_json::to_vec(&job).map_err(|e| {
    error!("job serialization failed: {e:?}");
    warp::reject::custom(InternalError { message: "Internal error".into() })
  })?;
  publish_message(&channel, queue, &payload).await.map_err(|e| {
    error!("failed to publish {action} job for {}: {e:?}", request.repo);
    warp::reject::custom(InternalError { message: "An error occurred when publishing the job.".into() })
  })?;

  trace.record(format!("{action} {}", record.name));
  info!(repo = %record.name, action, "job queued");
  let response = CrawlResponse {
    repo: record.name,
    status: "queued".into(),
    action: action.into(),
  };
  Ok(warp::reply::json(&response).into_response())
}
