use lapin::Channel;
use std::sync::Arc;
use warp::Filter;
use warp::http::StatusCode;

use crate::database::PgStore;
use crate::github::GithubClient;
use crate::trace::TraceBuffer;

pub mod repos;
pub mod status;

use repos::{BadRequest, ErrorMessage, InternalError};

pub fn routes(
  store: PgStore,
  rabbit_channel: Channel,
  github: GithubClient,
  trace: Arc<TraceBuffer>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
  repos::submit_route(store, rabbit_channel, github, trace.clone())
    .or(status::status_route(trace))
    .recover(handle_rejection)
}

// Caller mistakes come back as 400 with a JSON body, our own failures as
// 500; anything else falls through to warp's default handling.
async fn handle_rejection(err: warp::Rejection) -> Result<impl warp::Reply, warp::Rejection> {
  if let Some(bad) = err.find::<BadRequest>() {
    let reply = warp::reply::json(&ErrorMessage { error: bad.message.clone() });
    return Ok(warp::reply::with_status(reply, StatusCode::BAD_REQUEST));
  }
  if let Some(internal) = err.find::<InternalError>() {
    let reply = warp::reply::json(&ErrorMessage { error: internal.message.clone() });
    return Ok(warp::reply::with_status(reply, StatusCode::INTERNAL_SERVER_ERROR));
  }
  Err(err)
}
