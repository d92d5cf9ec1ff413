use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use warp::Filter;

use crate::trace::TraceBuffer;

#[derive(Serialize)]
struct StatusResponse {
  recent_jobs: Vec<String>,
}

pub fn status_route(
  trace: Arc<TraceBuffer>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
  warp::path("status")
    .and(warp::get())
    .and(with_trace(trace))
    .and_then(handle_status)
}

fn with_trace(trace: Arc<TraceBuffer>) -> impl Filter<Extract = (Arc<TraceBuffer>,), Error = Infallible> + Clone {
  warp::any().map(move || trace.clone())
}

async fn handle_status(trace: Arc<TraceBuffer>) -> Result<impl warp::Reply, warp::Rejection> {
  Ok(warp::reply::json(&StatusResponse { recent_jobs: trace.recent() }))
}
