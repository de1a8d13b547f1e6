use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::{error, info};

use std::sync::Arc;

use crate::app::AppState;
use crate::observability::metrics::Metrics;
use crate::queue::JobDispatcher;
use crate::store::dao::ReviewStore;
use crate::store::models::{
    EnrichedResult, ProcessingStatus, TriggerType, is_valid_movie_id,
};

#[derive(Debug, Serialize)]
struct ResultsResponse {
    movie_id: String,
    status: &'static str,
    count: usize,
    results: Vec<EnrichedResult>,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    movie_id: String,
    status: &'static str,
    message: &'static str,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

/// What the facade should do for one lookup, decided from three reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AbsaDecision {
    /// Results exist; serve them.
    ServeResults,
    /// A job is underway; tell the caller to come back.
    AlreadyProcessing(ProcessingStatus),
    /// Pipeline finished but produced nothing to show.
    CompletedEmpty(ProcessingStatus),
    /// Kick off a job. `reset_first` clears a failed status before the
    /// processing status is written.
    Dispatch {
        trigger: TriggerType,
        reset_first: bool,
    },
}

/// Pure decision core of `GET /get_absa/{movie_id}`.
///
/// An unknown movie starts a full crawl; known movies with results are
/// served; failed movies are reset and rescored from stored reviews.
pub(crate) fn decide(
    movie_exists: bool,
    status: Option<ProcessingStatus>,
    has_absa: bool,
) -> AbsaDecision {
    if !movie_exists {
        return AbsaDecision::Dispatch {
            trigger: TriggerType::CrawlAbsa,
            reset_first: false,
        };
    }
    if has_absa {
        return AbsaDecision::ServeResults;
    }
    match status {
        Some(status) if status.is_in_progress() => AbsaDecision::AlreadyProcessing(status),
        Some(status) if status.is_completed() => AbsaDecision::CompletedEmpty(status),
        Some(status) if status.is_failed() => AbsaDecision::Dispatch {
            trigger: TriggerType::AbsaOnly,
            reset_first: true,
        },
        // NOT_STARTED, or a status row created without a recorded state.
        _ => AbsaDecision::Dispatch {
            trigger: TriggerType::AbsaOnly,
            reset_first: false,
        },
    }
}

pub(crate) async fn get_absa(
    State(state): State<AppState>,
    Path(movie_id): Path<String>,
) -> Response {
    state.telemetry().metrics().absa_requests.inc();

    if !is_valid_movie_id(&movie_id) {
        let body = Json(ErrorResponse {
            error: "movie_id must be 1-64 characters of [A-Za-z0-9_-]".into(),
        });
        return (StatusCode::BAD_REQUEST, body).into_response();
    }

    let store = state.review_store();
    let dispatcher = state.dispatcher();
    match respond(&store, &dispatcher, state.telemetry().metrics(), &movie_id).await {
        Ok(response) => response,
        Err(err) => {
            error!(movie_id, error = %err, "get_absa failed");
            let body = Json(ErrorResponse {
                error: "internal error".into(),
            });
            (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
        }
    }
}

async fn respond(
    store: &Arc<dyn ReviewStore>,
    dispatcher: &Arc<dyn JobDispatcher>,
    metrics: &Metrics,
    movie_id: &str,
) -> anyhow::Result<Response> {
    let movie_exists = store.movie_exists(movie_id).await?;
    let status = store.movie_status(movie_id).await?;
    let has_absa = store.has_absa(movie_id).await?;

    if decide(movie_exists, status, has_absa) == AbsaDecision::ServeResults {
        let results = store.fetch_absa_results(movie_id).await?;
        // A concurrent rewrite can empty the join between the EXISTS probe
        // and the fetch; fall through to the status branch in that case.
        if !results.is_empty() {
            let body = Json(ResultsResponse {
                movie_id: movie_id.to_string(),
                status: status.unwrap_or(ProcessingStatus::CompletedAbsa).as_str(),
                count: results.len(),
                results,
            });
            return Ok((StatusCode::OK, body).into_response());
        }
    }

    let response = match decide(movie_exists, status, false) {
        AbsaDecision::ServeResults => unreachable!("serve branch requires has_absa"),
        AbsaDecision::AlreadyProcessing(status) => {
            let body = Json(StatusResponse {
                movie_id: movie_id.to_string(),
                status: status.as_str(),
                message: "analysis already in progress",
            });
            (StatusCode::ACCEPTED, body).into_response()
        }
        AbsaDecision::CompletedEmpty(status) => {
            let body = Json(ResultsResponse {
                movie_id: movie_id.to_string(),
                status: status.as_str(),
                count: 0,
                results: Vec::new(),
            });
            (StatusCode::OK, body).into_response()
        }
        AbsaDecision::Dispatch {
            trigger,
            reset_first,
        } => dispatch(store, dispatcher, metrics, movie_id, trigger, reset_first).await?,
    };
    Ok(response)
}

/// Mark the movie as processing, then enqueue. The job is never awaited
/// here; the caller polls by re-requesting.
async fn dispatch(
    store: &Arc<dyn ReviewStore>,
    dispatcher: &Arc<dyn JobDispatcher>,
    metrics: &Metrics,
    movie_id: &str,
    trigger: TriggerType,
    reset_first: bool,
) -> anyhow::Result<Response> {
    if reset_first {
        store
            .upsert_movie_status(movie_id, ProcessingStatus::NotStarted, None, None)
            .await?;
    }

    let processing = trigger.processing_status();
    store
        .upsert_movie_status(movie_id, processing, None, None)
        .await?;
    dispatcher.dispatch(movie_id, trigger).await?;
    metrics.jobs_dispatched.inc();

    info!(
        movie_id,
        trigger = trigger.as_str(),
        retry = reset_first,
        "analysis dispatched"
    );
    let body = Json(StatusResponse {
        movie_id: movie_id.to_string(),
        status: processing.as_str(),
        message: if reset_first {
            "previous attempt failed, analysis restarted"
        } else {
            "analysis started"
        },
    });
    Ok((StatusCode::ACCEPTED, body).into_response())
}
