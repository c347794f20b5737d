#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! HTTP serving of mirrored distributions
//!
//! Maps `GET /{base_path}/{relative_path}` onto catalog resolution and a
//! content store stream. Every byte that leaves this router passed digest
//! verification when it entered the store; the serving path never fetches
//! from upstream directly except through the on-demand single-flight
//! delegation in the sync layer.
//!
//! Verification failures are invisible to clients: a unit that failed to
//! mirror simply does not exist here (404). A catalog entry whose blob is
//! missing from the store is a consistency violation and answers 500, not
//! 404, so corruption never masquerades as absence.

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use depot_errors::{CatalogError, Error, FetchError, StorageError};
use depot_sync::MirrorService;
use depot_types::{ContentUnit, Distribution};
use std::net::SocketAddr;
use tokio_util::io::ReaderStream;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Build the serving router over a mirror service.
///
/// Distributions are matched per request, so ones created after the router
/// is running are served without a restart.
#[must_use]
pub fn router(service: MirrorService) -> Router {
    Router::new()
        .fallback(get(serve_unit))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

/// Bind and serve until the task is dropped
///
/// # Errors
/// Returns an error if the listener cannot bind.
pub async fn serve(addr: SocketAddr, service: MirrorService) -> Result<(), Error> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "distribution server listening");
    axum::serve(listener, router(service))
        .await
        .map_err(|e| Error::internal(format!("server failed: {e}")))
}

async fn serve_unit(State(service): State<MirrorService>, uri: Uri) -> Response {
    match resolve_request(&service, uri.path()).await {
        Ok((unit, response)) => {
            info!(path = %unit.relative_path, size = unit.size, "serving unit");
            response
        }
        Err(rejection) => rejection.into_response(),
    }
}

enum Rejection {
    NotFound,
    /// Catalog and store disagree; alert instead of a silent 404
    Inconsistent(String),
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        match self {
            Self::NotFound => (StatusCode::NOT_FOUND, "not found").into_response(),
            Self::Inconsistent(message) => {
                error!(message, "store/catalog inconsistency while serving");
                (StatusCode::INTERNAL_SERVER_ERROR, "store inconsistency").into_response()
            }
        }
    }
}

async fn resolve_request(
    service: &MirrorService,
    request_path: &str,
) -> Result<(ContentUnit, Response), Rejection> {
    let Some(distribution) = service.resolve_distribution(request_path) else {
        return Err(Rejection::NotFound);
    };
    let Some(relative_path) = distribution.relative_path(request_path) else {
        return Err(Rejection::NotFound);
    };

    let unit = resolve_unit(service, &distribution, relative_path).await?;

    let (file, len) = match service.store().open(&unit.store_key).await {
        Ok(opened) => opened,
        Err(Error::Storage(StorageError::NotPresent { key })) => {
            return Err(Rejection::Inconsistent(format!(
                "unit {relative_path} references missing blob {key}"
            )));
        }
        Err(e) => return Err(Rejection::Inconsistent(e.to_string())),
    };

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_LENGTH, len)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(|e| Rejection::Inconsistent(e.to_string()))?;

    Ok((unit, response))
}

async fn resolve_unit(
    service: &MirrorService,
    distribution: &Distribution,
    relative_path: &str,
) -> Result<ContentUnit, Rejection> {
    match service.resolve_unit(distribution, relative_path).await {
        Ok(unit) => Ok(unit),
        Err(Error::Catalog(CatalogError::UnitNotFound { .. })
        | Error::Fetch(FetchError::NotFound { .. })) => Err(Rejection::NotFound),
        Err(Error::Storage(StorageError::NotPresent { key })) => Err(Rejection::Inconsistent(
            format!("unit {relative_path} references missing blob {key}"),
        )),
        Err(e) => {
            // On-demand mirroring failed; the unit is simply not available
            warn!(relative_path, error = %e, "unit unavailable");
            Err(Rejection::NotFound)
        }
    }
}
