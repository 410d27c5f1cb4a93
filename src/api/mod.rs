//! HTTP surface: bookings, rooms, health.
//!
//! Every route is served at the root and mirrored under `/api`.

mod dto;
mod error;
mod extract;
mod handlers;

pub use dto::{BookingCreatedResponse, BookingView, CreateBookingRequest};
pub use error::{ApiError, ApiErrorResponse};
pub use extract::Requester;

use std::sync::Arc;

use axum::Router;
use axum::http::{Method, header};
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::admission::AdmissionService;
use crate::auth::TokenVerifier;
use crate::ledger::Ledger;

/// Shared handler state. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub ledger: Ledger,
    pub admission: Arc<AdmissionService>,
    pub verifier: Arc<dyn TokenVerifier>,
}

impl AppState {
    pub fn new(ledger: Ledger, verifier: Arc<dyn TokenVerifier>) -> Self {
        let admission = Arc::new(AdmissionService::new(Arc::new(ledger.clone())));
        Self {
            ledger,
            admission,
            verifier,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let routes = Router::new()
        .route(
            "/bookings",
            get(handlers::list_bookings).post(handlers::create_booking),
        )
        .route("/rooms", get(handlers::list_rooms))
        .route("/rooms/{id}/bookings", get(handlers::room_bookings))
        .route("/health", get(handlers::health));

    Router::new()
        .merge(routes.clone())
        .nest("/api", routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
        .with_state(state)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::POST,
            Method::GET,
            Method::OPTIONS,
            Method::PUT,
            Method::DELETE,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}
