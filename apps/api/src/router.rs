use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use registration_cell::router::{registration_routes, schedule_routes};
use registration_cell::RegistrationBookingService;

pub fn create_router(service: Arc<RegistrationBookingService>) -> Router {
    let api = registration_routes(Arc::clone(&service))
        .merge(schedule_routes(service));

    Router::new()
        .route("/", get(|| async { "Hospital registration API is running!" }))
        .nest("/api", api)
}
