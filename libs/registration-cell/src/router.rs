// libs/registration-cell/src/router.rs
use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::handlers;
use crate::services::booking::RegistrationBookingService;

pub fn registration_routes(service: Arc<RegistrationBookingService>) -> Router {
    Router::new()
        .route("/registration", post(handlers::create_registration))
        .route("/registration/cancel/{id}", put(handlers::cancel_registration))
        .route("/registration/finish/{id}", put(handlers::finish_registration))
        // Static segments win over `{id}`.
        .route("/registration/my", get(handlers::list_my_registrations))
        .route("/registration/list", get(handlers::list_registrations))
        .route("/registration/page", get(handlers::list_registrations_page))
        .route("/registration/statistics", get(handlers::get_statistics))
        .route("/registration/{id}", get(handlers::get_registration))
        .with_state(service)
}

pub fn schedule_routes(service: Arc<RegistrationBookingService>) -> Router {
    Router::new()
        .route("/schedule", post(handlers::register_slot))
        .route("/schedule/available", get(handlers::list_available_slots))
        .route("/schedule/consistency", get(handlers::check_consistency))
        .route("/schedule/{id}", get(handlers::get_slot))
        .route("/schedule/{id}/open", put(handlers::open_slot))
        .route("/schedule/{id}/close", put(handlers::close_slot))
        .with_state(service)
}
