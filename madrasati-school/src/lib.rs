pub mod clients;
pub mod config;
pub mod events;
pub mod lifecycle;
pub mod models;
pub mod rating;
pub mod routes;
pub mod schema;
pub mod services;
pub mod slug;
pub mod views;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use madrasati_shared::clients::db::DbPool;
use madrasati_shared::clients::minio::MinioClient;
use madrasati_shared::clients::rabbitmq::RabbitMQClient;

use clients::users::UserDirectory;
use config::AppConfig;

/// Room for multipart boundaries and text fields around one image.
const FORM_OVERHEAD: usize = 64 * 1024;

pub struct AppState {
    pub db: DbPool,
    pub config: AppConfig,
    pub rabbitmq: RabbitMQClient,
    pub minio: MinioClient,
    pub users: UserDirectory,
}

pub fn router(state: Arc<AppState>) -> Router {
    use routes::{admin, admin_schools, parent, public, school_admin};

    let body_limit = state.config.max_upload_bytes + FORM_OVERHEAD;

    let school_admin_routes = Router::new()
        .route("/profile", get(school_admin::get_profile).patch(school_admin::update_profile))
        .route("/profile/logo", post(school_admin::upload_logo))
        .route("/photos", get(school_admin::list_photos).post(school_admin::upload_photo))
        .route("/photos/:id", delete(school_admin::delete_photo))
        .route("/reviews", get(school_admin::pending_reviews))
        .route("/reviews/published", get(school_admin::published_reviews))
        .route("/reviews/:id/approve", post(school_admin::approve_review))
        .route("/reviews/:id/reject", post(school_admin::reject_review));

    let admin_routes = Router::new()
        .route("/moderation", get(admin::moderation_queue))
        .route("/reviews/:id/approve", post(admin::clear_review))
        .route("/reviews/:id/reject", post(admin::reject_review))
        .route("/reviews/:id", delete(admin::delete_review))
        .route("/reports", get(admin::list_reports))
        .route("/reports/:id/dismiss", post(admin::dismiss_report))
        .route("/reports/:id/delete", post(admin::delete_reported_review))
        .route("/stats", get(admin::get_stats))
        .route("/audit-log", get(admin::get_audit_log))
        .route("/schools", get(admin_schools::list_schools).post(admin_schools::create_school))
        .route(
            "/schools/:id",
            get(admin_schools::get_school)
                .patch(admin_schools::update_school)
                .delete(admin_schools::delete_school),
        )
        .route("/schools/:id/logo", post(admin_schools::upload_logo))
        .route("/schools/:id/photos", post(admin_schools::upload_photo))
        .route(
            "/schools/:id/admin",
            put(admin_schools::assign_admin).delete(admin_schools::unassign_admin),
        )
        .route("/school-admins", get(admin_schools::list_school_admins));

    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/schools", get(public::list_schools))
        .route("/schools/:slug", get(public::get_school))
        .route("/schools/:slug/photos", get(public::school_photos))
        .route("/schools/:slug/reviews", post(parent::submit_review))
        .route("/my-reviews", get(parent::my_reviews))
        .route("/reviews/:id/report", post(parent::report_review))
        .nest("/school-admin", school_admin_routes)
        .nest("/admin", admin_routes)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(axum::middleware::from_fn(madrasati_shared::middleware::metrics_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
