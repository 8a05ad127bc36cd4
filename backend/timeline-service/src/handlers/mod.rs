pub mod timeline;

use actix_web::web;

use crate::metrics;

/// Registers every HTTP route of the service.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(|| async { "OK" }))
        .route("/metrics", web::get().to(metrics::serve_metrics))
        .service(timeline::get_full_timeline)
        .service(timeline::get_day_timeline)
        .service(timeline::add_post)
        .service(timeline::remove_post);
}
