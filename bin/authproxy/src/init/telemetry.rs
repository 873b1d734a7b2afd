//! Expose process metrics for Prometheus to scrape.
use actix_web::web::Data;
use actix_web::App;
use actix_web::HttpResponse;
use actix_web::HttpServer;
use anyhow::Result;
use prometheus::Encoder;
use prometheus::TextEncoder;

/// Render all metrics in the registry in the Prometheus text format.
async fn metrics(registry: Data<prometheus::Registry>) -> HttpResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(error) = encoder.encode(&registry.gather(), &mut buffer) {
        return HttpResponse::InternalServerError().body(error.to_string());
    }
    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}

/// Start a plaintext HTTP server exposing metrics on `/metrics`.
pub fn server(bind: &str, registry: prometheus::Registry) -> Result<actix_web::dev::Server> {
    let registry = Data::new(registry);
    let server = HttpServer::new(move || {
        App::new()
            .app_data(registry.clone())
            .route("/metrics", actix_web::web::get().to(metrics))
    })
    .workers(1)
    .disable_signals()
    .bind(bind)?
    .run();
    Ok(server)
}
