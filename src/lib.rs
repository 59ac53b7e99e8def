use actix_cors::Cors;
use actix_web::middleware::Compress;
use actix_web::{http::header, web, App, HttpServer};
use actix_web_prometheus::PrometheusMetricsBuilder;
use serde::{Deserialize, Serialize};
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

pub mod calendar;
pub mod config;
pub mod db;
pub mod document;
pub mod letter;
pub mod workflow;

pub use crate::config::AppConfig;
pub use crate::db::AppState;

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error_type: &str, message: &str) -> Self {
        Self {
            error: error_type.to_string(),
            message: message.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn not_found(message: &str) -> Self {
        Self::new("NotFound", message)
    }

    pub fn bad_request(message: &str) -> Self {
        Self::new("BadRequest", message)
    }

    pub fn internal_error(message: &str) -> Self {
        Self::new("InternalServerError", message)
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::letter::handlers::preview_letter,
        crate::letter::handlers::submit_letter,
        crate::letter::handlers::paraf_letter,
        crate::letter::handlers::approve_letter,
        crate::letter::handlers::reject_letter,
        crate::letter::handlers::download_letter,
        crate::letter::handlers::verify_letter
    ),
    components(
        schemas(
            letter::models::LetterDraft,
            letter::models::LetterStatus,
            letter::models::CreationMode,
            letter::models::StepStatus,
            letter::models::ReviewerStep,
            letter::models::Maker,
            letter::models::Signatory,
            letter::models::OverlayKind,
            letter::models::OverlayPlacement,
            letter::models::AttachmentPayload,
            letter::models::UploadedSource,
            letter::models::SubmitLetterRequest,
            letter::models::PreviewRequest,
            letter::models::ParafRequest,
            letter::models::ApproveRequest,
            letter::models::RejectRequest,
            letter::models::SubmitResponse,
            letter::models::ApproveResponse,
            letter::models::LetterResponse,
            letter::models::VerificationRecord,
            letter::models::VerificationResponse,
            ErrorResponse,
        )
    ),
    tags(
        (name = "Letter Service", description = "Letter drafting, review, approval and download."),
        (name = "Verification", description = "Public lookup behind the QR code.")
    )
)]
pub struct ApiDoc;

pub async fn run() -> anyhow::Result<()> {
    if std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    let config = AppConfig::from_env();
    let bind_addr = config.bind_addr.clone();
    let app_state = match AppState::new(config).await {
        Ok(state) => web::Data::new(state),
        Err(e) => {
            log::error!(
                "Failed to initialise application state. Check DATABASE_URL and ASSETS_DIR. Error: {}",
                e
            );
            return Err(e);
        }
    };

    let prometheus = PrometheusMetricsBuilder::new("eoffice_server")
        .endpoint("/metrics")
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to create Prometheus metrics middleware: {}", e))?;

    log::info!("Starting server at http://{}", bind_addr);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin("https://eoffice.mij.sch.id")
            .allowed_origin("http://localhost:5173")
            .allowed_origin("http://localhost:3000")
            .allowed_origin("http://127.0.0.1:8080")
            .allowed_methods(vec!["GET", "POST", "OPTIONS"])
            .allowed_headers(vec![header::ACCEPT, header::CONTENT_TYPE])
            .expose_headers(vec![
                header::CONTENT_DISPOSITION.as_str(),
                letter::handlers::STAMP_SKIPPED_HEADER,
            ])
            .max_age(3600);

        App::new()
            .wrap(Compress::default())
            .wrap(prometheus.clone())
            .wrap(cors)
            .app_data(app_state.clone())
            .app_data(web::JsonConfig::default().limit(50 * 1024 * 1024))
            .service(web::scope("/api").configure(letter::handlers::config))
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
    })
    .keep_alive(actix_web::http::KeepAlive::Os)
    .bind(bind_addr)?
    .run()
    .await?;

    Ok(())
}
