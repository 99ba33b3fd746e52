use crate::coordinator::LedgerCoordinator;
use crate::errors::LedgerError;
use crate::metrics;
use crate::models::{ApiResponse, BalanceChangeRequest, LedgerReceipt};
use crate::store::LedgerStore;
use actix_web::{error::JsonPayloadError, web, HttpRequest, HttpResponse};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::{info_span, warn, Instrument};
use uuid::Uuid;
use validator::Validate;

/// Dependency checked by the health endpoint
#[async_trait(?Send)]
pub trait HealthProbe: Send + Sync {
    async fn check(&self) -> Result<(), String>;
}

/// Probe for deployments without an external dependency to check
pub struct AlwaysHealthy;

#[async_trait(?Send)]
impl HealthProbe for AlwaysHealthy {
    async fn check(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Health check endpoint
pub async fn health_check(probe: web::Data<Arc<dyn HealthProbe>>) -> HttpResponse {
    match probe.check().await {
        Ok(()) => HttpResponse::Ok().json(json!({
            "status": "healthy",
            "service": "ledger-engine",
            "version": env!("CARGO_PKG_VERSION")
        })),
        Err(reason) => {
            warn!("Health check failed: {}", reason);
            HttpResponse::ServiceUnavailable().json(json!({
                "status": "unhealthy",
                "service": "ledger-engine",
                "version": env!("CARGO_PKG_VERSION")
            }))
        }
    }
}

/// Credit endpoint
pub async fn credit<S: LedgerStore + 'static>(
    ledger: web::Data<Arc<LedgerCoordinator<S>>>,
    request: web::Json<BalanceChangeRequest>,
) -> Result<HttpResponse, LedgerError> {
    let request = request.into_inner();
    validate(&request)?;

    let span = info_span!("credit", request_id = %Uuid::new_v4(), account_id = request.account_id);
    let receipt = ledger
        .credit(request.account_id, request.amount)
        .instrument(span)
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::<LedgerReceipt>::success(receipt)))
}

/// Debit endpoint
pub async fn debit<S: LedgerStore + 'static>(
    ledger: web::Data<Arc<LedgerCoordinator<S>>>,
    request: web::Json<BalanceChangeRequest>,
) -> Result<HttpResponse, LedgerError> {
    let request = request.into_inner();
    validate(&request)?;

    let span = info_span!("debit", request_id = %Uuid::new_v4(), account_id = request.account_id);
    let receipt = ledger
        .debit(request.account_id, request.amount)
        .instrument(span)
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::<LedgerReceipt>::success(receipt)))
}

fn validate(request: &BalanceChangeRequest) -> Result<(), LedgerError> {
    request
        .validate()
        .map_err(|e| LedgerError::Validation(e.to_string()))
}

/// Prometheus metrics endpoint
pub async fn metrics_endpoint() -> HttpResponse {
    match metrics::metrics_handler() {
        Ok(body) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(body),
        Err(e) => HttpResponse::InternalServerError()
            .json(json!({
                "error": "Failed to gather metrics",
                "details": e.to_string()
            }))
    }
}

/// Malformed bodies are answered in the ledger envelope instead of
/// actix's plain-text default.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err: JsonPayloadError, _req: &HttpRequest| {
        warn!("Rejected request body: {}", err);
        LedgerError::Validation("Invalid request body".to_string()).into()
    })
}

/// Configure routes
pub fn configure_routes<S: LedgerStore + 'static>(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        .service(
            web::scope("/api/transactions")
                .route("/credit", web::post().to(credit::<S>))
                .route("/debit", web::post().to(debit::<S>)),
        )
        .route("/credit", web::post().to(credit::<S>))
        .route("/debit", web::post().to(debit::<S>))
        .route("/metrics", web::get().to(metrics_endpoint))
        .route("/health", web::get().to(health_check));
}
