mod stream;

use crate::core::{
    error::PipelineError,
    health::{Component, ComponentState},
    pipeline::Pipeline,
    resolver::Intent,
    shutdown::ShutdownSignal,
};
use actix_web::{
    dev::ServerHandle,
    error::{ErrorBadRequest, ErrorInternalServerError, ErrorNotFound},
    get,
    web::{self, Data},
    App, HttpResponse, HttpServer, Responder,
};
use log::info;
use serde::Deserialize;
use std::sync::Arc;

// Query-string surface of the intent vocabulary
#[derive(Debug, Deserialize)]
pub struct IntentQuery {
    // "latest", "as_of_ledger:N", "as_of_protocol:P", "explicit:{era}:{version}"
    #[serde(default = "default_command")]
    pub command: String,
    pub start_ledger: Option<u32>,
    pub end_ledger: Option<u32>,
    #[serde(default)]
    pub strict_pas: bool,
}

fn default_command() -> String {
    "latest".to_owned()
}

impl IntentQuery {
    fn to_intent(&self, pipeline: &Pipeline) -> Result<Intent, PipelineError> {
        let mut intent = Intent::parse_command(&self.command, pipeline.config.network)?;
        intent.strict_pas = self.strict_pas || pipeline.config.strict_pas;
        intent.range = match (self.start_ledger, self.end_ledger) {
            (Some(start), Some(end)) => Some((start, end)),
            (Some(start), None) => Some((start, u32::MAX)),
            (None, Some(end)) => Some((0, end)),
            (None, None) => None,
        };
        Ok(intent)
    }
}

fn to_http_error(e: PipelineError) -> actix_web::Error {
    let kind = e.kind().as_str();
    let body = serde_json::json!({ "error": e.to_string(), "kind": kind });
    match &e {
        PipelineError::NotFound(_)
        | PipelineError::DatasetNotFound(_)
        | PipelineError::EraNotFound(_) => ErrorNotFound(body),
        PipelineError::Config(_) => ErrorBadRequest(body),
        _ => ErrorInternalServerError(body),
    }
}

#[get("/health")]
async fn health(pipeline: Data<Arc<Pipeline>>) -> impl Responder {
    let report = pipeline.health.snapshot();
    let status = match report.status {
        ComponentState::Healthy | ComponentState::Degraded => HttpResponse::Ok(),
        ComponentState::Unhealthy => HttpResponse::ServiceUnavailable(),
    };
    let mut response = status;
    response.json(report)
}

#[get("/datasets")]
async fn list_datasets(pipeline: Data<Arc<Pipeline>>) -> actix_web::Result<impl Responder> {
    let datasets = pipeline.catalog.list_datasets().map_err(to_http_error)?;
    Ok(HttpResponse::Ok().json(datasets))
}

#[get("/eras")]
async fn list_eras(pipeline: Data<Arc<Pipeline>>) -> actix_web::Result<impl Responder> {
    let eras = pipeline
        .catalog
        .list_eras(pipeline.config.network)
        .map_err(to_http_error)?;
    Ok(HttpResponse::Ok().json(eras))
}

// Resolve an intent to a pinned (era, version) plus coverage, manifest
// and the SQL text the lake engine should run
#[get("/datasets/{dataset}/resolve")]
async fn resolve_dataset(
    pipeline: Data<Arc<Pipeline>>,
    path: web::Path<String>,
    query: web::Query<IntentQuery>,
) -> actix_web::Result<impl Responder> {
    let dataset = path.into_inner();
    let intent = query.to_intent(&pipeline).map_err(to_http_error)?;
    let resolved = pipeline
        .resolver
        .resolve(&pipeline.catalog, &dataset, &intent)
        .map_err(to_http_error)?;
    Ok(HttpResponse::Ok().json(resolved))
}

// Columnar stream: one Arrow IPC schema descriptor, then record batches
// covering cold partitions and the hot tail
#[get("/datasets/{dataset}/stream")]
async fn stream_dataset(
    pipeline: Data<Arc<Pipeline>>,
    path: web::Path<String>,
    query: web::Query<IntentQuery>,
) -> actix_web::Result<impl Responder> {
    let dataset = path.into_inner();
    let intent = query.to_intent(&pipeline).map_err(to_http_error)?;
    let body = stream::dataset_stream(pipeline.get_ref().clone(), dataset, intent)
        .await
        .map_err(to_http_error)?;
    Ok(HttpResponse::Ok()
        .content_type("application/vnd.apache.arrow.stream")
        .streaming(body))
}

pub async fn serve(
    pipeline: Arc<Pipeline>,
    mut shutdown: ShutdownSignal,
) -> Result<(), PipelineError> {
    let bind_address = pipeline.config.rpc_bind_address.clone();
    let data = Data::new(pipeline.clone());

    let server = HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .service(health)
            .service(list_datasets)
            .service(list_eras)
            .service(resolve_dataset)
            .service(stream_dataset)
    })
    .disable_signals()
    .bind(&bind_address)
    .map_err(PipelineError::Io)?
    .run();

    info!("rpc server listening on {}", bind_address);
    pipeline.health.set(Component::Rpc, ComponentState::Healthy);

    let handle: ServerHandle = server.handle();
    let watcher = tokio::spawn(async move {
        shutdown.cancelled().await;
        handle.stop(true).await;
    });

    let result = server.await;
    let _ = watcher.await;
    pipeline.health.set(Component::Rpc, ComponentState::Unhealthy);
    result.map_err(PipelineError::Io)
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{http::StatusCode, test, App};
    use lumenlake_common::network::Network;

    async fn test_pipeline() -> Arc<Pipeline> {
        let config = crate::config::Config {
            network: Network::Testnet,
            ..Default::default()
        };
        let pipeline = Arc::new(Pipeline::temporary(config).unwrap());
        pipeline.ensure_era().unwrap();
        pipeline
    }

    #[actix_web::test]
    async fn test_health_endpoint_reports_components() {
        let pipeline = test_pipeline().await;
        let app = test::init_service(
            App::new()
                .app_data(Data::new(pipeline.clone()))
                .service(health),
        )
        .await;

        let request = test::TestRequest::get().uri("/health").to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body: serde_json::Value = test::read_body_json(response).await;
        assert_eq!(body["status"], "healthy");
        assert!(body["components"].get("flusher").is_some());
    }

    #[actix_web::test]
    async fn test_resolve_unknown_dataset_is_404() {
        let pipeline = test_pipeline().await;
        let app = test::init_service(
            App::new()
                .app_data(Data::new(pipeline.clone()))
                .service(resolve_dataset),
        )
        .await;

        let request = test::TestRequest::get()
            .uri("/datasets/nonsense/resolve?command=latest")
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_resolve_latest_operations() {
        let pipeline = test_pipeline().await;
        let app = test::init_service(
            App::new()
                .app_data(Data::new(pipeline.clone()))
                .service(resolve_dataset),
        )
        .await;

        let request = test::TestRequest::get()
            .uri("/datasets/operations/resolve?command=latest")
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body: serde_json::Value = test::read_body_json(response).await;
        assert_eq!(body["era_id"], "testnet-001");
        assert_eq!(body["version_label"], "v1");
        assert!(body["sql"].as_str().unwrap().contains("era_id"));
    }

    #[actix_web::test]
    async fn test_bad_command_is_400() {
        let pipeline = test_pipeline().await;
        let app = test::init_service(
            App::new()
                .app_data(Data::new(pipeline.clone()))
                .service(resolve_dataset),
        )
        .await;

        let request = test::TestRequest::get()
            .uri("/datasets/operations/resolve?command=whenever")
            .to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
