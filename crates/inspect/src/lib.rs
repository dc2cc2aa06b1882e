//! Synchronous HTTP endpoint for read-only machine queries.
//!
//! `GET /inspect/{dapp}/{payload}` runs the path-decoded payload against
//! the application's inspect machine; `POST /inspect/{dapp}` takes the
//! payload from the body. The handlers never mutate state.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::*;

use rollups_machine::{InspectResult, MachineRegistry};
use rollups_primitives::Buf20;
use rollups_tasks::{ReadySignal, ShutdownGuard};

#[derive(Debug, Serialize, Deserialize)]
pub struct ReportResponse {
    pub payload: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InspectResponse {
    pub status: String,
    pub exception: String,
    pub reports: Vec<ReportResponse>,
    pub processed_input_count: u64,
}

impl From<InspectResult> for InspectResponse {
    fn from(result: InspectResult) -> Self {
        let (status, exception) = match result.error {
            Some(err) => (
                "Exception".to_string(),
                format!("Error on the machine while inspecting: {err}"),
            ),
            None if result.accepted => ("Accepted".to_string(), String::new()),
            None => ("Rejected".to_string(), String::new()),
        };
        Self {
            status,
            exception,
            reports: result
                .reports
                .iter()
                .map(|payload| ReportResponse {
                    payload: format!("0x{}", hex::encode(payload)),
                })
                .collect(),
            processed_input_count: result.processed_inputs,
        }
    }
}

pub fn router(registry: Arc<MachineRegistry>) -> Router {
    Router::new()
        .route(
            "/inspect/{dapp}",
            get(missing_payload).post(inspect_post),
        )
        .route("/inspect/{dapp}/{payload}", get(inspect_get))
        .with_state(registry)
}

async fn missing_payload() -> Response {
    info!("bad inspect request, missing payload");
    (StatusCode::BAD_REQUEST, "Missing payload").into_response()
}

async fn inspect_get(
    State(registry): State<Arc<MachineRegistry>>,
    Path((dapp, payload)): Path<(String, String)>,
) -> Response {
    // the router already percent-decoded the path segment
    run_inspect(&registry, &dapp, payload.into_bytes()).await
}

async fn inspect_post(
    State(registry): State<Arc<MachineRegistry>>,
    Path(dapp): Path<String>,
    body: Bytes,
) -> Response {
    run_inspect(&registry, &dapp, body.to_vec()).await
}

async fn run_inspect(registry: &MachineRegistry, dapp: &str, payload: Vec<u8>) -> Response {
    let Ok(app) = dapp.parse::<Buf20>() else {
        info!(%dapp, "bad inspect request, invalid application address");
        return (StatusCode::BAD_REQUEST, "Invalid application address").into_response();
    };

    let Some(machine) = registry.inspect_machine(app) else {
        warn!(%app, "inspect request for unknown application");
        return (StatusCode::NOT_FOUND, "Application not found").into_response();
    };

    info!(%app, "processing inspect request");
    match machine.inspect(&payload).await {
        Ok(result) => {
            let response = InspectResponse::from(result);
            info!(%app, status = %response.status, "inspect request executed");
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(err) => {
            error!(%app, %err, "inspect request failed");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}

/// Serves the inspect routes until shutdown, signalling readiness once the
/// listener is bound.
pub async fn serve(
    addr: SocketAddr,
    registry: Arc<MachineRegistry>,
    shutdown: ShutdownGuard,
    ready: ReadySignal,
) -> anyhow::Result<()> {
    let app = router(registry);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "inspect endpoint listening");
    ready.notify();

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.wait_for_shutdown().await })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollups_machine::test_utils::EchoMachineFactory;
    use rollups_primitives::{Application, Buf32};

    async fn spawn_server() -> (SocketAddr, Buf20) {
        let app_address = Buf20::from([0x54; 20]);
        let apps = [Application {
            contract_address: app_address,
            consensus_address: Buf20::from([0xcc; 20]),
            template_hash: Buf32::from([0; 32]),
            last_processed_block: 0,
            enabled: true,
        }];
        let registry = Arc::new(
            MachineRegistry::load(&apps, &EchoMachineFactory)
                .await
                .unwrap(),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(registry)).await.unwrap();
        });
        (addr, app_address)
    }

    #[tokio::test]
    async fn test_get_echoes_payload() {
        let (addr, app) = spawn_server().await;

        let resp = reqwest::get(format!("http://{addr}/inspect/{app}/hello"))
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let body: InspectResponse = resp.json().await.unwrap();
        assert_eq!(body.status, "Accepted");
        assert_eq!(body.exception, "");
        assert_eq!(body.reports.len(), 1);
        assert_eq!(body.reports[0].payload, "0x68656c6c6f");
        assert_eq!(body.processed_input_count, 0);
    }

    #[tokio::test]
    async fn test_get_decodes_path_payload() {
        let (addr, app) = spawn_server().await;

        let resp = reqwest::get(format!("http://{addr}/inspect/{app}/hello%20world"))
            .await
            .unwrap();
        let body: InspectResponse = resp.json().await.unwrap();
        assert_eq!(
            body.reports[0].payload,
            format!("0x{}", hex::encode("hello world"))
        );
    }

    #[tokio::test]
    async fn test_post_reads_body() {
        let (addr, app) = spawn_server().await;

        let client = reqwest::Client::new();
        let resp = client
            .post(format!("http://{addr}/inspect/{app}"))
            .body(vec![0xca, 0xfe])
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let body: InspectResponse = resp.json().await.unwrap();
        assert_eq!(body.reports[0].payload, "0xcafe");
    }

    #[tokio::test]
    async fn test_unknown_application_is_404() {
        let (addr, _app) = spawn_server().await;

        let other = Buf20::from([0x99; 20]);
        let resp = reqwest::get(format!("http://{addr}/inspect/{other}/test"))
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);
        assert!(resp.text().await.unwrap().contains("Application not found"));
    }

    #[tokio::test]
    async fn test_missing_payload_is_400() {
        let (addr, app) = spawn_server().await;

        let resp = reqwest::get(format!("http://{addr}/inspect/{app}"))
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
    }

    #[tokio::test]
    async fn test_bad_address_is_400() {
        let (addr, _app) = spawn_server().await;

        let resp = reqwest::get(format!("http://{addr}/inspect/0x1234/test"))
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
    }
}
