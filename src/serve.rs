use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::config::LayoutConfig;
use crate::layout::Canvas;
use crate::result::EvaluationResult;
use crate::scene::Scene;
use crate::svg::render_svg;
use crate::wrap::CharWidthMeasure;

/// Arguments for running the obligraph layout server
#[derive(Debug, Clone, Parser)]
#[command(name = "obligraph serve", about = "Serve diagram layouts over HTTP.")]
pub struct ServeArgs {
    /// Address to bind the HTTP server to.
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 5151)]
    pub port: u16,

    /// Background color for rendered SVG.
    #[arg(long = "background-color", default_value = "white")]
    pub background_color: String,

    /// Layout configuration file (JSON).
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,
}

struct ServeState {
    config: LayoutConfig,
    background: String,
}

/// Body of `/api/layout` and `/api/render`.
#[derive(Debug, Deserialize)]
struct LayoutRequest {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    canvas: Option<Canvas>,
}

#[derive(Debug, Serialize)]
struct HealthPayload {
    ok: bool,
    version: &'static str,
}

impl ServeState {
    fn scene_for(&self, request: LayoutRequest) -> Scene {
        let mut config = self.config.clone();
        if let Some(canvas) = request.canvas {
            config.canvas = canvas;
        }
        let result = request
            .result
            .filter(|value| !value.is_null())
            .map(EvaluationResult::from);
        let measure = CharWidthMeasure::new(config.wrap.char_width);
        Scene::compute(result.as_ref(), &config, &measure)
    }
}

pub fn router(config: LayoutConfig, background: String) -> Router {
    let state = Arc::new(ServeState { config, background });

    Router::new()
        .route("/api/health", get(get_health))
        .route("/api/layout", post(post_layout))
        .route("/api/render", post(post_render))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

pub async fn run_serve(args: ServeArgs) -> Result<()> {
    let config = LayoutConfig::load(args.config.as_deref())?;
    let app = router(config, args.background_color.clone());

    let addr = format!("{}:{}", args.host, args.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind HTTP server to {addr}"))?;

    info!(%addr, "layout server listening");
    println!("obligraph server listening on http://{addr}");
    println!("Press Ctrl+C to stop.");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("HTTP server error")?;

    Ok(())
}

async fn get_health() -> Json<HealthPayload> {
    Json(HealthPayload {
        ok: true,
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn post_layout(
    State(state): State<Arc<ServeState>>,
    Json(request): Json<LayoutRequest>,
) -> Json<Scene> {
    Json(state.scene_for(request))
}

async fn post_render(
    State(state): State<Arc<ServeState>>,
    Json(request): Json<LayoutRequest>,
) -> Result<Response, (StatusCode, String)> {
    let scene = state.scene_for(request);
    let svg = render_svg(&scene, &state.background).map_err(internal_error)?;

    let mut response = Response::new(svg.into());
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("image/svg+xml"),
    );
    Ok(response)
}

fn internal_error(err: anyhow::Error) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}"))
}
