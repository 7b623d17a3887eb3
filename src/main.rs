use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use setlog::api;
use setlog::cli::{Cli, Commands, UserCommands};
use setlog::{build_state, config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "setlog=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = config::load()?;
    let args = Cli::parse();

    match args.command {
        Some(Commands::Serve { port }) => {
            // The flag wins over SETLOG_PORT; absent both, config's default.
            let port = port.unwrap_or(cfg.port);
            run_server(cfg, port).await
        }
        Some(Commands::User { command }) => handle_user_command(cfg, command).await,
        None => {
            let port = cfg.port;
            run_server(cfg, port).await
        }
    }
}

async fn run_server(cfg: config::Config, port: u16) -> anyhow::Result<()> {
    tracing::info!("Connecting to database...");
    let state = Arc::new(build_state(cfg).await?);

    let app = axum::Router::new()
        // Health endpoint (no auth)
        .route("/healthz", axum::routing::get(|| async { "ok" }))
        .nest("/api/v1", api::api_router())
        .with_state(state)
        .layer({
            use axum::http::{HeaderName, Method};
            use tower_http::cors::AllowOrigin;
            let dashboard_origin = std::env::var("SETLOG_DASHBOARD_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:3000".to_string());
            CorsLayer::new()
                .allow_origin(AllowOrigin::predicate(move |origin, _| {
                    let origin_str = origin.to_str().unwrap_or("");
                    origin_str == dashboard_origin
                        || origin_str.starts_with("http://localhost:")
                        || origin_str.starts_with("http://127.0.0.1:")
                }))
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PATCH,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([
                    HeaderName::from_static("content-type"),
                    HeaderName::from_static("authorization"),
                    HeaderName::from_static("x-request-id"),
                ])
                .allow_credentials(true)
        })
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(axum::middleware::from_fn(security_headers_middleware));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("setlog listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn handle_user_command(cfg: config::Config, cmd: UserCommands) -> anyhow::Result<()> {
    match cmd {
        UserCommands::Create {
            email,
            display_name,
        } => {
            let state = build_state(cfg).await?;
            let user = state
                .db
                .insert_user(&email, display_name.as_deref())
                .await?;
            let token = api::generate_session_token();
            state
                .db
                .insert_session(user.id, &api::hash_token(&token), None)
                .await?;
            println!("User created:");
            println!("  ID:    {}", user.id);
            println!("  Email: {}", user.email);
            println!("  Use:   Authorization: Bearer {token}");
        }
    }
    Ok(())
}

/// Injects a unique X-Request-Id into every response so clients can correlate
/// errors with server logs.
async fn request_id_middleware(
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let req_id = uuid::Uuid::new_v4().to_string();
    let mut resp = next.run(req).await;
    if let Ok(val) = axum::http::HeaderValue::from_str(&req_id) {
        resp.headers_mut().insert("x-request-id", val);
    }
    resp
}

/// Injects security headers into every response. API responses carry vault
/// metadata and must never be cached or framed.
async fn security_headers_middleware(
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let mut resp = next.run(req).await;
    let headers = resp.headers_mut();

    if let Ok(v) = "nosniff".parse() {
        headers.insert("X-Content-Type-Options", v);
    }
    if let Ok(v) = "DENY".parse() {
        headers.insert("X-Frame-Options", v);
    }
    if let Ok(v) = "no-store".parse() {
        headers.insert("Cache-Control", v);
    }
    if let Ok(v) = "no-referrer".parse() {
        headers.insert("Referrer-Policy", v);
    }
    headers.remove("Server");

    resp
}
