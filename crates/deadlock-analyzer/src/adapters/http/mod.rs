mod handler;
mod protocol;

use std::any::Any;

use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{get, post, MethodRouter};
use axum::Router;
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::{DefaultOnResponse, TraceLayer};
use tracing::{Level, Span};

use crate::{
    cli::Args,
    core::types::{
        DatabaseConnectionResponse, DeadlockEventsResponse, DiagnosticQueryResponse,
    },
    error::AppResult,
};

pub use handler::AppState;
use protocol::{json_with_status, ApiFailure};

pub async fn run(args: Args) -> AppResult<()> {
    let listener = TcpListener::bind(&args.listen).await?;
    tracing::info!(
        listen = %args.listen,
        static_dir = ?args.static_dir,
        "deadlock-analyzer HTTP API ready"
    );

    let app = build_router(AppState::new(args));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("deadlock-analyzer stopped");
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route(
            "/test-connection",
            guarded(post(handler::test_connection), test_connection_panicked),
        )
        .route(
            "/extended-event-sessions",
            guarded(get(handler::extended_event_sessions), sessions_panicked),
        )
        .route(
            "/deadlock-events",
            guarded(post(handler::deadlock_events), deadlock_events_panicked),
        )
        .route(
            "/execute-diagnostic-query",
            guarded(post(handler::execute_diagnostic_query), diagnostic_panicked),
        )
        .route(
            "/execute-predefined-query",
            guarded(post(handler::execute_predefined_query), diagnostic_panicked),
        )
        .route(
            "/predefined-queries",
            guarded(get(handler::predefined_queries), catalog_panicked),
        );

    let static_dir = state.args().static_dir.clone();
    let mut app = Router::new().nest("/api/deadlock", api).with_state(state);
    if let Some(dir) = static_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }

    app.layer(CorsLayer::permissive()).layer(
        TraceLayer::new_for_http()
            .make_span_with(request_span)
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    )
}

/// Span fields carry the path only: the query string of
/// `extended-event-sessions` holds a connection string.
fn request_span(req: &Request) -> Span {
    tracing::info_span!("request", method = %req.method(), path = %req.uri().path())
}

type PanicResponder = fn(Box<dyn Any + Send + 'static>) -> Response;

fn guarded(route: MethodRouter<AppState>, on_panic: PanicResponder) -> MethodRouter<AppState> {
    route.layer(CatchPanicLayer::custom(on_panic))
}

fn panicked<T: Serialize>(err: Box<dyn Any + Send + 'static>, body: &T) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(%detail, "handler panicked");
    json_with_status(StatusCode::INTERNAL_SERVER_ERROR, body)
}

fn test_connection_panicked(err: Box<dyn Any + Send + 'static>) -> Response {
    panicked(
        err,
        &DatabaseConnectionResponse::failed("Internal server error occurred while testing connection"),
    )
}

fn sessions_panicked(err: Box<dyn Any + Send + 'static>) -> Response {
    panicked(
        err,
        &ApiFailure::new("Internal server error occurred while retrieving Extended Event sessions"),
    )
}

fn deadlock_events_panicked(err: Box<dyn Any + Send + 'static>) -> Response {
    panicked(
        err,
        &DeadlockEventsResponse::failed(
            "Internal server error occurred while retrieving deadlock events",
        ),
    )
}

fn diagnostic_panicked(err: Box<dyn Any + Send + 'static>) -> Response {
    panicked(
        err,
        &DiagnosticQueryResponse::failed(
            "Internal server error occurred while executing diagnostic query",
            0.0,
        ),
    )
}

fn catalog_panicked(err: Box<dyn Any + Send + 'static>) -> Response {
    panicked(
        err,
        &ApiFailure::new("Internal server error occurred while retrieving predefined queries"),
    )
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::{Arc, Mutex};

    use axum::body::Body;
    use clap::Parser;
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use tracing_subscriber::EnvFilter;

    use super::*;
    use crate::logging::default_directives;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn router() -> Router {
        build_router(AppState::new(Args::parse_from(["deadlock-analyzer"])))
    }

    async fn read(resp: Response) -> (StatusCode, Value) {
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn request_logs_leave_out_the_query_string() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new(default_directives("debug")))
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let uri = "/api/deadlock/extended-event-sessions?connectionString=Server%3Dtcp%3A127.0.0.1%2C1%3BUser%20Id%3Dsa%3BPassword%3DHunter2Secret";
        let resp = router()
            .oneshot(axum::http::Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let out = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(out.contains("/api/deadlock/extended-event-sessions"), "{out}");
        assert!(!out.contains("Hunter2Secret"), "{out}");
        assert!(!out.contains("connectionString"), "{out}");
    }

    #[tokio::test]
    async fn bad_session_query_string_gets_json_failure() {
        let uri = "/api/deadlock/extended-event-sessions?connectionString=a&connectionString=b";
        let resp = router()
            .oneshot(axum::http::Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(resp.headers()[axum::http::header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("application/json"));
        let (status, body) = read(resp).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], json!(false));
        assert!(body["message"]
            .as_str()
            .unwrap()
            .starts_with("invalid query string"));
    }

    #[tokio::test]
    async fn panics_answer_500_in_the_endpoint_shape() {
        let (status, body) = read(diagnostic_panicked(Box::new("boom"))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], json!(false));
        assert_eq!(
            body["message"],
            json!("Internal server error occurred while executing diagnostic query")
        );
        assert_eq!(body["results"], json!([]));
        assert_eq!(body["columnNames"], json!([]));

        let (status, body) = read(deadlock_events_panicked(Box::new(String::from("boom")))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["events"], json!([]));
        assert_eq!(body["totalRecords"], json!(0));

        let (_, body) = read(test_connection_panicked(Box::new(7_u8))).await;
        assert_eq!(body["isConnected"], json!(false));
        assert_eq!(
            body["message"],
            json!("Internal server error occurred while testing connection")
        );

        let (_, body) = read(sessions_panicked(Box::new("boom"))).await;
        assert_eq!(
            body["message"],
            json!("Internal server error occurred while retrieving Extended Event sessions")
        );
    }
}
