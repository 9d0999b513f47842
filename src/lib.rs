//! Coursekeeper identity service: registration, activation and stateful
//! token authentication.

#![forbid(unsafe_code)]
pub mod clock;
pub mod config;
mod crypto;
mod database;
pub mod error;
mod mail;
mod middleware;
pub mod module_info;
mod router;
pub mod sweeper;
pub mod telemetry;
pub mod token;
pub mod user;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{Method, StatusCode, header};
use axum::routing::{get, post, put};
use axum::{Router, middleware as AxumMiddleware};
use error::ServerError;
use tower::ServiceBuilder;
use tower_http::LatencyUnit;
use tower_http::cors::{Any, CorsLayer};
use tower_http::sensitive_headers::SetSensitiveHeadersLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};

/// MUST NEVER be used in production.
#[cfg(test)]
pub async fn make_request(
    app: Router,
    method: Method,
    path: &str,
    body: String,
    token: Option<&str>,
) -> axum::http::Response<axum::body::Body> {
    use axum::extract::Request;
    use tower::util::ServiceExt;

    let mut request = Request::builder()
        .method(method)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    app.oneshot(request.body(axum::body::Body::from(body)).unwrap())
        .await
        .unwrap()
}

/// Decode a JSON response body.
#[cfg(test)]
pub async fn body_json(response: axum::http::Response<axum::body::Body>) -> serde_json::Value {
    use http_body_util::BodyExt;

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// State sharing between routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::Configuration>,
    pub users: Arc<dyn user::UserRepository>,
    pub modules: Arc<dyn module_info::ModuleInfoRepository>,
    pub tokens: token::TokenAuthority,
    pub pwd: Arc<crypto::PasswordManager>,
    pub mail: Arc<dyn mail::Mailer>,
    pub clock: Arc<dyn clock::Clock>,
}

/// Create router.
pub fn app(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        // Add high level tracing/logging to all requests.
        .layer(
            TraceLayer::new_for_http()
                .on_body_chunk(|chunk: &Bytes, latency: Duration, _span: &tracing::Span| {
                    tracing::trace!(size_bytes = chunk.len(), ?latency, "sending body chunk")
                })
                .make_span_with(
                    DefaultMakeSpan::new()
                        .include_headers(true)
                        .level(tracing::Level::INFO),
                )
                .on_request(DefaultOnRequest::new())
                .on_response(
                    DefaultOnResponse::new()
                        .include_headers(true)
                        .latency_unit(LatencyUnit::Micros),
                ),
        )
        // Set a timeout.
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(10),
        ))
        // Remove senstive headers from trace.
        .layer(SetSensitiveHeadersLayer::new([header::AUTHORIZATION, header::COOKIE]))
        // Add CORS preflight support.
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::PATCH,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers(Any)
                .vary([header::AUTHORIZATION]),
        );

    Router::new()
        // `GET /status.json` goes to `status`.
        .route("/status.json", get(router::status::status))
        // `POST /v1/users` goes to `create`.
        .route("/v1/users", post(router::create::handler))
        // `PUT /v1/users/activated` goes to `activate`.
        .route("/v1/users/activated", put(router::activate::handler))
        // `POST /v1/tokens/authentication` goes to `login`.
        .route("/v1/tokens/authentication", post(router::login::handler))
        .merge(router::users::router(state.clone()))
        .merge(router::info::router(state.clone()))
        .with_state(state)
        .route_layer(AxumMiddleware::from_fn(telemetry::track))
        .layer(middleware)
}

/// Initialize the application state.
pub async fn initialize_state() -> Result<AppState, Box<dyn std::error::Error>> {
    // read configuration file. let it in memory.
    let path = std::env::var("CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_default();
    let config = config::Configuration::default().path(path).read();

    let db = match config.postgres {
        Some(ref config) => {
            database::Database::new(
                &config.address,
                &config
                    .username
                    .clone()
                    .unwrap_or(database::DEFAULT_CREDENTIALS.into()),
                &config
                    .password
                    .clone()
                    .unwrap_or(database::DEFAULT_CREDENTIALS.into()),
                &config
                    .database
                    .clone()
                    .unwrap_or(database::DEFAULT_DATABASE_NAME.into()),
                config.pool_size.unwrap_or(database::DEFAULT_POOL_SIZE),
                config
                    .query_timeout
                    .map(Duration::from_secs)
                    .unwrap_or(database::DEFAULT_QUERY_TIMEOUT),
            )
            .await?
        },
        None => {
            return Err(ServerError::Internal {
                details: "missing `postgres` entry on `config.yaml` file".into(),
                source: None,
            }
            .into());
        },
    };

    // execute migrations scripts on start.
    sqlx::migrate!().run(&db.postgres).await?;

    let clock: Arc<dyn clock::Clock> = Arc::new(clock::SystemClock);
    let users: Arc<dyn user::UserRepository> = Arc::new(user::PgUserRepository::new(db.clone()));
    let modules: Arc<dyn module_info::ModuleInfoRepository> =
        Arc::new(module_info::PgModuleInfoRepository::new(db.clone()));
    let tokens = token::TokenAuthority::new(
        Arc::new(token::PgTokenRepository::new(db)),
        Arc::clone(&users),
        Arc::clone(&clock),
    );
    let pwd = Arc::new(crypto::PasswordManager::new(config.argon2.clone())?);

    // handle mail sender.
    let mail: Arc<dyn mail::Mailer> = if let Some(cfg) = &config.mail {
        Arc::new(mail::MailManager::new(cfg).await?)
    } else {
        tracing::warn!("missing `mail` entry on `config.yaml` file, mails are dropped");
        Arc::new(mail::MailManager::default())
    };

    Ok(AppState {
        config,
        users,
        modules,
        tokens,
        pwd,
        mail,
        clock,
    })
}
