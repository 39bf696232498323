//! rotoken signs short-lived access tokens and rotates refresh tokens in
//! generation chains, revoking a whole chain when a used token comes back.

#![forbid(unsafe_code)]

pub mod auth;
pub mod cache;
pub mod claims;
pub mod clock;
pub mod config;
pub mod error;
pub mod guard;
pub mod refresh;
mod router;
pub mod telemetry;
pub mod token;
pub mod user;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{Method, StatusCode, header};
use axum::routing::{get, post};
use axum::{Router, middleware as AxumMiddleware};
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceBuilder;
use tower_http::LatencyUnit;
use tower_http::cors::{Any, CorsLayer};
use tower_http::sensitive_headers::SetSensitiveHeadersLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{
    DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer,
};

use crate::auth::AuthService;
use crate::cache::{Cacher, DEFAULT_PREFIX, GenerationStore, MemoryBackend, RedisBackend};
use crate::clock::{Clock, SystemClock};
use crate::guard::Guard;
use crate::refresh::RefreshTokenManager;
use crate::token::{JwtParser, RsaSigner, Signer};
use crate::user::{Argon2Hasher, DefaultClaimsMapper, PostgresUserRepository, UserRepository};

/// Environment variable overriding the configuration file path.
pub const CONFIG_PATH_ENV: &str = "CONFIG_PATH";

/// State sharing between routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::Configuration>,
    pub auth: AuthService,
    pub signer: Arc<dyn Signer>,
    pub guard: Guard,
    pub metrics: Option<PrometheusHandle>,
}

/// Create router.
pub fn app(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        // Add high level tracing/logging to all requests.
        .layer(
            TraceLayer::new_for_http()
                .on_body_chunk(|chunk: &Bytes, latency: Duration, _span: &tracing::Span| {
                    tracing::trace!(size_bytes = chunk.len(), latency = ?latency, "sending body chunk")
                })
                .make_span_with(DefaultMakeSpan::new().include_headers(true).level(tracing::Level::INFO))
                .on_request(DefaultOnRequest::new())
                .on_response(DefaultOnResponse::new().include_headers(true).latency_unit(LatencyUnit::Micros)),
        )
        // Set a timeout.
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, Duration::from_secs(10)))
        // Remove senstive headers from trace.
        .layer(SetSensitiveHeadersLayer::new([header::AUTHORIZATION, header::COOKIE]))
        // Add CORS preflight support.
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers(Any)
                .vary([header::AUTHORIZATION]),
        );

    let me = get(router::me::handler).route_layer(
        AxumMiddleware::from_fn_with_state(state.clone(), router::authenticated),
    );

    Router::new()
        // `GET /status.json` goes to `status`.
        .route("/status.json", get(router::status::status))
        .route("/metrics", get(telemetry::metrics))
        // `POST /login` goes to `login`.
        .route("/login", post(router::login::handler))
        .route("/token/refresh", post(router::refresh_token::handler))
        .route("/logout", post(router::logout::handler))
        // `GET /users/@me`. Authorization required.
        .route("/users/@me", me)
        .with_state(state)
        .route_layer(AxumMiddleware::from_fn(telemetry::track))
        .layer(middleware)
}

/// Initialize the application state.
pub async fn initialize_state(
    metrics: Option<PrometheusHandle>,
) -> Result<AppState, Box<dyn std::error::Error>> {
    // read configuration file. let it in memory.
    let path = std::env::var(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_default();
    let config = config::Configuration::default().path(path).read();

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());

    // handle jwt.
    let Some(token) = &config.token else {
        return Err("missing `token` entry on `config.yaml` file".into());
    };
    let mut signer =
        RsaSigner::new(&token.private_key_pem, &token.public_key_pem, Arc::clone(&clock))?;
    if let Some(key_id) = &token.key_id {
        signer = signer.with_key_id(key_id);
    }
    if let Some(leeway) = token.leeway {
        signer = signer.with_leeway(leeway);
    }
    let signer: Arc<dyn Signer> = Arc::new(signer);

    // refresh token storage.
    let cache = config.cache.clone().unwrap_or_default();
    let prefix = cache.prefix.unwrap_or_else(|| DEFAULT_PREFIX.to_owned());
    let cacher: Arc<dyn Cacher> = match cache.address {
        Some(address) => Arc::new(
            GenerationStore::new(RedisBackend::connect(&address).await?)
                .with_prefix(prefix),
        ),
        None => {
            tracing::warn!("no `cache.address` set, refresh tokens are kept in memory");
            Arc::new(
                GenerationStore::new(MemoryBackend::new(Arc::clone(&clock)))
                    .with_prefix(prefix),
            )
        },
    };

    let Some(postgres) = &config.postgres else {
        return Err("missing `postgres` entry on `config.yaml` file".into());
    };
    let users: Arc<dyn UserRepository> =
        Arc::new(PostgresUserRepository::connect(postgres).await?);

    let access_ttl = token
        .access_ttl()
        .ok_or("`token.access_ttl` must be between 1 second and 100 years")?;
    let refresh_ttl = token
        .refresh_ttl()
        .ok_or("`token.refresh_ttl` must be between 1 second and 100 years")?;

    let hasher = Arc::new(Argon2Hasher::new(config.argon2.clone())?);
    let mapper = Arc::new(
        DefaultClaimsMapper::new(token.audiences.iter().cloned())
            .with_access_ttl(access_ttl),
    );
    let refresh_tokens = RefreshTokenManager::new(cacher, Arc::clone(&clock))
        .with_ttl(refresh_ttl);

    let auth = AuthService::new(
        Arc::clone(&users),
        hasher,
        mapper,
        Arc::clone(&signer),
        refresh_tokens,
        clock,
    );
    let guard = Guard::new(Arc::new(JwtParser::new()), users);

    Ok(AppState {
        config,
        auth,
        signer,
        guard,
        metrics,
    })
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::extract::Request;
    use axum::http::Response;
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::util::ServiceExt;

    use super::*;
    use crate::auth::tests::{EMAIL, PASSWORD, hasher, users};
    use crate::clock::FixedClock;
    use crate::router::TokenResponse;
    use crate::token::Parser;
    use crate::token::fake::InsecureSigner;
    use crate::token::signer::tests::{NOW, PRIVATE_KEY, PUBLIC_KEY};
    use crate::user::MemoryUserRepository;

    /// In-memory state signing with the fixture keys.
    fn state() -> AppState {
        let clock = Arc::new(FixedClock::new(NOW));
        let hasher = hasher();
        let users: Arc<dyn UserRepository> = Arc::new(users(&hasher));
        let signer: Arc<dyn Signer> =
            Arc::new(RsaSigner::new(PRIVATE_KEY, PUBLIC_KEY, clock.clone()).unwrap());
        let store = GenerationStore::new(MemoryBackend::new(clock.clone()));

        let auth = AuthService::new(
            Arc::clone(&users),
            Arc::new(hasher),
            Arc::new(DefaultClaimsMapper::new(["api.example.com"])),
            Arc::clone(&signer),
            RefreshTokenManager::new(Arc::new(store), clock.clone()),
            clock,
        );

        AppState {
            config: Arc::new(config::Configuration::default()),
            auth,
            signer,
            guard: Guard::new(Arc::new(JwtParser::new()), users),
            metrics: None,
        }
    }

    /// MUST NEVER be used in production.
    async fn make_request(
        state: &AppState,
        method: Method,
        path: &str,
        body: Value,
        token: Option<&str>,
    ) -> Response<Body> {
        let mut request = Request::builder()
            .method(method)
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }

        app(state.clone())
            .oneshot(request.body(Body::from(body.to_string())).unwrap())
            .await
            .unwrap()
    }

    async fn json<T: serde::de::DeserializeOwned>(response: Response<Body>) -> T {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    async fn login(state: &AppState) -> TokenResponse {
        let response = make_request(
            state,
            Method::POST,
            "/login",
            json!({ "email": EMAIL, "password": PASSWORD }),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        json(response).await
    }

    async fn refresh(state: &AppState, refresh_token: &str) -> Response<Body> {
        make_request(
            state,
            Method::POST,
            "/token/refresh",
            json!({ "refreshToken": refresh_token }),
            None,
        )
        .await
    }

    #[tokio::test]
    async fn test_status() {
        let state = state();
        let response =
            make_request(&state, Method::GET, "/status.json", Value::Null, None).await;

        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = json(response).await;
        assert_eq!(body["name"], "rotoken");
    }

    #[tokio::test]
    async fn test_login() {
        let state = state();
        let body = login(&state).await;

        assert_eq!(body.token_type, "Bearer");
        assert_eq!(body.expires_in, 900);
        assert!(state.signer.validate(&body.access_token).is_ok());
    }

    #[tokio::test]
    async fn test_login_rejected() {
        let state = state();

        let response = make_request(
            &state,
            Method::POST,
            "/login",
            json!({ "email": EMAIL, "password": "wrong" }),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = make_request(
            &state,
            Method::POST,
            "/login",
            json!({ "email": "not an email", "password": PASSWORD }),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: Value = json(response).await;
        assert_eq!(body["errors"][0]["field"], "email");
    }

    #[tokio::test]
    async fn test_refresh() {
        let state = state();
        let first = login(&state).await;

        let response = refresh(&state, &first.refresh_token).await;
        assert_eq!(response.status(), StatusCode::OK);
        let second: TokenResponse = json(response).await;
        assert_ne!(second.refresh_token, first.refresh_token);

        // Reuse revokes the chain.
        let response = refresh(&state, &first.refresh_token).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let response = refresh(&state, &second.refresh_token).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_refresh_body_shapes() {
        let state = state();
        let first = login(&state).await;

        // Snake case is accepted too.
        let response = make_request(
            &state,
            Method::POST,
            "/token/refresh",
            json!({ "refresh_token": first.refresh_token }),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let second: TokenResponse = json(response).await;

        let response = refresh(&state, &second.refresh_token).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_refresh_bad_request() {
        let state = state();

        let response = refresh(&state, "short").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = make_request(
            &state,
            Method::POST,
            "/token/refresh",
            json!({ "token": "a".repeat(64) }),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_logout() {
        let state = state();
        let tokens = login(&state).await;

        let response = make_request(
            &state,
            Method::POST,
            "/logout",
            json!({ "refreshToken": tokens.refresh_token }),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = refresh(&state, &tokens.refresh_token).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_me() {
        let state = state();
        let tokens = login(&state).await;

        let response = make_request(
            &state,
            Method::GET,
            "/users/@me",
            Value::Null,
            Some(&tokens.access_token),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = json(response).await;
        assert_eq!(body, json!({ "id": "42", "email": EMAIL }));
    }

    #[tokio::test]
    async fn test_me_unauthorized() {
        let state = state();
        let response =
            make_request(&state, Method::GET, "/users/@me", Value::Null, None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        // Decodable but unsigned tokens do not pass.
        let tokens = login(&state).await;
        let claims = JwtParser::new().parse(&tokens.access_token).unwrap();
        let forged = InsecureSigner::new(Arc::new(FixedClock::new(NOW)))
            .sign(&claims)
            .unwrap();
        let response =
            make_request(&state, Method::GET, "/users/@me", Value::Null, Some(&forged)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_me_deleted_user() {
        let mut state = state();
        let tokens = login(&state).await;
        // Token stays valid but its user is gone.
        state.guard = Guard::new(
            Arc::new(JwtParser::new()),
            Arc::new(MemoryUserRepository::default()),
        );

        let response = make_request(
            &state,
            Method::GET,
            "/users/@me",
            Value::Null,
            Some(&tokens.access_token),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_metrics_without_recorder() {
        let state = state();
        let response =
            make_request(&state, Method::GET, "/metrics", Value::Null, None).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
