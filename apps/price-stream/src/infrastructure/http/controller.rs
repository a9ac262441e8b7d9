//! HTTP Controller (Driver Adapter)
//!
//! - `GET /rates`: stored price of every asset, one shared rate limit
//! - `GET /rates/stream`: WebSocket push of every price change, bearer
//!   authenticated and rate limited per login

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{FromRequestParts, State, WebSocketUpgrade, ws::WebSocket},
    http::{header::AUTHORIZATION, request::Parts},
    response::Response,
    routing::get,
};
use futures::StreamExt;

use super::response::ApiError;
use crate::application::ports::{AuthError, Authenticator, Identity, PriceStore};
use crate::domain::admission::RateGovernor;
use crate::infrastructure::broadcast::{HubHandle, RemovalReason};
use crate::infrastructure::config::RateLimitSettings;
use crate::infrastructure::metrics;
use crate::infrastructure::stream::{ConnectionSettings, PriceUpdateMessage, SubscriberConnection};

/// Rate limit group, and key, of the snapshot endpoint.
pub const RATES_GROUP: &str = "rates";

/// Rate limit group of the stream endpoint; keys are `rates-stream-<login>`.
pub const STREAM_GROUP: &str = "rates-stream";

/// State shared across handlers.
#[derive(Clone)]
pub struct ApiState {
    /// Hub new subscribers register with.
    pub hub: HubHandle,
    /// Source of the price snapshot.
    pub store: Arc<dyn PriceStore>,
    /// Resolves bearer tokens.
    pub authenticator: Arc<dyn Authenticator>,
    /// Shared admission state.
    pub governor: Arc<RateGovernor>,
    /// Per-group rates.
    pub limits: RateLimitSettings,
    /// Settings for each streaming connection.
    pub connection: ConnectionSettings,
}

/// Create the API router.
#[must_use]
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/rates", get(list_rates))
        .route("/rates/stream", get(stream_rates))
        .with_state(state)
}

async fn list_rates(
    State(state): State<ApiState>,
) -> Result<Json<Vec<PriceUpdateMessage>>, ApiError> {
    admit(
        &state.governor,
        RATES_GROUP,
        state.limits.rates_per_second,
        RATES_GROUP,
    )?;

    let prices = state.store.list_prices().await?;
    Ok(Json(prices.iter().map(PriceUpdateMessage::from).collect()))
}

async fn stream_rates(
    State(state): State<ApiState>,
    identity: Identity,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    admit(
        &state.governor,
        &format!("{STREAM_GROUP}-{}", identity.login),
        state.limits.stream_connects_per_second,
        STREAM_GROUP,
    )?;

    if !state.hub.stats().running {
        return Err(ApiError::Unavailable);
    }

    let hub = state.hub.clone();
    let settings = state.connection;
    Ok(ws.on_upgrade(move |socket| serve_socket(socket, hub, settings, identity)))
}

async fn serve_socket(
    socket: WebSocket,
    hub: HubHandle,
    settings: ConnectionSettings,
    identity: Identity,
) {
    let connection = match SubscriberConnection::open(hub, settings).await {
        Ok(connection) => connection,
        Err(e) => {
            tracing::warn!(login = %identity.login, error = %e, "Stream rejected");
            return;
        }
    };

    let id = connection.id();
    tracing::info!(subscriber = %id, login = %identity.login, "Stream opened");

    let (writer, reader) = socket.split();
    let summary = connection.serve(writer, reader).await;

    tracing::info!(
        subscriber = %id,
        login = %identity.login,
        sent = summary.sent,
        reason = summary.removal.map_or("shutdown", RemovalReason::as_str),
        "Stream closed"
    );
}

fn admit(
    governor: &RateGovernor,
    key: &str,
    max_per_second: f64,
    group: &'static str,
) -> Result<(), ApiError> {
    if governor.check_and_update(key, max_per_second).is_allowed() {
        return Ok(());
    }
    tracing::debug!(key, group, "Request rate limited");
    metrics::record_request_rejected(group);
    Err(ApiError::TooManyRequests)
}

impl FromRequestParts<ApiState> for Identity {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ApiState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or(AuthError::MissingCredentials)?;
        let value = header.to_str().map_err(|_| AuthError::Malformed {
            reason: "authorization header is not ASCII".to_string(),
        })?;
        let token = bearer_token(value)?;

        Ok(state.authenticator.authenticate(token).await?)
    }
}

fn bearer_token(value: &str) -> Result<&str, AuthError> {
    match value.trim().split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") => Ok(token.trim()),
        _ => Err(AuthError::Malformed {
            reason: "expected Bearer scheme".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header::WWW_AUTHENTICATE};
    use rust_decimal::Decimal;
    use tower::ServiceExt;

    use super::*;
    use crate::application::ports::{MockPriceStore, StoreError};
    use crate::infrastructure::auth::StaticTokenAuthenticator;
    use crate::infrastructure::broadcast::{BroadcastConfig, BroadcastHub};
    use crate::infrastructure::config::ApiTokens;
    use crate::infrastructure::http::ErrorResponse;
    use crate::infrastructure::persistence::InMemoryPriceStore;

    fn state_with(store: Arc<dyn PriceStore>) -> ApiState {
        let (_hub, handle) = BroadcastHub::new(BroadcastConfig::default());
        ApiState {
            hub: handle,
            store,
            authenticator: Arc::new(StaticTokenAuthenticator::new(ApiTokens::new([(
                "ana", "a1",
            )]))),
            governor: Arc::new(RateGovernor::new()),
            limits: RateLimitSettings::default(),
            connection: ConnectionSettings::default(),
        }
    }

    fn seeded_state() -> ApiState {
        state_with(Arc::new(
            InMemoryPriceStore::with_assets([
                ("white_wool", Decimal::new(45, 0)),
                ("black_wool", Decimal::new(42, 0)),
            ])
            .unwrap(),
        ))
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    async fn json_body<T: serde::de::DeserializeOwned>(response: Response) -> T {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn rates_lists_stored_prices() {
        let response = router(seeded_state()).oneshot(get("/rates")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let rates: Vec<PriceUpdateMessage> = json_body(response).await;
        assert_eq!(rates.len(), 2);
        assert_eq!(rates[0].asset_name, "black_wool");
        assert!((rates[1].price - 45.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn rates_are_rate_limited() {
        let app = router(seeded_state());

        let first = app.clone().oneshot(get("/rates")).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app.oneshot(get("/rates")).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        let body: ErrorResponse = json_body(second).await;
        assert!(!body.message.is_empty());
    }

    #[tokio::test]
    async fn store_failure_is_internal_error() {
        let mut store = MockPriceStore::new();
        store.expect_list_prices().returning(|| {
            Err(StoreError::Unavailable {
                message: "disk on fire".to_string(),
            })
        });

        let response = router(state_with(Arc::new(store)))
            .oneshot(get("/rates"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: ErrorResponse = json_body(response).await;
        assert!(!body.message.contains("disk on fire"));
    }

    #[tokio::test]
    async fn stream_requires_credentials() {
        let response = router(seeded_state())
            .oneshot(get("/rates/stream"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[WWW_AUTHENTICATE], "Bearer");
    }

    #[tokio::test]
    async fn stream_rejects_unknown_token() {
        let request = Request::get("/rates/stream")
            .header(AUTHORIZATION, "Bearer nope")
            .body(Body::empty())
            .unwrap();
        let response = router(seeded_state()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn stream_rejects_other_schemes() {
        let request = Request::get("/rates/stream")
            .header(AUTHORIZATION, "Basic YW5hOmEx")
            .body(Body::empty())
            .unwrap();
        let response = router(seeded_state()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn bearer_scheme_is_case_insensitive() {
        assert_eq!(bearer_token("bearer a1"), Ok("a1"));
        assert_eq!(bearer_token("Bearer  a1 "), Ok("a1"));
        assert!(bearer_token("a1").is_err());
    }
}
