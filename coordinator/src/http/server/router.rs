use axum::{
    Router,
    body::Body,
    http::{
        Request, StatusCode,
        header::{AUTHORIZATION, COOKIE},
    },
    middleware::{self as ax_middleware},
    response::IntoResponse as _,
    routing::{self, IntoMakeService, any},
};
use tower::ServiceBuilder;
use tower_http::{ServiceBuilderExt as _, request_id::MakeRequestUuid, trace::TraceLayer};

use crate::{
    app::AppState,
    http::{
        api,
        server::middleware::{DowngradeUnavailable, secure_headers_middleware},
    },
    websocket,
};

pub(crate) type App = IntoMakeService<Router<()>>;

/// Creates the application routes: the remote-control API and the state websocket.
///
/// No route is authenticated; deploy behind a reverse proxy that is.
pub(crate) fn create_app_router() -> Router<AppState> {
    Router::new()
        .merge(api::routes())
        .route("/ws", any(websocket::ws_handler))
}

/// Full router with state, fallback and the middleware stack applied.
pub(crate) fn build_router(app_state: AppState) -> Router<()> {
    let middleware_stack = ServiceBuilder::new()
        .sensitive_headers([AUTHORIZATION, COOKIE])
        .set_x_request_id(MakeRequestUuid)
        .propagate_x_request_id()
        .layer(TraceLayer::new_for_http().on_failure(DowngradeUnavailable))
        .layer(ax_middleware::from_fn(secure_headers_middleware));

    create_app_router()
        .with_state(app_state)
        .fallback(routing::any(|req: Request<Body>| async move {
            tracing::warn!(method = %req.method(), uri = %req.uri(), "Unhandled request");
            StatusCode::NOT_FOUND.into_response()
        }))
        .layer(middleware_stack)
}

pub(crate) fn create_app(app_state: AppState) -> App {
    build_router(app_state).into_make_service()
}
