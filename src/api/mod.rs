pub mod auth;
pub mod error;
pub mod metrics;
mod products;
pub mod rate_limit;
pub mod response;
mod users;
pub mod validation;

use axum::{
    http::{HeaderValue, Method},
    middleware,
    routing::{delete, get, patch, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{AllowHeaders, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Credential routes (public, tighter rate limit)
    let credential_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/password/forgot", post(auth::forgot_password))
        .route("/password/reset/:token", put(auth::reset_password))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_auth,
        ));

    // Catalog browsing (public; admins may see soft-deleted products)
    let catalog_routes = Router::new()
        .route("/products", get(products::list_products))
        .route("/product/:id", get(products::get_product));

    // Signed-in account routes
    let account_routes = Router::new()
        .route("/logout", get(auth::logout))
        .route("/me", get(auth::me))
        .route("/me/update", put(auth::update_profile))
        .route("/password/update", put(auth::update_password))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    // Admin routes: authenticate first, then check the role
    let admin_routes = Router::new()
        .route("/admin/users", get(users::list_users))
        .route(
            "/admin/user/:id",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        )
        .route("/admin/product/new", post(products::create_product))
        .route("/admin/product/:id", put(products::update_product))
        .route(
            "/admin/product/softDelete/:id",
            delete(products::soft_delete_product),
        )
        .route(
            "/admin/product/hardDelete/:id",
            delete(products::hard_delete_product),
        )
        .route(
            "/admin/product/restore/:id",
            patch(products::restore_product),
        )
        .route_layer(middleware::from_fn(auth::require_admin))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    let api_v1 = Router::new()
        .merge(credential_routes)
        .merge(catalog_routes)
        .merge(account_routes)
        .merge(admin_routes)
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_api,
        ))
        .route_layer(middleware::from_fn(metrics::metrics_middleware));

    let mut router = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics::metrics_endpoint))
        .nest("/api/v1", api_v1)
        .layer(TraceLayer::new_for_http());

    if let Some(cors) = cors_layer(&state.config.server.cors_origins) {
        router = router.layer(cors);
    }

    router.with_state(state)
}

/// Credentialed CORS for the configured front-end origins
fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if origins.is_empty() {
        return None;
    }

    Some(
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
            ])
            .allow_headers(AllowHeaders::mirror_request())
            .allow_credentials(true),
    )
}

async fn health_check() -> &'static str {
    "OK"
}
