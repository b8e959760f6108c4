use std::sync::Arc;

use axum::http::Method;
use axum::routing::{delete, get, post, put};
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::errors::AppError;
use crate::events::{self, EventBus};
use crate::jwt::JwtConfig;
use crate::models::role::FORMER_MEMBER_PERMISSION;
use crate::routes::{admissions, auth, health, labs, members};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    /// The single Former Member lab role, resolved once at startup. All
    /// soft-delete and reactivation logic compares against this id instead
    /// of scattering the -1 literal around.
    pub sentinel_role_id: Uuid,
    pub event_bus: EventBus,
}

impl AppState {
    pub fn new(pool: SqlitePool, jwt: JwtConfig, sentinel_role_id: Uuid, event_bus: EventBus) -> Self {
        Self {
            pool,
            jwt: Arc::new(jwt),
            sentinel_role_id,
            event_bus,
        }
    }
}

/// Resolve the Former Member sentinel role. Exactly one must exist; anything
/// else is a deployment error worth failing fast on.
async fn resolve_sentinel_role(pool: &SqlitePool) -> Result<Uuid, AppError> {
    let ids: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM lab_roles WHERE permission_level = ?")
        .bind(FORMER_MEMBER_PERMISSION)
        .fetch_all(pool)
        .await?;

    match ids.as_slice() {
        [id] => Ok(*id),
        [] => Err(AppError::configuration("Former Member sentinel lab role missing")),
        _ => Err(AppError::configuration("multiple Former Member sentinel lab roles found")),
    }
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let jwt_config = JwtConfig::from_env()?;
    let sentinel_role_id = resolve_sentinel_role(&pool).await?;

    let (event_bus, rx) = events::init_event_bus();
    tokio::spawn(events::start_activity_listener(rx, pool.clone()));

    let state = AppState::new(pool, jwt_config, sentinel_role_id, event_bus);

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/me", get(auth::me));

    let lab_routes = Router::new()
        .route("/", get(labs::list_labs))
        .route("/:lab_id", get(labs::get_lab))
        .route(
            "/:lab_id/admissions",
            post(admissions::request_admission).get(admissions::list_lab_admissions),
        )
        .route("/:lab_id/members", get(members::list_members))
        .route("/:lab_id/members/:user_id", delete(members::remove_member))
        .route("/:lab_id/available-users", get(members::list_available_users));

    let admission_routes = Router::new()
        .route("/mine", get(admissions::list_my_admissions))
        .route("/:id/approve", post(admissions::approve_admission))
        .route("/:id/reject", post(admissions::reject_admission))
        .route("/:id/withdraw", post(admissions::withdraw_admission));

    let member_routes = Router::new()
        .route("/:id/role", put(members::change_role))
        .route("/:id/induction", post(members::toggle_induction))
        .route("/:id/pci", put(members::set_pci))
        .route("/:id/status", put(members::set_status));

    let router = Router::new()
        .route("/api/health", get(health::health))
        .nest("/api/auth", auth_routes)
        .nest("/api/labs", lab_routes)
        .nest("/api/admissions", admission_routes)
        .nest("/api/members", member_routes)
        .route("/api/lab-roles", get(labs::list_lab_roles))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    Ok(router)
}
