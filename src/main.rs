use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use labhub::models;
use labhub::routes;
use labhub::{app, db};

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::health::health,
        routes::auth::register,
        routes::auth::login,
        routes::auth::me,
        routes::labs::list_labs,
        routes::labs::get_lab,
        routes::labs::list_lab_roles,
        routes::admissions::request_admission,
        routes::admissions::list_lab_admissions,
        routes::admissions::list_my_admissions,
        routes::admissions::approve_admission,
        routes::admissions::reject_admission,
        routes::admissions::withdraw_admission,
        routes::members::list_members,
        routes::members::remove_member,
        routes::members::change_role,
        routes::members::toggle_induction,
        routes::members::set_pci,
        routes::members::set_status,
        routes::members::list_available_users,
    ),
    components(
        schemas(
            models::user::User,
            models::user::UserSummary,
            models::user::AuthResponse,
            models::user::LoginRequest,
            models::user::RegisterRequest,
            models::lab::Lab,
            models::lab::LabSummary,
            models::role::Role,
            models::role::LabRole,
            models::member::LabMember,
            models::member::LabMemberDetail,
            models::member::MemberStatus,
            models::member::ChangeRoleRequest,
            models::member::SetPciRequest,
            models::member::SetStatusRequest,
            models::member::AvailableUser,
            models::member::AvailableUsersResponse,
            models::member::Pagination,
            models::admission::AdmissionStatus,
            models::admission::LabAdmission,
            models::admission::AdmissionDetail,
            models::admission::RequestAdmissionRequest,
            models::admission::ApproveAdmissionRequest,
            models::admission::ApprovalResponse,
        )
    ),
    tags(
        (name = "Auth", description = "Authentication endpoints"),
        (name = "Labs", description = "Lab and lab-role listings"),
        (name = "Admissions", description = "Lab admission workflow"),
        (name = "Members", description = "Lab membership administration"),
        (name = "Health", description = "Liveness")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_env();
    init_tracing();

    let pool = db::init().await?;
    let app = app::create_app(pool).await?;

    let app = app.merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()));

    let port = std::env::var("APP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8000);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

fn load_env() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    let crate_env = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    let _ = dotenvy::from_path(crate_env);
}

fn init_tracing() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false);

    let filter_layer = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}
