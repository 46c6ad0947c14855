use std::sync::Arc;

use axum::{
    error_handling::HandleErrorLayer,
    extract::{
        multipart::{Field, MultipartRejection},
        rejection::{JsonRejection, PathRejection, QueryRejection},
        DefaultBodyLimit, Multipart, Path, Query, State,
    },
    handler::Handler,
    http::{header, Method},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    BoxError, Extension, Json, Router,
};
use deskflow_shared::{Caller, Clock};
use deskflow_store::{Activity, Document, NewDocument, SyncStats, Ticket, User};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::auth::{require_admin, require_auth, Authenticator, TokenPair};
use crate::config::ServerConfig;
use crate::error::ServiceError;
use crate::response::Envelope;
use crate::service::accounts::{Credentials, DirectoryRecord};
use crate::service::tickets::{TicketForm, TicketQuery, TicketUpdate};
use crate::service::users::{PasswordChange, UserInput, UserPatch};
use crate::service::{
    AccountService, ActivityService, DocumentService, Store, TicketService, TicketSummary,
    UserService,
};

/// Upper bound on files in one multipart request.
const MAX_FILES_PER_REQUEST: usize = 10;

/// Form field carrying uploaded files.
const DOCUMENTS_FIELD: &str = "documents";

/// Form field carrying a profile photo.
const PHOTO_FIELD: &str = "photo";

#[derive(Clone)]
pub struct AppState {
    pub tickets: TicketService,
    pub activities: ActivityService,
    pub documents: DocumentService,
    pub users: UserService,
    pub accounts: AccountService,
    pub auth: Authenticator,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(
        config: ServerConfig,
        store: Store,
        auth: Authenticator,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let max = config.max_document_size;
        Self {
            tickets: TicketService::new(store.clone(), clock.clone(), max),
            activities: ActivityService::new(store.clone(), clock.clone(), max),
            documents: DocumentService::new(store.clone()),
            users: UserService::new(store.clone(), clock.clone(), max),
            accounts: AccountService::new(store, auth.clone(), clock),
            auth,
            config: Arc::new(config),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    let body_limit = state
        .config
        .max_document_size
        .saturating_mul(MAX_FILES_PER_REQUEST);

    let admin = Router::new()
        .route("/users", get(list_users).post(create_user))
        .route_layer(middleware::from_fn(require_admin));

    let authenticated = Router::new()
        .route("/tickets", get(list_tickets).post(create_ticket))
        .route("/tickets/summary", get(ticket_summary))
        .route(
            "/tickets/:id",
            get(get_ticket).put(update_ticket).delete(delete_ticket),
        )
        .route("/tickets/:id/close", put(close_ticket))
        .route("/tickets/:id/documents", put(replace_ticket_documents))
        .route(
            "/tickets/:id/activities",
            get(list_activities).post(create_activity),
        )
        .route(
            "/activities/:id",
            get(get_activity).put(update_activity).delete(delete_activity),
        )
        .route("/documents/:id", get(get_document))
        .route("/documents/:id/download", get(download_document))
        .route("/documents/:id/file", get(serve_document))
        .route(
            "/users/:id",
            get(get_user)
                .put(update_user)
                .delete(delete_user.layer(middleware::from_fn(require_admin))),
        )
        .route("/users/:id/password", put(update_user_password))
        .route("/users/:id/photo", put(update_user_photo))
        .merge(admin)
        .route_layer(middleware::from_fn_with_state(
            state.auth.clone(),
            require_auth,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/ping", get(ping))
        .route("/auth/sign-in", post(sign_in))
        .route("/auth/sign-up", post(sign_up))
        .route("/auth/refresh-token", post(refresh_token))
        .route("/directory/sync", post(directory_sync))
        .route("/directory/sign-in", post(directory_sign_in))
        .merge(authenticated)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_middleware_error))
                .timeout(state.config.request_timeout),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

type ApiResult<T> = Result<Envelope<T>, ServiceError>;

async fn handle_middleware_error(err: BoxError) -> ServiceError {
    if err.is::<tower::timeout::error::Elapsed>() {
        ServiceError::Timeout
    } else {
        ServiceError::Internal(err.to_string())
    }
}

// ─── Public ───

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    instance: String,
}

async fn health_check(State(state): State<AppState>) -> Envelope<HealthResponse> {
    Envelope::success(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        instance: state.config.instance_name.clone(),
    })
}

async fn ping() -> Envelope<&'static str> {
    Envelope::success("pong")
}

async fn sign_in(
    State(state): State<AppState>,
    body: Result<Json<Credentials>, JsonRejection>,
) -> ApiResult<TokenPair> {
    let Json(credentials) = body?;
    Ok(Envelope::success(state.accounts.sign_in(credentials).await?))
}

async fn sign_up(
    State(state): State<AppState>,
    body: Result<Json<UserInput>, JsonRejection>,
) -> ApiResult<User> {
    let Json(input) = body?;
    Ok(Envelope::success(state.users.sign_up(input).await?))
}

#[derive(Deserialize)]
struct RefreshRequest {
    refresh_token: String,
}

async fn refresh_token(
    State(state): State<AppState>,
    body: Result<Json<RefreshRequest>, JsonRejection>,
) -> ApiResult<TokenPair> {
    let Json(req) = body?;
    Ok(Envelope::success(
        state.accounts.refresh_token(&req.refresh_token).await?,
    ))
}

async fn directory_sync(
    State(state): State<AppState>,
    body: Result<Json<Vec<DirectoryRecord>>, JsonRejection>,
) -> ApiResult<SyncStats> {
    let Json(records) = body?;
    Ok(Envelope::success(
        state.accounts.sync_directory_users(records).await?,
    ))
}

async fn directory_sign_in(
    State(state): State<AppState>,
    body: Result<Json<Credentials>, JsonRejection>,
) -> ApiResult<TokenPair> {
    let Json(credentials) = body?;
    Ok(Envelope::success(
        state.accounts.sync_directory_password(credentials).await?,
    ))
}

// ─── Tickets ───

async fn list_tickets(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    query: Result<Query<TicketQuery>, QueryRejection>,
) -> ApiResult<Vec<Ticket>> {
    let Query(query) = query?;
    Ok(Envelope::success(
        state.tickets.get_tickets(caller, query).await?,
    ))
}

async fn create_ticket(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Ticket> {
    let form = read_ticket_form(multipart?).await?;
    Ok(Envelope::success(state.tickets.add_ticket(caller, form).await?))
}

async fn ticket_summary(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<TicketSummary> {
    Ok(Envelope::success(
        state.tickets.get_ticket_summary(caller).await?,
    ))
}

async fn get_ticket(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<Ticket> {
    let Path(id) = id?;
    Ok(Envelope::success(state.tickets.get_ticket_by_id(id).await?))
}

async fn update_ticket(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    id: Result<Path<i64>, PathRejection>,
    body: Result<Json<TicketUpdate>, JsonRejection>,
) -> ApiResult<Ticket> {
    let Path(id) = id?;
    let Json(update) = body?;
    Ok(Envelope::success(
        state.tickets.update_ticket(caller, id, update).await?,
    ))
}

#[derive(Deserialize, Default)]
struct CloseRequest {
    #[serde(default)]
    status: Option<String>,
}

async fn close_ticket(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    id: Result<Path<i64>, PathRejection>,
    body: Option<Json<CloseRequest>>,
) -> ApiResult<Ticket> {
    let Path(id) = id?;
    let status = body.and_then(|Json(req)| req.status);
    Ok(Envelope::success(
        state.tickets.close_ticket(caller, id, status).await?,
    ))
}

async fn replace_ticket_documents(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    id: Result<Path<i64>, PathRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Ticket> {
    let Path(id) = id?;
    let form = read_ticket_form(multipart?).await?;
    Ok(Envelope::success(
        state
            .tickets
            .replace_ticket_documents(caller, id, form.documents)
            .await?,
    ))
}

async fn delete_ticket(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<Value> {
    let Path(id) = id?;
    state.tickets.delete_ticket(caller, id).await?;
    Ok(Envelope::success(json!({ "deleted": true })))
}

// ─── Activities ───

async fn list_activities(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<Vec<Activity>> {
    let Path(ticket_id) = id?;
    Ok(Envelope::success(
        state.activities.get_activities_by_ticket(ticket_id).await?,
    ))
}

async fn create_activity(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    id: Result<Path<i64>, PathRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Activity> {
    let Path(ticket_id) = id?;
    let form = read_ticket_form(multipart?).await?;
    Ok(Envelope::success(
        state
            .activities
            .add_activity(
                caller,
                ticket_id,
                form.description.unwrap_or_default(),
                form.documents,
            )
            .await?,
    ))
}

async fn get_activity(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<Activity> {
    let Path(id) = id?;
    Ok(Envelope::success(
        state.activities.get_activity_by_id(id).await?,
    ))
}

#[derive(Deserialize)]
struct ActivityUpdate {
    description: String,
}

async fn update_activity(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    id: Result<Path<i64>, PathRejection>,
    body: Result<Json<ActivityUpdate>, JsonRejection>,
) -> ApiResult<Activity> {
    let Path(id) = id?;
    let Json(update) = body?;
    Ok(Envelope::success(
        state
            .activities
            .update_activity(caller, id, update.description)
            .await?,
    ))
}

async fn delete_activity(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<Value> {
    let Path(id) = id?;
    state.activities.delete_activity(caller, id).await?;
    Ok(Envelope::success(json!({ "deleted": true })))
}

// ─── Documents ───

async fn get_document(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<Document> {
    let Path(id) = id?;
    Ok(Envelope::success(
        state.documents.get_document_by_id(id).await?,
    ))
}

async fn download_document(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Response, ServiceError> {
    let Path(id) = id?;
    let (document, content) = state.documents.download_document(id).await?;
    Ok(file_response("attachment", document, content))
}

/// Same bytes as the download, shown in the browser instead of saved.
async fn serve_document(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Response, ServiceError> {
    let Path(id) = id?;
    let (document, content) = state.documents.download_document(id).await?;
    Ok(file_response("inline", document, content))
}

fn file_response(disposition: &str, document: Document, content: Vec<u8>) -> Response {
    let disposition = format!(
        "{disposition}; filename=\"{}\"",
        document.document_name.replace(['"', '\\', '\r', '\n'], "_")
    );
    (
        [
            (header::CONTENT_TYPE, document.document_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        content,
    )
        .into_response()
}

// ─── Users ───

async fn list_users(State(state): State<AppState>) -> ApiResult<Vec<User>> {
    Ok(Envelope::success(state.users.get_users().await?))
}

async fn create_user(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    body: Result<Json<UserInput>, JsonRejection>,
) -> ApiResult<User> {
    let Json(input) = body?;
    Ok(Envelope::success(state.users.add_user(caller, input).await?))
}

async fn get_user(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<User> {
    let Path(id) = id?;
    Ok(Envelope::success(state.users.get_user_by_id(id).await?))
}

async fn update_user(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    id: Result<Path<i64>, PathRejection>,
    body: Result<Json<UserPatch>, JsonRejection>,
) -> ApiResult<User> {
    let Path(id) = id?;
    let Json(patch) = body?;
    Ok(Envelope::success(
        state.users.update_user(caller, id, patch).await?,
    ))
}

async fn delete_user(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<Value> {
    let Path(id) = id?;
    state.users.delete_user(caller, id).await?;
    Ok(Envelope::success(json!({ "deleted": true })))
}

async fn update_user_password(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    id: Result<Path<i64>, PathRejection>,
    body: Result<Json<PasswordChange>, JsonRejection>,
) -> ApiResult<Value> {
    let Path(id) = id?;
    let Json(change) = body?;
    state.users.update_user_password(caller, id, change).await?;
    Ok(Envelope::success(json!({ "updated": true })))
}

async fn update_user_photo(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    id: Result<Path<i64>, PathRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<User> {
    let Path(id) = id?;
    let photo = read_photo(multipart?).await?;
    Ok(Envelope::success(
        state.users.update_user_photo(caller, id, photo).await?,
    ))
}

// ─── Multipart ───

/// The first `photo` file part; other fields are ignored.
async fn read_photo(mut multipart: Multipart) -> Result<Option<NewDocument>, ServiceError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(PHOTO_FIELD) {
            return Ok(Some(read_document(field).await?));
        }
    }
    Ok(None)
}

/// Collect text fields and `documents` file parts.  Shared by ticket
/// creation, document replacement and activity creation.
async fn read_ticket_form(mut multipart: Multipart) -> Result<TicketForm, ServiceError> {
    let mut form = TicketForm::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();

        if name == DOCUMENTS_FIELD {
            if form.documents.len() == MAX_FILES_PER_REQUEST {
                return Err(ServiceError::Validation(format!(
                    "at most {MAX_FILES_PER_REQUEST} documents per request"
                )));
            }
            let document = read_document(field).await?;
            if !document.content.is_empty() {
                form.documents.push(document);
            }
            continue;
        }

        let value = field.text().await?;
        match name.as_str() {
            "ticket_type" => form.ticket_type = value,
            "subject" => form.subject = value,
            "content" => form.content = Some(value),
            "reporter_id" => form.reporter_id = Some(value),
            "assigned_id" => form.assigned_id = Some(value),
            "priority" => form.priority = value,
            "status" => form.status = Some(value),
            "report_date" => form.report_date = Some(value),
            "description" => form.description = Some(value),
            other => debug!(field = other, "Ignoring unknown form field"),
        }
    }

    Ok(form)
}

async fn read_document(field: Field<'_>) -> Result<NewDocument, ServiceError> {
    let file_name = field.file_name().unwrap_or("document").to_string();
    let document_type = field
        .content_type()
        .unwrap_or("application/octet-stream")
        .to_string();
    let content = field.bytes().await?;

    Ok(NewDocument {
        file_name,
        document_type,
        content,
    })
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
