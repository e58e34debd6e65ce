use axum::{
    Extension, Json, Router,
    extract::{DefaultBodyLimit, Multipart, State, multipart::MultipartError},
    http::{HeaderValue, StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::config::Config;
use crate::downloader::{self, CSV_FILENAME};
use crate::error::AppError;
use crate::forward::{Forwarder, UploadedFile};
use crate::loader::{self, RowRecord};
use crate::login::{self, SessionId, SessionStore};
use crate::saving::DatasetStore;
use crate::users::{AcceptAll, CredentialVerifier, UserFile};

/// Multipart field holding the uploaded spreadsheet, and the primary file to forward.
pub const FILE_FIELD: &str = "file";
/// Optional second spreadsheet for `/process-files`.
pub const SECONDARY_FIELD: &str = "spreadsheet";

const NO_CACHE: &str = "no-store, no-cache, must-revalidate, post-check=0, pre-check=0, max-age=0";

pub struct AppState {
    pub config: Config,
    pub sessions: SessionStore,
    pub store: DatasetStore,
    pub forwarder: Forwarder,
    pub verifier: Box<dyn CredentialVerifier>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, AppError> {
        let verifier: Box<dyn CredentialVerifier> = match &config.users_file {
            Some(path) => {
                let users = UserFile::load(path)?;
                if users.is_empty() {
                    warn!("Users file {} has no users, every login will fail", path.display());
                } else {
                    info!("Loaded {} users from {}", users.len(), path.display());
                }
                Box::new(users)
            }
            None => {
                info!("No users file configured, accepting any login");
                Box::new(AcceptAll)
            }
        };

        Ok(AppState {
            sessions: SessionStore::new(config.session_ttl),
            store: DatasetStore::open(&config.data_dir, config.dataset_ttl)?,
            forwarder: Forwarder::new(config.external_api_url.clone(), config.external_timeout)?,
            verifier,
            config,
        })
    }
}

#[derive(Serialize)]
struct UploadResponse {
    output: Vec<RowRecord>,
}

/// Build the router for the given state
pub fn router(state: Arc<AppState>) -> Router {
    let pages = Router::new()
        .route("/dashboard", get(login::serve_dashboard))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            login::require_login,
        ));

    let data = Router::new()
        .route("/process-file", post(process_file))
        .route("/process-files", post(process_files))
        .route("/download-csv", get(download_csv))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            login::require_login_api,
        ));

    Router::new()
        .route("/", get(login::serve_login_page).post(login::handle_login))
        .route("/logout", post(login::handle_logout))
        .merge(pages)
        .merge(data)
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static(NO_CACHE),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::PRAGMA,
            HeaderValue::from_static("no-cache"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::EXPIRES,
            HeaderValue::from_static("-1"),
        ))
        .with_state(state)
}

pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let bind_addr = config.bind_addr.clone();
    let state = Arc::new(AppState::new(config)?);
    let app = router(state);

    let listener = TcpListener::bind(&bind_addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                log::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

// The body limit surfaces as a multipart read error; keep its 413.
fn upload_error(e: MultipartError, limit: usize) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::UploadTooLarge { limit }
    } else {
        AppError::InvalidUpload(e.body_text())
    }
}

// Collect every file part by field name. Parts without a filename are
// ordinary form values and are skipped.
async fn read_files(
    multipart: &mut Multipart,
    limit: usize,
) -> Result<HashMap<String, UploadedFile>, AppError> {
    let mut files = HashMap::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| upload_error(e, limit))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| upload_error(e, limit))?;

        // An empty file input still submits a part, with an empty filename.
        if file_name.is_empty() {
            continue;
        }

        files.insert(
            name.clone(),
            UploadedFile {
                field: name,
                file_name,
                content_type,
                bytes,
            },
        );
    }

    Ok(files)
}

/// Upload a spreadsheet, store its rows for this session and echo them back.
async fn process_file(
    State(state): State<Arc<AppState>>,
    Extension(SessionId(session_id)): Extension<SessionId>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut files = read_files(&mut multipart, state.config.max_upload_bytes).await?;
    let file = files.remove(FILE_FIELD).ok_or(AppError::MissingFile)?;

    let rows = loader::parse(&file.bytes, &file.file_name)?;
    state.store.save(&session_id, &rows)?;

    info!("Parsed {} rows from {}", rows.len(), file.file_name);
    Ok(Json(UploadResponse { output: rows }))
}

/// Relay the upload to the external API and keep whatever JSON it returns.
async fn process_files(
    State(state): State<Arc<AppState>>,
    Extension(SessionId(session_id)): Extension<SessionId>,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let mut files = read_files(&mut multipart, state.config.max_upload_bytes).await?;
    let primary = files.remove(FILE_FIELD).ok_or(AppError::MissingFile)?;

    let mut outgoing = vec![primary];
    if let Some(secondary) = files.remove(SECONDARY_FIELD) {
        if loader::is_spreadsheet(&secondary.file_name) {
            outgoing.push(secondary);
        } else {
            debug!("Dropping secondary file {}: not a spreadsheet", secondary.file_name);
        }
    }

    let forwarded = state.forwarder.forward(outgoing).await?;
    state.store.save(&session_id, &forwarded.rows)?;

    Ok(([(header::CONTENT_TYPE, "application/json")], forwarded.raw).into_response())
}

/// Render this session's dataset as a CSV attachment.
async fn download_csv(
    State(state): State<Arc<AppState>>,
    Extension(SessionId(session_id)): Extension<SessionId>,
) -> Result<Response, AppError> {
    let rows = state.store.load(&session_id)?;
    let csv = downloader::render_csv(&rows)?;
    let path = state.store.save_export(&session_id, &csv)?;

    debug!("Wrote {} bytes of CSV to {}", csv.len(), path.display());

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", CSV_FILENAME),
            ),
        ],
        csv,
    )
        .into_response())
}
