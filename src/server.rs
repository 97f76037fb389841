use std::sync::Arc;

use actix_web::http::header::CONTENT_TYPE;
use actix_web::{HttpRequest, HttpResponse, Responder, get, post, web};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::error::ApiError;
use crate::pipeline::{self, Evaluator, Upload};
use crate::store::{HistoryEntry, HistoryStore};

const ACCEPTED_TYPES: [&str; 3] = ["image/jpeg", "image/jpg", "image/png"];

pub struct AppState {
    pub evaluator: Arc<Evaluator>,
    pub store: Arc<HistoryStore>,
}

#[derive(Deserialize)]
struct Credentials {
    username: String,
    password: String,
}

#[derive(Serialize)]
struct LoginResponse {
    user_id: i64,
}

#[derive(Serialize)]
struct HistoryRow {
    #[serde(flatten)]
    entry: HistoryEntry,
    thumbnail_available: bool,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(signup)
        .service(login)
        .service(analyze)
        .service(history);
}

#[post("/signup")]
async fn signup(
    data: web::Data<AppState>,
    req: web::Json<Credentials>,
) -> Result<impl Responder, ApiError> {
    let Credentials { username, password } = req.into_inner();
    if username.trim().is_empty() || password.is_empty() {
        return Err(ApiError::BadRequest(
            "username and password must not be empty".to_string(),
        ));
    }

    let store = data.store.clone();
    let created = web::block(move || store.create_user(&username, &password))
        .await?
        .inspect_err(|err| error!(error = %err, "failed to create user"))?;
    if !created {
        return Err(ApiError::UsernameTaken);
    }
    Ok(HttpResponse::Created().json(serde_json::json!({ "created": true })))
}

#[post("/login")]
async fn login(
    data: web::Data<AppState>,
    req: web::Json<Credentials>,
) -> Result<impl Responder, ApiError> {
    let Credentials { username, password } = req.into_inner();
    let store = data.store.clone();
    let user_id = web::block(move || store.authenticate_user(&username, &password))
        .await?
        .inspect_err(|err| error!(error = %err, "failed to authenticate user"))?
        .ok_or(ApiError::Unauthorized)?;
    Ok(HttpResponse::Ok().json(LoginResponse { user_id }))
}

#[post("/users/{user_id}/analyze")]
async fn analyze(
    data: web::Data<AppState>,
    path: web::Path<i64>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<impl Responder, ApiError> {
    let user_id = path.into_inner();
    let mime_type = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_ascii_lowercase())
        .unwrap_or_default();
    if !ACCEPTED_TYPES.contains(&mime_type.as_str()) {
        return Err(ApiError::UnsupportedMediaType(mime_type));
    }

    let store = data.store.clone();
    let evaluator = data.evaluator.clone();
    let verdict = web::block(move || -> Result<_, ApiError> {
        let exists = store
            .user_exists(user_id)
            .inspect_err(|err| error!(user_id, error = %err, "failed to look up user"))?;
        if !exists {
            return Err(ApiError::UnknownUser(user_id));
        }

        let upload = Upload::decode(body.to_vec(), &mime_type)?;
        info!(user_id, bytes = upload.bytes.len(), %mime_type, "processing upload");
        let verdict = evaluator.evaluate(&upload);

        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        pipeline::record(&store, user_id, &upload, &verdict, &timestamp).inspect_err(|err| {
            error!(user_id, error = %err, "failed to record evaluation");
        })?;
        Ok(verdict)
    })
    .await??;

    Ok(HttpResponse::Ok().json(verdict))
}

#[get("/users/{user_id}/history")]
async fn history(
    data: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<impl Responder, ApiError> {
    let user_id = path.into_inner();
    let store = data.store.clone();
    let rows = web::block(move || -> Result<_, ApiError> {
        let exists = store
            .user_exists(user_id)
            .inspect_err(|err| error!(user_id, error = %err, "failed to look up user"))?;
        if !exists {
            return Err(ApiError::UnknownUser(user_id));
        }
        let rows: Vec<HistoryRow> = store
            .get_user_history(user_id)
            .inspect_err(|err| error!(user_id, error = %err, "failed to load history"))?
            .into_iter()
            .map(|entry| HistoryRow {
                thumbnail_available: entry.thumbnail_path.exists(),
                entry,
            })
            .collect();
        Ok(rows)
    })
    .await??;

    Ok(HttpResponse::Ok().json(rows))
}
