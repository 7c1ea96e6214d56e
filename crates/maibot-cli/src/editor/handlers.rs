//! Web editor endpoints.
//!
//! Every request reloads `config.toml` so edits made in the console or a text
//! editor meanwhile are never overwritten with stale data.

use super::settings::EditorSettings;
use axum::{
    extract::{Path as UrlPath, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    Json,
};
use maibot_core::{AppConfig, ConfigStore, InstanceConfig, LauncherError};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const PAGE: &str = include_str!("page.html");

/// Fields holding directories or executables. Empty is allowed.
const PATH_FIELDS: [&str; 6] = [
    "mai_path",
    "adapter_path",
    "napcat_path",
    "venv_path",
    "mongodb_path",
    "webui_path",
];

pub struct EditorState {
    pub config_path: PathBuf,
    pub settings_path: PathBuf,
    /// Serializes read-modify-write cycles on both files.
    pub lock: Mutex<()>,
}

impl EditorState {
    pub fn new(config_path: &Path) -> Self {
        Self {
            config_path: config_path.to_path_buf(),
            settings_path: EditorSettings::path_for(config_path),
            lock: Mutex::new(()),
        }
    }

    fn store(&self) -> Result<ConfigStore, ApiError> {
        let store = ConfigStore::load(&self.config_path)?;
        if let Some(message) = store.load_error() {
            return Err(ApiError::Unreadable(message.to_string()));
        }
        Ok(store)
    }

    fn settings(&self) -> Result<EditorSettings, ApiError> {
        Ok(EditorSettings::load(&self.settings_path)?)
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("配置集不存在")]
    NotFound,
    #[error("配置集名称或用户序列号已存在")]
    Conflict,
    #[error("路径无效: {0}")]
    InvalidPath(String),
    #[error("未知字段: {0}")]
    UnknownField(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("配置文件解析失败，请先修复: {0}")]
    Unreadable(String),
    #[error(transparent)]
    Launcher(#[from] LauncherError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Conflict => StatusCode::CONFLICT,
            ApiError::InvalidPath(_) | ApiError::UnknownField(_) | ApiError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Unreadable(_) | ApiError::Launcher(_) | ApiError::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!("Editor request failed: {}", self);
        } else {
            debug!("Editor request rejected: {}", self);
        }
        (status, Json(json!({"success": false, "msg": self.to_string()}))).into_response()
    }
}

type ApiResult = Result<Json<Value>, ApiError>;

fn ok(msg: &str) -> Json<Value> {
    Json(json!({"success": true, "msg": msg}))
}

/// Apply `changes` to `instance`. Unknown keys and missing paths are rejected.
fn merge(instance: &InstanceConfig, changes: &Map<String, Value>) -> Result<InstanceConfig, ApiError> {
    let mut fields = match serde_json::to_value(instance).map_err(anyhow::Error::from)? {
        Value::Object(fields) => fields,
        _ => return Err(ApiError::BadRequest("instance is not an object".into())),
    };

    for (key, value) in changes {
        if !fields.contains_key(key) {
            return Err(ApiError::UnknownField(key.clone()));
        }
        if PATH_FIELDS.contains(&key.as_str()) {
            let path = value.as_str().unwrap_or_default();
            let usable = path.is_empty()
                || path == AppConfig::NO_ADAPTER_SENTINEL
                || Path::new(path).exists();
            if !usable {
                return Err(ApiError::InvalidPath(key.clone()));
            }
        }
        fields.insert(key.clone(), value.clone());
    }

    serde_json::from_value(Value::Object(fields)).map_err(|e| ApiError::BadRequest(e.to_string()))
}

pub async fn handle_page() -> Html<&'static str> {
    Html(PAGE)
}

pub async fn handle_health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// All records keyed by name.
pub async fn list_configs(State(state): State<Arc<EditorState>>) -> ApiResult {
    let _guard = state.lock.lock().await;
    let store = state.store()?;
    let configurations = serde_json::to_value(&store.document().configurations)
        .map_err(anyhow::Error::from)?;
    Ok(Json(configurations))
}

pub async fn update_config(
    State(state): State<Arc<EditorState>>,
    UrlPath(name): UrlPath<String>,
    Json(changes): Json<Map<String, Value>>,
) -> ApiResult {
    let _guard = state.lock.lock().await;
    let mut store = state.store()?;
    let current = store.get(&name).ok_or(ApiError::NotFound)?;
    let updated = merge(current, &changes)?;

    if updated.serial_number != current.serial_number
        && store
            .iter()
            .any(|(other, cfg)| *other != name && cfg.serial_number == updated.serial_number)
    {
        return Err(ApiError::Conflict);
    }

    store.update(&name, updated)?;
    store.save()?;
    info!("Editor updated configuration {}", name);
    Ok(ok("配置已保存"))
}

#[derive(Debug, Deserialize)]
pub struct NewConfig {
    pub name: String,
    #[serde(default)]
    pub config: Map<String, Value>,
}

pub async fn create_config(
    State(state): State<Arc<EditorState>>,
    Json(request): Json<NewConfig>,
) -> ApiResult {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("配置集名称不能为空".into()));
    }

    let _guard = state.lock.lock().await;
    let mut store = state.store()?;
    let mut settings = state.settings()?;

    let mut instance = merge(&InstanceConfig::default(), &request.config)?;
    if !request.config.contains_key("serial_number") {
        instance.serial_number = store.generate_unique_serial().to_string();
    }
    if store.contains(name) || store.serial_in_use(&instance.serial_number) {
        return Err(ApiError::Conflict);
    }
    // The store picks a free absolute serial.
    instance.absolute_serial_number = 0;

    let absolute = store.add(name, instance)?;
    store.save()?;
    if let Some(saved) = store.get(name) {
        settings.record(name, saved);
        settings.save(&state.settings_path)?;
    }
    info!("Editor created configuration {} (absolute {})", name, absolute);
    Ok(Json(json!({
        "success": true,
        "msg": "配置集已创建",
        "absolute_serial_number": absolute,
    })))
}

/// Whether install options may be edited: only for instances the editor created.
pub async fn config_ui_info(
    State(state): State<Arc<EditorState>>,
    UrlPath(name): UrlPath<String>,
) -> ApiResult {
    let _guard = state.lock.lock().await;
    let store = state.store()?;
    let settings = state.settings()?;
    Ok(Json(json!({
        "success": true,
        "editable_install_options": store.contains(&name) && settings.tracks(&name),
    })))
}

pub async fn delete_config(
    State(state): State<Arc<EditorState>>,
    UrlPath(name): UrlPath<String>,
) -> ApiResult {
    let _guard = state.lock.lock().await;
    let mut store = state.store()?;
    if !store.contains(&name) {
        return Err(ApiError::NotFound);
    }
    let mut settings = state.settings()?;

    store.remove(&name)?;
    store.save()?;
    if settings.forget(&name) {
        settings.save(&state.settings_path)?;
    }
    info!("Editor removed configuration {}", name);
    Ok(ok("配置集已删除"))
}

pub async fn get_ui_settings(State(state): State<Arc<EditorState>>) -> ApiResult {
    let _guard = state.lock.lock().await;
    let settings = state.settings()?;
    Ok(Json(Value::Object(settings.ui_settings)))
}

pub async fn update_ui_settings(
    State(state): State<Arc<EditorState>>,
    Json(changes): Json<Map<String, Value>>,
) -> ApiResult {
    let _guard = state.lock.lock().await;
    let mut settings = state.settings()?;
    settings.ui_settings.extend(changes);
    settings.save(&state.settings_path)?;
    Ok(ok("界面设置已保存"))
}
