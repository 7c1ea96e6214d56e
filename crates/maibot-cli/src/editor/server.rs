//! HTTP server for the web config editor.

use super::handlers::{
    config_ui_info, create_config, delete_config, get_ui_settings, handle_health, handle_page,
    list_configs, update_config, update_ui_settings, EditorState,
};
use super::settings::EditorSettings;
use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use maibot_core::{AppConfig, ConfigStore};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

/// A running editor. Dropping it also shuts the server down.
pub struct EditorServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<std::io::Result<()>>,
}

impl EditorServer {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    /// Stop accepting requests and wait for in-flight ones to finish.
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        match (&mut self.task).await {
            Ok(Ok(())) => info!("Config editor on {} stopped", self.addr),
            Ok(Err(e)) => warn!("Config editor exited with error: {}", e),
            Err(e) => warn!("Config editor task failed: {}", e),
        }
    }
}

fn router(state: Arc<EditorState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_page))
        .route("/health", get(handle_health))
        .route("/api/configs", get(list_configs).post(create_config))
        .route("/api/configs/:name", post(update_config).delete(delete_config))
        .route("/api/configs/:name/uiinfo", get(config_ui_info))
        .route("/api/ui_settings", get(get_ui_settings).post(update_ui_settings))
        .layer(cors)
        .with_state(state)
}

/// Start the editor for the store at `config_path`.
///
/// The port comes from `.config_UI.json`. When it is taken the server falls
/// back to any free port.
pub async fn start_editor(config_path: &Path) -> Result<EditorServer> {
    let state = Arc::new(EditorState::new(config_path));

    let mut settings = EditorSettings::load(&state.settings_path)?;
    let store = ConfigStore::load(config_path)?;
    if store.load_error().is_none() && settings.sync_with(&store) {
        settings.save(&state.settings_path)?;
    }

    let addr: SocketAddr = format!("{}:{}", AppConfig::EDITOR_HOST, settings.port()).parse()?;
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            warn!("Cannot bind {}: {}, using a free port", addr, e);
            TcpListener::bind((AppConfig::EDITOR_HOST, 0)).await?
        }
    };
    let addr = listener.local_addr()?;
    info!("Config editor listening on {}", addr);

    let (shutdown, signal) = oneshot::channel::<()>();
    let app = router(state);
    let task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = signal.await;
            })
            .await
    });

    Ok(EditorServer {
        addr,
        shutdown: Some(shutdown),
        task,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::fs;
    use tempfile::TempDir;

    /// Editor over a fresh store in `dir`, bound to a free port.
    async fn editor_in(dir: &Path) -> (EditorServer, reqwest::Client) {
        fs::write(
            dir.join(".config_UI.json"),
            r#"{"instances":[],"ui_settings":{"port":0}}"#,
        )
        .unwrap();
        let server = start_editor(&dir.join("config.toml")).await.unwrap();
        (server, reqwest::Client::new())
    }

    #[tokio::test]
    async fn test_editor_serves_page_and_health() {
        let tmp = TempDir::new().unwrap();
        let (server, client) = editor_in(tmp.path()).await;
        assert!(server.addr().port() > 0);

        let page = client.get(server.url()).send().await.unwrap();
        assert!(page.status().is_success());
        assert!(page.text().await.unwrap().contains("<html"));

        let health: Value = client
            .get(format!("{}health", server.url()))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["status"], "ok");
        server.stop().await;
    }

    #[tokio::test]
    async fn test_create_update_delete_config() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join("config.toml");
        let (server, client) = editor_in(tmp.path()).await;
        let api = format!("{}api/configs", server.url());

        let created = client
            .post(&api)
            .json(&json!({"name": "bot2", "config": {"serial_number": "7", "nickname_path": "小麦"}}))
            .send()
            .await
            .unwrap();
        assert!(created.status().is_success());
        let body: Value = created.json().await.unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["absolute_serial_number"], 2);

        let duplicate = client
            .post(&api)
            .json(&json!({"name": "bot3", "config": {"serial_number": "7"}}))
            .send()
            .await
            .unwrap();
        assert_eq!(duplicate.status(), reqwest::StatusCode::CONFLICT);
        let body: Value = duplicate.json().await.unwrap();
        assert_eq!(body["msg"], "配置集名称或用户序列号已存在");

        let info: Value = client
            .get(format!("{}/bot2/uiinfo", api))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(info["editable_install_options"], true);
        let info: Value = client
            .get(format!("{}/default/uiinfo", api))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(info["editable_install_options"], false);

        let bad_path = client
            .post(format!("{}/bot2", api))
            .json(&json!({"mai_path": tmp.path().join("nope")}))
            .send()
            .await
            .unwrap();
        assert_eq!(bad_path.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: Value = bad_path.json().await.unwrap();
        assert_eq!(body["msg"], "路径无效: mai_path");

        let updated = client
            .post(format!("{}/bot2", api))
            .json(&json!({"qq_account": "123456", "mai_path": tmp.path()}))
            .send()
            .await
            .unwrap();
        assert!(updated.status().is_success());
        let store = ConfigStore::load(&config_path).unwrap();
        assert_eq!(store.get("bot2").unwrap().qq_account, "123456");

        let listed: Value = client.get(&api).send().await.unwrap().json().await.unwrap();
        assert_eq!(listed["bot2"]["nickname_path"], "小麦");

        let deleted = client.delete(format!("{}/bot2", api)).send().await.unwrap();
        assert!(deleted.status().is_success());
        let missing = client.delete(format!("{}/bot2", api)).send().await.unwrap();
        assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);
        let body: Value = missing.json().await.unwrap();
        assert_eq!(body["msg"], "配置集不存在");

        let settings = EditorSettings::load(&tmp.path().join(".config_UI.json")).unwrap();
        assert!(!settings.tracks("bot2"));
        assert!(!ConfigStore::load(&config_path).unwrap().contains("bot2"));
        server.stop().await;
    }

    #[tokio::test]
    async fn test_ui_settings_merge() {
        let tmp = TempDir::new().unwrap();
        let (server, client) = editor_in(tmp.path()).await;
        let url = format!("{}api/ui_settings", server.url());

        let saved = client
            .post(&url)
            .json(&json!({"theme": "dark"}))
            .send()
            .await
            .unwrap();
        assert!(saved.status().is_success());

        let settings: Value = client.get(&url).send().await.unwrap().json().await.unwrap();
        assert_eq!(settings["theme"], "dark");
        assert_eq!(settings["port"], 0);
        server.stop().await;
    }

    #[tokio::test]
    async fn test_unreadable_store_is_left_alone() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join("config.toml");
        fs::write(&config_path, "configurations = 3\n").unwrap();
        let (server, client) = editor_in(tmp.path()).await;

        let listed = client
            .get(format!("{}api/configs", server.url()))
            .send()
            .await
            .unwrap();
        assert_eq!(listed.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);

        let created = client
            .post(format!("{}api/configs", server.url()))
            .json(&json!({"name": "bot2"}))
            .send()
            .await
            .unwrap();
        assert!(!created.status().is_success());
        assert_eq!(fs::read_to_string(&config_path).unwrap(), "configurations = 3\n");
        server.stop().await;
    }

    #[tokio::test]
    async fn test_stale_instances_dropped_on_start() {
        let tmp = TempDir::new().unwrap();
        let settings_path = tmp.path().join(".config_UI.json");
        fs::write(
            &settings_path,
            r#"{"instances":[{"name":"default"},{"name":"gone"}],"ui_settings":{"port":0}}"#,
        )
        .unwrap();
        let server = start_editor(&tmp.path().join("config.toml")).await.unwrap();

        let settings = EditorSettings::load(&settings_path).unwrap();
        assert!(settings.tracks("default"));
        assert!(!settings.tracks("gone"));
        server.stop().await;
    }

    #[tokio::test]
    async fn test_busy_port_falls_back() {
        let tmp = TempDir::new().unwrap();
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();
        fs::write(
            tmp.path().join(".config_UI.json"),
            format!(r#"{{"ui_settings":{{"port":{}}}}}"#, port),
        )
        .unwrap();

        let server = start_editor(&tmp.path().join("config.toml")).await.unwrap();
        assert_ne!(server.addr().port(), port);
        server.stop().await;
    }
}
