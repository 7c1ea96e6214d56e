//! Full deployment of a new instance with progress reporting.
//!
//! Downloads the bot, installs the selected components next to it, builds
//! the Python environment and records the instance in the config store.

use crate::config::{AppConfig, InstallationConfig};
use crate::deploy::adapter::{install_adapter, AdapterInstall};
use crate::deploy::progress::{DeployEvent, DeployStep, ProgressSink};
use crate::deploy::python::{create_venv, install_requirements};
use crate::deploy::versions::{napcat_versions, VersionEntry};
use crate::deploy::webui::{self, WebUiBranch};
use crate::deploy::{fetch_archive, install_bot_from, mongodb, napcat, templates};
use crate::models::{InstallOptions, InstanceConfig};
use crate::network::DownloadManager;
use crate::store::ConfigStore;
use crate::validation::{contains_cjk, validate_qq_account};
use crate::version::{is_legacy_version, needs_mongodb};
use crate::{LauncherError, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Everything the deploy wizard collected.
#[derive(Debug, Clone)]
pub struct DeployPlan {
    pub version: VersionEntry,
    /// `base_dir/nickname`; the bot lands in `install_dir/MaiBot`.
    pub install_dir: PathBuf,
    pub serial_number: String,
    pub nickname: String,
    pub qq_account: String,
    pub options: InstallOptions,
    pub napcat_version: Option<VersionEntry>,
    pub webui_branch: Option<WebUiBranch>,
    /// Start `NapCatInstaller.exe` after unpacking NapCat.
    pub run_napcat_installer: bool,
    /// Create the venv and install requirements.
    pub setup_python: bool,
}

impl DeployPlan {
    /// A plan with component defaults for `version`.
    pub fn new(
        version: VersionEntry,
        base_dir: &Path,
        serial_number: impl Into<String>,
        nickname: impl Into<String>,
        qq_account: impl Into<String>,
    ) -> Self {
        let nickname = nickname.into();
        let options = Self::component_defaults(&version.name);
        let napcat_version = options
            .install_napcat
            .then(|| napcat_versions().into_iter().next())
            .flatten();
        Self {
            install_dir: base_dir.join(&nickname),
            version,
            serial_number: serial_number.into(),
            nickname,
            qq_account: qq_account.into(),
            options,
            napcat_version,
            webui_branch: None,
            run_napcat_installer: cfg!(windows),
            setup_python: true,
        }
    }

    /// Which components a deployment of `version` selects by default.
    pub fn component_defaults(version: &str) -> InstallOptions {
        let legacy = is_legacy_version(version);
        InstallOptions {
            install_adapter: !legacy,
            install_napcat: !legacy,
            install_mongodb: needs_mongodb(version),
            install_webui: false,
        }
    }

    /// Problems that must be fixed before deploying.
    pub fn validate(&self, store: &ConfigStore) -> Vec<String> {
        let mut errors = Vec::new();

        let serial = self.serial_number.trim();
        if serial.is_empty() {
            errors.push("序列号不能为空".to_string());
        } else if store.serial_in_use(serial) {
            errors.push(format!("序列号 {} 已被使用", serial));
        }

        if self.nickname.trim().is_empty() {
            errors.push("实例昵称不能为空".to_string());
        }
        if let Err(e) = validate_qq_account(&self.qq_account) {
            errors.push(e);
        }

        let install_dir = self.install_dir.to_string_lossy();
        if contains_cjk(&install_dir) {
            errors.push(format!("安装路径包含中文字符: {}", install_dir));
        }
        if self.mai_dir().exists() {
            errors.push(format!("目录已存在 MaiBot: {}", self.mai_dir().display()));
        }
        if self.options.install_napcat && self.napcat_version.is_none() {
            errors.push("未选择 NapCat 版本".to_string());
        }
        errors
    }

    /// Rough wall-clock estimate: the bot plus each selected component.
    pub fn estimated_minutes(&self) -> u32 {
        (1 + self.options.selected_count()) * InstallationConfig::MINUTES_PER_COMPONENT
    }

    pub fn mai_dir(&self) -> PathBuf {
        self.install_dir.join(InstallationConfig::BOT_DIR_NAME)
    }

    pub fn config_name(&self) -> String {
        format!("instance_{}", self.serial_number.trim())
    }
}

/// Callbacks for steps that need the user.
pub trait DeployHooks {
    /// The NapCat installer window was opened. Return once the user is done with it.
    fn napcat_installer_started(&mut self, _installer: &Path) {}
}

/// Hooks that never wait.
pub struct NoHooks;

impl DeployHooks for NoHooks {}

/// What a finished deployment produced.
#[derive(Debug, Clone)]
pub struct DeployOutcome {
    pub config_name: String,
    pub instance: InstanceConfig,
    /// Non-fatal problems, in the order they happened.
    pub warnings: Vec<String>,
}

/// Paths collected while the steps run.
#[derive(Debug, Default)]
struct DeployedPaths {
    mai: PathBuf,
    adapter: String,
    napcat: String,
    mongodb: String,
    webui: String,
    venv: String,
}

/// Runs a [`DeployPlan`].
///
/// A failed deployment removes what it created: the whole install directory
/// when it did not exist before, otherwise just `install_dir/MaiBot`. The
/// same plan can then be run again.
pub struct Deployer {
    downloads: Arc<DownloadManager>,
}

impl Deployer {
    pub fn new(downloads: Arc<DownloadManager>) -> Self {
        Self { downloads }
    }

    /// Cancel the download currently in flight.
    pub fn cancel(&self) {
        self.downloads.cancel();
    }

    /// Download the bot and deploy it.
    pub async fn deploy(
        &self,
        plan: &DeployPlan,
        store: &mut ConfigStore,
        progress: &ProgressSink,
        hooks: &mut dyn DeployHooks,
    ) -> Result<DeployOutcome> {
        check_plan(plan, store)?;
        info!(
            "Deploying MaiBot {} to {}",
            plan.version.name,
            plan.install_dir.display()
        );

        progress.emit(DeployEvent::StepStarted { step: DeployStep::Bot }).await;
        let archive_name = format!("MaiBot_{}.zip", plan.version.name);
        let fetched = fetch_archive(
            &self.downloads,
            &plan.version.download_url,
            &archive_name,
            progress.download_channel(DeployStep::Bot),
        )
        .await;
        let (_temp, root) = match fetched {
            Ok(fetched) => fetched,
            Err(e) => return Err(fail(progress, e).await),
        };

        self.deploy_from_source(plan, &root, store, progress, hooks).await
    }

    /// Deploy from an already unpacked bot checkout at `source_root`.
    pub async fn deploy_from_source(
        &self,
        plan: &DeployPlan,
        source_root: &Path,
        store: &mut ConfigStore,
        progress: &ProgressSink,
        hooks: &mut dyn DeployHooks,
    ) -> Result<DeployOutcome> {
        check_plan(plan, store)?;
        let fresh_install_dir = !plan.install_dir.exists();

        match self.run_steps(plan, source_root, store, progress, hooks).await {
            Ok(outcome) => {
                progress.emit(DeployEvent::Completed { success: true }).await;
                info!("Deployment of {} finished", outcome.config_name);
                Ok(outcome)
            }
            Err(e) => {
                rollback(plan, fresh_install_dir);
                Err(fail(progress, e).await)
            }
        }
    }

    async fn run_steps(
        &self,
        plan: &DeployPlan,
        source_root: &Path,
        store: &mut ConfigStore,
        progress: &ProgressSink,
        hooks: &mut dyn DeployHooks,
    ) -> Result<DeployOutcome> {
        let mut warnings = Vec::new();
        let mut paths = DeployedPaths::default();

        std::fs::create_dir_all(&plan.install_dir)
            .map_err(|e| LauncherError::io_with_path(e, &plan.install_dir))?;
        paths.mai = install_bot_from(source_root, &plan.install_dir)?;
        progress
            .emit(DeployEvent::StepFinished {
                step: DeployStep::Bot,
                detail: paths.mai.display().to_string(),
            })
            .await;

        self.run_components(plan, &mut paths, &mut warnings, progress, hooks)
            .await?;

        self.setup_python(plan, &mut paths, &mut warnings, progress).await;

        progress.emit(DeployEvent::StepStarted { step: DeployStep::Templates }).await;
        match setup_templates(&paths) {
            Ok(created) => {
                progress
                    .emit(DeployEvent::StepFinished {
                        step: DeployStep::Templates,
                        detail: format!("{} 个文件", created),
                    })
                    .await
            }
            Err(e) => warn_step(progress, &mut warnings, DeployStep::Templates, e.to_string()).await,
        }

        progress.emit(DeployEvent::StepStarted { step: DeployStep::Finalize }).await;
        let instance = finalize(plan, paths, store)?;
        let outcome = DeployOutcome {
            config_name: plan.config_name(),
            instance,
            warnings,
        };
        progress
            .emit(DeployEvent::StepFinished {
                step: DeployStep::Finalize,
                detail: outcome.config_name.clone(),
            })
            .await;
        Ok(outcome)
    }

    async fn run_components(
        &self,
        plan: &DeployPlan,
        paths: &mut DeployedPaths,
        warnings: &mut Vec<String>,
        progress: &ProgressSink,
        hooks: &mut dyn DeployHooks,
    ) -> Result<()> {
        if is_legacy_version(&plan.version.name) {
            paths.adapter = AppConfig::NO_ADAPTER_SENTINEL.to_string();
        }

        if plan.options.install_adapter {
            progress.emit(DeployEvent::StepStarted { step: DeployStep::Adapter }).await;
            let installed = install_adapter(
                &self.downloads,
                &plan.version.name,
                &paths.mai,
                progress.download_channel(DeployStep::Adapter),
            )
            .await?;
            paths.adapter = match &installed {
                AdapterInstall::NotRequired => AppConfig::NO_ADAPTER_SENTINEL.to_string(),
                other => other
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default(),
            };
            progress
                .emit(DeployEvent::StepFinished {
                    step: DeployStep::Adapter,
                    detail: paths.adapter.clone(),
                })
                .await;
        } else {
            skip(progress, DeployStep::Adapter).await;
        }

        match (&plan.napcat_version, plan.options.install_napcat) {
            (Some(version), true) => {
                progress.emit(DeployEvent::StepStarted { step: DeployStep::NapCat }).await;
                paths.napcat = self
                    .install_napcat(plan, version, warnings, progress, hooks)
                    .await?;
                progress
                    .emit(DeployEvent::StepFinished {
                        step: DeployStep::NapCat,
                        detail: paths.napcat.clone(),
                    })
                    .await;
            }
            _ => skip(progress, DeployStep::NapCat).await,
        }

        if plan.options.install_mongodb {
            progress.emit(DeployEvent::StepStarted { step: DeployStep::MongoDb }).await;
            let installed = mongodb::install_mongodb(
                &self.downloads,
                &plan.install_dir,
                progress.download_channel(DeployStep::MongoDb),
            )
            .await?;
            paths.mongodb = installed.display().to_string();
            progress
                .emit(DeployEvent::StepFinished {
                    step: DeployStep::MongoDb,
                    detail: paths.mongodb.clone(),
                })
                .await;
        } else {
            skip(progress, DeployStep::MongoDb).await;
        }

        if plan.options.install_webui {
            progress.emit(DeployEvent::StepStarted { step: DeployStep::WebUi }).await;
            match self.install_webui(plan, warnings, progress).await {
                Ok(dir) => {
                    paths.webui = dir.display().to_string();
                    progress
                        .emit(DeployEvent::StepFinished {
                            step: DeployStep::WebUi,
                            detail: paths.webui.clone(),
                        })
                        .await;
                }
                Err(e) => warn_step(progress, warnings, DeployStep::WebUi, e.to_string()).await,
            }
        } else {
            skip(progress, DeployStep::WebUi).await;
        }
        Ok(())
    }

    async fn install_napcat(
        &self,
        plan: &DeployPlan,
        version: &VersionEntry,
        warnings: &mut Vec<String>,
        progress: &ProgressSink,
        hooks: &mut dyn DeployHooks,
    ) -> Result<String> {
        let napcat_dir = napcat::download_napcat(
            &self.downloads,
            version,
            &plan.install_dir,
            progress.download_channel(DeployStep::NapCat),
        )
        .await?;

        if plan.run_napcat_installer {
            if let Some(installer) = napcat::find_installer(&napcat_dir) {
                match napcat::run_installer(&installer) {
                    Ok(()) => hooks.napcat_installer_started(&installer),
                    Err(e) => warn_step(progress, warnings, DeployStep::NapCat, e.to_string()).await,
                }
            }
        }

        let found = napcat::wait_for_installation(
            &napcat_dir,
            InstallationConfig::NAPCAT_WAIT_ATTEMPTS,
            InstallationConfig::NAPCAT_WAIT_INTERVAL,
        )
        .await;
        Ok(match found {
            Some(exe) => exe.display().to_string(),
            None => {
                let message = format!(
                    "未找到 {}，请稍后在配置中手动设置 NapCat 路径",
                    InstallationConfig::NAPCAT_EXE
                );
                warn_step(progress, warnings, DeployStep::NapCat, message).await;
                String::new()
            }
        })
    }

    async fn install_webui(
        &self,
        plan: &DeployPlan,
        warnings: &mut Vec<String>,
        progress: &ProgressSink,
    ) -> Result<PathBuf> {
        let branch = plan
            .webui_branch
            .clone()
            .unwrap_or_else(|| WebUiBranch::named("main"));
        let dir = webui::download_webui(
            &self.downloads,
            &branch,
            &plan.install_dir,
            progress.download_channel(DeployStep::WebUi),
        )
        .await?;

        if webui::check_node().await.is_none() || webui::check_npm().await.is_none() {
            let message = format!("未检测到 Node.js/npm，跳过前端依赖安装\n{}", webui::node_install_hint());
            warn_step(progress, warnings, DeployStep::WebUi, message).await;
        } else if let Err(e) = webui::npm_install(&dir).await {
            warn_step(progress, warnings, DeployStep::WebUi, e.to_string()).await;
        }
        Ok(dir)
    }

    async fn setup_python(
        &self,
        plan: &DeployPlan,
        paths: &mut DeployedPaths,
        warnings: &mut Vec<String>,
        progress: &ProgressSink,
    ) {
        if !plan.setup_python {
            skip(progress, DeployStep::PythonEnv).await;
            return;
        }
        progress.emit(DeployEvent::StepStarted { step: DeployStep::PythonEnv }).await;

        let python = match create_venv(&paths.mai).await {
            Ok(python) => python,
            Err(e) => {
                let message = format!("虚拟环境创建失败，将使用系统 Python: {}", e);
                warn_step(progress, warnings, DeployStep::PythonEnv, message).await;
                return;
            }
        };
        paths.venv = paths
            .mai
            .join(InstallationConfig::VENV_DIR_NAME)
            .display()
            .to_string();

        let mut requirements = vec![paths.mai.join("requirements.txt")];
        if let Some(adapter) = adapter_dir(&paths.adapter) {
            requirements.push(adapter.join("requirements.txt"));
        }
        for file in requirements.iter().filter(|f| f.is_file()) {
            if let Err(e) = install_requirements(&python, file, false).await {
                warn_step(progress, warnings, DeployStep::PythonEnv, e.to_string()).await;
            }
        }

        if !paths.webui.is_empty() {
            if let Err(e) = webui::install_backend_requirements(Path::new(&paths.webui), &python).await {
                warn_step(progress, warnings, DeployStep::WebUi, e.to_string()).await;
            }
        }

        progress
            .emit(DeployEvent::StepFinished {
                step: DeployStep::PythonEnv,
                detail: paths.venv.clone(),
            })
            .await;
    }
}

fn check_plan(plan: &DeployPlan, store: &ConfigStore) -> Result<()> {
    let problems = plan.validate(store);
    if problems.is_empty() {
        Ok(())
    } else {
        Err(LauncherError::validation("deploy_plan", problems.join("; ")))
    }
}

fn adapter_dir(adapter_path: &str) -> Option<&Path> {
    if adapter_path.is_empty() || adapter_path == AppConfig::NO_ADAPTER_SENTINEL {
        None
    } else {
        Some(Path::new(adapter_path))
    }
}

fn setup_templates(paths: &DeployedPaths) -> Result<usize> {
    let mut created = templates::setup_bot_config(&paths.mai)?.len();
    if let Some(adapter) = adapter_dir(&paths.adapter) {
        created += templates::setup_adapter_config(adapter)?.len();
    }
    Ok(created)
}

fn finalize(plan: &DeployPlan, paths: DeployedPaths, store: &mut ConfigStore) -> Result<InstanceConfig> {
    let install_options = InstallOptions {
        install_adapter: adapter_dir(&paths.adapter).is_some(),
        install_napcat: plan.options.install_napcat,
        install_mongodb: !paths.mongodb.is_empty(),
        install_webui: plan.options.install_webui,
    };

    let mut instance = InstanceConfig::new(plan.serial_number.trim(), plan.version.name.clone());
    instance.absolute_serial_number = store.generate_unique_serial();
    instance.nickname_path = plan.nickname.trim().to_string();
    instance.qq_account = plan.qq_account.trim().to_string();
    instance.mai_path = paths.mai.display().to_string();
    instance.adapter_path = paths.adapter;
    instance.napcat_path = paths.napcat;
    instance.mongodb_path = paths.mongodb;
    instance.webui_path = paths.webui;
    instance.venv_path = paths.venv;
    instance.install_options = install_options;

    let name = plan.config_name();
    let previous = store.current_name().to_string();
    store.add(&name, instance.clone())?;
    store.set_current(&name)?;
    if let Err(e) = store.save() {
        let _ = store.remove(&name);
        let _ = store.set_current(&previous);
        return Err(e);
    }
    Ok(instance)
}

/// Remove what a failed deployment created.
fn rollback(plan: &DeployPlan, fresh_install_dir: bool) {
    let target = if fresh_install_dir {
        plan.install_dir.clone()
    } else {
        plan.mai_dir()
    };
    if !target.exists() {
        return;
    }
    match std::fs::remove_dir_all(&target) {
        Ok(()) => info!("Removed partial deployment {}", target.display()),
        Err(e) => warn!("Could not remove partial deployment {}: {}", target.display(), e),
    }
}

async fn skip(progress: &ProgressSink, step: DeployStep) {
    progress
        .emit(DeployEvent::StepSkipped {
            step,
            reason: "未选择".to_string(),
        })
        .await;
}

async fn warn_step(progress: &ProgressSink, warnings: &mut Vec<String>, step: DeployStep, message: String) {
    warn!("{}: {}", step, message);
    progress
        .emit(DeployEvent::Warning {
            step,
            message: message.clone(),
        })
        .await;
    warnings.push(format!("{}: {}", step, message));
}

async fn fail(progress: &ProgressSink, err: LauncherError) -> LauncherError {
    error!("Deployment failed: {}", err);
    progress.emit(DeployEvent::Completed { success: false }).await;
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deploy::versions::{offline_versions, VersionKind};
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    fn version(name: &str) -> VersionEntry {
        VersionEntry {
            kind: VersionKind::Release,
            name: name.to_string(),
            display_name: name.to_string(),
            description: String::new(),
            published_at: None,
            prerelease: false,
            download_url: format!("https://example.invalid/{}.zip", name),
            changelog: String::new(),
            size: None,
        }
    }

    fn bot_source(root: &Path) -> PathBuf {
        let source = root.join("MaiBot-main");
        std::fs::create_dir_all(source.join("template")).unwrap();
        std::fs::write(source.join("bot.py"), "print('hi')").unwrap();
        std::fs::write(source.join("requirements.txt"), "").unwrap();
        std::fs::write(source.join("template/bot_config_template.toml"), "[bot]\n").unwrap();
        std::fs::write(source.join("template/template.env"), "HOST=127.0.0.1\nPORT=8080\n").unwrap();
        source
    }

    fn bare_plan(base: &Path, version: VersionEntry) -> DeployPlan {
        let mut plan = DeployPlan::new(version, base, "7", "bot7", "123456");
        plan.options = InstallOptions::default();
        plan.napcat_version = None;
        plan.setup_python = false;
        plan.run_napcat_installer = false;
        plan
    }

    #[test]
    fn test_component_defaults() {
        let classical = DeployPlan::component_defaults("classical");
        assert!(!classical.install_adapter);
        assert!(!classical.install_napcat);
        assert!(classical.install_mongodb);

        let modern = DeployPlan::component_defaults("0.8.1");
        assert!(modern.install_adapter && modern.install_napcat);
        assert!(!modern.install_mongodb);
        assert!(!modern.install_webui);

        assert!(DeployPlan::component_defaults("0.6.3").install_mongodb);
    }

    #[test]
    fn test_plan_defaults() {
        let temp = TempDir::new().unwrap();
        let plan = DeployPlan::new(offline_versions().remove(0), temp.path(), "1", "alpha", "10001");
        assert_eq!(plan.install_dir, temp.path().join("alpha"));
        assert_eq!(plan.mai_dir(), temp.path().join("alpha").join("MaiBot"));
        assert_eq!(plan.config_name(), "instance_1");
        assert_eq!(plan.napcat_version.as_ref().unwrap().name, "v4.8.90-framework");
        // bot + adapter + napcat
        assert_eq!(plan.estimated_minutes(), 6);
    }

    #[test]
    fn test_validate_collects_problems() {
        let temp = TempDir::new().unwrap();
        let store = ConfigStore::load(temp.path().join("config.toml")).unwrap();

        let mut plan = bare_plan(temp.path(), version("0.8.1"));
        assert!(plan.validate(&store).is_empty());

        plan.serial_number = "1".to_string();
        plan.qq_account = "12ab".to_string();
        plan.install_dir = temp.path().join("机器人");
        let problems = plan.validate(&store);
        assert_eq!(problems.len(), 3, "{:?}", problems);

        let mut plan = bare_plan(temp.path(), version("0.8.1"));
        std::fs::create_dir_all(plan.mai_dir()).unwrap();
        plan.options.install_napcat = true;
        assert_eq!(plan.validate(&store).len(), 2);
    }

    #[tokio::test]
    async fn test_deploy_from_source_records_instance() {
        let temp = TempDir::new().unwrap();
        let source = bot_source(temp.path());
        let base = temp.path().join("deploy");
        let mut store = ConfigStore::load(temp.path().join("config.toml")).unwrap();

        let (tx, mut rx) = mpsc::channel(64);
        let sink = ProgressSink::new(Some(tx));
        let deployer = Deployer::new(Arc::new(DownloadManager::new().unwrap()));
        let plan = bare_plan(&base, version("0.8.1"));

        let outcome = deployer
            .deploy_from_source(&plan, &source, &mut store, &sink, &mut NoHooks)
            .await
            .unwrap();
        drop(sink);

        let mai = base.join("bot7").join("MaiBot");
        assert!(mai.join("bot.py").exists());
        assert!(mai.join("config/bot_config.toml").exists());
        let env = std::fs::read_to_string(mai.join(".env")).unwrap();
        assert!(env.contains("PORT=8000"));

        assert_eq!(outcome.config_name, "instance_7");
        assert_eq!(outcome.instance.mai_path, mai.display().to_string());
        assert_eq!(outcome.instance.nickname_path, "bot7");
        assert_eq!(outcome.instance.absolute_serial_number, 2);
        assert!(outcome.instance.adapter_path.is_empty());
        assert!(outcome.warnings.is_empty());

        assert_eq!(store.current_name(), "instance_7");
        let reloaded = ConfigStore::load(store.path()).unwrap();
        assert_eq!(reloaded.get("instance_7").unwrap().version_path, "0.8.1");

        let mut completed = false;
        while let Some(event) = rx.recv().await {
            if let DeployEvent::Completed { success } = event {
                completed = success;
            }
        }
        assert!(completed);
    }

    #[tokio::test]
    async fn test_legacy_deploy_marks_adapter_not_applicable() {
        let temp = TempDir::new().unwrap();
        let source = bot_source(temp.path());
        let mut store = ConfigStore::load(temp.path().join("config.toml")).unwrap();
        let deployer = Deployer::new(Arc::new(DownloadManager::new().unwrap()));
        let plan = bare_plan(&temp.path().join("deploy"), version("classical"));

        let outcome = deployer
            .deploy_from_source(&plan, &source, &mut store, &ProgressSink::default(), &mut NoHooks)
            .await
            .unwrap();
        assert!(outcome.instance.has_no_adapter_marker());
        assert!(!outcome.instance.install_options.install_adapter);
    }

    #[tokio::test]
    async fn test_invalid_plan_is_rejected() {
        let temp = TempDir::new().unwrap();
        let source = bot_source(temp.path());
        let mut store = ConfigStore::load(temp.path().join("config.toml")).unwrap();
        let deployer = Deployer::new(Arc::new(DownloadManager::new().unwrap()));
        let mut plan = bare_plan(&temp.path().join("deploy"), version("0.8.1"));
        plan.nickname = String::new();

        let err = deployer
            .deploy_from_source(&plan, &source, &mut store, &ProgressSink::default(), &mut NoHooks)
            .await
            .unwrap_err();
        assert!(matches!(err, LauncherError::Validation { .. }));
        assert!(!plan.mai_dir().exists());
    }

    fn unreachable_napcat() -> VersionEntry {
        VersionEntry {
            kind: VersionKind::Release,
            name: "v4.8.90-framework".to_string(),
            display_name: "NapCat".to_string(),
            description: String::new(),
            published_at: None,
            prerelease: false,
            download_url: "file:///nonexistent/NapCat.zip".to_string(),
            changelog: String::new(),
            size: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_component_rolls_back_for_retry() {
        let temp = TempDir::new().unwrap();
        let source = bot_source(temp.path());
        let base = temp.path().join("deploy");
        let mut store = ConfigStore::load(temp.path().join("config.toml")).unwrap();
        let deployer = Deployer::new(Arc::new(DownloadManager::new().unwrap()));

        let mut plan = bare_plan(&base, version("0.8.1"));
        plan.options.install_napcat = true;
        plan.napcat_version = Some(unreachable_napcat());

        let err = deployer
            .deploy_from_source(&plan, &source, &mut store, &ProgressSink::default(), &mut NoHooks)
            .await
            .unwrap_err();
        assert!(!matches!(err, LauncherError::Validation { .. }), "{err}");
        assert!(!plan.install_dir.exists());
        assert!(!store.contains("instance_7"));
        assert!(plan.validate(&store).is_empty());

        plan.options.install_napcat = false;
        plan.napcat_version = None;
        let outcome = deployer
            .deploy_from_source(&plan, &source, &mut store, &ProgressSink::default(), &mut NoHooks)
            .await
            .unwrap();
        assert_eq!(outcome.config_name, "instance_7");
        assert!(plan.mai_dir().join("bot.py").exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rollback_keeps_existing_install_dir() {
        let temp = TempDir::new().unwrap();
        let source = bot_source(temp.path());
        let mut store = ConfigStore::load(temp.path().join("config.toml")).unwrap();
        let deployer = Deployer::new(Arc::new(DownloadManager::new().unwrap()));

        let mut plan = bare_plan(&temp.path().join("deploy"), version("0.8.1"));
        std::fs::create_dir_all(&plan.install_dir).unwrap();
        std::fs::write(plan.install_dir.join("notes.txt"), "keep").unwrap();
        plan.options.install_napcat = true;
        plan.napcat_version = Some(unreachable_napcat());

        assert!(deployer
            .deploy_from_source(&plan, &source, &mut store, &ProgressSink::default(), &mut NoHooks)
            .await
            .is_err());
        assert!(plan.install_dir.join("notes.txt").exists());
        assert!(!plan.mai_dir().exists());
    }

    #[tokio::test]
    async fn test_unsaved_record_is_dropped_on_failure() {
        let temp = TempDir::new().unwrap();
        let source = bot_source(temp.path());
        let config = temp.path().join("config.toml");
        std::fs::write(&config, "configurations = 3\n").unwrap();
        let mut store = ConfigStore::load(&config).unwrap();
        assert!(store.load_error().is_some());
        let deployer = Deployer::new(Arc::new(DownloadManager::new().unwrap()));
        let plan = bare_plan(&temp.path().join("deploy"), version("0.8.1"));

        let err = deployer
            .deploy_from_source(&plan, &source, &mut store, &ProgressSink::default(), &mut NoHooks)
            .await
            .unwrap_err();
        assert!(matches!(err, LauncherError::ConfigUnreadable { .. }));
        assert!(!store.contains("instance_7"));
        assert_eq!(store.current_name(), "default");
        assert!(!plan.install_dir.exists());
        assert_eq!(std::fs::read_to_string(&config).unwrap(), "configurations = 3\n");
    }
}
