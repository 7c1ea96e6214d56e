//! Starting a configured instance and its companions.
//!
//! Launch order is fixed: NapCat, then MongoDB, then the adapter, then the
//! bot. Each step waits a fixed delay from [`LaunchTimings`] before the next
//! one starts; nothing checks whether the previous program is ready.

use super::launcher::LaunchConfig;
use super::manager::ProcessManager;
use crate::config::{InstallationConfig, LaunchTimings};
use crate::detection;
use crate::error::{LauncherError, Result};
use crate::models::InstanceConfig;
use crate::platform;
use crate::validation;
use crate::version;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// One program in the launch sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchStep {
    NapCat,
    MongoDb,
    Adapter,
    Bot,
    WebUiFrontend,
    WebUiBackend,
}

impl fmt::Display for LaunchStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LaunchStep::NapCat => "NapCat",
            LaunchStep::MongoDb => "MongoDB",
            LaunchStep::Adapter => "适配器",
            LaunchStep::Bot => "麦麦本体",
            LaunchStep::WebUiFrontend => "WebUI 前端",
            LaunchStep::WebUiBackend => "WebUI 后端",
        };
        f.write_str(name)
    }
}

/// What happened to a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Started { pid: u32 },
    /// A service was started outside the launcher's process tree.
    ServiceStarted,
    AlreadyRunning,
    Skipped(String),
    Failed(String),
}

/// Ordered outcomes of one launch request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchReport {
    pub steps: Vec<(LaunchStep, StepOutcome)>,
}

impl LaunchReport {
    fn record(&mut self, step: LaunchStep, outcome: StepOutcome) {
        match &outcome {
            StepOutcome::Failed(reason) => warn!("{} failed: {}", step, reason),
            StepOutcome::Skipped(reason) => info!("{} skipped: {}", step, reason),
            other => info!("{}: {:?}", step, other),
        }
        self.steps.push((step, outcome));
    }

    pub fn outcome(&self, step: LaunchStep) -> Option<&StepOutcome> {
        self.steps
            .iter()
            .find(|(s, _)| *s == step)
            .map(|(_, outcome)| outcome)
    }

    pub fn started(&self, step: LaunchStep) -> bool {
        matches!(self.outcome(step), Some(StepOutcome::Started { .. }))
    }
}

/// Pauses between dependent programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchDelays {
    pub adapter_to_bot: Duration,
    pub napcat: Duration,
    pub mongodb: Duration,
}

impl Default for LaunchDelays {
    fn default() -> Self {
        Self {
            adapter_to_bot: LaunchTimings::ADAPTER_TO_BOT,
            napcat: LaunchTimings::NAPCAT,
            mongodb: LaunchTimings::MONGODB,
        }
    }
}

impl LaunchDelays {
    pub fn none() -> Self {
        Self {
            adapter_to_bot: Duration::ZERO,
            napcat: Duration::ZERO,
            mongodb: Duration::ZERO,
        }
    }
}

/// Quote a path for the command line of the hosting shell.
fn quoted(path: &Path) -> String {
    format!("\"{}\"", path.display())
}

/// Interpreter for an instance: its venv when present, otherwise the system one.
pub fn python_for(instance: &InstanceConfig) -> String {
    match instance.venv_dir() {
        Some(venv) => {
            let python = platform::venv_python(&venv);
            if python.exists() {
                return quoted(&python);
            }
            platform::system_python().to_string()
        }
        None => platform::system_python().to_string(),
    }
}

pub struct InstanceLauncher {
    manager: Arc<ProcessManager>,
    delays: LaunchDelays,
}

impl InstanceLauncher {
    pub fn new(manager: Arc<ProcessManager>) -> Self {
        Self {
            manager,
            delays: LaunchDelays::default(),
        }
    }

    pub fn with_delays(mut self, delays: LaunchDelays) -> Self {
        self.delays = delays;
        self
    }

    pub fn manager(&self) -> &Arc<ProcessManager> {
        &self.manager
    }

    /// Problems that would stop the instance from launching.
    pub fn validate(&self, instance: &InstanceConfig) -> Vec<String> {
        validation::validate_instance(instance)
    }

    fn title(instance: &InstanceConfig, step: LaunchStep) -> String {
        format!("{} - {}", step, instance.version_path)
    }

    fn spawn_step(
        &self,
        report: &mut LaunchReport,
        step: LaunchStep,
        config: LaunchConfig,
    ) -> Option<u32> {
        match self.manager.spawn(config) {
            Ok(pid) => {
                report.record(step, StepOutcome::Started { pid });
                Some(pid)
            }
            Err(e) => {
                report.record(step, StepOutcome::Failed(e.to_string()));
                None
            }
        }
    }

    /// Start the bot, preceded by its adapter when the version uses one.
    pub async fn launch_bot_only(&self, instance: &InstanceConfig) -> Result<LaunchReport> {
        let mut report = LaunchReport::default();
        self.launch_bot_into(instance, &mut report).await?;
        Ok(report)
    }

    async fn launch_bot_into(
        &self,
        instance: &InstanceConfig,
        report: &mut LaunchReport,
    ) -> Result<()> {
        let mai = instance.mai_dir();
        let python = python_for(instance);

        if version::is_legacy_version(&instance.version_path) {
            info!("Legacy version {}, using run script", instance.version_path);
            let script = if cfg!(windows) { "run.bat" } else { "run.sh" };
            let script_path = mai.join(script);

            let command = if script_path.is_file() {
                if cfg!(windows) {
                    quoted(&script_path)
                } else {
                    format!("sh {}", script)
                }
            } else if mai.join("bot.py").is_file() {
                format!("{} bot.py", python)
            } else {
                return Err(LauncherError::LaunchFailed {
                    app: LaunchStep::Bot.to_string(),
                    message: format!("未找到 {}", script),
                });
            };

            let config = LaunchConfig::new(Self::title(instance, LaunchStep::Bot), command, mai);
            return self.require(report, LaunchStep::Bot, config);
        }

        match instance.adapter_dir() {
            Some(adapter) => {
                let config = LaunchConfig::new(
                    Self::title(instance, LaunchStep::Adapter),
                    format!("{} main.py", python),
                    adapter,
                );
                if self.spawn_step(report, LaunchStep::Adapter, config).is_some() {
                    tokio::time::sleep(self.delays.adapter_to_bot).await;
                }
            }
            None => report.record(
                LaunchStep::Adapter,
                StepOutcome::Skipped("未配置适配器路径".to_string()),
            ),
        }

        let config = LaunchConfig::new(
            Self::title(instance, LaunchStep::Bot),
            format!("{} bot.py", python),
            mai,
        );
        self.require(report, LaunchStep::Bot, config)
    }

    fn require(
        &self,
        report: &mut LaunchReport,
        step: LaunchStep,
        config: LaunchConfig,
    ) -> Result<()> {
        let title = config.title.clone();
        match self.spawn_step(report, step, config) {
            Some(_) => Ok(()),
            None => Err(LauncherError::LaunchFailed {
                app: title,
                message: self
                    .manager
                    .last_launch_error()
                    .unwrap_or_else(|| "unknown launch failure".to_string()),
            }),
        }
    }

    async fn launch_napcat(&self, instance: &InstanceConfig, report: &mut LaunchReport) {
        if platform::is_process_running(InstallationConfig::NAPCAT_EXE) {
            report.record(LaunchStep::NapCat, StepOutcome::AlreadyRunning);
            return;
        }
        let exe = match instance.napcat_exe() {
            Some(exe) if exe.is_file() => exe,
            _ => {
                report.record(
                    LaunchStep::NapCat,
                    StepOutcome::Skipped("未配置 NapCat 路径或文件不存在".to_string()),
                );
                return;
            }
        };
        let cwd = exe.parent().unwrap_or(exe);
        let config = LaunchConfig::new(
            Self::title(instance, LaunchStep::NapCat),
            quoted(exe),
            cwd,
        );
        if self.spawn_step(report, LaunchStep::NapCat, config).is_some() {
            tokio::time::sleep(self.delays.napcat).await;
        }
    }

    async fn launch_mongodb(&self, instance: &InstanceConfig, report: &mut LaunchReport) {
        if !version::needs_mongodb(&instance.version_path) {
            report.record(
                LaunchStep::MongoDb,
                StepOutcome::Skipped("该版本不需要 MongoDB".to_string()),
            );
            return;
        }
        if platform::is_mongodb_running() {
            report.record(LaunchStep::MongoDb, StepOutcome::AlreadyRunning);
            return;
        }

        let Some(mongodb_dir) = instance.mongodb_dir().filter(|dir| dir.is_dir()) else {
            let outcome = match start_mongodb_service().await {
                Ok(()) => StepOutcome::ServiceStarted,
                Err(e) => StepOutcome::Failed(format!("MongoDB 服务启动失败: {}", e)),
            };
            let started = outcome == StepOutcome::ServiceStarted;
            report.record(LaunchStep::MongoDb, outcome);
            if started {
                tokio::time::sleep(self.delays.mongodb).await;
            }
            return;
        };

        let Some(mongod) = detection::find_mongod(mongodb_dir) else {
            report.record(
                LaunchStep::MongoDb,
                StepOutcome::Failed(format!("在 {} 中未找到 mongod", mongodb_dir.display())),
            );
            return;
        };

        let data_dir: PathBuf = mongodb_dir.join("data");
        if let Err(e) = std::fs::create_dir_all(&data_dir) {
            report.record(LaunchStep::MongoDb, StepOutcome::Failed(e.to_string()));
            return;
        }

        let config = LaunchConfig::new(
            Self::title(instance, LaunchStep::MongoDb),
            format!("{} --dbpath {}", quoted(&mongod), quoted(&data_dir)),
            mongodb_dir,
        );
        if self.spawn_step(report, LaunchStep::MongoDb, config).is_some() {
            tokio::time::sleep(self.delays.mongodb).await;
        }
    }

    /// NapCat, MongoDB when the version needs it, then the bot.
    pub async fn launch_full_stack(&self, instance: &InstanceConfig) -> Result<LaunchReport> {
        let mut report = LaunchReport::default();
        self.launch_napcat(instance, &mut report).await;
        self.launch_mongodb(instance, &mut report).await;
        self.launch_bot_into(instance, &mut report).await?;
        Ok(report)
    }

    /// Start the WebUI frontend and, when present, its Python backend.
    pub async fn launch_webui(&self, instance: &InstanceConfig) -> Result<LaunchReport> {
        let webui = instance
            .webui_dir()
            .filter(|dir| dir.is_dir())
            .ok_or_else(|| LauncherError::validation("webui_path", "未配置 WebUI 路径或目录不存在"))?;

        let mut report = LaunchReport::default();
        let http_server = webui.join("http_server");
        let frontend = if http_server.join("package.json").is_file() {
            Some("npm run start")
        } else if http_server.join("server.js").is_file() {
            Some("node server.js")
        } else {
            None
        };

        match frontend {
            Some(command) => {
                let config = LaunchConfig::new(
                    Self::title(instance, LaunchStep::WebUiFrontend),
                    command,
                    &http_server,
                );
                self.spawn_step(&mut report, LaunchStep::WebUiFrontend, config);
            }
            None => report.record(
                LaunchStep::WebUiFrontend,
                StepOutcome::Skipped("未找到 http_server".to_string()),
            ),
        }

        if webui.join("main.py").is_file() {
            let config = LaunchConfig::new(
                Self::title(instance, LaunchStep::WebUiBackend),
                format!("{} main.py", python_for(instance)),
                webui,
            );
            self.spawn_step(&mut report, LaunchStep::WebUiBackend, config);
        }

        if !report.started(LaunchStep::WebUiFrontend) && !report.started(LaunchStep::WebUiBackend) {
            return Err(LauncherError::LaunchFailed {
                app: "WebUI".to_string(),
                message: "没有可启动的 WebUI 组件".to_string(),
            });
        }
        Ok(report)
    }
}

async fn start_mongodb_service() -> Result<()> {
    let (program, args): (&str, &[&str]) = if cfg!(windows) {
        ("net", &["start", "MongoDB"])
    } else {
        ("systemctl", &["start", "mongod"])
    };
    info!("Starting MongoDB service via {} {:?}", program, args);

    let output = tokio::process::Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|e| LauncherError::LaunchFailed {
            app: "MongoDB".to_string(),
            message: e.to_string(),
        })?;

    if output.status.success() {
        Ok(())
    } else {
        Err(LauncherError::LaunchFailed {
            app: "MongoDB".to_string(),
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::platform::TerminalKind;
    use std::fs;
    use tempfile::TempDir;

    fn launcher(temp_dir: &TempDir) -> InstanceLauncher {
        let manager = ProcessManager::new(Some(&temp_dir.path().join("logs")))
            .with_terminal(TerminalKind::Background);
        InstanceLauncher::new(Arc::new(manager)).with_delays(LaunchDelays::none())
    }

    fn instance_with_bot(temp_dir: &TempDir, version: &str) -> InstanceConfig {
        let mai = temp_dir.path().join("MaiBot");
        fs::create_dir_all(&mai).unwrap();
        fs::write(mai.join("bot.py"), "").unwrap();
        let mut instance = InstanceConfig::new("1", version);
        instance.mai_path = mai.to_string_lossy().to_string();
        instance
    }

    #[test]
    fn test_python_for_prefers_venv() {
        let temp_dir = TempDir::new().unwrap();
        let mut instance = instance_with_bot(&temp_dir, "0.7.0");
        assert_eq!(python_for(&instance), platform::system_python());

        let venv = temp_dir.path().join("MaiBot").join("venv");
        let python = platform::venv_python(&venv);
        fs::create_dir_all(python.parent().unwrap()).unwrap();
        fs::write(&python, "").unwrap();
        instance.venv_path = String::new();
        assert_eq!(python_for(&instance), quoted(&python));
    }

    #[tokio::test]
    async fn test_launch_bot_only_starts_adapter_then_bot() {
        let temp_dir = TempDir::new().unwrap();
        let launcher = launcher(&temp_dir);
        let mut instance = instance_with_bot(&temp_dir, "0.7.0");
        let adapter = temp_dir.path().join("adapter");
        fs::create_dir_all(&adapter).unwrap();
        instance.adapter_path = adapter.to_string_lossy().to_string();

        let report = launcher.launch_bot_only(&instance).await.unwrap();
        let order: Vec<LaunchStep> = report.steps.iter().map(|(s, _)| *s).collect();
        assert_eq!(order, vec![LaunchStep::Adapter, LaunchStep::Bot]);
        assert!(report.started(LaunchStep::Bot));
        assert_eq!(launcher.manager().len(), 2);
        launcher.manager().stop_all();
    }

    #[tokio::test]
    async fn test_launch_bot_only_without_adapter_marks_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let launcher = launcher(&temp_dir);
        let mut instance = instance_with_bot(&temp_dir, "0.7.0");
        instance.adapter_path = AppConfig::NO_ADAPTER_SENTINEL.to_string();

        let report = launcher.launch_bot_only(&instance).await.unwrap();
        assert!(matches!(
            report.outcome(LaunchStep::Adapter),
            Some(StepOutcome::Skipped(_))
        ));
        assert!(report.started(LaunchStep::Bot));
        launcher.manager().stop_all();
    }

    #[tokio::test]
    async fn test_legacy_launch_requires_script_or_bot() {
        let temp_dir = TempDir::new().unwrap();
        let launcher = launcher(&temp_dir);
        let mut instance = InstanceConfig::new("1", "classical");
        let mai = temp_dir.path().join("old");
        fs::create_dir_all(&mai).unwrap();
        instance.mai_path = mai.to_string_lossy().to_string();

        let err = launcher.launch_bot_only(&instance).await.unwrap_err();
        assert!(matches!(err, LauncherError::LaunchFailed { .. }));

        let script = if cfg!(windows) { "run.bat" } else { "run.sh" };
        fs::write(mai.join(script), "").unwrap();
        let report = launcher.launch_bot_only(&instance).await.unwrap();
        assert_eq!(report.steps.len(), 1);
        assert!(report.started(LaunchStep::Bot));
        launcher.manager().stop_all();
    }

    #[tokio::test]
    async fn test_full_stack_skips_unneeded_components() {
        let temp_dir = TempDir::new().unwrap();
        let launcher = launcher(&temp_dir);
        let mut instance = instance_with_bot(&temp_dir, "0.8.0");
        instance.adapter_path = AppConfig::NO_ADAPTER_SENTINEL.to_string();

        let report = launcher.launch_full_stack(&instance).await.unwrap();
        let napcat = report.outcome(LaunchStep::NapCat).unwrap();
        assert!(matches!(
            napcat,
            StepOutcome::Skipped(_) | StepOutcome::AlreadyRunning
        ));
        assert!(matches!(
            report.outcome(LaunchStep::MongoDb),
            Some(StepOutcome::Skipped(_))
        ));
        assert!(report.started(LaunchStep::Bot));
        launcher.manager().stop_all();
    }

    #[tokio::test]
    async fn test_launch_webui_requires_path() {
        let temp_dir = TempDir::new().unwrap();
        let launcher = launcher(&temp_dir);
        let instance = instance_with_bot(&temp_dir, "0.7.0");

        let err = launcher.launch_webui(&instance).await.unwrap_err();
        assert!(matches!(err, LauncherError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_launch_webui_frontend() {
        let temp_dir = TempDir::new().unwrap();
        let launcher = launcher(&temp_dir);
        let mut instance = instance_with_bot(&temp_dir, "0.7.0");
        let webui = temp_dir.path().join("WebUI");
        fs::create_dir_all(webui.join("http_server")).unwrap();
        fs::write(webui.join("http_server").join("server.js"), "").unwrap();
        instance.webui_path = webui.to_string_lossy().to_string();

        let report = launcher.launch_webui(&instance).await.unwrap();
        assert!(report.started(LaunchStep::WebUiFrontend));
        assert!(report.outcome(LaunchStep::WebUiBackend).is_none());
        launcher.manager().stop_all();
    }
}
