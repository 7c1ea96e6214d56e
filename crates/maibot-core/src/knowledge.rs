//! LPMM knowledge-base scripts shipped with the bot.
//!
//! Each step is a Python script under `mai_path/scripts` that runs in its own
//! console window. The launcher only checks preconditions and starts it.

use crate::models::InstanceConfig;
use crate::process::{python_for, LaunchConfig, ProcessManager};
use crate::validation::validate_path;
use crate::version::{is_legacy_version, supports_lpmm};
use crate::{LauncherError, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

const SCRIPTS_DIR: &str = "scripts";
const LEGACY_DIR: &[&str] = &["src", "plugins", "zhishi"];
const LEGACY_SCRIPT: &str = "knowledge_library.py";

/// One stage of the LPMM pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LpmmStep {
    TextSplit,
    EntityExtract,
    KnowledgeImport,
}

impl LpmmStep {
    /// Pipeline order.
    pub const ALL: [LpmmStep; 3] = [
        LpmmStep::TextSplit,
        LpmmStep::EntityExtract,
        LpmmStep::KnowledgeImport,
    ];

    pub fn script(&self) -> &'static str {
        match self {
            LpmmStep::TextSplit => "raw_data_preprocessor.py",
            LpmmStep::EntityExtract => "info_extraction.py",
            LpmmStep::KnowledgeImport => "import_openie.py",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            LpmmStep::TextSplit => "LPMM知识库文本分割",
            LpmmStep::EntityExtract => "LPMM知识库实体提取",
            LpmmStep::KnowledgeImport => "LPMM知识库知识图谱导入",
        }
    }

    /// Notes shown before the step runs.
    pub fn warnings(&self) -> &'static [&'static str] {
        match self {
            LpmmStep::TextSplit => &[
                "该进程将处理 MaiBot/data/lpmm_raw_data 目录下的所有 .txt 文件",
                "处理后的数据将合并为一个 JSON 文件并储存在 MaiBot/data/imported_lpmm_data 目录中",
            ],
            LpmmStep::EntityExtract => &[
                "实体提取会花费较多 API 余额和时间，建议在空闲时段执行",
                "举例：600万字全剧情，选用 deepseek v3 0324，消耗约40元，约3小时",
                "建议使用硅基流动的非 Pro 模型，或可用赠金抵扣的 Pro 模型",
                "请确保账户余额充足，并在执行前确认无误",
            ],
            LpmmStep::KnowledgeImport => &[
                "OpenIE 导入时会大量发送请求，可能撞到请求速度上限，请注意选用的模型",
                "推荐使用硅基流动的 Pro/BAAI/bge-m3，每百万 Token 费用为0.7元",
                "导入会消耗大量系统资源，峰值内存占用约3GB，建议在配置较好的电脑上运行",
                "请确保账户余额充足，并在执行前确认无误",
            ],
        }
    }
}

impl fmt::Display for LpmmStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Started legacy build.
#[derive(Debug, Clone)]
pub struct LegacyBuild {
    pub pid: u32,
    /// Where the user drops the UTF-8 text files to learn.
    pub raw_info_dir: PathBuf,
}

/// Runs knowledge-base scripts for an instance.
pub struct KnowledgeBuilder {
    manager: Arc<ProcessManager>,
}

impl KnowledgeBuilder {
    pub fn new(manager: Arc<ProcessManager>) -> Self {
        Self { manager }
    }

    /// Script path for `step`, once the instance is able to run it.
    pub fn check(instance: &InstanceConfig, step: LpmmStep) -> Result<PathBuf> {
        validate_path(&instance.mai_path, Some("bot.py"))
            .map_err(|e| LauncherError::validation("mai_path", e))?;

        if !supports_lpmm(&instance.version_path) {
            return Err(LauncherError::validation(
                "version_path",
                format!(
                    "版本 {} 不支持 LPMM 知识库，请升级到 0.6.3 以上版本",
                    instance.version_path
                ),
            ));
        }

        let script = instance.mai_dir().join(SCRIPTS_DIR).join(step.script());
        if !script.is_file() {
            return Err(LauncherError::FileNotFound(script));
        }
        Ok(script)
    }

    /// Open a console running `step`. Returns the window's PID.
    pub fn run_step(&self, instance: &InstanceConfig, step: LpmmStep) -> Result<u32> {
        Self::check(instance, step)?;
        let relative = Path::new(SCRIPTS_DIR).join(step.script());
        let command = format!("{} {}", python_for(instance), relative.display());
        info!("Starting {} for {}", step, instance.label());
        self.manager
            .spawn(LaunchConfig::new(step.description(), command, instance.mai_dir()))
    }

    /// Knowledge build of legacy bots, run from `src/plugins/zhishi`.
    pub fn legacy_build(&self, instance: &InstanceConfig) -> Result<LegacyBuild> {
        if instance.mai_path.trim().is_empty() {
            return Err(LauncherError::validation("mai_path", "麦麦路径未配置"));
        }
        if !is_legacy_version(&instance.version_path) {
            return Err(LauncherError::validation(
                "version_path",
                "此功能仅适用于 0.6.0-alpha 及更早版本",
            ));
        }

        let zhishi = legacy_dir(instance.mai_dir());
        let script = zhishi.join(LEGACY_SCRIPT);
        if !script.is_file() {
            return Err(LauncherError::FileNotFound(script));
        }
        let raw_info_dir = zhishi.join("data").join("raw_info");
        std::fs::create_dir_all(&raw_info_dir)
            .map_err(|e| LauncherError::io_with_path(e, &raw_info_dir))?;

        let command = format!("{} {}", python_for(instance), LEGACY_SCRIPT);
        let pid = self
            .manager
            .spawn(LaunchConfig::new("旧版知识库构建", command, &zhishi))?;
        Ok(LegacyBuild { pid, raw_info_dir })
    }
}

fn legacy_dir(mai_dir: &Path) -> PathBuf {
    LEGACY_DIR.iter().fold(mai_dir.to_path_buf(), |dir, part| dir.join(part))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn instance(mai: &Path, version: &str) -> InstanceConfig {
        let mut instance = InstanceConfig::new("1", version);
        instance.mai_path = mai.display().to_string();
        instance
    }

    #[test]
    fn test_steps_in_pipeline_order() {
        let scripts: Vec<&str> = LpmmStep::ALL.iter().map(|s| s.script()).collect();
        assert_eq!(
            scripts,
            ["raw_data_preprocessor.py", "info_extraction.py", "import_openie.py"]
        );
        assert!(LpmmStep::ALL.iter().all(|s| !s.warnings().is_empty()));
    }

    #[test]
    fn test_check() {
        let temp = TempDir::new().unwrap();
        let mai = temp.path().join("MaiBot");
        std::fs::create_dir_all(mai.join("scripts")).unwrap();

        // no bot.py yet
        assert!(KnowledgeBuilder::check(&instance(&mai, "0.7.0"), LpmmStep::TextSplit).is_err());

        std::fs::write(mai.join("bot.py"), "").unwrap();
        let err = KnowledgeBuilder::check(&instance(&mai, "0.7.0"), LpmmStep::TextSplit).unwrap_err();
        assert!(matches!(err, LauncherError::FileNotFound(_)));

        std::fs::write(mai.join("scripts/raw_data_preprocessor.py"), "").unwrap();
        let script = KnowledgeBuilder::check(&instance(&mai, "0.7.0"), LpmmStep::TextSplit).unwrap();
        assert_eq!(script, mai.join("scripts").join("raw_data_preprocessor.py"));

        let err = KnowledgeBuilder::check(&instance(&mai, "0.6.0"), LpmmStep::TextSplit).unwrap_err();
        assert!(matches!(err, LauncherError::Validation { .. }));
    }

    #[test]
    fn test_legacy_build_rejects_modern_versions() {
        let temp = TempDir::new().unwrap();
        let builder = KnowledgeBuilder::new(Arc::new(ProcessManager::new(None)));
        let err = builder.legacy_build(&instance(temp.path(), "0.8.0")).unwrap_err();
        assert!(matches!(err, LauncherError::Validation { .. }));

        let err = builder.legacy_build(&instance(temp.path(), "classical")).unwrap_err();
        assert!(matches!(err, LauncherError::FileNotFound(_)));
    }

    #[test]
    fn test_legacy_dir() {
        assert_eq!(
            legacy_dir(Path::new("bot")),
            Path::new("bot").join("src").join("plugins").join("zhishi")
        );
    }
}
