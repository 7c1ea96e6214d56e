use crate::prompt::Prompt;
use crate::ui;
use anyhow::Result;
use maibot_core::{platform, AppConfig, RepoConfig};

const LAUNCHER_REPO: &str = env!("CARGO_PKG_REPOSITORY");

pub(super) fn run(prompt: &mut dyn Prompt) -> Result<()> {
    ui::header("关于本程序");
    ui::info(&format!("{} v{}", AppConfig::APP_NAME, AppConfig::VERSION));
    ui::info(&format!("许可证: {}", env!("CARGO_PKG_LICENSE")));
    ui::info(&format!("项目地址: {}", LAUNCHER_REPO));
    ui::info(&format!(
        "麦麦本体: https://github.com/{}",
        RepoConfig::MAIBOT_REPO
    ));
    ui::info(&format!("运行平台: {}", platform::current_platform()));
    prompt.pause()
}
