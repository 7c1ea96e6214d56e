use super::{select_instance, App};
use crate::prompt::Prompt;
use crate::ui;
use anyhow::Result;
use maibot_core::version;
use maibot_core::Migrator;

pub(super) async fn run(app: &mut App, prompt: &mut dyn Prompt) -> Result<()> {
    ui::header("数据库迁移（MongoDB → SQLite）");
    ui::info("适用于从 0.7 以前版本升级到 0.7 及以上版本的实例");
    let Some(name) = select_instance(app, prompt)? else {
        return Ok(());
    };
    let instance = app.find(&name)?;
    if version::needs_mongodb(&instance.version_path) {
        ui::warning(&format!(
            "实例版本 {} 仍在使用 MongoDB，请先更新到 0.7 及以上版本",
            instance.version_path
        ));
    }

    let script = Migrator::check(&instance)?;
    ui::info(&format!("迁移脚本: {}", script.display()));
    ui::warning("迁移前请备份 MongoDB 数据，并保持 MongoDB 服务运行");
    if !prompt.confirm("确认开始迁移?", false)? {
        ui::info("已取消");
        return Ok(());
    }
    let pid = app.launcher.migrator().run(&instance)?;
    ui::success(&format!("迁移脚本已在新窗口中启动 (PID {})", pid));
    prompt.pause()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::testing::app_in;
    use super::*;
    use crate::prompt::scripted::ScriptedPrompt;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_unconfigured_instance_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let mut app = app_in(tmp.path());
        let mut prompt = ScriptedPrompt::new(["1"]);
        assert!(run(&mut app, &mut prompt).await.is_err());
        assert_eq!(prompt.pauses, 0);
    }
}
