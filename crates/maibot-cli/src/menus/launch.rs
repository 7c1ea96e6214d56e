use super::{select_instance, settle, App};
use crate::prompt::Prompt;
use crate::ui;
use anyhow::Result;

pub(super) async fn run(app: &mut App, prompt: &mut dyn Prompt) -> Result<()> {
    let Some(name) = select_instance(app, prompt)? else {
        return Ok(());
    };
    let instance = app.find(&name)?;
    let launcher = app.launcher.instance_launcher();

    let problems = launcher.validate(&instance);
    if !problems.is_empty() {
        ui::error(&format!("配置集 {} 未通过检查:", name));
        for problem in &problems {
            ui::bullet(problem);
        }
        ui::info("请先在配置管理中修正后再启动");
        prompt.pause()?;
        return Ok(());
    }

    if app.store.current_name() != name {
        app.store.set_current(&name)?;
        app.store.save()?;
    }

    loop {
        ui::header(&format!("启动 {} ({})", instance.label(), instance.version_path));
        ui::option('A', "仅启动麦麦（适配器 + 本体）");
        ui::option('B', "全栈启动（NapCat + MongoDB + 麦麦）");
        ui::option('C', "启动 WebUI");
        ui::option('Q', "返回上级");

        let report = match prompt.choice("请选择启动方式", &['A', 'B', 'C', 'Q'])? {
            'A' => launcher.launch_bot_only(&instance).await,
            'B' => launcher.launch_full_stack(&instance).await,
            'C' => launcher.launch_webui(&instance).await,
            _ => return Ok(()),
        };
        settle(report.map(|report| ui::launch_report(&report)).map_err(Into::into))?;
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::app_in;
    use super::*;
    use crate::prompt::scripted::ScriptedPrompt;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_invalid_instance_is_not_launched() {
        let tmp = TempDir::new().unwrap();
        let mut app = app_in(tmp.path());
        // The default record has no bot path.
        let mut prompt = ScriptedPrompt::new(["1"]);
        run(&mut app, &mut prompt).await.unwrap();
        assert_eq!(prompt.pauses, 1);
        assert!(app.launcher.processes().running().is_empty());
    }

    #[tokio::test]
    async fn test_back_out_of_selection() {
        let tmp = TempDir::new().unwrap();
        let mut app = app_in(tmp.path());
        let mut prompt = ScriptedPrompt::new(["q"]);
        run(&mut app, &mut prompt).await.unwrap();
        assert_eq!(prompt.pauses, 0);
    }
}
