//! LPMM knowledge-base builds.

use super::{select_instance, settle, App};
use crate::prompt::Prompt;
use crate::ui;
use anyhow::Result;
use maibot_core::{InstanceConfig, KnowledgeBuilder, LpmmStep};

pub(super) async fn run(app: &mut App, prompt: &mut dyn Prompt) -> Result<()> {
    let Some(name) = select_instance(app, prompt)? else {
        return Ok(());
    };
    let instance = app.find(&name)?;
    let builder = app.launcher.knowledge();

    loop {
        ui::header(&format!("知识库构建 - {}", instance.label()));
        ui::section("LPMM 知识库");
        ui::option('A', "一键执行全部步骤");
        ui::option('B', LpmmStep::TextSplit.description());
        ui::option('C', LpmmStep::EntityExtract.description());
        ui::option('D', LpmmStep::KnowledgeImport.description());
        ui::section("旧版知识库");
        ui::option('E', "旧版知识库构建（0.6.0-alpha 及更早）");
        ui::option('Q', "返回上级");

        let result = match prompt.choice("请输入选项", &['A', 'B', 'C', 'D', 'E', 'Q'])? {
            'A' => pipeline(&builder, &instance, prompt),
            'B' => single(&builder, &instance, LpmmStep::TextSplit, prompt),
            'C' => single(&builder, &instance, LpmmStep::EntityExtract, prompt),
            'D' => single(&builder, &instance, LpmmStep::KnowledgeImport, prompt),
            'E' => legacy(&builder, &instance, prompt),
            _ => return Ok(()),
        };
        settle(result)?;
    }
}

/// Show the step's notes and ask to go ahead.
fn confirm_step(step: LpmmStep, prompt: &mut dyn Prompt) -> Result<bool> {
    ui::header(step.description());
    for note in step.warnings() {
        ui::warning(note);
    }
    prompt.confirm(&format!("确认执行{}?", step.description()), false)
}

fn single(
    builder: &KnowledgeBuilder,
    instance: &InstanceConfig,
    step: LpmmStep,
    prompt: &mut dyn Prompt,
) -> Result<()> {
    KnowledgeBuilder::check(instance, step)?;
    if !confirm_step(step, prompt)? {
        ui::info("已取消");
        return Ok(());
    }
    let pid = builder.run_step(instance, step)?;
    ui::success(&format!("{} 已在新窗口中启动 (PID {})", step, pid));
    Ok(())
}

fn pipeline(builder: &KnowledgeBuilder, instance: &InstanceConfig, prompt: &mut dyn Prompt) -> Result<()> {
    for step in LpmmStep::ALL {
        KnowledgeBuilder::check(instance, step)?;
    }
    for (index, step) in LpmmStep::ALL.into_iter().enumerate() {
        if !confirm_step(step, prompt)? {
            ui::info("已中止后续步骤");
            return Ok(());
        }
        let pid = builder.run_step(instance, step)?;
        ui::success(&format!("{} 已在新窗口中启动 (PID {})", step, pid));
        if index + 1 < LpmmStep::ALL.len() {
            ui::info("请等待该窗口执行完毕后再继续");
            prompt.pause()?;
        }
    }
    ui::success("LPMM 知识库构建流程已全部启动");
    Ok(())
}

fn legacy(builder: &KnowledgeBuilder, instance: &InstanceConfig, prompt: &mut dyn Prompt) -> Result<()> {
    ui::warning("旧版知识库构建会读取 raw_info 目录下的 UTF-8 文本文件");
    if !prompt.confirm("确认开始构建?", false)? {
        return Ok(());
    }
    let build = builder.legacy_build(instance)?;
    ui::success(&format!("旧版知识库构建已启动 (PID {})", build.pid));
    ui::info(&format!("学习资料目录: {}", build.raw_info_dir.display()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::testing::app_in;
    use super::*;
    use maibot_core::ProcessManager;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;
    use crate::prompt::scripted::ScriptedPrompt;

    #[test]
    fn test_pipeline_fails_before_asking_when_scripts_missing() {
        let tmp = TempDir::new().unwrap();
        let mai = tmp.path().join("MaiBot");
        fs::create_dir_all(&mai).unwrap();
        fs::write(mai.join("bot.py"), "").unwrap();
        let mut instance = InstanceConfig::new("1", "0.7.0");
        instance.mai_path = mai.to_string_lossy().into_owned();

        let builder = KnowledgeBuilder::new(Arc::new(ProcessManager::new(None)));
        let mut prompt = ScriptedPrompt::new(Vec::<String>::new());
        assert!(pipeline(&builder, &instance, &mut prompt).is_err());
        assert!(prompt.asked.is_empty());
    }

    #[test]
    fn test_declined_step_runs_nothing() {
        let tmp = TempDir::new().unwrap();
        let mai = tmp.path().join("MaiBot");
        fs::create_dir_all(mai.join("scripts")).unwrap();
        fs::write(mai.join("bot.py"), "").unwrap();
        fs::write(mai.join("scripts").join(LpmmStep::TextSplit.script()), "").unwrap();
        let mut instance = InstanceConfig::new("1", "0.7.0");
        instance.mai_path = mai.to_string_lossy().into_owned();

        let manager = Arc::new(ProcessManager::new(None));
        let builder = KnowledgeBuilder::new(manager.clone());
        let mut prompt = ScriptedPrompt::new(["n"]);
        single(&builder, &instance, LpmmStep::TextSplit, &mut prompt).unwrap();
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn test_menu_backs_out() {
        let tmp = TempDir::new().unwrap();
        let mut app = app_in(tmp.path());
        let mut prompt = ScriptedPrompt::new(["1", "q"]);
        run(&mut app, &mut prompt).await.unwrap();
        assert_eq!(prompt.remaining(), 0);
    }
}
