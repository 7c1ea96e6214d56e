//! Deploy, update and delete wizards.

use super::{ask_identity, ask_valid, select_instance, settle, App};
use crate::prompt::{InputClosed, Prompt};
use crate::ui;
use anyhow::Result;
use maibot_core::config::RepoConfig;
use maibot_core::deploy::webui::{self, WebUiBranch};
use maibot_core::deploy::{
    confirmation_token, delete_instance, deletion_target, maibot_versions, napcat_versions,
    same_version, DeployEvent, DeployHooks, DeployPlan, ProgressSink, VersionEntry,
};
use maibot_core::{network, validation, version};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{info, warn};

pub(super) async fn run(app: &mut App, prompt: &mut dyn Prompt) -> Result<()> {
    loop {
        ui::header("实例部署辅助系统");
        ui::option('A', "部署新实例");
        ui::option('B', "更新已有实例");
        ui::option('C', "删除实例");
        ui::option('Q', "返回上级");

        let result = match prompt.choice("请输入选项", &['A', 'B', 'C', 'Q'])? {
            'A' => wizard(app, prompt).await,
            'B' => update(app, prompt).await,
            'C' => remove(app, prompt),
            _ => return Ok(()),
        };
        settle(result)?;
    }
}

/// Waits for the user while the NapCat installer window is open.
struct ConsoleHooks<'a> {
    prompt: &'a mut dyn Prompt,
    input_closed: bool,
}

impl<'a> ConsoleHooks<'a> {
    fn new(prompt: &'a mut dyn Prompt) -> Self {
        Self {
            prompt,
            input_closed: false,
        }
    }
}

impl DeployHooks for ConsoleHooks<'_> {
    fn napcat_installer_started(&mut self, installer: &Path) {
        ui::info(&format!("已启动 NapCat 安装程序: {}", installer.display()));
        ui::info("请在安装程序中完成安装，完成后回到此处继续");
        if self.prompt.pause().is_err() {
            self.input_closed = true;
        }
    }
}

async fn check_network(app: &App) {
    if app.launcher.is_offline() {
        ui::warning("离线模式：将使用缓存或离线版本列表");
        return;
    }
    ui::info("正在检查网络连接...");
    match network::check_connectivity().await {
        Ok(connectivity) if connectivity.is_online() => {
            if connectivity.needs_proxy() {
                ui::warning("GitHub 无法访问但镜像可用，下载可能失败，建议配置代理");
            } else {
                ui::success("网络连接正常");
            }
        }
        Ok(_) => ui::warning("网络不可用，将使用缓存或离线版本列表"),
        Err(e) => {
            warn!("Connectivity check failed: {}", e);
            ui::warning("网络检查失败，将使用缓存或离线版本列表");
        }
    }
}

/// Bot version menu: first entries by number, C changelog, R refresh, Q back.
async fn choose_version(app: &App, prompt: &mut dyn Prompt) -> Result<Option<VersionEntry>> {
    let mut force_refresh = false;
    loop {
        let versions = maibot_versions(app.launcher.github(), force_refresh).await;
        force_refresh = false;
        let shown = &versions[..versions.len().min(RepoConfig::VERSION_MENU_LIMIT)];

        ui::header("选择要部署的版本");
        ui::version_menu(shown);
        println!();
        ui::option('C', "查看版本更新日志");
        ui::option('R', "刷新版本列表");
        ui::option('Q', "返回上级菜单");

        let answer = prompt.input("请输入版本序号", None)?;
        match answer.to_ascii_uppercase().as_str() {
            "Q" => return Ok(None),
            "R" => force_refresh = true,
            "C" => {
                let number = prompt.input("查看哪个版本的更新日志（序号）", None)?;
                match pick(shown, &number) {
                    Some(entry) if !entry.changelog.is_empty() => {
                        ui::header(&entry.display_name);
                        println!("{}", entry.changelog);
                    }
                    Some(_) => ui::info("该版本没有更新日志"),
                    None => ui::error("无效的序号"),
                }
                prompt.pause()?;
            }
            _ => match pick(shown, &answer) {
                Some(entry) => return Ok(Some(entry.clone())),
                None => ui::error("无效的序号"),
            },
        }
    }
}

/// 1-based selection from `entries`.
fn pick<'a, T>(entries: &'a [T], answer: &str) -> Option<&'a T> {
    let index: usize = answer.trim().parse().ok()?;
    index.checked_sub(1).and_then(|i| entries.get(i))
}

fn choose_components(plan: &mut DeployPlan, prompt: &mut dyn Prompt) -> Result<()> {
    let name = plan.version.name.clone();
    let options = &mut plan.options;
    ui::header("选择安装组件");

    if version::is_legacy_version(&name) {
        ui::info("该版本不需要适配器");
        options.install_adapter = false;
        options.install_napcat = prompt.confirm("安装 NapCat?", false)?;
    } else {
        options.install_adapter = prompt.confirm("安装适配器?", true)?;
        options.install_napcat = prompt.confirm("安装 NapCat?", options.install_adapter)?;
    }
    if version::needs_mongodb(&name) {
        options.install_mongodb = prompt.confirm("安装 MongoDB?", true)?;
    } else {
        options.install_mongodb = false;
    }
    options.install_webui = prompt.confirm("安装 WebUI?", false)?;
    Ok(())
}

fn choose_napcat(plan: &mut DeployPlan, prompt: &mut dyn Prompt) -> Result<()> {
    if !plan.options.install_napcat {
        plan.napcat_version = None;
        return Ok(());
    }
    let versions = napcat_versions();
    ui::header("选择 NapCat 版本");
    ui::version_menu(&versions);
    ui::option('Q', "跳过 NapCat 下载");
    loop {
        let answer = prompt.input("请输入 NapCat 版本序号", Some("1"))?;
        if answer.eq_ignore_ascii_case("q") {
            plan.options.install_napcat = false;
            plan.napcat_version = None;
            return Ok(());
        }
        if let Some(entry) = pick(&versions, &answer) {
            plan.napcat_version = Some(entry.clone());
            return Ok(());
        }
        ui::error("无效的序号");
    }
}

async fn choose_webui(app: &App, plan: &mut DeployPlan, prompt: &mut dyn Prompt) -> Result<()> {
    if !plan.options.install_webui {
        return Ok(());
    }
    match (webui::check_node().await, webui::check_npm().await) {
        (Some(node), Some(npm)) => ui::success(&format!("Node.js {} / npm {}", node, npm)),
        _ => {
            ui::warning("未检测到 Node.js 或 npm，WebUI 依赖需要稍后手动安装");
            ui::info(&webui::node_install_hint());
        }
    }

    let branches = match webui::webui_branches(app.launcher.github(), false).await {
        Ok(branches) if !branches.is_empty() => branches,
        Ok(_) => vec![WebUiBranch::named("main")],
        Err(e) => {
            warn!("Could not list WebUI branches: {}", e);
            vec![WebUiBranch::named("main")]
        }
    };
    ui::header("选择 WebUI 分支");
    for (index, branch) in branches.iter().enumerate() {
        println!("  {:>2}. {} {}", index + 1, branch.name, branch.commit_sha);
    }
    loop {
        let answer = prompt.input("请输入分支序号", Some("1"))?;
        if let Some(branch) = pick(&branches, &answer) {
            plan.webui_branch = Some(branch.clone());
            return Ok(());
        }
        ui::error("无效的序号");
    }
}

fn ask_base_dir(prompt: &mut dyn Prompt) -> Result<PathBuf> {
    let default = std::env::current_dir()
        .map(|dir| dir.to_string_lossy().into_owned())
        .unwrap_or_else(|_| ".".to_string());
    let answer = ask_valid(prompt, "安装目录（实例将放在 安装目录/昵称 下）", Some(&default), |answer| {
        if answer.is_empty() {
            Err("路径不能为空".to_string())
        } else if validation::contains_cjk(answer) {
            Err("路径不能包含中文字符".to_string())
        } else {
            Ok(())
        }
    })?;
    Ok(PathBuf::from(answer))
}

fn confirmation_screen(plan: &DeployPlan) {
    ui::header("部署确认");
    ui::info(&format!("版本: {}", plan.version.display_name));
    ui::info(&format!("序列号: {}", plan.serial_number));
    ui::info(&format!("昵称: {}", plan.nickname));
    ui::info(&format!("QQ 账号: {}", plan.qq_account));
    ui::info(&format!("安装路径: {}", plan.install_dir.display()));
    for (component, on) in plan.options.entries() {
        ui::bullet(&format!("{}: {}", component, if on { "安装" } else { "跳过" }));
    }
    if let Some(napcat) = &plan.napcat_version {
        ui::bullet(&format!("NapCat 版本: {}", napcat.display_name));
    }
    if let Some(branch) = &plan.webui_branch {
        ui::bullet(&format!("WebUI 分支: {}", branch.name));
    }
    ui::info(&format!("预计耗时约 {} 分钟", plan.estimated_minutes()));
}

async fn wizard(app: &mut App, prompt: &mut dyn Prompt) -> Result<()> {
    check_network(app).await;
    let Some(version) = choose_version(app, prompt).await? else {
        return Ok(());
    };
    ui::success(&format!("已选择 {}", version.display_name));

    let (serial, nickname, qq) = ask_identity(app, prompt, true)?;
    let base_dir = ask_base_dir(prompt)?;
    let mut plan = DeployPlan::new(version, &base_dir, serial, nickname, qq);
    choose_components(&mut plan, prompt)?;
    choose_napcat(&mut plan, prompt)?;
    choose_webui(app, &mut plan, prompt).await?;

    let problems = plan.validate(&app.store);
    if !problems.is_empty() {
        ui::error("部署参数有误:");
        for problem in &problems {
            ui::bullet(problem);
        }
        return Ok(());
    }

    confirmation_screen(&plan);
    if !prompt.confirm("确认开始部署?", true)? {
        ui::info("已取消部署");
        return Ok(());
    }

    info!("Starting deployment {}", plan.config_name());
    let deployer = app.launcher.deployer();
    let (tx, mut rx) = mpsc::channel::<DeployEvent>(64);
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            ui::deploy_event(&event);
        }
    });
    let sink = ProgressSink::new(Some(tx));
    let mut hooks = ConsoleHooks::new(prompt);
    let outcome = deployer.deploy(&plan, &mut app.store, &sink, &mut hooks).await;
    let input_closed = hooks.input_closed;
    drop(sink);
    let _ = printer.await;

    let outcome = outcome?;
    ui::success(&format!(
        "实例 {} 部署完成，已设为当前配置",
        outcome.config_name
    ));
    for warning in &outcome.warnings {
        ui::warning(warning);
    }
    ui::info(&format!("麦麦本体: {}", outcome.instance.mai_path));
    ui::info("请编辑 config/bot_config.toml 与 .env 后再启动");
    if input_closed {
        return Err(InputClosed.into());
    }
    prompt.pause()?;
    Ok(())
}

async fn update(app: &mut App, prompt: &mut dyn Prompt) -> Result<()> {
    let Some(name) = select_instance(app, prompt)? else {
        return Ok(());
    };
    let instance = app.find(&name)?;
    check_network(app).await;
    let Some(target) = choose_version(app, prompt).await? else {
        return Ok(());
    };

    if same_version(&instance, &target.name)
        && !prompt.confirm(
            &format!("实例已是 {}，仍要重新安装?", instance.version_path),
            false,
        )?
    {
        return Ok(());
    }
    ui::warning("更新会替换程序文件，配置文件、数据与虚拟环境会被保留");
    ui::info("更新前会自动备份实例目录");
    if !prompt.confirm(
        &format!("确认将 {} 从 {} 更新到 {}?", instance.label(), instance.version_path, target.name),
        false,
    )? {
        return Ok(());
    }

    let report = app.launcher.updater().update(&mut app.store, &name, &target).await?;
    ui::success(&format!(
        "已从 {} 更新到 {}",
        report.previous_version, report.new_version
    ));
    ui::info(&format!("备份目录: {}", report.backup_dir.display()));
    for warning in &report.warnings {
        ui::warning(warning);
    }
    prompt.pause()?;
    Ok(())
}

fn remove(app: &mut App, prompt: &mut dyn Prompt) -> Result<()> {
    let Some(name) = select_instance(app, prompt)? else {
        return Ok(());
    };
    let instance = app.find(&name)?;
    ui::instance_details(&name, &instance);

    if !prompt.confirm("确认删除该实例?", false)? {
        return Ok(());
    }
    let delete_files = prompt.confirm("同时删除实例文件?", false)?;
    if delete_files {
        match deletion_target(&instance) {
            Some(dir) => ui::warning(&format!("以下部署目录将被整个删除: {}", dir.display())),
            None => ui::warning("未找到可删除的部署目录，只删除配置记录"),
        }
    }
    if !prompt.confirm("此操作不可恢复，确定继续?", false)? {
        return Ok(());
    }
    let token = confirmation_token(&instance.serial_number);
    let typed = prompt.input(&format!("请输入 {} 以确认", token), None)?;
    if typed != token {
        ui::info("输入不匹配，已取消删除");
        return Ok(());
    }

    let report = delete_instance(&mut app.store, &name, delete_files)?;
    match &report.deleted_dir {
        Some(dir) => ui::success(&format!("已删除实例 {} 及目录 {}", name, dir.display())),
        None => ui::success(&format!("已删除实例 {} 的配置", name)),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::testing::app_in;
    use super::*;
    use crate::prompt::scripted::ScriptedPrompt;
    use maibot_core::InstanceConfig;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_pick() {
        let entries = ["a", "b"];
        assert_eq!(pick(&entries, "1"), Some(&"a"));
        assert_eq!(pick(&entries, " 2 "), Some(&"b"));
        assert_eq!(pick(&entries, "0"), None);
        assert_eq!(pick(&entries, "3"), None);
        assert_eq!(pick(&entries, "x"), None);
    }

    #[tokio::test]
    async fn test_offline_version_menu() {
        let tmp = TempDir::new().unwrap();
        let app = app_in(tmp.path());
        let mut prompt = ScriptedPrompt::new(["9", "1"]);
        let entry = choose_version(&app, &mut prompt).await.unwrap().unwrap();
        assert_eq!(entry.name, "main");

        let mut prompt = ScriptedPrompt::new(["c", "2", "q"]);
        assert!(choose_version(&app, &mut prompt).await.unwrap().is_none());
        assert_eq!(prompt.pauses, 1);
    }

    #[test]
    fn test_components_for_legacy_version() {
        let tmp = TempDir::new().unwrap();
        let app = app_in(tmp.path());
        let mut entry = maibot_core::deploy::versions::offline_versions().remove(0);
        entry.name = "0.5.15".to_string();
        let mut plan = DeployPlan::new(entry, tmp.path(), "2", "old", "123");

        // NapCat, MongoDB, WebUI.
        let mut prompt = ScriptedPrompt::new(["n", "y", "n"]);
        choose_components(&mut plan, &mut prompt).unwrap();
        choose_napcat(&mut plan, &mut prompt).unwrap();
        assert!(!plan.options.install_adapter);
        assert!(!plan.options.install_napcat);
        assert!(plan.options.install_mongodb);
        assert!(plan.napcat_version.is_none());
        assert!(plan.validate(&app.store).is_empty());
    }

    #[test]
    fn test_napcat_skip() {
        let tmp = TempDir::new().unwrap();
        let entry = maibot_core::deploy::versions::offline_versions().remove(0);
        let mut plan = DeployPlan::new(entry, tmp.path(), "2", "bot", "123");
        assert!(plan.options.install_napcat);

        let mut prompt = ScriptedPrompt::new(["5", "q"]);
        choose_napcat(&mut plan, &mut prompt).unwrap();
        assert!(!plan.options.install_napcat);
        assert!(plan.napcat_version.is_none());
    }

    #[test]
    fn test_napcat_installer_waits_on_prompt() {
        let mut prompt = ScriptedPrompt::new(Vec::<String>::new());
        let mut hooks = ConsoleHooks::new(&mut prompt);
        hooks.napcat_installer_started(Path::new("NapCat/NapCatInstaller.exe"));
        assert!(!hooks.input_closed);
        assert_eq!(prompt.pauses, 1);
    }

    #[test]
    fn test_remove_keeps_unrecognised_dir() {
        let tmp = TempDir::new().unwrap();
        let mut app = app_in(tmp.path());
        let mai = tmp.path().join("my-bot");
        fs::create_dir_all(&mai).unwrap();
        let mut instance = InstanceConfig::new("7", "0.7.0");
        instance.mai_path = mai.to_string_lossy().into_owned();
        app.store.add("instance_7", instance).unwrap();

        let mut prompt = ScriptedPrompt::new(["7", "y", "y", "y", "delete-7"]);
        remove(&mut app, &mut prompt).unwrap();
        assert!(!app.store.contains("instance_7"));
        assert!(mai.exists());
    }

    #[test]
    fn test_remove_requires_token() {
        let tmp = TempDir::new().unwrap();
        let mut app = app_in(tmp.path());
        let deploy_dir = tmp.path().join("bot");
        let mai = deploy_dir.join("MaiBot");
        fs::create_dir_all(&mai).unwrap();
        let mut instance = InstanceConfig::new("7", "0.7.0");
        instance.mai_path = mai.to_string_lossy().into_owned();
        app.store.add("instance_7", instance).unwrap();

        let mut prompt = ScriptedPrompt::new(["7", "y", "y", "y", "delete-8"]);
        remove(&mut app, &mut prompt).unwrap();
        assert!(app.store.contains("instance_7"));
        assert!(mai.exists());

        let mut prompt = ScriptedPrompt::new(["7", "y", "y", "y", "delete-7"]);
        remove(&mut app, &mut prompt).unwrap();
        assert!(!app.store.contains("instance_7"));
        assert!(!deploy_dir.exists());
    }
}
