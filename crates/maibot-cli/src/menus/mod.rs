//! Letter-keyed interactive menus.

mod about;
mod config;
mod deploy;
mod knowledge;
mod launch;
mod migration;
mod process;

use crate::prompt::{InputClosed, Prompt};
use crate::ui;
use anyhow::Result;
use maibot_core::validation;
use maibot_core::{ConfigStore, InstanceConfig, Launcher, LauncherError};
use tracing::{debug, info};

/// The launcher session behind the menus.
pub struct App {
    pub(crate) launcher: Launcher,
    pub(crate) store: ConfigStore,
}

impl App {
    pub fn new(launcher: Launcher, store: ConfigStore) -> Self {
        Self { launcher, store }
    }

    /// Main menu loop. Returns when the user quits or input closes.
    pub async fn run(&mut self, prompt: &mut dyn Prompt) -> Result<()> {
        if let Some(message) = self.store.load_error() {
            ui::error(&format!(
                "配置文件解析失败，已使用默认配置，修复前不会保存任何修改: {}",
                message
            ));
            ui::info("可在 配置管理 → 可视化编辑配置 中用文本编辑器修复");
        }

        let result = self.main_loop(prompt).await;
        let stopped = self.launcher.shutdown();
        if stopped > 0 {
            ui::info(&format!("已停止 {} 个进程", stopped));
        }
        match result {
            Err(e) if e.is::<InputClosed>() => {
                debug!("Input closed, leaving main menu");
                Ok(())
            }
            other => other,
        }
    }

    async fn main_loop(&mut self, prompt: &mut dyn Prompt) -> Result<()> {
        loop {
            ui::banner();
            ui::section("启动类");
            ui::option('A', "运行麦麦");
            ui::section("配置类");
            ui::option('C', "配置管理（新建/修改/检查配置）");
            ui::section("功能类");
            ui::option('D', "知识库构建");
            ui::option('E', "数据库迁移（MongoDB → SQLite）");
            ui::section("部署类");
            ui::option('F', "实例部署辅助系统");
            ui::section("进程管理");
            ui::option('H', "查看运行状态");
            ui::section("关于类");
            ui::option('G', "关于本程序");
            ui::section("退出类");
            ui::option('Q', "退出程序");

            let choice = prompt.choice("请输入选项", &['A', 'C', 'D', 'E', 'F', 'G', 'H', 'Q'])?;
            debug!("Main menu choice {}", choice);
            let result = match choice {
                'A' => launch::run(self, prompt).await,
                'C' => config::run(self, prompt).await,
                'D' => knowledge::run(self, prompt).await,
                'E' => migration::run(self, prompt).await,
                'F' => deploy::run(self, prompt).await,
                'G' => about::run(prompt),
                'H' => process::run(self, prompt).await,
                _ => {
                    info!("Quit requested");
                    return Ok(());
                }
            };
            settle(result)?;
        }
    }

    fn find(&self, name: &str) -> Result<InstanceConfig> {
        self.store.get(name).cloned().ok_or_else(|| {
            LauncherError::ConfigNotFound {
                name: name.to_string(),
            }
            .into()
        })
    }
}

/// Print an action error and carry on. Closed input still ends the session.
pub(crate) fn settle(result: Result<()>) -> Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.is::<InputClosed>() => Err(e),
        Err(e) => {
            ui::error(&format!("{:#}", e));
            Ok(())
        }
    }
}

/// Ask for an instance by serial. `None` when the user backs out with Q.
pub(crate) fn select_instance(app: &App, prompt: &mut dyn Prompt) -> Result<Option<String>> {
    ui::header("选择实例");
    ui::instance_table(&app.store);
    loop {
        let answer = prompt.input("请输入实例序列号（Q 返回）", None)?;
        if answer.eq_ignore_ascii_case("q") {
            return Ok(None);
        }
        match app.store.find_by_serial(&answer) {
            Some((name, _)) => return Ok(Some(name.to_string())),
            None => ui::error(&format!("未找到序列号为 {} 的实例", answer)),
        }
    }
}

/// Ask until `check` accepts the answer.
pub(crate) fn ask_valid(
    prompt: &mut dyn Prompt,
    label: &str,
    default: Option<&str>,
    check: impl Fn(&str) -> std::result::Result<(), String>,
) -> Result<String> {
    loop {
        let answer = prompt.input(label, default)?;
        match check(&answer) {
            Ok(()) => return Ok(answer),
            Err(message) => ui::error(&message),
        }
    }
}

/// A directory that must contain `check_file`. Empty is allowed when `optional`.
pub(crate) fn ask_dir(
    prompt: &mut dyn Prompt,
    label: &str,
    check_file: Option<&str>,
    optional: bool,
) -> Result<String> {
    ask_valid(prompt, label, None, |answer| {
        if optional && answer.is_empty() {
            return Ok(());
        }
        validation::validate_path(answer, check_file)
    })
}

/// Serial number, nickname and QQ account for a new instance.
pub(crate) fn ask_identity(
    app: &App,
    prompt: &mut dyn Prompt,
    qq_required: bool,
) -> Result<(String, String, String)> {
    let suggested = app.store.generate_unique_serial().to_string();
    let serial = ask_valid(prompt, "实例序列号", Some(&suggested), |answer| {
        if answer.is_empty() {
            Err("序列号不能为空".to_string())
        } else if app.store.serial_in_use(answer) {
            Err(format!("序列号 {} 已被使用", answer))
        } else {
            Ok(())
        }
    })?;
    let nickname = ask_valid(prompt, "实例昵称", None, |answer| {
        if answer.is_empty() {
            Err("昵称不能为空".to_string())
        } else {
            Ok(())
        }
    })?;
    let qq_label = if qq_required {
        "机器人 QQ 账号"
    } else {
        "机器人 QQ 账号（可留空）"
    };
    let qq = ask_valid(prompt, qq_label, Some(""), |answer| {
        if answer.is_empty() && !qq_required {
            Ok(())
        } else {
            validation::validate_qq_account(answer)
        }
    })?;
    Ok((serial, nickname, qq))
}

#[cfg(test)]
pub(crate) mod testing {
    use super::App;
    use maibot_core::{ConfigStore, Launcher};
    use std::path::Path;

    /// An offline app over `dir/config.toml`.
    pub fn app_in(dir: &Path) -> App {
        let launcher = Launcher::builder(dir.join("config.toml"))
            .data_dir(dir.join("data"))
            .auto_create_dirs(true)
            .offline(true)
            .build()
            .unwrap();
        let store = ConfigStore::load(launcher.config_path()).unwrap();
        App::new(launcher, store)
    }
}
