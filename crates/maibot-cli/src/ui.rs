//! Styled console output.

use console::style;
use maibot_core::deploy::{DeployEvent, VersionEntry};
use maibot_core::process::{LaunchReport, StepOutcome};
use maibot_core::{AppConfig, ConfigStore, InstanceConfig, ProcessInfo};

const BANNER: &str = r"
 __  __       _ ____        _     _                           _
|  \/  | __ _(_) __ )  ___ | |_  | |    __ _ _   _ _ __   ___| |__   ___ _ __
| |\/| |/ _` | |  _ \ / _ \| __| | |   / _` | | | | '_ \ / __| '_ \ / _ \ '__|
| |  | | (_| | | |_) | (_) | |_  | |__| (_| | |_| | | | | (__| | | |  __/ |
|_|  |_|\__,_|_|____/ \___/ \__| |_____\__,_|\__,_|_| |_|\___|_| |_|\___|_|
";

pub fn banner() {
    println!("{}", style(BANNER).cyan().bold());
    println!(
        "  {} {}",
        style("麦麦启动器控制台").white().bold(),
        style(format!("v{}", AppConfig::VERSION)).dim()
    );
    println!("  {}", style("促进多元化艺术创作发展普及").dim());
    println!();
}

/// `====>>title<<====`
pub fn section(title: &str) {
    println!("{}", style(format!("====>>{}<<====", title)).magenta());
}

pub fn header(title: &str) {
    println!();
    println!("  {}", style(title).white().bold());
    println!("  {}", style("─".repeat(50)).dim());
}

pub fn option(letter: char, text: &str) {
    println!(" {} {}", style(format!("[{}]", letter)).cyan().bold(), text);
}

pub fn success(message: &str) {
    println!("{} {}", style("✓").green().bold(), style(message).green());
}

pub fn error(message: &str) {
    println!("{} {}", style("✗").red().bold(), style(message).red());
}

pub fn warning(message: &str) {
    println!("{} {}", style("!").yellow().bold(), style(message).yellow());
}

pub fn info(message: &str) {
    println!("{} {}", style("›").cyan(), message);
}

pub fn bullet(message: &str) {
    println!("    {} {}", style("-").dim(), message);
}

fn or_unset(value: &str) -> String {
    if value.trim().is_empty() {
        style("未配置").dim().to_string()
    } else {
        value.to_string()
    }
}

pub fn instance_table(store: &ConfigStore) {
    println!(
        "  {:<8} {:<16} {:<12} {}",
        style("序列号").bold(),
        style("昵称").bold(),
        style("版本").bold(),
        style("路径").bold()
    );
    for (name, instance) in store.iter() {
        let marker = if name == store.current_name() { "*" } else { " " };
        println!(
            "{} {:<8} {:<16} {:<12} {}",
            style(marker).green(),
            instance.serial_number,
            instance.label(),
            instance.version_path,
            or_unset(&instance.mai_path)
        );
    }
}

pub fn instance_details(name: &str, instance: &InstanceConfig) {
    header(&format!("配置集 {}", name));
    let rows = [
        ("序列号", instance.serial_number.clone()),
        ("绝对序列号", instance.absolute_serial_number.to_string()),
        ("昵称", instance.nickname_path.clone()),
        ("版本", instance.version_path.clone()),
        ("麦麦本体路径", instance.mai_path.clone()),
        ("适配器路径", instance.adapter_path.clone()),
        ("NapCat 路径", instance.napcat_path.clone()),
        ("MongoDB 路径", instance.mongodb_path.clone()),
        ("WebUI 路径", instance.webui_path.clone()),
        ("虚拟环境", instance.venv_path.clone()),
        ("QQ 账号", instance.qq_account.clone()),
    ];
    for (label, value) in rows {
        println!("  {:<14} {}", style(label).cyan(), or_unset(&value));
    }
    let components: Vec<String> = instance
        .install_options
        .entries()
        .iter()
        .map(|(component, on)| format!("{}={}", component, if *on { "是" } else { "否" }))
        .collect();
    println!("  {:<14} {}", style("安装组件").cyan(), components.join(" "));
}

pub fn launch_report(report: &LaunchReport) {
    for (step, outcome) in &report.steps {
        match outcome {
            StepOutcome::Started { pid } => success(&format!("{} 已启动 (PID {})", step, pid)),
            StepOutcome::ServiceStarted => success(&format!("{} 服务已启动", step)),
            StepOutcome::AlreadyRunning => info(&format!("{} 已在运行", step)),
            StepOutcome::Skipped(reason) => info(&format!("{} 已跳过: {}", step, reason)),
            StepOutcome::Failed(reason) => error(&format!("{} 启动失败: {}", step, reason)),
        }
    }
}

pub fn process_table(processes: &[ProcessInfo]) {
    if processes.is_empty() {
        info("当前没有由启动器管理的进程");
        return;
    }
    println!(
        "  {:<20} {:<8} {:<8} {:<10} {}",
        style("名称").bold(),
        style("PID").bold(),
        style("状态").bold(),
        style("运行(秒)").bold(),
        style("工作目录").bold()
    );
    for process in processes {
        let state = if process.running {
            style("运行中").green()
        } else {
            style("已退出").red()
        };
        println!(
            "  {:<20} {:<8} {:<8} {:<10} {}",
            process.title,
            process.pid,
            state,
            process.runtime_secs,
            process.cwd.display()
        );
    }
}

pub fn version_menu(entries: &[VersionEntry]) {
    for (index, entry) in entries.iter().enumerate() {
        let mut line = format!("{:>2}. {}", index + 1, entry.display_name);
        if entry.prerelease {
            line.push_str(" (预发布)");
        }
        if let Some(date) = &entry.published_at {
            line.push_str(&format!("  {}", date.get(..10).unwrap_or(date)));
        }
        println!("  {}", line);
        if !entry.description.is_empty() {
            println!("      {}", style(&entry.description).dim());
        }
    }
}

pub fn deploy_event(event: &DeployEvent) {
    match event {
        DeployEvent::StepStarted { step } => info(&format!("{}...", step)),
        DeployEvent::StepFinished { step, detail } => success(&format!("{}: {}", step, detail)),
        DeployEvent::StepSkipped { step, reason } => {
            println!("  {} {} ({})", style("→").dim(), step, style(reason).dim())
        }
        DeployEvent::Warning { step, message } => warning(&format!("{}: {}", step, message)),
        DeployEvent::Download { step, progress } => {
            println!("  {} {} {}", style("↓").dim(), step, style(progress.summary()).dim())
        }
        DeployEvent::Completed { success: ok } => {
            if *ok {
                success("部署完成");
            } else {
                error("部署失败");
            }
        }
    }
}
