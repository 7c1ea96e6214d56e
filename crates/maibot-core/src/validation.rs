//! Path, version and instance validators.
//!
//! Validators return plain messages rather than [`LauncherError`](crate::LauncherError)
//! so menus can list every problem at once.

use crate::config::AppConfig;
use crate::models::InstanceConfig;
use crate::version;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

/// True if the string contains CJK unified ideographs.
pub fn contains_cjk(s: &str) -> bool {
    s.chars().any(|c| ('\u{4e00}'..='\u{9fff}').contains(&c))
}

/// Validate a directory path and optionally a file that must exist inside it.
pub fn validate_path(path: &str, check_file: Option<&str>) -> Result<(), String> {
    let path = path.trim();
    if path.is_empty() {
        return Err("路径为空".to_string());
    }
    if contains_cjk(path) {
        return Err(format!("路径包含中文字符: {}", path));
    }
    let dir = Path::new(path);
    if !dir.exists() {
        return Err(format!("路径不存在: {}", path));
    }
    if let Some(file) = check_file {
        if !dir.join(file).exists() {
            return Err(format!("在路径中未找到 {}", file));
        }
    }
    Ok(())
}

/// Validate a path to a Windows executable.
pub fn validate_exe_path(path: &str) -> Result<(), String> {
    validate_path(path, None)?;
    if !path.trim().to_lowercase().ends_with(".exe") {
        return Err(format!("不是有效的可执行文件: {}", path));
    }
    Ok(())
}

fn version_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[vV]?\d+\.\d+\.\d+(-[0-9A-Za-z.\-]+)?$").expect("version pattern is valid")
    })
}

/// Accepts `x.y.z` with optional `v` prefix and `-suffix`, or `classical`.
pub fn validate_version_string(version: &str) -> Result<(), String> {
    let version = version.trim();
    if version.eq_ignore_ascii_case("classical") || version_regex().is_match(version) {
        Ok(())
    } else {
        Err(format!("版本号格式无效: {} (应为 x.y.z)", version))
    }
}

/// QQ accounts are non-empty digit strings.
pub fn validate_qq_account(account: &str) -> Result<(), String> {
    let account = account.trim();
    if account.is_empty() {
        return Err("QQ号不能为空".to_string());
    }
    if !account.chars().all(|c| c.is_ascii_digit()) {
        return Err(format!("QQ号只能包含数字: {}", account));
    }
    Ok(())
}

/// Collect every problem that would stop an instance from launching.
pub fn validate_instance(instance: &InstanceConfig) -> Vec<String> {
    let mut errors = Vec::new();

    if let Err(e) = validate_path(&instance.mai_path, Some("bot.py")) {
        errors.push(format!("麦麦本体路径: {}", e));
    }

    if version::is_legacy_version(&instance.version_path) {
        let launcher_script = if cfg!(windows) { "run.bat" } else { "run.sh" };
        let mai = instance.mai_dir();
        if !instance.mai_path.is_empty()
            && mai.exists()
            && !mai.join(launcher_script).exists()
            && !mai.join("bot.py").exists()
        {
            errors.push(format!("旧版本缺少启动脚本 {}", launcher_script));
        }
    } else if instance.adapter_path.trim().is_empty()
        || instance.adapter_path == AppConfig::NO_ADAPTER_SENTINEL
    {
        errors.push("适配器路径: 新版本需要配置适配器".to_string());
    } else if let Err(e) = validate_path(&instance.adapter_path, Some("main.py")) {
        errors.push(format!("适配器路径: {}", e));
    }

    if !instance.napcat_path.trim().is_empty() {
        let check = if cfg!(windows) {
            validate_exe_path(&instance.napcat_path)
        } else {
            validate_path(&instance.napcat_path, None)
        };
        if let Err(e) = check {
            errors.push(format!("NapCat路径: {}", e));
        }
    }

    errors
}
