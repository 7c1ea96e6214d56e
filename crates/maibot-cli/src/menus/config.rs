//! Creating, editing, validating and deleting instance records.

use super::{ask_dir, ask_identity, ask_valid, select_instance, settle, App};
use crate::editor;
use crate::prompt::Prompt;
use crate::ui;
use anyhow::Result;
use maibot_core::config::AppConfig;
use maibot_core::{detection, platform, validation, version};
use maibot_core::{InstallOptions, InstanceConfig};
use std::path::{Path, PathBuf};
use tracing::info;

pub(super) async fn run(app: &mut App, prompt: &mut dyn Prompt) -> Result<()> {
    loop {
        ui::header("配置管理");
        ui::section("配置新建");
        ui::option('A', "自动检索麦麦");
        ui::option('B', "手动配置");
        ui::section("配置管理");
        ui::option('C', "配置管理（查看/编辑/删除配置）");
        ui::section("返回");
        ui::option('Q', "返回上级");

        let result = match prompt.choice("请输入选项", &['A', 'B', 'C', 'Q'])? {
            'A' => auto_create(app, prompt),
            'B' => manual_create(app, prompt),
            'C' => manage(app, prompt).await,
            _ => return Ok(()),
        };
        settle(result)?;
    }
}

fn search_roots() -> Vec<PathBuf> {
    let mut roots = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        if let Some(parent) = cwd.parent() {
            roots.push(parent.to_path_buf());
        }
        roots.push(cwd);
    }
    if let Some(home) = dirs::home_dir() {
        roots.push(home);
    }
    roots
}

fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn ask_version(prompt: &mut dyn Prompt, detected: Option<&str>) -> Result<String> {
    ask_valid(prompt, "麦麦版本号（如 0.7.0、classical、main）", detected, |answer| {
        if answer == "main" || answer == "dev" {
            Ok(())
        } else {
            validation::validate_version_string(answer)
        }
    })
}

fn ask_napcat(prompt: &mut dyn Prompt) -> Result<String> {
    ask_valid(prompt, "NapCat 路径（NapCatWinBootMain.exe，可留空）", Some(""), |answer| {
        if answer.is_empty() {
            Ok(())
        } else if cfg!(windows) {
            validation::validate_exe_path(answer)
        } else {
            validation::validate_path(answer, None)
        }
    })
}

/// Adapter path for `version`, or the no-adapter marker for legacy versions.
fn adapter_for(prompt: &mut dyn Prompt, version: &str, mai_dir: Option<&Path>) -> Result<String> {
    if version::is_legacy_version(version) {
        return Ok(AppConfig::NO_ADAPTER_SENTINEL.to_string());
    }
    if let Some(found) = mai_dir.and_then(detection::detect_adapter_path) {
        ui::success(&format!("检测到适配器: {}", found.display()));
        if prompt.confirm("使用该适配器?", true)? {
            return Ok(display(&found));
        }
    }
    ask_dir(prompt, "适配器路径（包含 main.py）", Some("main.py"), false)
}

fn mongodb_for(prompt: &mut dyn Prompt, version: &str, roots: &[PathBuf]) -> Result<String> {
    if !version::needs_mongodb(version) {
        return Ok(String::new());
    }
    if let Some(found) = detection::detect_mongodb_path(roots) {
        ui::success(&format!("检测到 MongoDB: {}", found.display()));
        if prompt.confirm("使用该 MongoDB?", true)? {
            return Ok(display(&found));
        }
    }
    ask_dir(prompt, "MongoDB 路径（可留空，使用系统服务）", None, true)
}

fn save_new(app: &mut App, instance: InstanceConfig) -> Result<()> {
    let name = format!("instance_{}", instance.serial_number);
    let absolute = app.store.add(&name, instance)?;
    app.store.set_current(&name)?;
    app.store.save()?;
    info!("Created config {} (absolute serial {})", name, absolute);
    ui::success(&format!("已创建配置集 {}", name));
    Ok(())
}

fn auto_create(app: &mut App, prompt: &mut dyn Prompt) -> Result<()> {
    ui::header("自动检索麦麦");
    let roots = search_roots();
    let Some(mai_dir) = detection::detect_mai_path(&roots) else {
        ui::warning("未找到麦麦本体（包含 bot.py 的目录），请使用手动配置");
        return Ok(());
    };
    ui::success(&format!("检测到麦麦本体: {}", mai_dir.display()));
    if !prompt.confirm("使用该目录?", true)? {
        return Ok(());
    }

    let detected = version::detect_version_from_files(&mai_dir);
    if let Some(v) = &detected {
        ui::info(&format!("检测到版本 {}", v));
    }
    let version = ask_version(prompt, detected.as_deref())?;
    let adapter = adapter_for(prompt, &version, Some(&mai_dir))?;

    let napcat = match detection::detect_napcat_path(&roots) {
        Some(found) => {
            ui::success(&format!("检测到 NapCat: {}", found.display()));
            if prompt.confirm("使用该 NapCat?", true)? {
                display(&found)
            } else {
                ask_napcat(prompt)?
            }
        }
        None => ask_napcat(prompt)?,
    };
    let mongodb = mongodb_for(prompt, &version, &roots)?;
    let (serial, nickname, qq) = ask_identity(app, prompt, false)?;

    let mut instance = InstanceConfig::new(serial, version);
    instance.nickname_path = nickname;
    instance.qq_account = qq;
    instance.mai_path = display(&mai_dir);
    instance.install_options = options_for(&adapter, &napcat, &mongodb, "");
    instance.adapter_path = adapter;
    instance.napcat_path = napcat;
    instance.mongodb_path = mongodb;
    save_new(app, instance)
}

fn manual_create(app: &mut App, prompt: &mut dyn Prompt) -> Result<()> {
    ui::header("手动配置");
    let version = ask_version(prompt, None)?;
    let mai = ask_dir(prompt, "麦麦本体路径（包含 bot.py）", Some("bot.py"), false)?;
    let adapter = adapter_for(prompt, &version, None)?;
    let napcat = ask_napcat(prompt)?;
    let mongodb = if version::needs_mongodb(&version) {
        ask_dir(prompt, "MongoDB 路径（可留空，使用系统服务）", None, true)?
    } else {
        String::new()
    };
    let webui = ask_dir(prompt, "WebUI 路径（可留空）", None, true)?;
    let (serial, nickname, qq) = ask_identity(app, prompt, false)?;

    let mut instance = InstanceConfig::new(serial, version);
    instance.nickname_path = nickname;
    instance.qq_account = qq;
    instance.mai_path = mai;
    instance.install_options = options_for(&adapter, &napcat, &mongodb, &webui);
    instance.adapter_path = adapter;
    instance.napcat_path = napcat;
    instance.mongodb_path = mongodb;
    instance.webui_path = webui;
    save_new(app, instance)
}

/// Components recorded for a hand-made record: whatever has a path.
fn options_for(adapter: &str, napcat: &str, mongodb: &str, webui: &str) -> InstallOptions {
    InstallOptions {
        install_adapter: !adapter.is_empty() && adapter != AppConfig::NO_ADAPTER_SENTINEL,
        install_napcat: !napcat.is_empty(),
        install_mongodb: !mongodb.is_empty(),
        install_webui: !webui.is_empty(),
    }
}

async fn manage(app: &mut App, prompt: &mut dyn Prompt) -> Result<()> {
    loop {
        ui::header("配置管理");
        ui::instance_table(&app.store);
        ui::section("配置操作");
        ui::option('A', "查看配置详情");
        ui::option('B', "直接编辑配置");
        ui::option('C', "可视化编辑配置");
        ui::option('D', "验证配置");
        ui::option('E', "新建配置集");
        ui::option('F', "删除配置集");
        ui::section("返回");
        ui::option('Q', "返回上级");

        let result = match prompt.choice("请输入选项", &['A', 'B', 'C', 'D', 'E', 'F', 'Q'])? {
            'A' => show_details(app, prompt),
            'B' => edit(app, prompt),
            'C' => visual_edit(app, prompt, DESKTOP).await,
            'D' => validate_all(app, prompt),
            'E' => manual_create(app, prompt),
            'F' => delete(app, prompt),
            _ => return Ok(()),
        };
        settle(result)?;
    }
}

fn show_details(app: &mut App, prompt: &mut dyn Prompt) -> Result<()> {
    if let Some(name) = select_instance(app, prompt)? {
        ui::instance_details(&name, &app.find(&name)?);
        prompt.pause()?;
    }
    Ok(())
}

/// Fields offered by the editor, with their validation.
#[derive(Clone, Copy)]
enum Field {
    Version,
    Nickname,
    Mai,
    Adapter,
    NapCat,
    MongoDb,
    WebUi,
    Qq,
}

impl Field {
    const ALL: [Field; 8] = [
        Field::Version,
        Field::Nickname,
        Field::Mai,
        Field::Adapter,
        Field::NapCat,
        Field::MongoDb,
        Field::WebUi,
        Field::Qq,
    ];

    fn label(self) -> &'static str {
        match self {
            Field::Version => "版本号",
            Field::Nickname => "昵称",
            Field::Mai => "麦麦本体路径",
            Field::Adapter => "适配器路径",
            Field::NapCat => "NapCat 路径",
            Field::MongoDb => "MongoDB 路径",
            Field::WebUi => "WebUI 路径",
            Field::Qq => "QQ 账号",
        }
    }

    fn slot(self, instance: &mut InstanceConfig) -> &mut String {
        match self {
            Field::Version => &mut instance.version_path,
            Field::Nickname => &mut instance.nickname_path,
            Field::Mai => &mut instance.mai_path,
            Field::Adapter => &mut instance.adapter_path,
            Field::NapCat => &mut instance.napcat_path,
            Field::MongoDb => &mut instance.mongodb_path,
            Field::WebUi => &mut instance.webui_path,
            Field::Qq => &mut instance.qq_account,
        }
    }

    fn ask(self, prompt: &mut dyn Prompt, instance: &InstanceConfig) -> Result<String> {
        let label = format!("新的{}", self.label());
        match self {
            Field::Version => ask_version(prompt, None),
            Field::Nickname => ask_valid(prompt, &label, None, |a| {
                if a.is_empty() {
                    Err("昵称不能为空".to_string())
                } else {
                    Ok(())
                }
            }),
            Field::Mai => ask_dir(prompt, &label, Some("bot.py"), false),
            Field::Adapter => adapter_for(prompt, &instance.version_path, None),
            Field::NapCat => ask_napcat(prompt),
            Field::MongoDb => ask_dir(prompt, &label, None, true),
            Field::WebUi => ask_dir(prompt, &label, None, true),
            Field::Qq => ask_valid(prompt, &label, None, validation::validate_qq_account),
        }
    }
}

fn edit(app: &mut App, prompt: &mut dyn Prompt) -> Result<()> {
    let Some(name) = select_instance(app, prompt)? else {
        return Ok(());
    };
    let mut instance = app.find(&name)?;
    ui::instance_details(&name, &instance);

    let mut changed = false;
    for field in Field::ALL {
        let current = field.slot(&mut instance).clone();
        let shown = if current.is_empty() { "未配置" } else { current.as_str() };
        if !prompt.confirm(&format!("修改{}（当前: {}）?", field.label(), shown), false)? {
            continue;
        }
        let value = field.ask(prompt, &instance)?;
        *field.slot(&mut instance) = value;
        changed = true;
    }

    if !changed {
        ui::info("未做任何修改");
        return Ok(());
    }
    let adapter = instance.adapter_path.clone();
    instance.install_options.install_adapter =
        !adapter.is_empty() && adapter != AppConfig::NO_ADAPTER_SENTINEL;
    app.store.update(&name, instance)?;
    app.store.save()?;
    ui::success(&format!("配置集 {} 已保存", name));
    Ok(())
}

/// How visual edit hands the store file to the user.
#[derive(Clone, Copy)]
struct Openers {
    file: fn(&Path) -> std::io::Result<()>,
    url: fn(&str) -> std::io::Result<()>,
}

const DESKTOP: Openers = Openers {
    file: platform::open_in_editor,
    url: platform::open_url,
};

/// Edit `config.toml` outside the menus, then reload it.
///
/// The file on disk is never written here. An unreadable file can only be
/// fixed in a text editor since the web editor refuses to touch it.
async fn visual_edit(app: &mut App, prompt: &mut dyn Prompt, openers: Openers) -> Result<()> {
    let path = app.store.path().to_path_buf();

    if let Some(message) = app.store.load_error() {
        ui::warning(&format!("配置文件无法解析，请在文本编辑器中修复: {}", message));
        text_edit(&path, prompt, openers)?;
    } else {
        ui::section("编辑方式");
        ui::option('A', "网页编辑器");
        ui::option('B', "文本编辑器");
        ui::option('Q', "返回上级");
        match prompt.choice("请输入选项", &['A', 'B', 'Q'])? {
            'A' => web_edit(&path, prompt, openers).await?,
            'B' => text_edit(&path, prompt, openers)?,
            _ => return Ok(()),
        }
    }

    app.store = app.launcher.load_store()?;
    match app.store.load_error() {
        Some(message) => ui::error(&format!(
            "配置文件解析失败，修复前不会保存任何修改: {}",
            message
        )),
        None => ui::success("配置已重新加载"),
    }
    Ok(())
}

fn text_edit(path: &Path, prompt: &mut dyn Prompt, openers: Openers) -> Result<()> {
    (openers.file)(path)?;
    ui::info(&format!("已在编辑器中打开 {}，保存后回到此处", path.display()));
    prompt.pause()
}

async fn web_edit(path: &Path, prompt: &mut dyn Prompt, openers: Openers) -> Result<()> {
    let server = editor::start_editor(path).await?;
    let url = server.url();
    info!("Visual edit through the web editor on {}", server.addr());
    if let Err(e) = (openers.url)(&url) {
        info!("Could not open browser: {}", e);
        ui::warning("无法自动打开浏览器，请手动访问下方地址");
    }
    ui::info(&format!("网页编辑器已启动: {}，编辑完成后回到此处", url));
    let paused = prompt.pause();
    server.stop().await;
    paused
}

fn validate_all(app: &mut App, prompt: &mut dyn Prompt) -> Result<()> {
    ui::header("验证配置");
    for (name, instance) in app.store.iter() {
        let problems = validation::validate_instance(instance);
        if problems.is_empty() {
            ui::success(&format!("{} ({}) 配置正确", name, instance.label()));
        } else {
            ui::error(&format!("{} ({}) 存在问题:", name, instance.label()));
            for problem in &problems {
                ui::bullet(problem);
            }
        }
    }
    prompt.pause()?;
    Ok(())
}

fn delete(app: &mut App, prompt: &mut dyn Prompt) -> Result<()> {
    ui::instance_table(&app.store);
    let answer = prompt.input("要删除的序列号（多个用逗号分隔，Q 返回）", None)?;
    if answer.eq_ignore_ascii_case("q") || answer.is_empty() {
        return Ok(());
    }
    let serials: Vec<String> = answer
        .split([',', '，'])
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    let unknown: Vec<&String> = serials
        .iter()
        .filter(|s| app.store.find_by_serial(s).is_none())
        .collect();
    for serial in &unknown {
        ui::warning(&format!("未找到序列号 {}", serial));
    }
    if unknown.len() == serials.len() {
        return Ok(());
    }

    ui::warning("只删除配置记录，不会删除实例文件");
    if !prompt.confirm("确认删除?", false)? {
        ui::info("已取消");
        return Ok(());
    }
    let removed = app.store.remove_by_serials(&serials);
    app.store.save()?;
    ui::success(&format!("已删除 {} 个配置集: {}", removed.len(), removed.join(", ")));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::testing::app_in;
    use super::*;
    use crate::prompt::scripted::ScriptedPrompt;
    use maibot_core::ConfigStore;
    use std::fs;
    use tempfile::TempDir;

    fn bot_dir(root: &Path) -> PathBuf {
        let mai = root.join("bots").join("MaiBot");
        fs::create_dir_all(&mai).unwrap();
        fs::write(mai.join("bot.py"), "").unwrap();
        mai
    }

    #[test]
    fn test_manual_create_legacy_instance() {
        let tmp = TempDir::new().unwrap();
        let mut app = app_in(tmp.path());
        let mai = bot_dir(tmp.path());
        let mai = display(&mai);

        let mut prompt = ScriptedPrompt::new([
            "0.5.13",       // version
            "/missing/dir", // rejected path
            mai.as_str(),
            "", // napcat
            "", // mongodb
            "", // webui
            "", // serial -> suggested 2
            "旧麦麦",
            "",
        ]);
        manual_create(&mut app, &mut prompt).unwrap();

        let reloaded = ConfigStore::load(tmp.path().join("config.toml")).unwrap();
        let instance = reloaded.get("instance_2").unwrap();
        assert_eq!(reloaded.current_name(), "instance_2");
        assert_eq!(instance.version_path, "0.5.13");
        assert_eq!(instance.mai_path, mai);
        assert!(instance.has_no_adapter_marker());
        assert!(!instance.install_options.install_adapter);
    }

    #[test]
    fn test_edit_changes_only_confirmed_fields() {
        let tmp = TempDir::new().unwrap();
        let mut app = app_in(tmp.path());

        let mut answers = vec!["1".to_string()];
        // Version: no. Nickname: yes.
        answers.extend(["n", "y", "新名字"].map(String::from));
        // Remaining fields declined.
        answers.extend(std::iter::repeat("n".to_string()).take(Field::ALL.len() - 2));
        let mut prompt = ScriptedPrompt::new(answers);
        edit(&mut app, &mut prompt).unwrap();

        let reloaded = ConfigStore::load(tmp.path().join("config.toml")).unwrap();
        let instance = reloaded.get("default").unwrap();
        assert_eq!(instance.nickname_path, "新名字");
        assert_eq!(instance.version_path, AppConfig::DEFAULT_VERSION);
        assert_eq!(prompt.remaining(), 0);
    }

    #[test]
    fn test_delete_by_serials() {
        let tmp = TempDir::new().unwrap();
        let mut app = app_in(tmp.path());
        app.store
            .add("instance_2", InstanceConfig::new("2", "0.7.0"))
            .unwrap();
        app.store
            .add("instance_3", InstanceConfig::new("3", "0.7.0"))
            .unwrap();

        let mut prompt = ScriptedPrompt::new(["2，3, 42", "y"]);
        delete(&mut app, &mut prompt).unwrap();
        assert_eq!(app.store.names(), vec!["default".to_string()]);

        let mut prompt = ScriptedPrompt::new(["1", "n"]);
        delete(&mut app, &mut prompt).unwrap();
        assert!(app.store.contains("default"));
    }

    #[test]
    fn test_validate_all_pauses() {
        let tmp = TempDir::new().unwrap();
        let mut app = app_in(tmp.path());
        let mut prompt = ScriptedPrompt::new(Vec::<String>::new());
        validate_all(&mut app, &mut prompt).unwrap();
        assert_eq!(prompt.pauses, 1);
    }

    fn no_open(_: &Path) -> std::io::Result<()> {
        Ok(())
    }

    fn no_browser(_: &str) -> std::io::Result<()> {
        Ok(())
    }

    const NOTHING: Openers = Openers {
        file: no_open,
        url: no_browser,
    };

    #[tokio::test]
    async fn test_visual_edit_leaves_broken_file_alone() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join("config.toml");
        fs::write(&config_path, "configurations = 3\n").unwrap();
        let mut app = app_in(tmp.path());
        assert!(app.store.load_error().is_some());

        let mut prompt = ScriptedPrompt::new(Vec::<String>::new());
        visual_edit(&mut app, &mut prompt, NOTHING).await.unwrap();

        assert_eq!(prompt.pauses, 1);
        assert_eq!(fs::read_to_string(&config_path).unwrap(), "configurations = 3\n");
        assert!(app.store.load_error().is_some());
        assert!(app.store.save().is_err());
    }

    #[tokio::test]
    async fn test_visual_edit_picks_up_repaired_file() {
        fn repair(path: &Path) -> std::io::Result<()> {
            fs::write(
                path,
                "current_config = \"fixed\"\n\n[configurations.fixed]\nserial_number = \"5\"\n",
            )
        }

        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("config.toml"), "configurations = 3\n").unwrap();
        let mut app = app_in(tmp.path());

        let openers = Openers {
            file: repair,
            url: no_browser,
        };
        let mut prompt = ScriptedPrompt::new(Vec::<String>::new());
        visual_edit(&mut app, &mut prompt, openers).await.unwrap();

        assert!(app.store.load_error().is_none());
        assert_eq!(app.store.current_name(), "fixed");
        assert!(app.store.find_by_serial("5").is_some());
    }

    #[tokio::test]
    async fn test_text_edit_does_not_rewrite_file() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join("config.toml");
        let mut app = app_in(tmp.path());
        app.store
            .add("unsaved", InstanceConfig::new("9", "0.7.0"))
            .unwrap();
        let before = fs::read_to_string(&config_path).unwrap();

        let mut prompt = ScriptedPrompt::new(["b"]);
        visual_edit(&mut app, &mut prompt, NOTHING).await.unwrap();

        assert_eq!(fs::read_to_string(&config_path).unwrap(), before);
        assert!(!app.store.contains("unsaved"));
    }

    #[tokio::test]
    async fn test_web_edit_runs_editor_until_pause() {
        static OPENED: std::sync::Mutex<Vec<String>> = std::sync::Mutex::new(Vec::new());
        fn record(url: &str) -> std::io::Result<()> {
            OPENED.lock().unwrap().push(url.to_string());
            Ok(())
        }

        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join(".config_UI.json"),
            r#"{"ui_settings":{"port":0}}"#,
        )
        .unwrap();
        let mut app = app_in(tmp.path());

        let openers = Openers {
            file: no_open,
            url: record,
        };
        let mut prompt = ScriptedPrompt::new(["a"]);
        visual_edit(&mut app, &mut prompt, openers).await.unwrap();

        assert_eq!(prompt.pauses, 1);
        let opened = OPENED.lock().unwrap();
        assert_eq!(opened.len(), 1);
        assert!(opened[0].starts_with("http://127.0.0.1:"));
        assert!(app.store.contains("default"));
    }

    #[test]
    fn test_options_for() {
        let options = options_for(AppConfig::NO_ADAPTER_SENTINEL, "", "/db", "");
        assert!(!options.install_adapter);
        assert!(options.install_mongodb);
        assert_eq!(options.selected_count(), 1);
    }
}
