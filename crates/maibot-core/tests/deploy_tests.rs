//! End-to-end deployment lifecycle against local archive fixtures.

use maibot_core::deploy::archive::{extract_archive, single_root_dir};
use maibot_core::deploy::versions::offline_versions;
use maibot_core::deploy::{
    confirmation_token, delete_instance, DeployEvent, DeployPlan, Deployer, NoHooks, ProgressSink,
    Updater, VersionEntry, VersionKind,
};
use maibot_core::{ConfigStore, DownloadManager, InstallOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::mpsc;
use zip::write::SimpleFileOptions;

fn release(name: &str) -> VersionEntry {
    VersionEntry {
        kind: VersionKind::Release,
        name: name.to_string(),
        display_name: format!("MaiBot {}", name),
        description: String::new(),
        published_at: Some("2025-06-01T00:00:00Z".to_string()),
        prerelease: false,
        download_url: format!("https://example.invalid/{}.zip", name),
        changelog: String::new(),
        size: None,
    }
}

/// A GitHub-style zipball with a single `MaiBot-{version}/` root.
fn write_bot_zip(path: &Path, version: &str) {
    let root = format!("MaiBot-{}", version);
    let file = std::fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default();

    let files = [
        ("bot.py".to_string(), format!("__version__ = \"{}\"\n", version)),
        ("requirements.txt".to_string(), String::new()),
        ("template/bot_config_template.toml".to_string(), "[bot]\nqq = 0\n".to_string()),
        ("template/template.env".to_string(), "HOST=127.0.0.1\nPORT=8080\n".to_string()),
        (format!("src/v{}.py", version.replace('.', "_")), String::new()),
    ];
    for (name, body) in &files {
        zip.start_file(format!("{}/{}", root, name), options).unwrap();
        zip.write_all(body.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
}

fn unpack(temp: &Path, version: &str) -> PathBuf {
    let archive = temp.join(format!("{}.zip", version));
    write_bot_zip(&archive, version);
    let dest = temp.join(format!("extract-{}", version));
    extract_archive(&archive, &dest).unwrap();
    single_root_dir(&dest).unwrap()
}

fn plan(base: &Path, version: &str) -> DeployPlan {
    let mut plan = DeployPlan::new(release(version), base, "3", "lifecycle", "10086");
    plan.options = InstallOptions::default();
    plan.napcat_version = None;
    plan.setup_python = false;
    plan
}

#[tokio::test]
async fn test_deploy_update_delete_lifecycle() {
    let temp = TempDir::new().unwrap();
    let downloads = Arc::new(DownloadManager::new().unwrap());
    let mut store = ConfigStore::load(temp.path().join("config.toml")).unwrap();
    let base = temp.path().join("instances");

    // deploy 0.8.0
    let source = unpack(temp.path(), "0.8.0");
    let (tx, mut rx) = mpsc::channel(64);
    let sink = ProgressSink::new(Some(tx));
    let plan = plan(&base, "0.8.0");
    let outcome = Deployer::new(downloads.clone())
        .deploy_from_source(&plan, &source, &mut store, &sink, &mut NoHooks)
        .await
        .unwrap();
    drop(sink);

    let mai = base.join("lifecycle").join("MaiBot");
    assert_eq!(outcome.instance.mai_path, mai.display().to_string());
    assert!(mai.join("src/v0_8_0.py").exists());
    assert!(mai.join("config/bot_config.toml").exists());
    assert_eq!(store.current_name(), "instance_3");

    let mut started = Vec::new();
    while let Some(event) = rx.recv().await {
        if let DeployEvent::StepStarted { step } = event {
            started.push(step.to_string());
        }
    }
    // nothing optional was selected, so only the local steps start
    assert_eq!(started, ["生成配置文件", "保存实例配置"]);

    // a second deploy into the same dir is refused
    assert!(!plan.validate(&store).is_empty());

    // user edits survive an update
    std::fs::write(mai.join("config/bot_config.toml"), "[bot]\nqq = 10086\n").unwrap();
    let source = unpack(temp.path(), "0.9.0");
    let report = Updater::new(downloads.clone())
        .without_requirements()
        .update_from_source(&mut store, "instance_3", "0.9.0", &source)
        .await
        .unwrap();

    assert_eq!(report.previous_version, "0.8.0");
    assert!(mai.join("src/v0_9_0.py").exists());
    assert!(!mai.join("src/v0_8_0.py").exists());
    assert_eq!(
        std::fs::read_to_string(mai.join("config/bot_config.toml")).unwrap(),
        "[bot]\nqq = 10086\n"
    );
    assert!(report.backup_dir.join("src/v0_8_0.py").exists());
    let reloaded = ConfigStore::load(store.path()).unwrap();
    assert_eq!(reloaded.get("instance_3").unwrap().version_path, "0.9.0");

    // delete with files
    assert_eq!(confirmation_token("3"), "delete-3");
    let removal = delete_instance(&mut store, "instance_3", true).unwrap();
    assert_eq!(removal.deleted_dir, Some(base.join("lifecycle")));
    assert!(!base.join("lifecycle").exists());
    assert!(!store.contains("instance_3"));
}

#[test]
fn test_offline_catalogue_has_supported_branches() {
    let entries = offline_versions();
    let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, ["main", "dev"]);
    assert!(entries.iter().all(|e| e.kind == VersionKind::Offline));
}
