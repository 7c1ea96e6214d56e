//! Deployment progress events.

use crate::network::DownloadProgress;
use std::fmt;
use tokio::sync::mpsc;

/// Stages of a deployment, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeployStep {
    Bot,
    Adapter,
    NapCat,
    MongoDb,
    WebUi,
    PythonEnv,
    Templates,
    Finalize,
}

impl fmt::Display for DeployStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeployStep::Bot => "下载 MaiBot",
            DeployStep::Adapter => "安装适配器",
            DeployStep::NapCat => "安装 NapCat",
            DeployStep::MongoDb => "安装 MongoDB",
            DeployStep::WebUi => "安装 WebUI",
            DeployStep::PythonEnv => "配置 Python 环境",
            DeployStep::Templates => "生成配置文件",
            DeployStep::Finalize => "保存实例配置",
        };
        f.write_str(name)
    }
}

/// Progress update sent through channels.
#[derive(Debug, Clone)]
pub enum DeployEvent {
    StepStarted { step: DeployStep },
    StepFinished { step: DeployStep, detail: String },
    StepSkipped { step: DeployStep, reason: String },
    /// A step failed without aborting the deployment.
    Warning { step: DeployStep, message: String },
    Download { step: DeployStep, progress: DownloadProgress },
    Completed { success: bool },
}

/// Optional event sink; sending never fails the caller.
#[derive(Clone, Default)]
pub struct ProgressSink {
    tx: Option<mpsc::Sender<DeployEvent>>,
}

impl ProgressSink {
    pub fn new(tx: Option<mpsc::Sender<DeployEvent>>) -> Self {
        Self { tx }
    }

    pub async fn emit(&self, event: DeployEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event).await;
        }
    }

    /// Forward download progress for `step` until the returned sender drops.
    pub fn download_channel(&self, step: DeployStep) -> Option<mpsc::Sender<DownloadProgress>> {
        let events = self.tx.clone()?;
        let (tx, mut rx) = mpsc::channel::<DownloadProgress>(16);
        tokio::spawn(async move {
            while let Some(progress) = rx.recv().await {
                if events.send(DeployEvent::Download { step, progress }).await.is_err() {
                    break;
                }
            }
        });
        Some(tx)
    }
}
