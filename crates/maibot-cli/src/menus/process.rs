use super::App;
use crate::prompt::Prompt;
use crate::ui;
use anyhow::Result;

pub(super) async fn run(app: &mut App, prompt: &mut dyn Prompt) -> Result<()> {
    let processes = app.launcher.processes().clone();
    loop {
        ui::header("运行状态");
        ui::process_table(&processes.running());
        ui::option('A', "刷新");
        ui::option('B', "停止全部进程");
        ui::option('Q', "返回上级");

        match prompt.choice("请输入选项", &['A', 'B', 'Q'])? {
            'A' => {
                let pruned = processes.prune();
                if pruned > 0 {
                    ui::info(&format!("已清理 {} 个已退出的进程", pruned));
                }
            }
            'B' => {
                if processes.is_empty() {
                    ui::info("没有需要停止的进程");
                } else if prompt.confirm("确认停止全部进程?", false)? {
                    let stopped = processes.stop_all();
                    ui::success(&format!("已停止 {} 个进程", stopped));
                }
            }
            _ => return Ok(()),
        }
    }
}
