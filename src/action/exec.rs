//! 命令执行动作
//!
//! 以环境变量传递迁移事件字段，超时后终止子进程

use crate::action::ActionSender;
use crate::config::ExecActionConfig;
use crate::error::DispatchError;
use crate::health::result::TransitionEvent;
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// 命令执行动作实现
pub struct ExecAction {
    config: ExecActionConfig,
}

impl ExecAction {
    pub fn new(config: ExecActionConfig) -> Self {
        Self { config }
    }

    /// 事件字段对应的环境变量
    pub fn event_env(event: &TransitionEvent) -> Vec<(&'static str, String)> {
        vec![
            ("WATCHDOG_TARGET", event.target.clone()),
            ("WATCHDOG_PREVIOUS_STATE", event.previous_label().to_string()),
            ("WATCHDOG_NEW_STATE", event.current.as_str().to_string()),
            ("WATCHDOG_TIMESTAMP", event.timestamp.to_rfc3339()),
            ("WATCHDOG_OUTCOME", event.trigger.outcome.to_string()),
            (
                "WATCHDOG_MESSAGE",
                event.trigger.message.clone().unwrap_or_default(),
            ),
            ("WATCHDOG_EVENT_ID", event.id.to_string()),
        ]
    }
}

#[async_trait]
impl ActionSender for ExecAction {
    fn kind(&self) -> &'static str {
        "exec"
    }

    async fn send(&self, event: &TransitionEvent) -> Result<(), DispatchError> {
        let mut command = Command::new(&self.config.command);
        command
            .args(&self.config.args)
            .envs(&self.config.env)
            .envs(Self::event_env(event))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("执行命令: {} {:?}", self.config.command, self.config.args);
        let child = command.spawn()?;

        // 超时后 child 随 future 一起被丢弃，kill_on_drop 负责终止进程
        let output = tokio::time::timeout(
            Duration::from_secs(self.config.timeout_seconds),
            child.wait_with_output(),
        )
        .await
        .map_err(|_| DispatchError::Timeout(self.config.timeout_seconds))??;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!(
            "命令退出码非零: {} ({:?}) {}",
            self.config.command,
            output.status.code(),
            stderr.trim()
        );
        Err(DispatchError::CommandFailed {
            command: self.config.command.clone(),
            code: output.status.code(),
        })
    }
}
