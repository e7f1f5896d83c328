//! 动作模块
//!
//! 状态迁移时执行的通知/补救动作：日志、webhook 和命令执行

pub mod dispatcher;
pub mod exec;
pub mod log;
pub mod template;
pub mod webhook;

pub use dispatcher::{ActionDispatcher, ActionOutcome, ActionResult};
pub use exec::ExecAction;
pub use log::LogAction;
pub use template::TemplateRenderer;
pub use webhook::WebhookAction;

use crate::config::ActionConfig;
use crate::error::{ConfigError, DispatchError};
use crate::health::result::TransitionEvent;
use async_trait::async_trait;
use std::sync::Arc;

/// 动作发送器trait
#[async_trait]
pub trait ActionSender: Send + Sync {
    /// 动作类型名称
    fn kind(&self) -> &'static str;

    /// 执行动作
    ///
    /// # 参数
    /// * `event` - 迁移事件
    ///
    /// # 返回
    /// * `Result<(), DispatchError>` - 执行结果
    async fn send(&self, event: &TransitionEvent) -> Result<(), DispatchError>;
}

/// 根据配置构建动作实例
#[derive(Clone)]
pub struct ActionFactory {
    client: reqwest::Client,
    renderer: Arc<TemplateRenderer>,
}

impl ActionFactory {
    /// 创建动作工厂
    pub fn new() -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .user_agent(format!("{}/{}", crate::APP_NAME, crate::VERSION))
            .build()
            .map_err(|e| ConfigError::ValidationError(format!("无法创建HTTP客户端: {}", e)))?;
        let renderer = TemplateRenderer::new()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        Ok(Self {
            client,
            renderer: Arc::new(renderer),
        })
    }

    /// 构建单个动作
    pub fn build(&self, config: &ActionConfig) -> Result<Arc<dyn ActionSender>, ConfigError> {
        let action: Arc<dyn ActionSender> = match config {
            ActionConfig::Log(log) => Arc::new(LogAction::new(log, self.renderer.clone())?),
            ActionConfig::Webhook(webhook) => Arc::new(WebhookAction::new(
                self.client.clone(),
                webhook.clone(),
                self.renderer.clone(),
            )),
            ActionConfig::Exec(exec) => Arc::new(ExecAction::new(exec.clone())),
        };
        Ok(action)
    }

    /// 构建动作列表
    pub fn build_all(
        &self,
        configs: &[ActionConfig],
    ) -> Result<Vec<Arc<dyn ActionSender>>, ConfigError> {
        configs.iter().map(|config| self.build(config)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExecActionConfig, LogActionConfig};
    use std::collections::HashMap;

    #[test]
    fn test_factory_builds_each_kind() {
        let factory = ActionFactory::new().unwrap();
        let actions = factory
            .build_all(&[
                ActionConfig::Log(LogActionConfig::default()),
                ActionConfig::Exec(ExecActionConfig {
                    command: "true".to_string(),
                    args: vec![],
                    env: HashMap::new(),
                    timeout_seconds: 5,
                }),
            ])
            .unwrap();

        let kinds: Vec<_> = actions.iter().map(|a| a.kind()).collect();
        assert_eq!(kinds, vec!["log", "exec"]);
    }

    #[test]
    fn test_factory_rejects_invalid_log_level() {
        let factory = ActionFactory::new().unwrap();
        let result = factory.build(&ActionConfig::Log(LogActionConfig {
            level: Some("loud".to_string()),
            template: None,
        }));
        assert!(result.is_err());
    }
}
