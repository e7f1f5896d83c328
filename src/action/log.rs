//! 日志动作
//!
//! 以 `watchdog::transition` 为 target 写入一条结构化 tracing 记录，
//! JSON 日志模式下即为机器可读的迁移记录。

use crate::action::{ActionSender, TemplateRenderer};
use crate::config::LogActionConfig;
use crate::error::{ConfigError, DispatchError};
use crate::health::result::TransitionEvent;
use async_trait::async_trait;
use std::str::FromStr;
use std::sync::Arc;
use tracing::Level;

/// 迁移日志的 tracing target
pub const TRANSITION_LOG_TARGET: &str = "watchdog::transition";

/// 日志动作实现
pub struct LogAction {
    level: Option<Level>,
    template: Option<String>,
    renderer: Arc<TemplateRenderer>,
}

impl LogAction {
    /// 创建日志动作
    pub fn new(
        config: &LogActionConfig,
        renderer: Arc<TemplateRenderer>,
    ) -> Result<Self, ConfigError> {
        let level = config
            .level
            .as_deref()
            .map(|l| {
                Level::from_str(l)
                    .map_err(|_| ConfigError::ValidationError(format!("无效的日志级别: {}", l)))
            })
            .transpose()?;

        Ok(Self {
            level,
            template: config.template.clone(),
            renderer,
        })
    }

    /// 实际使用的日志级别：未配置时降级/故障用 warn，恢复用 info
    fn effective_level(&self, event: &TransitionEvent) -> Level {
        self.level.unwrap_or(if event.is_recovery() {
            Level::INFO
        } else {
            Level::WARN
        })
    }
}

macro_rules! emit_transition {
    ($level:ident, $event:expr, $text:expr) => {
        tracing::$level!(
            target: TRANSITION_LOG_TARGET,
            event_id = %$event.id,
            target_name = %$event.target,
            previous = $event.previous_label(),
            current = $event.current.as_str(),
            outcome = %$event.trigger.outcome,
            latency_ms = $event.trigger.latency_ms(),
            "{}",
            $text
        )
    };
}

#[async_trait]
impl ActionSender for LogAction {
    fn kind(&self) -> &'static str {
        "log"
    }

    async fn send(&self, event: &TransitionEvent) -> Result<(), DispatchError> {
        let text = match &self.template {
            Some(template) => self.renderer.render(event, Some(template))?,
            None => format!(
                "{} 状态变化: {} → {}{}",
                event.target,
                event.previous_label(),
                event.current.as_str(),
                event
                    .trigger
                    .message
                    .as_deref()
                    .map(|m| format!(" ({})", m))
                    .unwrap_or_default()
            ),
        };

        let level = self.effective_level(event);
        if level == Level::ERROR {
            emit_transition!(error, event, text);
        } else if level == Level::WARN {
            emit_transition!(warn, event, text);
        } else if level == Level::INFO {
            emit_transition!(info, event, text);
        } else if level == Level::DEBUG {
            emit_transition!(debug, event, text);
        } else {
            emit_transition!(trace, event, text);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::result::{HealthState, ProbeResult};

    fn renderer() -> Arc<TemplateRenderer> {
        Arc::new(TemplateRenderer::new().unwrap())
    }

    #[test]
    fn test_default_levels() {
        let action = LogAction::new(&LogActionConfig::default(), renderer()).unwrap();

        let alert = TransitionEvent::new(
            Some(HealthState::Healthy),
            HealthState::Degraded,
            ProbeResult::failure("api", "down"),
        );
        let recovery = TransitionEvent::new(
            Some(HealthState::Degraded),
            HealthState::Healthy,
            ProbeResult::success("api"),
        );

        assert_eq!(action.effective_level(&alert), Level::WARN);
        assert_eq!(action.effective_level(&recovery), Level::INFO);
    }

    #[tokio::test]
    async fn test_send_with_template() {
        let config = LogActionConfig {
            level: Some("error".to_string()),
            template: Some("{{target}} is {{current}}".to_string()),
        };
        let action = LogAction::new(&config, renderer()).unwrap();
        let event = TransitionEvent::new(None, HealthState::Failed, ProbeResult::error("db", "x"));

        assert_eq!(action.effective_level(&event), Level::ERROR);
        assert!(action.send(&event).await.is_ok());
    }
}
