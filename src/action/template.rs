//! 消息模板模块
//!
//! 使用 handlebars 渲染迁移事件的通知文本

use crate::error::DispatchError;
use crate::health::result::TransitionEvent;
use handlebars::Handlebars;
use serde_json::{json, Value};

const ALERT_TEMPLATE: &str = "alert";
const RECOVERY_TEMPLATE: &str = "recovery";

/// 默认的告警消息模板
pub fn default_alert_template() -> &'static str {
    r#"🚨 **目标告警**
- **目标名称**: {{target}}
- **状态变化**: {{previous_label}} → {{current_label}}
- **探测结果**: {{outcome}}
- **耗时**: {{latency_ms}}ms
- **检测时间**: {{timestamp}}
{{#if message}}
- **诊断信息**: {{message}}
{{/if}}"#
}

/// 默认的恢复消息模板
pub fn default_recovery_template() -> &'static str {
    r#"✅ **目标恢复**
- **目标名称**: {{target}}
- **状态变化**: {{previous_label}} → {{current_label}}
- **耗时**: {{latency_ms}}ms
- **恢复时间**: {{timestamp}}"#
}

/// 消息模板渲染器
#[derive(Debug)]
pub struct TemplateRenderer {
    registry: Handlebars<'static>,
}

impl TemplateRenderer {
    /// 创建渲染器并注册默认模板
    pub fn new() -> Result<Self, DispatchError> {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        registry
            .register_template_string(ALERT_TEMPLATE, default_alert_template())
            .map_err(|e| DispatchError::TemplateError(e.to_string()))?;
        registry
            .register_template_string(RECOVERY_TEMPLATE, default_recovery_template())
            .map_err(|e| DispatchError::TemplateError(e.to_string()))?;
        Ok(Self { registry })
    }

    /// 渲染事件消息
    ///
    /// # 参数
    /// * `event` - 迁移事件
    /// * `custom` - 自定义模板，为空时按事件类型选择默认模板
    pub fn render(
        &self,
        event: &TransitionEvent,
        custom: Option<&str>,
    ) -> Result<String, DispatchError> {
        let context = Self::context(event);
        let rendered = match custom {
            Some(template) => self.registry.render_template(template, &context),
            None if event.is_recovery() => self.registry.render(RECOVERY_TEMPLATE, &context),
            None => self.registry.render(ALERT_TEMPLATE, &context),
        };
        rendered.map_err(|e| DispatchError::TemplateError(e.to_string()))
    }

    /// 通知标题
    pub fn title(event: &TransitionEvent) -> String {
        if event.is_recovery() {
            format!("✅ 目标恢复: {}", event.target)
        } else {
            format!("🚨 目标告警: {} ({})", event.target, event.current)
        }
    }

    /// 构建模板上下文
    pub fn context(event: &TransitionEvent) -> Value {
        json!({
            "event_id": event.id.to_string(),
            "target": event.target,
            "previous": event.previous_label(),
            "current": event.current.as_str(),
            "previous_label": event.previous.map(|s| s.to_string()).unwrap_or_else(|| "未知".to_string()),
            "current_label": event.current.to_string(),
            "outcome": event.trigger.outcome.to_string(),
            "message": event.trigger.message,
            "latency_ms": event.trigger.latency_ms(),
            "timestamp": event.timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            "is_recovery": event.is_recovery(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::result::{HealthState, ProbeResult};

    #[test]
    fn test_default_alert_template() {
        let renderer = TemplateRenderer::new().unwrap();
        let event = TransitionEvent::new(
            Some(HealthState::Healthy),
            HealthState::Degraded,
            ProbeResult::failure("api", "HTTP 500 Internal Server Error"),
        );

        let text = renderer.render(&event, None).unwrap();
        assert!(text.contains("目标告警"));
        assert!(text.contains("健康 → 降级"));
        assert!(text.contains("HTTP 500 Internal Server Error"));
    }

    #[test]
    fn test_default_recovery_template() {
        let renderer = TemplateRenderer::new().unwrap();
        let event = TransitionEvent::new(
            Some(HealthState::Failed),
            HealthState::Healthy,
            ProbeResult::success("api"),
        );

        let text = renderer.render(&event, None).unwrap();
        assert!(text.contains("目标恢复"));
        assert!(!text.contains("诊断信息"));
    }

    #[test]
    fn test_custom_template_is_not_escaped() {
        let renderer = TemplateRenderer::new().unwrap();
        let event = TransitionEvent::new(
            None,
            HealthState::Failed,
            ProbeResult::error("db", "<bad pid>"),
        );

        let text = renderer
            .render(&event, Some("{{target}} {{previous}}->{{current}}: {{message}}"))
            .unwrap();
        assert_eq!(text, "db none->failed: <bad pid>");
    }

    #[test]
    fn test_invalid_template_is_dispatch_error() {
        let renderer = TemplateRenderer::new().unwrap();
        let event = TransitionEvent::new(None, HealthState::Failed, ProbeResult::error("db", "x"));
        let err = renderer.render(&event, Some("{{#if}}")).unwrap_err();
        assert!(matches!(err, DispatchError::TemplateError(_)));
    }
}
