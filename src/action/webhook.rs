//! Webhook 动作
//!
//! 支持三种消息格式：原始迁移事件JSON、钉钉文本消息和飞书卡片消息。
//! 配置了密钥时按对应平台的规则签名。

use crate::action::{ActionSender, TemplateRenderer};
use crate::config::{WebhookActionConfig, WebhookFormat};
use crate::error::DispatchError;
use crate::health::result::{HealthState, TransitionEvent};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use reqwest::{Client, Url};
use serde_json::{json, Value};
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

type HmacSha256 = Hmac<Sha256>;

/// Webhook 动作实现
pub struct WebhookAction {
    client: Client,
    config: WebhookActionConfig,
    renderer: Arc<TemplateRenderer>,
}

impl WebhookAction {
    /// 创建 webhook 动作
    pub fn new(client: Client, config: WebhookActionConfig, renderer: Arc<TemplateRenderer>) -> Self {
        Self {
            client,
            config,
            renderer,
        }
    }

    /// 构建消息体
    fn build_body(&self, event: &TransitionEvent, timestamp_ms: i64) -> Result<Value, DispatchError> {
        let body = match self.config.format {
            WebhookFormat::Event => serde_json::to_value(event)
                .map_err(|e| DispatchError::SendError(format!("序列化事件失败: {}", e)))?,
            WebhookFormat::Dingtalk => {
                let content = self
                    .renderer
                    .render(event, self.config.template.as_deref())?;
                json!({
                    "msgtype": "text",
                    "text": { "content": content }
                })
            }
            WebhookFormat::Feishu => {
                let content = self
                    .renderer
                    .render(event, self.config.template.as_deref())?;
                let color = match event.current {
                    HealthState::Healthy => "green",
                    HealthState::Degraded => "orange",
                    HealthState::Failed => "red",
                };
                let mut body = json!({
                    "msg_type": "interactive",
                    "card": {
                        "elements": [
                            {
                                "tag": "div",
                                "text": {
                                    "content": content,
                                    "tag": "lark_md"
                                }
                            }
                        ],
                        "header": {
                            "title": {
                                "content": TemplateRenderer::title(event),
                                "tag": "plain_text"
                            },
                            "template": color
                        }
                    }
                });
                if let Some(secret) = &self.config.secret {
                    // 飞书使用秒级时间戳，签名放在消息体中
                    let timestamp = timestamp_ms / 1000;
                    body["timestamp"] = json!(timestamp.to_string());
                    body["sign"] = json!(feishu_sign(timestamp, secret)?);
                }
                body
            }
        };
        Ok(body)
    }

    /// 计算请求URL，钉钉和事件格式在URL上追加签名参数
    fn request_url(&self, timestamp_ms: i64) -> Result<Url, DispatchError> {
        let mut url = Url::parse(&self.config.url)
            .map_err(|e| DispatchError::SendError(format!("无效的webhook URL: {}", e)))?;

        if let Some(secret) = &self.config.secret {
            if self.config.format != WebhookFormat::Feishu {
                let sign = dingtalk_sign(timestamp_ms, secret)?;
                url.query_pairs_mut()
                    .append_pair("timestamp", &timestamp_ms.to_string())
                    .append_pair("sign", &sign);
            }
        }

        Ok(url)
    }

    /// 检查平台返回的业务错误码
    fn check_response_body(&self, body: &str) -> Result<(), DispatchError> {
        let code_field = match self.config.format {
            WebhookFormat::Dingtalk => "errcode",
            WebhookFormat::Feishu => "code",
            WebhookFormat::Event => return Ok(()),
        };

        let Ok(value) = serde_json::from_str::<Value>(body) else {
            return Ok(());
        };

        match value.get(code_field).and_then(Value::as_i64) {
            Some(0) | None => Ok(()),
            Some(code) => {
                let message = value
                    .get("errmsg")
                    .or_else(|| value.get("msg"))
                    .and_then(Value::as_str)
                    .unwrap_or("unknown");
                Err(DispatchError::SendError(format!(
                    "webhook返回错误码 {}: {}",
                    code, message
                )))
            }
        }
    }
}

/// 钉钉签名：base64(HMAC-SHA256(secret, "{timestamp}\n{secret}"))
pub fn dingtalk_sign(timestamp_ms: i64, secret: &str) -> Result<String, DispatchError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| DispatchError::SendError(format!("签名密钥无效: {}", e)))?;
    mac.update(format!("{}\n{}", timestamp_ms, secret).as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// 飞书签名：以 "{timestamp}\n{secret}" 为密钥对空消息做 HMAC-SHA256
pub fn feishu_sign(timestamp: i64, secret: &str) -> Result<String, DispatchError> {
    let key = format!("{}\n{}", timestamp, secret);
    let mac = HmacSha256::new_from_slice(key.as_bytes())
        .map_err(|e| DispatchError::SendError(format!("签名密钥无效: {}", e)))?;
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

#[async_trait]
impl ActionSender for WebhookAction {
    fn kind(&self) -> &'static str {
        "webhook"
    }

    async fn send(&self, event: &TransitionEvent) -> Result<(), DispatchError> {
        let timestamp_ms = chrono::Utc::now().timestamp_millis();
        let body = self.build_body(event, timestamp_ms)?;
        let url = self.request_url(timestamp_ms)?;

        debug!("发送webhook: {} -> {}", event.target, self.config.url);

        let mut request = self
            .client
            .post(url)
            .timeout(Duration::from_secs(self.config.timeout_seconds))
            .json(&body);
        for (key, value) in &self.config.headers {
            request = request.header(key, value);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                DispatchError::Timeout(self.config.timeout_seconds)
            } else {
                DispatchError::SendError(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!("webhook发送失败: {} - {}", status, text);
            return Err(DispatchError::HttpStatus {
                status: status.as_u16(),
            });
        }

        let text = response.text().await.unwrap_or_default();
        self.check_response_body(&text)
    }
}
