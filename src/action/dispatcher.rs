//! 动作分发器
//!
//! 每个迁移事件只分发一次：依次调用目标配置的每个动作，失败不重试，
//! 也不会反馈到健康跟踪器。分发结果写入状态管理器对外暴露。

use crate::action::ActionSender;
use crate::health::result::TransitionEvent;
use crate::status::StatusManager;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};
use uuid::Uuid;

/// 单个动作的执行结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    /// 动作类型
    pub kind: String,
    /// 是否成功
    pub success: bool,
    /// 错误信息
    pub error: Option<String>,
    /// 执行耗时（毫秒）
    pub duration_ms: u64,
}

/// 一次分发的整体结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    /// 迁移事件ID
    pub event_id: Uuid,
    /// 目标名称
    pub target: String,
    /// 各动作结果
    pub results: Vec<ActionResult>,
}

impl ActionOutcome {
    /// 是否全部成功
    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(|r| r.success)
    }

    /// 失败的动作数
    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| !r.success).count()
    }

    /// 第一个错误信息
    pub fn first_error(&self) -> Option<&str> {
        self.results.iter().find_map(|r| r.error.as_deref())
    }
}

/// 动作分发器
#[derive(Debug, Clone)]
pub struct ActionDispatcher {
    status: Arc<StatusManager>,
}

impl ActionDispatcher {
    /// 创建新的分发器
    pub fn new(status: Arc<StatusManager>) -> Self {
        Self { status }
    }

    /// 分发迁移事件
    ///
    /// # 参数
    /// * `event` - 迁移事件
    /// * `actions` - 目标的动作列表
    ///
    /// # 返回
    /// * `ActionOutcome` - 每个动作的执行结果
    pub async fn dispatch(
        &self,
        event: &TransitionEvent,
        actions: &[Arc<dyn ActionSender>],
    ) -> ActionOutcome {
        let mut results = Vec::with_capacity(actions.len());

        for action in actions {
            let start = Instant::now();
            let sent = action.send(event).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            let result = match sent {
                Ok(()) => ActionResult {
                    kind: action.kind().to_string(),
                    success: true,
                    error: None,
                    duration_ms,
                },
                Err(e) => {
                    error!(
                        "动作执行失败: {} [{}] {} → {}: {}",
                        event.target,
                        action.kind(),
                        event.previous_label(),
                        event.current.as_str(),
                        e
                    );
                    ActionResult {
                        kind: action.kind().to_string(),
                        success: false,
                        error: Some(e.to_string()),
                        duration_ms,
                    }
                }
            };
            results.push(result);
        }

        let outcome = ActionOutcome {
            event_id: event.id,
            target: event.target.clone(),
            results,
        };

        if outcome.all_succeeded() {
            info!(
                "迁移事件分发完成: {} {} → {} ({} 个动作)",
                event.target,
                event.previous_label(),
                event.current.as_str(),
                outcome.results.len()
            );
        }

        self.status.record_dispatch(&outcome).await;
        outcome
    }
}
