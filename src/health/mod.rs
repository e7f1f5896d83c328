//! 健康状态模块
//!
//! 提供探测结果、健康跟踪、目标注册表和探测调度功能

pub mod cancel;
pub mod registry;
pub mod result;
pub mod scheduler;
pub mod tracker;

// 重新导出主要类型
pub use cancel::{CancelSource, CancelToken};
pub use registry::{TargetEntry, TargetRegistry};
pub use result::{HealthState, ProbeOutcome, ProbeResult, TransitionEvent};
pub use scheduler::{ProbeScheduler, SchedulerConfig, ShutdownReport};
pub use tracker::{HealthTracker, TrackerSnapshot};
