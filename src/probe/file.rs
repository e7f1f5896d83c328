//! 存活文件探测
//!
//! 被监控进程定期更新一个文件，文件修改时间超过上限即视为不健康

use crate::error::ProbeError;
use crate::health::cancel::CancelToken;
use crate::probe::{Probe, ProbeReport};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

/// 存活文件探测实现
pub struct FileProbe {
    path: PathBuf,
    max_age: Duration,
}

impl FileProbe {
    pub fn new(path: PathBuf, max_age: Duration) -> Self {
        Self { path, max_age }
    }
}

#[async_trait]
impl Probe for FileProbe {
    fn kind(&self) -> &'static str {
        "file"
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn check(&self, _cancel: &CancelToken) -> Result<ProbeReport, ProbeError> {
        let metadata = match tokio::fs::metadata(&self.path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Ok(ProbeReport::unhealthy(format!(
                    "存活文件不存在: {}",
                    self.path.display()
                )));
            }
            Err(e) => return Err(ProbeError::Io(e)),
        };

        let modified = metadata.modified()?;
        // 修改时间在未来时按 0 处理
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO);

        let report = if age > self.max_age {
            ProbeReport::unhealthy(format!(
                "存活文件已过期: {}s > {}s",
                age.as_secs(),
                self.max_age.as_secs()
            ))
        } else {
            ProbeReport::healthy()
        };

        Ok(report.with_metadata("age_seconds", serde_json::json!(age.as_secs())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    #[tokio::test]
    async fn test_fresh_file_is_healthy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("heartbeat");
        File::create(&path).unwrap();

        let probe = FileProbe::new(path, Duration::from_secs(60));
        let report = probe.check(&CancelToken::never()).await.unwrap();
        assert!(report.healthy);
    }

    #[tokio::test]
    async fn test_stale_file_is_unhealthy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("heartbeat");
        let file = File::create(&path).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(600))
            .unwrap();

        let probe = FileProbe::new(path, Duration::from_secs(60));
        let report = probe.check(&CancelToken::never()).await.unwrap();
        assert!(!report.healthy);
        assert!(report.message.unwrap().contains("已过期"));
    }

    #[tokio::test]
    async fn test_missing_file_is_unhealthy() {
        let dir = tempfile::tempdir().unwrap();
        let probe = FileProbe::new(dir.path().join("missing"), Duration::from_secs(60));
        let report = probe.check(&CancelToken::never()).await.unwrap();
        assert!(!report.healthy);
        assert!(report.message.unwrap().contains("不存在"));
    }
}
