//! 进程存活探测
//!
//! 读取PID文件并向该进程发送信号0。以非root用户运行时，
//! EPERM 表示进程存在但属于其他用户，同样视为存活。

use crate::error::ProbeError;
use crate::health::cancel::CancelToken;
use crate::probe::{Probe, ProbeReport};
use async_trait::async_trait;
use std::path::PathBuf;

/// 进程存活探测实现
pub struct ProcessProbe {
    pid_file: PathBuf,
}

impl ProcessProbe {
    pub fn new(pid_file: PathBuf) -> Self {
        Self { pid_file }
    }

    async fn read_pid(&self) -> Result<i32, ProbeError> {
        let content = tokio::fs::read_to_string(&self.pid_file).await?;
        let trimmed = content.trim();
        match trimmed.parse::<i32>() {
            Ok(pid) if pid > 0 => Ok(pid),
            _ => Err(ProbeError::MalformedResponse(format!(
                "PID文件内容无效 {}: {:?}",
                self.pid_file.display(),
                trimmed
            ))),
        }
    }
}

#[async_trait]
impl Probe for ProcessProbe {
    fn kind(&self) -> &'static str {
        "process"
    }

    fn describe(&self) -> String {
        self.pid_file.display().to_string()
    }

    async fn check(&self, _cancel: &CancelToken) -> Result<ProbeReport, ProbeError> {
        let pid = self.read_pid().await?;
        Ok(signal_zero(pid)?.with_metadata("pid", serde_json::json!(pid)))
    }
}

#[cfg(unix)]
fn signal_zero(pid: i32) -> Result<ProbeReport, ProbeError> {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    match kill(Pid::from_raw(pid), None) {
        Ok(()) | Err(Errno::EPERM) => Ok(ProbeReport::healthy()),
        Err(Errno::ESRCH) => Ok(ProbeReport::unhealthy(format!("进程 {} 不存在", pid))),
        Err(e) => Err(ProbeError::Io(std::io::Error::from(e))),
    }
}

#[cfg(not(unix))]
fn signal_zero(_pid: i32) -> Result<ProbeReport, ProbeError> {
    Err(ProbeError::Unsupported("进程探测仅支持Unix平台".to_string()))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_own_process_is_alive() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("app.pid");
        std::fs::write(&pid_file, format!("{}\n", std::process::id())).unwrap();

        let probe = ProcessProbe::new(pid_file);
        let report = probe.check(&CancelToken::never()).await.unwrap();
        assert!(report.healthy);
    }

    #[tokio::test]
    async fn test_exited_process_is_unhealthy() {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();

        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("app.pid");
        std::fs::write(&pid_file, pid.to_string()).unwrap();

        let probe = ProcessProbe::new(pid_file);
        let report = probe.check(&CancelToken::never()).await.unwrap();
        assert!(!report.healthy);
    }

    #[tokio::test]
    async fn test_malformed_pid_file_is_probe_error() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("app.pid");
        std::fs::write(&pid_file, "not-a-pid").unwrap();

        let probe = ProcessProbe::new(pid_file);
        let err = probe.check(&CancelToken::never()).await.unwrap_err();
        assert!(matches!(err, ProbeError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_missing_pid_file_is_probe_error() {
        let dir = tempfile::tempdir().unwrap();
        let probe = ProcessProbe::new(dir.path().join("missing.pid"));
        let err = probe.check(&CancelToken::never()).await.unwrap_err();
        assert!(matches!(err, ProbeError::Io(_)));
    }
}
