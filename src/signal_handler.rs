//! 信号处理模块
//!
//! 收到 SIGINT/SIGTERM 时通过广播通道发出关闭信号

use crate::error::Result;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

#[cfg(unix)]
use signal_hook::consts::{SIGINT, SIGTERM};
#[cfg(unix)]
use signal_hook_tokio::Signals;

/// 信号监听器，关闭时注销信号处理
pub struct SignalListener {
    #[cfg(unix)]
    handle: signal_hook_tokio::Handle,
    task: JoinHandle<()>,
}

impl SignalListener {
    /// 停止监听信号
    pub fn close(self) {
        #[cfg(unix)]
        self.handle.close();
        self.task.abort();
    }
}

/// 设置信号处理器
pub fn setup_signal_handlers(shutdown_tx: broadcast::Sender<()>) -> Result<SignalListener> {
    #[cfg(unix)]
    {
        setup_unix_signals(shutdown_tx)
    }
    #[cfg(not(unix))]
    {
        let task = tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("接收到 Ctrl+C，开始优雅关闭...");
                    notify(&shutdown_tx);
                }
                Err(e) => error!("监听 Ctrl+C 失败: {e}"),
            }
        });
        Ok(SignalListener { task })
    }
}

/// Unix/Linux系统信号处理
#[cfg(unix)]
fn setup_unix_signals(shutdown_tx: broadcast::Sender<()>) -> Result<SignalListener> {
    use futures::stream::StreamExt;

    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    let handle = signals.handle();

    let task = tokio::spawn(async move {
        while let Some(signal) = signals.next().await {
            match signal {
                SIGINT => {
                    info!("接收到 SIGINT 信号，开始优雅关闭...");
                    notify(&shutdown_tx);
                    break;
                }
                SIGTERM => {
                    info!("接收到 SIGTERM 信号，开始优雅关闭...");
                    notify(&shutdown_tx);
                    break;
                }
                _ => {
                    warn!("接收到未处理的信号: {signal}");
                }
            }
        }
    });

    Ok(SignalListener { handle, task })
}

fn notify(shutdown_tx: &broadcast::Sender<()>) {
    if let Err(e) = shutdown_tx.send(()) {
        error!("发送关闭信号失败: {e}");
    }
}
