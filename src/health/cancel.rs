//! 探测取消令牌
//!
//! 停止阶段通过 watch 通道向所有在途探测广播取消信号，
//! 探测实现在 I/O 边界上检查令牌。

use tokio::sync::watch;

/// 取消信号的发送端，由调度器持有
#[derive(Debug)]
pub struct CancelSource {
    tx: watch::Sender<bool>,
}

impl Default for CancelSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelSource {
    /// 创建新的取消源
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// 获取一个新的取消令牌
    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: self.tx.subscribe(),
        }
    }

    /// 发出取消信号
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// 是否已发出取消信号
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// 取消令牌，传入每次探测调用
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// 永不取消的令牌，用于一次性检测
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        // 发送端丢弃后 cancelled() 会一直挂起
        drop(tx);
        Self { rx }
    }

    /// 是否已取消
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// 等待取消信号
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                // 发送端已释放且从未取消
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_wakes_waiters() {
        let source = CancelSource::new();
        let mut token = source.token();
        assert!(!token.is_cancelled());

        let waiter = tokio::spawn(async move {
            token.cancelled().await;
            true
        });

        source.cancel();
        let woke = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(woke);
        assert!(source.is_cancelled());
    }

    #[tokio::test]
    async fn test_token_created_after_cancel_is_cancelled() {
        let source = CancelSource::new();
        source.cancel();

        let mut token = source.token();
        assert!(token.is_cancelled());
        tokio::time::timeout(Duration::from_millis(100), token.cancelled())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_never_token_does_not_fire() {
        let mut token = CancelToken::never();
        let waited = tokio::time::timeout(Duration::from_millis(50), token.cancelled()).await;
        assert!(waited.is_err());
    }
}
