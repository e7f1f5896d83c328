//! TCP可达性探测

use crate::error::ProbeError;
use crate::health::cancel::CancelToken;
use crate::probe::{Probe, ProbeReport};
use async_trait::async_trait;
use tokio::net::TcpStream;

/// TCP连接探测，连接建立即视为健康
pub struct TcpProbe {
    address: String,
}

impl TcpProbe {
    pub fn new(address: String) -> Self {
        Self { address }
    }
}

#[async_trait]
impl Probe for TcpProbe {
    fn kind(&self) -> &'static str {
        "tcp"
    }

    fn describe(&self) -> String {
        self.address.clone()
    }

    async fn check(&self, _cancel: &CancelToken) -> Result<ProbeReport, ProbeError> {
        match TcpStream::connect(self.address.as_str()).await {
            Ok(stream) => {
                let mut report = ProbeReport::healthy();
                if let Ok(peer) = stream.peer_addr() {
                    report = report.with_metadata("peer", serde_json::json!(peer.to_string()));
                }
                Ok(report)
            }
            Err(e) => Ok(ProbeReport::unhealthy(format!(
                "TCP连接失败 {}: {}",
                self.address, e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_tcp_probe_open_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let probe = TcpProbe::new(address.clone());
        let report = probe.check(&CancelToken::never()).await.unwrap();

        assert!(report.healthy);
        assert_eq!(report.metadata["peer"], address);
    }

    #[tokio::test]
    async fn test_tcp_probe_closed_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let probe = TcpProbe::new(address);
        let report = probe.check(&CancelToken::never()).await.unwrap();
        assert!(!report.healthy);
    }
}
