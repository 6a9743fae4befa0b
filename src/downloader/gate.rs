use tokio::sync::watch;

/// 两态闸门：打开时 `wait` 立即返回，关闭时挂起直到重新打开。
/// 可以反复关闭/打开，任意数量的调用方可以同时等待。
#[derive(Debug)]
pub struct PauseGate {
    tx: watch::Sender<bool>,
}

impl PauseGate {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(true);
        Self { tx }
    }

    pub fn close(&self) {
        self.tx.send_replace(false);
    }

    pub fn open(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_open(&self) -> bool {
        *self.tx.borrow()
    }

    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // 发送端由 self 持有，不会在等待期间被丢弃
        let _ = rx.wait_for(|open| *open).await;
    }
}

impl Default for PauseGate {
    fn default() -> Self {
        Self::new()
    }
}
