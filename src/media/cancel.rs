//! # 取消标志
//!
//! 每个调整会话持有一个 `CancelFlag`，并传给所有异步边界调用
//! （裁剪提取、压缩、上传）。会话销毁时置位，之后返回的结果一律丢弃，
//! 避免旧会话的迟到响应改写新会话的状态。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::ImageError;

#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// 已取消时返回 `ImageError::Cancelled`。
    pub fn ensure_active(&self, what: &str) -> Result<(), ImageError> {
        if self.is_cancelled() {
            return Err(ImageError::Cancelled(format!("{what}：会话已结束")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let flag = CancelFlag::new();
        let other = flag.clone();
        assert!(flag.ensure_active("上传").is_ok());

        other.cancel();
        assert!(flag.is_cancelled());
        assert!(matches!(flag.ensure_active("上传"), Err(ImageError::Cancelled(_))));
    }
}
