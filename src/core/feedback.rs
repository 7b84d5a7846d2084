use crate::domain::ports::Feedback;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// 可跨執行緒共享的取消旗標；管線只在步驟之間與群組之間輪詢
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// 以 tracing 記錄進度的預設實作
#[derive(Debug, Default)]
pub struct ProgressFeedback {
    token: CancellationToken,
    current_step: AtomicUsize,
    groups: AtomicUsize,
}

impl ProgressFeedback {
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            current_step: AtomicUsize::new(0),
            groups: AtomicUsize::new(0),
        }
    }

    pub fn current_step(&self) -> usize {
        self.current_step.load(Ordering::SeqCst)
    }

    pub fn groups_reported(&self) -> usize {
        self.groups.load(Ordering::SeqCst)
    }
}

impl Feedback for ProgressFeedback {
    fn is_canceled(&self) -> bool {
        self.token.is_canceled()
    }

    fn set_current_step(&self, step: usize, total: usize) {
        self.current_step.store(step, Ordering::SeqCst);
        tracing::info!("⏩ Step {}/{} complete", step, total);
    }

    fn report_group(&self, key: &str, points: usize, lines: usize) {
        self.groups.fetch_add(1, Ordering::SeqCst);
        if lines == 0 {
            tracing::warn!("⚠️ Group '{}' has {} points but no canals, points left in place", key, points);
        } else {
            tracing::debug!("Group '{}': {} points against {} canals", key, points, lines);
        }
    }

    fn push_info(&self, message: &str) {
        tracing::info!("{}", message);
    }
}
