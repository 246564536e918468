//! 生命周期管理
//!
//! 单个模块实例的状态机：
//!
//! ```text
//! Unloaded → Booting → {Running, Failed}
//! Running → ShuttingDown → Shutdown
//! ```
//!
//! 启动和关闭都先获取实例级互斥锁再做状态转换，并在整个钩子调用期间持有，
//! 所以针对同一实例的并发重复请求会被串行化；不同实例之间不保证顺序。
//! 锁由守卫对象持有，钩子返回错误或 panic 时同样会被释放。

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use super::metadata::ModuleState;
use super::runtime::Module;
use crate::utils::{CoreError, Result};

/// 生命周期记录快照
#[derive(Debug, Clone, Default)]
pub struct LifecycleRecord {
    /// 当前状态
    pub state: ModuleState,
    /// 进入 Running 的时间
    pub booted_at: Option<DateTime<Utc>>,
    /// 进入 Shutdown 的时间
    pub shutdown_at: Option<DateTime<Utc>>,
    /// 最近一次钩子错误
    pub last_error: Option<String>,
}

/// 模块实例生命周期
#[derive(Debug, Default)]
pub struct ModuleLifecycle {
    /// 状态记录
    record: RwLock<LifecycleRecord>,
    /// 实例级互斥锁，串行化启动/关闭
    transition: Mutex<()>,
}

impl ModuleLifecycle {
    /// 创建处于 Unloaded 状态的生命周期
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前状态
    pub async fn state(&self) -> ModuleState {
        self.record.read().await.state
    }

    /// 状态记录快照
    pub async fn record(&self) -> LifecycleRecord {
        self.record.read().await.clone()
    }

    /// 启动：调用模块的 enable 钩子
    ///
    /// 已处于 Running 时记录警告并返回 `Ok(false)`；成功转换返回 `Ok(true)`。
    ///
    /// # Errors
    ///
    /// 状态不允许启动或 enable 钩子失败时返回 [`CoreError::ModuleConstructionFailed`]，
    /// 后一种情况下状态变为 Failed。
    pub async fn boot(&self, module_type: &str, module: &dyn Module) -> Result<bool> {
        let _guard = self.transition.lock().await;

        let current = self.state().await;
        if current == ModuleState::Running {
            warn!(module_type, "模块已在运行中，忽略启动请求");
            return Ok(false);
        }
        if !current.can_boot() {
            error!(module_type, state = %current, "模块状态不允许启动");
            return Err(CoreError::construction(
                module_type,
                format!("模块状态 {} 不允许启动", current),
            ));
        }

        self.set_state(ModuleState::Booting).await;
        debug!(module_type, "调用 enable 钩子");

        match module.enable().await {
            Ok(()) => {
                let mut record = self.record.write().await;
                record.state = ModuleState::Running;
                record.booted_at = Some(Utc::now());
                info!(module_type, "模块启动成功");
                Ok(true)
            }
            Err(e) => {
                let mut record = self.record.write().await;
                record.state = ModuleState::Failed;
                record.last_error = Some(e.to_string());
                error!(module_type, error = %e, "enable 钩子失败");
                Err(match e {
                    err @ CoreError::ModuleConstructionFailed { .. } => err,
                    other => CoreError::construction(module_type, other),
                })
            }
        }
    }

    /// 关闭：调用模块的 disable 钩子
    ///
    /// 不处于 Running 时记录警告并返回 `false`。disable 钩子失败只记录日志，
    /// 关闭流程照常完成，实例最终一定处于 Shutdown。
    pub async fn shutdown(&self, module_type: &str, module: &dyn Module) -> bool {
        let _guard = self.transition.lock().await;

        let current = self.state().await;
        if !current.can_shutdown() {
            warn!(module_type, state = %current, "模块未在运行，忽略关闭请求");
            return false;
        }

        self.set_state(ModuleState::ShuttingDown).await;
        debug!(module_type, "调用 disable 钩子");

        let hook_result = module.disable().await;

        let mut record = self.record.write().await;
        if let Err(e) = hook_result {
            error!(module_type, error = %e, "disable 钩子失败");
            warn!(module_type, "忽略 disable 钩子错误，继续关闭流程");
            record.last_error = Some(e.to_string());
        }
        record.state = ModuleState::Shutdown;
        record.shutdown_at = Some(Utc::now());
        info!(module_type, "模块已关闭");
        true
    }

    async fn set_state(&self, state: ModuleState) {
        self.record.write().await.state = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Default)]
    struct CountingModule {
        enables: AtomicUsize,
        disables: AtomicUsize,
        fail_enable: bool,
        fail_disable: bool,
        delay_ms: u64,
    }

    #[async_trait]
    impl Module for CountingModule {
        async fn enable(&self) -> Result<()> {
            if self.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            }
            self.enables.fetch_add(1, Ordering::SeqCst);
            if self.fail_enable {
                return Err(anyhow::anyhow!("enable 失败").into());
            }
            Ok(())
        }

        async fn disable(&self) -> Result<()> {
            self.disables.fetch_add(1, Ordering::SeqCst);
            if self.fail_disable {
                return Err(anyhow::anyhow!("disable 失败").into());
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_boot_and_shutdown() {
        let lifecycle = ModuleLifecycle::new();
        let module = CountingModule::default();
        assert_eq!(lifecycle.state().await, ModuleState::Unloaded);

        assert!(lifecycle.boot("a", &module).await.unwrap());
        assert_eq!(lifecycle.state().await, ModuleState::Running);
        assert!(lifecycle.record().await.booted_at.is_some());

        assert!(lifecycle.shutdown("a", &module).await);
        let record = lifecycle.record().await;
        assert_eq!(record.state, ModuleState::Shutdown);
        assert!(record.shutdown_at.is_some());
        assert_eq!(module.disables.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_boot_running_is_noop() {
        let lifecycle = ModuleLifecycle::new();
        let module = CountingModule::default();

        lifecycle.boot("a", &module).await.unwrap();
        assert!(!lifecycle.boot("a", &module).await.unwrap());
        assert_eq!(module.enables.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_shutdown_not_running_is_noop() {
        let lifecycle = ModuleLifecycle::new();
        let module = CountingModule::default();

        assert!(!lifecycle.shutdown("a", &module).await);
        assert_eq!(lifecycle.state().await, ModuleState::Unloaded);
        assert_eq!(module.disables.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_enable_failure_marks_failed() {
        let lifecycle = ModuleLifecycle::new();
        let module = CountingModule {
            fail_enable: true,
            ..Default::default()
        };

        let err = lifecycle.boot("a", &module).await.unwrap_err();
        assert!(matches!(err, CoreError::ModuleConstructionFailed { .. }));
        let record = lifecycle.record().await;
        assert_eq!(record.state, ModuleState::Failed);
        assert!(record.last_error.unwrap().contains("enable 失败"));

        // Failed 之后不允许再次启动，且锁已释放
        assert!(lifecycle.boot("a", &module).await.is_err());
    }

    #[tokio::test]
    async fn test_disable_failure_still_completes() {
        let lifecycle = ModuleLifecycle::new();
        let module = CountingModule {
            fail_disable: true,
            ..Default::default()
        };

        lifecycle.boot("a", &module).await.unwrap();
        assert!(lifecycle.shutdown("a", &module).await);
        assert_eq!(lifecycle.state().await, ModuleState::Shutdown);
        assert!(lifecycle.record().await.last_error.is_some());
    }

    #[tokio::test]
    async fn test_concurrent_boot_is_serialized() {
        let lifecycle = Arc::new(ModuleLifecycle::new());
        let module = Arc::new(CountingModule {
            delay_ms: 20,
            ..Default::default()
        });

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lifecycle = lifecycle.clone();
                let module = module.clone();
                tokio::spawn(async move { lifecycle.boot("a", module.as_ref()).await })
            })
            .collect();

        let mut transitions = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap() {
                transitions += 1;
            }
        }

        assert_eq!(transitions, 1);
        assert_eq!(module.enables.load(Ordering::SeqCst), 1);
        assert_eq!(lifecycle.state().await, ModuleState::Running);
    }

    #[tokio::test]
    async fn test_concurrent_shutdown_is_serialized() {
        let lifecycle = Arc::new(ModuleLifecycle::new());
        let module = Arc::new(CountingModule::default());
        lifecycle.boot("a", module.as_ref()).await.unwrap();

        let (first, second) = tokio::join!(
            lifecycle.shutdown("a", module.as_ref()),
            lifecycle.shutdown("a", module.as_ref())
        );

        assert!(first ^ second);
        assert_eq!(module.disables.load(Ordering::SeqCst), 1);
    }
}
