//! 生命周期事件
//!
//! 编排器在注册、启动、隔离和关闭时发布的事件，宿主通过
//! [`ModuleOrchestrator::set_event_publisher`](super::manager::ModuleOrchestrator::set_event_publisher)
//! 订阅。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::Serialize;

/// 事件名称常量
pub mod event_names {
    /// 模块类型加入加载顺序
    pub const MODULE_REGISTERED: &str = "module.registered";
    /// 模块实例进入 Running
    pub const MODULE_BOOTED: &str = "module.booted";
    /// 模块构造或启用失败
    pub const MODULE_BOOT_FAILED: &str = "module.boot_failed";
    /// 模块被级联隔离
    pub const MODULE_CONTAINED: &str = "module.contained";
    /// 模块实例已关闭
    pub const MODULE_SHUT_DOWN: &str = "module.shut_down";
    /// 所属者整体释放
    pub const OWNER_RELEASED: &str = "owner.released";
}

/// 生命周期事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// 新的模块类型加入了所属者的加载顺序
    Registered {
        /// 所属者
        owner: String,
        /// 本次新增的类型，按加载顺序
        added: Vec<String>,
    },
    /// 模块启动成功
    Booted {
        /// 所属者
        owner: String,
        /// 模块类型
        module_type: String,
        /// 实例 ID
        instance_id: String,
    },
    /// 模块构造或启用失败
    BootFailed {
        /// 所属者
        owner: String,
        /// 模块类型
        module_type: String,
        /// 失败原因
        reason: String,
    },
    /// 模块因依赖无法加载而被隔离
    Contained {
        /// 所属者
        owner: String,
        /// 模块类型
        module_type: String,
        /// 引发隔离的模块类型
        cause: String,
    },
    /// 模块实例已关闭
    ShutDown {
        /// 所属者
        owner: String,
        /// 模块类型
        module_type: String,
        /// 实例 ID
        instance_id: String,
    },
    /// 所属者上下文已整体释放
    OwnerReleased {
        /// 所属者
        owner: String,
    },
}

impl LifecycleEvent {
    /// 事件名称
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::Registered { .. } => event_names::MODULE_REGISTERED,
            LifecycleEvent::Booted { .. } => event_names::MODULE_BOOTED,
            LifecycleEvent::BootFailed { .. } => event_names::MODULE_BOOT_FAILED,
            LifecycleEvent::Contained { .. } => event_names::MODULE_CONTAINED,
            LifecycleEvent::ShutDown { .. } => event_names::MODULE_SHUT_DOWN,
            LifecycleEvent::OwnerReleased { .. } => event_names::OWNER_RELEASED,
        }
    }

    /// 事件所属者
    pub fn owner(&self) -> &str {
        match self {
            LifecycleEvent::Registered { owner, .. }
            | LifecycleEvent::Booted { owner, .. }
            | LifecycleEvent::BootFailed { owner, .. }
            | LifecycleEvent::Contained { owner, .. }
            | LifecycleEvent::ShutDown { owner, .. }
            | LifecycleEvent::OwnerReleased { owner } => owner,
        }
    }
}

/// 带时间戳的事件信封，供宿主序列化转发
#[derive(Debug, Clone, Serialize)]
pub struct EventEnvelope {
    /// 事件名称
    pub name: &'static str,
    /// 发布时间
    pub timestamp: DateTime<Utc>,
    /// 事件内容
    #[serde(flatten)]
    pub event: LifecycleEvent,
}

impl From<LifecycleEvent> for EventEnvelope {
    fn from(event: LifecycleEvent) -> Self {
        Self {
            name: event.name(),
            timestamp: Utc::now(),
            event,
        }
    }
}

/// 事件发布函数
pub type EventPublisher = Arc<dyn Fn(LifecycleEvent) -> BoxFuture<'static, ()> + Send + Sync>;
