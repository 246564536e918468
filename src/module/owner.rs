//! 所属者上下文
//!
//! 每个所属者（宿主插件）独立维护一份加载顺序、已加载实例列表、
//! 无法加载集合和失败日志。上下文本身不加锁，由编排器的表锁保护。

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

use super::runtime::ModuleInstance;

/// 失败类型
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureKind {
    /// 构造或启用失败
    Construction {
        /// 失败原因
        reason: String,
    },
    /// 因依赖无法加载被隔离，从未尝试构造
    Contained {
        /// 引发隔离的模块类型
        cause: String,
    },
}

/// 失败日志条目
#[derive(Debug, Clone, Serialize)]
pub struct BootFailure {
    /// 模块类型
    pub module_type: String,
    /// 失败类型
    #[serde(flatten)]
    pub kind: FailureKind,
    /// 记录时间
    pub at: DateTime<Utc>,
}

impl BootFailure {
    /// 是否为构造失败
    pub fn is_construction(&self) -> bool {
        matches!(self.kind, FailureKind::Construction { .. })
    }
}

/// 启动结果报告
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BootReport {
    /// 本轮新启动的类型，按启动顺序
    pub booted: Vec<String>,
    /// 本轮构造或启用失败的类型
    pub failed: Vec<String>,
    /// 本轮被隔离的类型
    pub contained: Vec<String>,
}

impl BootReport {
    /// 本轮是否没有任何失败或隔离
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.contained.is_empty()
    }
}

/// 关闭结果报告
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    /// 已关闭的类型，按关闭顺序
    pub shut_down: Vec<String>,
    /// 仍被其他实例使用而保留的依赖
    pub retained: Vec<String>,
    /// 声明了但未加载的依赖
    pub missing: Vec<String>,
    /// 因不可变而跳过的类型
    pub skipped_immutable: Vec<String>,
}

impl ShutdownReport {
    /// 合并另一份报告
    pub fn merge(&mut self, other: ShutdownReport) {
        self.shut_down.extend(other.shut_down);
        self.retained.extend(other.retained);
        self.missing.extend(other.missing);
        self.skipped_immutable.extend(other.skipped_immutable);
        self.normalize();
    }

    /// 去重，并剔除后来被关闭的保留项
    ///
    /// 不可变模块在整体关闭时先被跳过、最后才收尾，两个列表里都会保留它。
    pub(crate) fn normalize(&mut self) {
        dedup_in_place(&mut self.shut_down);
        let shut_down = &self.shut_down;
        self.retained.retain(|t| !shut_down.contains(t));
        dedup_in_place(&mut self.retained);
        dedup_in_place(&mut self.missing);
        dedup_in_place(&mut self.skipped_immutable);
    }
}

fn dedup_in_place(items: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    items.retain(|t| seen.insert(t.clone()));
}

/// 所属者上下文
#[derive(Debug)]
pub struct OwnerContext {
    owner: String,
    load_order: Vec<String>,
    loaded: Vec<Arc<ModuleInstance>>,
    /// 模块类型 -> 引发无法加载的类型（构造失败时为自身）
    cannot_load: HashMap<String, String>,
    failures: Vec<BootFailure>,
    created_at: DateTime<Utc>,
    /// 串行化同一所属者的启动流程和整体关闭
    pass_guard: Arc<Mutex<()>>,
}

impl OwnerContext {
    /// 创建空上下文
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            load_order: Vec::new(),
            loaded: Vec::new(),
            cannot_load: HashMap::new(),
            failures: Vec::new(),
            created_at: Utc::now(),
            pass_guard: Arc::new(Mutex::new(())),
        }
    }

    /// 所属者 ID
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// 创建时间
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub(crate) fn pass_guard(&self) -> Arc<Mutex<()>> {
        self.pass_guard.clone()
    }

    /// 加载顺序
    pub fn load_order(&self) -> &[String] {
        &self.load_order
    }

    /// 替换加载顺序，由构建器在成功展开后提交
    pub fn set_load_order(&mut self, order: Vec<String>) {
        self.load_order = order;
    }

    /// 已加载实例，按启动顺序
    pub fn loaded(&self) -> &[Arc<ModuleInstance>] {
        &self.loaded
    }

    /// 查找某类型的已加载实例
    pub fn find_loaded(&self, module_type: &str) -> Option<Arc<ModuleInstance>> {
        self.loaded
            .iter()
            .find(|i| i.module_type() == module_type)
            .cloned()
    }

    /// 是否已加载某类型
    pub fn is_loaded(&self, module_type: &str) -> bool {
        self.loaded.iter().any(|i| i.module_type() == module_type)
    }

    /// 追加已进入 Running 的实例
    pub fn push_loaded(&mut self, instance: Arc<ModuleInstance>) {
        self.loaded.push(instance);
    }

    /// 按实例 ID 移除已加载实例
    pub fn remove_loaded(&mut self, instance_id: &str) -> Option<Arc<ModuleInstance>> {
        let index = self
            .loaded
            .iter()
            .position(|i| i.instance_id() == instance_id)?;
        Some(self.loaded.remove(index))
    }

    /// 是否在无法加载集合中
    pub fn is_blocked(&self, module_type: &str) -> bool {
        self.cannot_load.contains_key(module_type)
    }

    /// 引发该类型无法加载的类型
    pub fn blocked_cause(&self, module_type: &str) -> Option<&str> {
        self.cannot_load.get(module_type).map(String::as_str)
    }

    /// 加入无法加载集合，已存在时保留最初的原因并返回 `false`
    pub fn block(&mut self, module_type: impl Into<String>, cause: impl Into<String>) -> bool {
        let module_type = module_type.into();
        if self.cannot_load.contains_key(&module_type) {
            return false;
        }
        self.cannot_load.insert(module_type, cause.into());
        true
    }

    /// 无法加载集合，已排序
    pub fn cannot_load(&self) -> Vec<String> {
        let mut types: Vec<String> = self.cannot_load.keys().cloned().collect();
        types.sort();
        types
    }

    /// 记录失败，每个类型最多一条；已记录过时返回 `false`
    pub fn record_failure(&mut self, module_type: &str, kind: FailureKind) -> bool {
        if self.failures.iter().any(|f| f.module_type == module_type) {
            return false;
        }
        self.failures.push(BootFailure {
            module_type: module_type.to_string(),
            kind,
            at: Utc::now(),
        });
        true
    }

    /// 失败日志
    pub fn failures(&self) -> &[BootFailure] {
        &self.failures
    }
}
