//! 模块元数据定义
//!
//! 静态模块描述（类型 ID、依赖集合、不可变标记）以及实例生命周期状态。

use serde::{Deserialize, Serialize};

/// 模块展示信息
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleMetadata {
    /// 显示名称
    #[serde(default)]
    pub name: String,

    /// 版本号（仅作展示，不参与依赖解析）
    #[serde(default)]
    pub version: String,

    /// 作者列表
    #[serde(default)]
    pub authors: Vec<String>,

    /// 描述
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl ModuleMetadata {
    /// 创建模块展示信息
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            ..Default::default()
        }
    }

    /// 添加作者
    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.authors.push(author.into());
        self
    }
}

/// 模块描述
///
/// 一个模块类型的静态声明，在启动时一次性登记到描述表中，之后不再改变。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    /// 模块类型 ID
    pub id: String,

    /// 直接依赖的模块类型
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// 不可变模块只能随所属者整体关闭
    #[serde(default)]
    pub immutable: bool,

    /// 展示信息
    #[serde(default)]
    pub metadata: ModuleMetadata,
}

impl ModuleDescriptor {
    /// 创建无依赖的模块描述
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            metadata: ModuleMetadata::new(id.clone(), ""),
            id,
            dependencies: Vec::new(),
            immutable: false,
        }
    }

    /// 添加一个直接依赖（重复添加会被忽略）
    pub fn depends_on(mut self, dependency: impl Into<String>) -> Self {
        let dependency = dependency.into();
        if !self.dependencies.contains(&dependency) {
            self.dependencies.push(dependency);
        }
        self
    }

    /// 批量添加直接依赖
    pub fn with_dependencies<I, S>(self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        dependencies
            .into_iter()
            .fold(self, |descriptor, dep| descriptor.depends_on(dep))
    }

    /// 标记为不可变模块
    pub fn immutable(mut self) -> Self {
        self.immutable = true;
        self
    }

    /// 设置展示信息
    pub fn with_metadata(mut self, metadata: ModuleMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// 是否直接依赖指定类型
    pub fn depends_on_type(&self, module_type: &str) -> bool {
        self.dependencies.iter().any(|d| d == module_type)
    }

    /// 去除重复依赖，保留首次出现的顺序
    pub(crate) fn normalize(&mut self) {
        let mut seen = std::collections::HashSet::new();
        self.dependencies.retain(|d| seen.insert(d.clone()));
    }
}

/// 模块实例生命周期状态
///
/// ```text
/// Unloaded → Booting → Running → ShuttingDown → Shutdown
///                   ↘ Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleState {
    /// 已构造，尚未启用
    #[default]
    Unloaded,
    /// 正在启用
    Booting,
    /// 运行中
    Running,
    /// 启用失败
    Failed,
    /// 正在关闭
    ShuttingDown,
    /// 已关闭
    Shutdown,
}

impl ModuleState {
    /// 是否可以启动
    pub fn can_boot(&self) -> bool {
        matches!(self, ModuleState::Unloaded)
    }

    /// 是否可以关闭
    pub fn can_shutdown(&self) -> bool {
        matches!(self, ModuleState::Running)
    }

    /// 是否为终止状态
    pub fn is_terminal(&self) -> bool {
        matches!(self, ModuleState::Failed | ModuleState::Shutdown)
    }
}

impl std::fmt::Display for ModuleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ModuleState::Unloaded => "unloaded",
            ModuleState::Booting => "booting",
            ModuleState::Running => "running",
            ModuleState::Failed => "failed",
            ModuleState::ShuttingDown => "shutting_down",
            ModuleState::Shutdown => "shutdown",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_builder() {
        let descriptor = ModuleDescriptor::new("economy")
            .depends_on("storage")
            .depends_on("storage")
            .with_dependencies(["permissions", "storage"])
            .immutable();

        assert_eq!(descriptor.dependencies, vec!["storage", "permissions"]);
        assert!(descriptor.immutable);
        assert!(descriptor.depends_on_type("permissions"));
        assert!(!descriptor.depends_on_type("economy"));
        assert_eq!(descriptor.metadata.name, "economy");
    }

    #[test]
    fn test_descriptor_normalize() {
        let mut descriptor = ModuleDescriptor::new("a");
        descriptor.dependencies = vec!["b".into(), "c".into(), "b".into()];
        descriptor.normalize();
        assert_eq!(descriptor.dependencies, vec!["b", "c"]);
    }

    #[test]
    fn test_state_transitions_allowed() {
        assert!(ModuleState::Unloaded.can_boot());
        assert!(!ModuleState::Running.can_boot());
        assert!(ModuleState::Running.can_shutdown());
        assert!(!ModuleState::Failed.can_shutdown());
        assert!(ModuleState::Shutdown.is_terminal());
        assert_eq!(ModuleState::default(), ModuleState::Unloaded);
    }

    #[test]
    fn test_state_serde() {
        let json = serde_json::to_string(&ModuleState::ShuttingDown).unwrap();
        assert_eq!(json, "\"shutting_down\"");
        assert_eq!(ModuleState::ShuttingDown.to_string(), "shutting_down");
    }

    #[test]
    fn test_metadata_builder() {
        let metadata = ModuleMetadata::new("Economy", "1.2.0").author("alice");
        assert_eq!(metadata.authors, vec!["alice".to_string()]);
    }
}
