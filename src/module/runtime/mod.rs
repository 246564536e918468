//! 模块运行时
//!
//! 定义宿主实现的模块接口、注入给编排器的构造设施，以及已构造的模块实例。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::lifecycle::{LifecycleRecord, ModuleLifecycle};
use super::metadata::{ModuleDescriptor, ModuleMetadata, ModuleState};
use crate::utils::id::generate_instance_id;
use crate::utils::{CoreError, Result};

/// 模块接口
///
/// 宿主为每种模块类型提供一个实现。两个钩子都有空的默认实现。
#[async_trait]
pub trait Module: Send + Sync {
    /// 运行期展示信息，返回 `None` 时使用描述表中的元数据
    fn metadata(&self) -> Option<ModuleMetadata> {
        None
    }

    /// 启用钩子，在 Booting 状态下调用
    async fn enable(&self) -> Result<()> {
        Ok(())
    }

    /// 停用钩子，在 ShuttingDown 状态下调用
    async fn disable(&self) -> Result<()> {
        Ok(())
    }
}

/// 构造设施
///
/// 给定模块类型和所属者，同步地产出一个模块对象，或者返回构造错误。
#[async_trait]
pub trait ModuleFactory: Send + Sync {
    /// 构造模块
    async fn construct(&self, module_type: &str, owner: &str) -> Result<Box<dyn Module>>;
}

type Constructor = Box<dyn Fn(&str) -> Result<Box<dyn Module>> + Send + Sync>;

/// 基于构造函数表的构造设施
///
/// ```rust
/// use chips_modkit::module::runtime::{FactoryTable, Module};
///
/// struct Wallet;
/// impl Module for Wallet {}
///
/// let factory = FactoryTable::new()
///     .with("wallet", |_owner| Ok(Box::new(Wallet) as Box<dyn Module>));
/// assert!(factory.contains("wallet"));
/// ```
#[derive(Default)]
pub struct FactoryTable {
    constructors: HashMap<String, Constructor>,
}

impl FactoryTable {
    /// 创建空表
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记构造函数（构建器风格）
    pub fn with<F>(mut self, module_type: impl Into<String>, constructor: F) -> Self
    where
        F: Fn(&str) -> Result<Box<dyn Module>> + Send + Sync + 'static,
    {
        self.insert(module_type, constructor);
        self
    }

    /// 登记构造函数，已存在时覆盖
    pub fn insert<F>(&mut self, module_type: impl Into<String>, constructor: F)
    where
        F: Fn(&str) -> Result<Box<dyn Module>> + Send + Sync + 'static,
    {
        self.constructors
            .insert(module_type.into(), Box::new(constructor));
    }

    /// 是否登记了该类型的构造函数
    pub fn contains(&self, module_type: &str) -> bool {
        self.constructors.contains_key(module_type)
    }
}

#[async_trait]
impl ModuleFactory for FactoryTable {
    async fn construct(&self, module_type: &str, owner: &str) -> Result<Box<dyn Module>> {
        let constructor = self.constructors.get(module_type).ok_or_else(|| {
            CoreError::construction(module_type, "没有登记构造函数")
        })?;
        constructor(owner)
    }
}

/// 模块实例
///
/// 由构造设施在启动过程中产出，只有进入 Running 的实例才会被放进所属者的已加载列表。
pub struct ModuleInstance {
    instance_id: String,
    owner: String,
    descriptor: Arc<ModuleDescriptor>,
    metadata: ModuleMetadata,
    lifecycle: ModuleLifecycle,
    module: Box<dyn Module>,
}

impl ModuleInstance {
    /// 包装一个刚构造出来的模块
    pub fn new(owner: impl Into<String>, descriptor: Arc<ModuleDescriptor>, module: Box<dyn Module>) -> Self {
        let metadata = module
            .metadata()
            .unwrap_or_else(|| descriptor.metadata.clone());
        Self {
            instance_id: generate_instance_id(),
            owner: owner.into(),
            descriptor,
            metadata,
            lifecycle: ModuleLifecycle::new(),
            module,
        }
    }

    /// 实例 ID
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// 所属者
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// 模块类型
    pub fn module_type(&self) -> &str {
        &self.descriptor.id
    }

    /// 模块描述
    pub fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    /// 展示信息
    pub fn metadata(&self) -> &ModuleMetadata {
        &self.metadata
    }

    /// 是否为不可变模块
    pub fn is_immutable(&self) -> bool {
        self.descriptor.immutable
    }

    /// 当前生命周期状态
    pub async fn state(&self) -> ModuleState {
        self.lifecycle.state().await
    }

    /// 生命周期记录
    pub async fn record(&self) -> LifecycleRecord {
        self.lifecycle.record().await
    }

    /// 启动实例
    pub async fn boot(&self) -> Result<bool> {
        self.lifecycle.boot(self.module_type(), self.module.as_ref()).await
    }

    /// 关闭实例
    pub async fn shutdown(&self) -> bool {
        self.lifecycle.shutdown(self.module_type(), self.module.as_ref()).await
    }
}

impl std::fmt::Debug for ModuleInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleInstance")
            .field("instance_id", &self.instance_id)
            .field("owner", &self.owner)
            .field("module_type", &self.descriptor.id)
            .field("metadata", &self.metadata)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Wallet;

    impl Module for Wallet {}

    struct Branded;

    impl Module for Branded {
        fn metadata(&self) -> Option<ModuleMetadata> {
            Some(ModuleMetadata::new("Branded", "9.9.9").author("carol"))
        }
    }

    #[tokio::test]
    async fn test_factory_table_construct() {
        let factory = FactoryTable::new()
            .with("wallet", |_| Ok(Box::new(Wallet) as Box<dyn Module>));

        assert!(factory.construct("wallet", "shop").await.is_ok());

        let err = factory.construct("bank", "shop").await.err().unwrap();
        assert!(matches!(err, CoreError::ModuleConstructionFailed { .. }));
    }

    #[tokio::test]
    async fn test_factory_receives_owner() {
        let factory = FactoryTable::new().with("wallet", |owner| {
            if owner == "banned" {
                Err(CoreError::construction("wallet", "所属者被禁用"))
            } else {
                Ok(Box::new(Wallet) as Box<dyn Module>)
            }
        });

        assert!(factory.construct("wallet", "shop").await.is_ok());
        assert!(factory.construct("wallet", "banned").await.is_err());
    }

    #[tokio::test]
    async fn test_instance_metadata_source() {
        let descriptor = Arc::new(
            ModuleDescriptor::new("wallet").with_metadata(ModuleMetadata::new("Wallet", "1.0.0")),
        );

        let plain = ModuleInstance::new("shop", descriptor.clone(), Box::new(Wallet));
        assert_eq!(plain.metadata().name, "Wallet");
        assert_eq!(plain.module_type(), "wallet");
        assert_eq!(plain.owner(), "shop");

        let branded = ModuleInstance::new("shop", descriptor, Box::new(Branded));
        assert_eq!(branded.metadata().version, "9.9.9");
        assert_ne!(plain.instance_id(), branded.instance_id());
    }

    #[tokio::test]
    async fn test_instance_lifecycle() {
        let instance = ModuleInstance::new(
            "shop",
            Arc::new(ModuleDescriptor::new("wallet")),
            Box::new(Wallet),
        );
        assert_eq!(instance.state().await, ModuleState::Unloaded);
        assert!(instance.boot().await.unwrap());
        assert_eq!(instance.state().await, ModuleState::Running);
        assert!(instance.shutdown().await);
        assert_eq!(instance.state().await, ModuleState::Shutdown);
    }
}
