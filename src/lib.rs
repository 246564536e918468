//! # Chips ModKit - 模块编排引擎
//!
//! 宿主应用登记一组可选的功能单元（模块），每个模块静态声明它依赖的其他模块，
//! 引擎负责：
//!
//! - **依赖展开**: 按所属者把请求的模块展开为依赖优先的加载顺序，注册时检测循环依赖
//! - **失败隔离**: 模块构造失败时，它和所有传递依赖它的模块被加入无法加载集合，启动流程继续
//! - **引用计数关闭**: 跨所属者统计依赖关系，只关闭不再被使用的依赖
//! - **不可变模块**: 只能随所属者整体关闭
//!
//! ## 快速开始
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chips_modkit::{DescriptorRegistry, FactoryTable, Module, ModuleDescriptor, ModuleOrchestrator};
//!
//! struct Storage;
//! impl Module for Storage {}
//!
//! struct Economy;
//! impl Module for Economy {}
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = DescriptorRegistry::builder()
//!         .descriptor(ModuleDescriptor::new("storage"))
//!         .descriptor(ModuleDescriptor::new("economy").depends_on("storage"))
//!         .build()?;
//!
//!     let factory = FactoryTable::new()
//!         .with("storage", |_| Ok(Box::new(Storage) as Box<dyn Module>))
//!         .with("economy", |_| Ok(Box::new(Economy) as Box<dyn Module>));
//!
//!     let orchestrator = ModuleOrchestrator::new(Arc::new(registry), Arc::new(factory));
//!     orchestrator.register("shop-plugin", &["economy"]).await?;
//!
//!     let report = orchestrator.boot("shop-plugin").await?;
//!     assert_eq!(report.booted, vec!["storage", "economy"]);
//!
//!     orchestrator.shutdown_owner("shop-plugin").await?;
//!     Ok(())
//! }
//! ```
//!
//! ## 模块结构
//!
//! - `module` - 描述表、依赖图、生命周期和编排器
//! - `core` - 引擎配置
//! - `utils` - 错误类型、ID 生成和日志系统

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod core;
pub mod module;
pub mod utils;

// 重导出常用类型，方便使用
pub use module::{
    BootFailure, BootReport, DescriptorRegistry, FactoryTable, FailureKind, LifecycleEvent, Module,
    ModuleDescriptor, ModuleFactory, ModuleInstance, ModuleMetadata, ModuleOrchestrator,
    ModuleState, ShutdownReport,
};

pub use utils::{error_code, generate_uuid, CoreError, Result};
pub use utils::logger::{LogGuard, Logger, LoggerConfig, LoggerConfigBuilder, RotationStrategy};

pub use core::config::{CoreConfig, CoreConfigBuilder, EngineConfig, LogConfig, OwnerConfig};

/// 库版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
