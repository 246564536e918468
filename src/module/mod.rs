//! 模块编排
//!
//! 包含模块编排引擎的全部组件：
//! - 模块元数据和静态描述
//! - 描述表和依赖图
//! - 实例生命周期和构造设施
//! - 所属者上下文、生命周期事件和编排器

pub mod dependency;
pub mod events;
pub mod lifecycle;
pub mod manager;
pub mod metadata;
pub mod owner;
pub mod registry;
pub mod runtime;

// 重导出常用类型
pub use dependency::{DependencyGraph, DependencyGraphBuilder};
pub use events::{EventEnvelope, EventPublisher, LifecycleEvent};
pub use lifecycle::{LifecycleRecord, ModuleLifecycle};
pub use manager::ModuleOrchestrator;
pub use metadata::{ModuleDescriptor, ModuleMetadata, ModuleState};
pub use owner::{BootFailure, BootReport, FailureKind, OwnerContext, ShutdownReport};
pub use registry::{DescriptorRegistry, DescriptorRegistryBuilder};
pub use runtime::{FactoryTable, Module, ModuleFactory, ModuleInstance};
