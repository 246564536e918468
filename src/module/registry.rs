//! 模块描述表
//!
//! 进程启动时一次性构建的静态表：模块类型 -> 依赖集合 + 不可变标记。
//! 构建完成后只读，编排器通过 `Arc` 共享它。

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::core::config::CoreConfig;
use crate::module::dependency::DependencyGraph;
use crate::module::metadata::ModuleDescriptor;
use crate::utils::{CoreError, Result};

/// 模块描述表
///
/// 内部维护一份剔除了管理器命名空间类型的有效依赖图，
/// 依赖展开、级联隔离和环检测都基于这份图完成。
#[derive(Debug, Default)]
pub struct DescriptorRegistry {
    /// 模块类型 -> 描述
    descriptors: HashMap<String, Arc<ModuleDescriptor>>,
    /// 管理器命名空间前缀
    manager_namespaces: Vec<String>,
    /// 有效依赖图
    graph: DependencyGraph,
}

impl DescriptorRegistry {
    /// 创建描述表构建器
    pub fn builder() -> DescriptorRegistryBuilder {
        DescriptorRegistryBuilder::default()
    }

    /// 从配置中的静态描述表构建
    pub fn from_config(config: &CoreConfig) -> Result<Self> {
        let mut builder = Self::builder()
            .descriptors(config.modules.iter().cloned())
            .strict(config.engine.strict_validation);
        for prefix in &config.engine.manager_namespaces {
            builder = builder.manager_namespace(prefix.clone());
        }
        builder.build()
    }

    /// 获取模块描述
    pub fn get(&self, module_type: &str) -> Option<Arc<ModuleDescriptor>> {
        self.descriptors.get(module_type).cloned()
    }

    /// 获取模块描述，未声明的类型返回一个无依赖的默认描述
    pub fn descriptor_or_default(&self, module_type: &str) -> Arc<ModuleDescriptor> {
        self.get(module_type)
            .unwrap_or_else(|| Arc::new(ModuleDescriptor::new(module_type)))
    }

    /// 是否声明了该模块类型
    pub fn contains(&self, module_type: &str) -> bool {
        self.descriptors.contains_key(module_type)
    }

    /// 是否为不可变模块
    pub fn is_immutable(&self, module_type: &str) -> bool {
        self.descriptors
            .get(module_type)
            .map(|d| d.immutable)
            .unwrap_or(false)
    }

    /// 是否属于管理器/基础设施命名空间
    pub fn is_manager_type(&self, module_type: &str) -> bool {
        self.manager_namespaces
            .iter()
            .any(|prefix| module_type.starts_with(prefix.as_str()))
    }

    /// 有效直接依赖（不含管理器类型）
    pub fn dependencies_of(&self, module_type: &str) -> &[String] {
        self.graph.get_dependencies(module_type)
    }

    /// 所有传递依赖于 `module_type` 的已声明类型
    pub fn transitive_dependents(&self, module_type: &str) -> Vec<String> {
        self.graph.get_all_dependents(module_type)
    }

    /// 查找描述表中的循环依赖
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        self.graph.find_cycle()
    }

    /// 依赖了但从未声明的模块类型，已排序
    pub fn undeclared_dependencies(&self) -> Vec<String> {
        let mut missing: Vec<String> = self
            .descriptors
            .values()
            .flat_map(|d| self.dependencies_of(&d.id).iter())
            .filter(|dep| !self.contains(dep))
            .cloned()
            .collect();
        missing.sort();
        missing.dedup();
        missing
    }

    /// 严格校验描述表
    ///
    /// # Errors
    ///
    /// - [`CoreError::CircularDependency`] - 存在循环依赖
    /// - [`CoreError::InvalidDescriptor`] - 存在未声明的依赖
    pub fn validate(&self) -> Result<()> {
        if let Some(cycle) = self.find_cycle() {
            return Err(CoreError::CircularDependency(cycle.join(" -> ")));
        }

        let missing = self.undeclared_dependencies();
        if !missing.is_empty() {
            return Err(CoreError::InvalidDescriptor(format!(
                "依赖了未声明的模块类型: {}",
                missing.join(", ")
            )));
        }

        Ok(())
    }

    /// 所有已声明的模块类型，已排序
    pub fn module_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.descriptors.keys().cloned().collect();
        types.sort();
        types
    }

    /// 已声明的模块数量
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// 描述表是否为空
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// 有效依赖图
    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }
}

/// 描述表构建器
#[derive(Debug, Default)]
pub struct DescriptorRegistryBuilder {
    descriptors: Vec<ModuleDescriptor>,
    manager_namespaces: Vec<String>,
    strict: bool,
}

impl DescriptorRegistryBuilder {
    /// 登记一个模块描述
    pub fn descriptor(mut self, descriptor: ModuleDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    /// 批量登记模块描述
    pub fn descriptors(mut self, descriptors: impl IntoIterator<Item = ModuleDescriptor>) -> Self {
        self.descriptors.extend(descriptors);
        self
    }

    /// 添加管理器命名空间前缀
    pub fn manager_namespace(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        if !prefix.is_empty() && !self.manager_namespaces.contains(&prefix) {
            self.manager_namespaces.push(prefix);
        }
        self
    }

    /// 严格模式下，循环依赖和未声明的依赖会让 `build` 失败
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// 构建描述表
    ///
    /// # Errors
    ///
    /// - 模块类型为空或重复声明时返回 [`CoreError::InvalidDescriptor`]
    /// - 严格模式下见 [`DescriptorRegistry::validate`]
    pub fn build(self) -> Result<DescriptorRegistry> {
        let mut registry = DescriptorRegistry {
            descriptors: HashMap::with_capacity(self.descriptors.len()),
            manager_namespaces: self.manager_namespaces,
            graph: DependencyGraph::new(),
        };

        for mut descriptor in self.descriptors {
            if descriptor.id.trim().is_empty() {
                return Err(CoreError::InvalidDescriptor("模块类型不能为空".to_string()));
            }
            if registry.descriptors.contains_key(&descriptor.id) {
                return Err(CoreError::InvalidDescriptor(format!(
                    "模块类型 '{}' 重复声明",
                    descriptor.id
                )));
            }

            descriptor.normalize();
            registry.graph.add_module(&descriptor.id);
            for dep in &descriptor.dependencies {
                if registry.is_manager_type(dep) {
                    debug!(module_type = %descriptor.id, dependency = %dep, "忽略管理器命名空间依赖");
                    continue;
                }
                registry.graph.add_dependency(&descriptor.id, dep);
            }

            registry
                .descriptors
                .insert(descriptor.id.clone(), Arc::new(descriptor));
        }

        if self.strict {
            registry.validate()?;
        } else {
            if let Some(cycle) = registry.find_cycle() {
                warn!(cycle = %cycle.join(" -> "), "描述表中存在循环依赖，注册相关模块时将失败");
            }
            let missing = registry.undeclared_dependencies();
            if !missing.is_empty() {
                debug!(?missing, "存在未声明的依赖，它们将按无依赖模块处理");
            }
        }

        info!(count = registry.len(), "模块描述表构建完成");
        Ok(registry)
    }
}
