//! 模块编排器
//!
//! 整合描述表、加载顺序构建器、所属者上下文和实例生命周期，提供统一的编排接口：
//! - 注册：把请求的模块类型展开进所属者的加载顺序
//! - 启动：按加载顺序构造并启用模块，失败时级联隔离依赖方
//! - 关闭：按依赖引用计数逐个关闭，或随所属者整体关闭
//!
//! 所属者表由 `RwLock` 保护，但从不跨越构造设施或模块钩子的调用持有。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument, warn};

use super::dependency::DependencyGraphBuilder;
use super::events::{EventPublisher, LifecycleEvent};
use super::metadata::ModuleState;
use super::owner::{BootFailure, BootReport, FailureKind, OwnerContext, ShutdownReport};
use super::registry::DescriptorRegistry;
use super::runtime::{ModuleFactory, ModuleInstance};
use crate::core::config::{CoreConfig, OwnerConfig};
use crate::utils::{error_code, CoreError, Result};

/// 启动流程中单个类型的处理决定
enum BootStep {
    Skip,
    Construct,
}

/// 模块编排器
///
/// 负责模块的整个编排过程，包括：
/// - 按所属者维护依赖优先的加载顺序
/// - 启动时的失败隔离
/// - 基于跨所属者引用计数的关闭
pub struct ModuleOrchestrator {
    /// 静态描述表
    registry: Arc<DescriptorRegistry>,
    /// 构造设施
    factory: Arc<dyn ModuleFactory>,
    /// 所属者 -> 上下文
    owners: Arc<RwLock<HashMap<String, OwnerContext>>>,
    /// 事件发布函数
    event_publisher: Option<EventPublisher>,
}

impl ModuleOrchestrator {
    /// 创建新的编排器
    pub fn new(registry: Arc<DescriptorRegistry>, factory: Arc<dyn ModuleFactory>) -> Self {
        Self {
            registry,
            factory,
            owners: Arc::new(RwLock::new(HashMap::new())),
            event_publisher: None,
        }
    }

    /// 从配置构建描述表并创建编排器
    ///
    /// 配置中的所属者注册计划不会自动执行，见 [`register_owners`](Self::register_owners)。
    pub fn from_config(config: &CoreConfig, factory: Arc<dyn ModuleFactory>) -> Result<Self> {
        let registry = DescriptorRegistry::from_config(config)?;
        Ok(Self::new(Arc::new(registry), factory))
    }

    /// 设置事件发布器
    pub fn set_event_publisher<F>(&mut self, publisher: F)
    where
        F: Fn(LifecycleEvent) -> futures::future::BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        self.event_publisher = Some(Arc::new(publisher));
    }

    /// 描述表
    pub fn registry(&self) -> &Arc<DescriptorRegistry> {
        &self.registry
    }

    // ==================== 注册 ====================

    /// 把请求的模块类型合并进所属者的加载顺序
    ///
    /// 所属者不存在时自动创建。返回合并后的完整加载顺序。
    ///
    /// # Errors
    ///
    /// 展开过程中发现循环依赖时返回 [`CoreError::CircularDependency`]，
    /// 此时所属者的加载顺序保持不变。
    #[instrument(skip(self, module_types))]
    pub async fn register<S: AsRef<str>>(&self, owner: &str, module_types: &[S]) -> Result<Vec<String>> {
        let (order, added) = {
            let mut owners = self.owners.write().await;
            let existing = owners
                .get(owner)
                .map(|ctx| ctx.load_order().to_vec())
                .unwrap_or_default();

            let order = match DependencyGraphBuilder::new(&self.registry).extend(&existing, module_types) {
                Ok(order) => order,
                Err(e) => {
                    error!(owner, error = %e, error_code = e.error_code(), "模块注册失败");
                    return Err(e);
                }
            };
            let added = order[existing.len()..].to_vec();

            owners
                .entry(owner.to_string())
                .or_insert_with(|| OwnerContext::new(owner))
                .set_load_order(order.clone());
            (order, added)
        };

        info!(owner, added = added.len(), total = order.len(), "模块已注册");
        if !added.is_empty() {
            self.publish_event(LifecycleEvent::Registered {
                owner: owner.to_string(),
                added,
            })
            .await;
        }

        Ok(order)
    }

    /// 按配置中的计划批量注册
    pub async fn register_owners(&self, plans: &[OwnerConfig]) -> Result<()> {
        for plan in plans {
            self.register(&plan.id, &plan.modules[..]).await?;
        }
        Ok(())
    }

    // ==================== 启动 ====================

    /// 按加载顺序启动所属者的模块
    ///
    /// 单个模块的构造失败只会让它和依赖它的模块进入无法加载集合，
    /// 启动流程本身不会中止。重复调用是幂等的：已加载的模块会被跳过。
    ///
    /// # Errors
    ///
    /// 所属者未注册时返回 [`CoreError::OwnerNotFound`]。
    #[instrument(skip(self))]
    pub async fn boot(&self, owner: &str) -> Result<BootReport> {
        let (order, pass_guard) = {
            let owners = self.owners.read().await;
            let ctx = owners
                .get(owner)
                .ok_or_else(|| CoreError::OwnerNotFound(owner.to_string()))?;
            (ctx.load_order().to_vec(), ctx.pass_guard())
        };
        let _pass = pass_guard.lock().await;

        info!(owner, count = order.len(), "开始启动模块");
        let mut report = BootReport::default();

        for module_type in &order {
            let mut events = Vec::new();
            let step = {
                let mut owners = self.owners.write().await;
                let ctx = owners
                    .get_mut(owner)
                    .ok_or_else(|| CoreError::OwnerNotFound(owner.to_string()))?;
                self.plan_step(ctx, module_type, &mut report, &mut events)
            };
            self.publish_events(events).await;

            if let BootStep::Construct = step {
                self.construct_and_boot(owner, module_type, &mut report).await?;
            }
        }

        info!(
            owner,
            booted = report.booted.len(),
            failed = report.failed.len(),
            contained = report.contained.len(),
            "模块启动流程结束"
        );
        Ok(report)
    }

    /// 决定单个类型在本轮启动中如何处理
    fn plan_step(
        &self,
        ctx: &mut OwnerContext,
        module_type: &str,
        report: &mut BootReport,
        events: &mut Vec<LifecycleEvent>,
    ) -> BootStep {
        let owner = ctx.owner().to_string();

        if let Some(cause) = ctx.blocked_cause(module_type).map(str::to_string) {
            if ctx.record_failure(module_type, FailureKind::Contained { cause: cause.clone() }) {
                warn!(owner = %owner, module_type, cause = %cause, "依赖无法加载，模块被隔离");
                report.contained.push(module_type.to_string());
                events.push(LifecycleEvent::Contained {
                    owner,
                    module_type: module_type.to_string(),
                    cause,
                });
            } else {
                debug!(owner = %owner, module_type, "模块在无法加载集合中，跳过");
            }
            return BootStep::Skip;
        }

        if ctx.is_loaded(module_type) {
            debug!(owner = %owner, module_type, "模块已加载，跳过");
            return BootStep::Skip;
        }

        let blocked_dependency = self
            .registry
            .dependencies_of(module_type)
            .iter()
            .find(|dep| ctx.is_blocked(dep))
            .cloned();
        if let Some(cause) = blocked_dependency {
            ctx.block(module_type, cause.clone());
            ctx.record_failure(module_type, FailureKind::Contained { cause: cause.clone() });
            warn!(owner = %owner, module_type, cause = %cause, "依赖无法加载，模块被隔离");
            report.contained.push(module_type.to_string());
            events.push(LifecycleEvent::Contained {
                owner,
                module_type: module_type.to_string(),
                cause,
            });
            return BootStep::Skip;
        }

        BootStep::Construct
    }

    async fn construct_and_boot(&self, owner: &str, module_type: &str, report: &mut BootReport) -> Result<()> {
        debug!(owner, module_type, "构造模块");
        let descriptor = self.registry.descriptor_or_default(module_type);

        let booted = match self.factory.construct(module_type, owner).await {
            Ok(module) => {
                let instance = Arc::new(ModuleInstance::new(owner, descriptor, module));
                instance.boot().await.map(|_| instance)
            }
            Err(e) => Err(e),
        };

        match booted {
            Ok(instance) => {
                let pushed = match self.owners.write().await.get_mut(owner) {
                    Some(ctx) => {
                        ctx.push_loaded(instance.clone());
                        true
                    }
                    None => false,
                };
                if !pushed {
                    warn!(owner, module_type, "启动期间所属者已被释放，关闭刚启动的实例");
                    instance.shutdown().await;
                    return Err(CoreError::OwnerNotFound(owner.to_string()));
                }
                report.booted.push(module_type.to_string());
                self.publish_event(LifecycleEvent::Booted {
                    owner: owner.to_string(),
                    module_type: module_type.to_string(),
                    instance_id: instance.instance_id().to_string(),
                })
                .await;
            }
            Err(e) => {
                let reason = match e {
                    CoreError::ModuleConstructionFailed { reason, .. } => reason,
                    other => other.to_string(),
                };
                error!(
                    owner,
                    module_type,
                    error = %reason,
                    error_code = error_code::MODULE_CONSTRUCTION_FAILED,
                    "模块构造失败"
                );

                let dependents = self.registry.transitive_dependents(module_type);
                {
                    let mut owners = self.owners.write().await;
                    let ctx = owners
                        .get_mut(owner)
                        .ok_or_else(|| CoreError::OwnerNotFound(owner.to_string()))?;
                    ctx.block(module_type, module_type);
                    ctx.record_failure(
                        module_type,
                        FailureKind::Construction {
                            reason: reason.clone(),
                        },
                    );
                    for dependent in &dependents {
                        ctx.block(dependent.as_str(), module_type);
                    }
                }
                if !dependents.is_empty() {
                    debug!(owner, module_type, ?dependents, "依赖方已加入无法加载集合");
                }

                report.failed.push(module_type.to_string());
                self.publish_event(LifecycleEvent::BootFailed {
                    owner: owner.to_string(),
                    module_type: module_type.to_string(),
                    reason,
                })
                .await;
            }
        }

        Ok(())
    }

    // ==================== 关闭 ====================

    /// 按类型单独关闭一个模块
    ///
    /// 先按依赖引用计数关闭只被它使用的依赖，再关闭它本身。
    ///
    /// # Errors
    ///
    /// - [`CoreError::ImmutableShutdown`] - 不可变模块
    /// - [`CoreError::OwnerNotFound`] / [`CoreError::ModuleNotLoaded`] - 找不到实例
    /// - [`CoreError::ModuleHasDependents`] - 仍被其他已加载实例依赖
    #[instrument(skip(self))]
    pub async fn shutdown_module(&self, owner: &str, module_type: &str) -> Result<ShutdownReport> {
        if self.registry.is_immutable(module_type) {
            warn!(owner, module_type, "拒绝单独关闭不可变模块");
            return Err(CoreError::ImmutableShutdown(module_type.to_string()));
        }

        let instance = {
            let owners = self.owners.read().await;
            let ctx = owners
                .get(owner)
                .ok_or_else(|| CoreError::OwnerNotFound(owner.to_string()))?;
            ctx.find_loaded(module_type)
                .ok_or_else(|| CoreError::ModuleNotLoaded {
                    owner: owner.to_string(),
                    module_type: module_type.to_string(),
                })?
        };

        self.shutdown_instance(owner, &instance).await
    }

    /// 单独关闭一个实例
    ///
    /// 实例已不在已加载列表中（例如已随依赖方一起被关闭）时，只记录警告并返回空报告。
    ///
    /// # Errors
    ///
    /// - [`CoreError::ImmutableShutdown`] - 不可变模块
    /// - [`CoreError::OwnerNotFound`] - 所属者未注册
    /// - [`CoreError::ModuleNotLoaded`] - 实例属于其他所属者
    /// - [`CoreError::ModuleHasDependents`] - 仍被其他已加载实例依赖
    #[instrument(skip(self, instance), fields(module_type = instance.module_type()))]
    pub async fn shutdown_instance(&self, owner: &str, instance: &Arc<ModuleInstance>) -> Result<ShutdownReport> {
        let module_type = instance.module_type();
        if instance.is_immutable() {
            warn!(owner, module_type, "拒绝单独关闭不可变模块");
            return Err(CoreError::ImmutableShutdown(module_type.to_string()));
        }

        if instance.owner() != owner {
            warn!(owner, module_type, actual_owner = instance.owner(), "实例不属于该所属者");
            return Err(CoreError::ModuleNotLoaded {
                owner: owner.to_string(),
                module_type: module_type.to_string(),
            });
        }

        let still_loaded = {
            let owners = self.owners.read().await;
            let ctx = owners
                .get(owner)
                .ok_or_else(|| CoreError::OwnerNotFound(owner.to_string()))?;
            ctx.loaded()
                .iter()
                .any(|i| i.instance_id() == instance.instance_id())
        };
        if !still_loaded {
            warn!(owner, module_type, "实例不在已加载列表中，忽略关闭请求");
            return Ok(ShutdownReport::default());
        }

        let dependents = self.depended_by(module_type).await;
        if dependents > 0 {
            warn!(owner, module_type, depended_by = dependents, "模块仍被依赖，拒绝关闭");
            return Err(CoreError::ModuleHasDependents {
                module: module_type.to_string(),
                dependents,
            });
        }

        let mut report = ShutdownReport::default();
        self.shutdown_walk(owner, instance.clone(), &mut report).await;
        report.normalize();
        Ok(report)
    }

    /// 关闭所属者的全部模块并释放其上下文
    ///
    /// 按启动顺序的逆序逐个关闭，顶层不检查引用计数。不可变模块在遍历中
    /// 只记录警告，遍历结束后统一收尾。
    #[instrument(skip(self))]
    pub async fn shutdown_owner(&self, owner: &str) -> Result<ShutdownReport> {
        let pass_guard = {
            let owners = self.owners.read().await;
            owners
                .get(owner)
                .ok_or_else(|| CoreError::OwnerNotFound(owner.to_string()))?
                .pass_guard()
        };
        let _pass = pass_guard.lock().await;

        let loaded = self.loaded_instances(owner).await;
        info!(owner, count = loaded.len(), "开始关闭所属者的全部模块");

        let mut report = ShutdownReport::default();
        for instance in loaded.iter().rev() {
            if instance.is_immutable() {
                warn!(
                    owner,
                    module_type = instance.module_type(),
                    error_code = error_code::MODULE_IMMUTABLE,
                    "不可变模块将在所属者释放时收尾"
                );
                report.skipped_immutable.push(instance.module_type().to_string());
                continue;
            }
            if !self.is_still_loaded(owner, instance.instance_id()).await {
                continue;
            }
            self.shutdown_walk(owner, instance.clone(), &mut report).await;
        }

        for instance in self.loaded_instances(owner).await.iter().rev() {
            debug!(owner, module_type = instance.module_type(), "收尾剩余模块");
            self.stop_instance(owner, instance, &mut report).await;
        }

        self.owners.write().await.remove(owner);
        report.normalize();
        info!(owner, shut_down = report.shut_down.len(), "所属者已释放");
        self.publish_event(LifecycleEvent::OwnerReleased {
            owner: owner.to_string(),
        })
        .await;

        Ok(report)
    }

    /// 后序遍历依赖并关闭：依赖先于依赖方关闭
    ///
    /// 只有引用计数小于 2（即只被当前路径上的父节点使用）的依赖才会被关闭。
    /// 节点只在入栈时记为已访问，被保留的依赖可以在其他父节点下重新评估。
    async fn shutdown_walk(&self, owner: &str, root: Arc<ModuleInstance>, report: &mut ShutdownReport) {
        let mut visited: HashSet<String> = HashSet::from([root.module_type().to_string()]);
        let mut stack: Vec<(Arc<ModuleInstance>, usize)> = vec![(root, 0)];

        loop {
            let next = match stack.last_mut() {
                None => break,
                Some((instance, cursor)) => {
                    let dep = self
                        .registry
                        .dependencies_of(instance.module_type())
                        .get(*cursor)
                        .cloned();
                    *cursor += 1;
                    dep
                }
            };

            let Some(dependency) = next else {
                if let Some((instance, _)) = stack.pop() {
                    self.stop_instance(owner, &instance, report).await;
                }
                continue;
            };

            if visited.contains(&dependency) {
                continue;
            }

            if self.registry.is_immutable(&dependency) {
                warn!(owner, module_type = %dependency, "依赖为不可变模块，保持运行");
                report.skipped_immutable.push(dependency);
                continue;
            }

            let dep_instance = match self.instance(owner, &dependency).await {
                Some(instance) => instance,
                None => {
                    let err = CoreError::DependencyNotLoaded {
                        owner: owner.to_string(),
                        module_type: dependency.clone(),
                    };
                    warn!(owner, module_type = %dependency, error = %err, error_code = err.error_code(), "依赖未加载");
                    report.missing.push(dependency);
                    continue;
                }
            };

            let users = self.depended_by(&dependency).await;
            if users < 2 {
                visited.insert(dependency);
                stack.push((dep_instance, 0));
            } else {
                debug!(owner, module_type = %dependency, depended_by = users, "依赖仍在使用中，保留");
                report.retained.push(dependency);
            }
        }
    }

    async fn stop_instance(&self, owner: &str, instance: &Arc<ModuleInstance>, report: &mut ShutdownReport) {
        let transitioned = instance.shutdown().await;

        if let Some(ctx) = self.owners.write().await.get_mut(owner) {
            ctx.remove_loaded(instance.instance_id());
        }

        if transitioned {
            report.shut_down.push(instance.module_type().to_string());
            self.publish_event(LifecycleEvent::ShutDown {
                owner: owner.to_string(),
                module_type: instance.module_type().to_string(),
                instance_id: instance.instance_id().to_string(),
            })
            .await;
        }
    }

    // ==================== 查询 ====================

    /// 所有所属者中直接依赖 `module_type` 的已加载实例数
    pub async fn depended_by(&self, module_type: &str) -> usize {
        let owners = self.owners.read().await;
        owners
            .values()
            .flat_map(|ctx| ctx.loaded().iter())
            .filter(|instance| instance.descriptor().depends_on_type(module_type))
            .count()
    }

    /// 所属者的加载顺序，未注册时为空
    pub async fn load_order(&self, owner: &str) -> Vec<String> {
        self.owners
            .read()
            .await
            .get(owner)
            .map(|ctx| ctx.load_order().to_vec())
            .unwrap_or_default()
    }

    /// 已加载的模块类型，按启动顺序
    pub async fn loaded_modules(&self, owner: &str) -> Vec<String> {
        self.loaded_instances(owner)
            .await
            .iter()
            .map(|i| i.module_type().to_string())
            .collect()
    }

    /// 已加载实例
    pub async fn instance(&self, owner: &str, module_type: &str) -> Option<Arc<ModuleInstance>> {
        self.owners
            .read()
            .await
            .get(owner)
            .and_then(|ctx| ctx.find_loaded(module_type))
    }

    /// 已加载实例的状态
    pub async fn module_state(&self, owner: &str, module_type: &str) -> Option<ModuleState> {
        let instance = self.instance(owner, module_type).await?;
        Some(instance.state().await)
    }

    /// 无法加载集合
    pub async fn cannot_load(&self, owner: &str) -> Vec<String> {
        self.owners
            .read()
            .await
            .get(owner)
            .map(OwnerContext::cannot_load)
            .unwrap_or_default()
    }

    /// 失败日志
    pub async fn failures(&self, owner: &str) -> Vec<BootFailure> {
        self.owners
            .read()
            .await
            .get(owner)
            .map(|ctx| ctx.failures().to_vec())
            .unwrap_or_default()
    }

    /// 已注册的所属者，已排序
    pub async fn owners(&self) -> Vec<String> {
        let mut owners: Vec<String> = self.owners.read().await.keys().cloned().collect();
        owners.sort();
        owners
    }

    async fn loaded_instances(&self, owner: &str) -> Vec<Arc<ModuleInstance>> {
        self.owners
            .read()
            .await
            .get(owner)
            .map(|ctx| ctx.loaded().to_vec())
            .unwrap_or_default()
    }

    async fn is_still_loaded(&self, owner: &str, instance_id: &str) -> bool {
        self.owners
            .read()
            .await
            .get(owner)
            .map(|ctx| ctx.loaded().iter().any(|i| i.instance_id() == instance_id))
            .unwrap_or(false)
    }

    // ==================== 事件 ====================

    async fn publish_event(&self, event: LifecycleEvent) {
        if let Some(ref publisher) = self.event_publisher {
            publisher(event).await;
        }
    }

    async fn publish_events(&self, events: Vec<LifecycleEvent>) {
        for event in events {
            self.publish_event(event).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::metadata::ModuleDescriptor;
    use crate::module::runtime::{FactoryTable, Module};

    struct Noop;

    impl Module for Noop {}

    fn orchestrator(descriptors: Vec<ModuleDescriptor>, failing: &[&str]) -> ModuleOrchestrator {
        let registry = DescriptorRegistry::builder()
            .manager_namespace("manager.")
            .descriptors(descriptors.clone())
            .build()
            .unwrap();

        let mut factory = FactoryTable::new();
        for descriptor in &descriptors {
            let fail = failing.contains(&descriptor.id.as_str());
            let id = descriptor.id.clone();
            factory.insert(descriptor.id.clone(), move |_owner| {
                if fail {
                    Err(CoreError::construction(&id, "模拟构造失败"))
                } else {
                    Ok(Box::new(Noop) as Box<dyn Module>)
                }
            });
        }

        ModuleOrchestrator::new(Arc::new(registry), Arc::new(factory))
    }

    #[tokio::test]
    async fn test_register_creates_owner() {
        let orch = orchestrator(
            vec![
                ModuleDescriptor::new("a"),
                ModuleDescriptor::new("b").depends_on("a"),
            ],
            &[],
        );

        let order = orch.register("p", &["b"]).await.unwrap();
        assert_eq!(order, vec!["a", "b"]);
        assert_eq!(orch.owners().await, vec!["p"]);
        assert_eq!(orch.load_order("p").await, vec!["a", "b"]);
        assert!(orch.load_order("nobody").await.is_empty());
    }

    #[tokio::test]
    async fn test_register_cycle_leaves_owner_untouched() {
        let orch = orchestrator(
            vec![
                ModuleDescriptor::new("x"),
                ModuleDescriptor::new("a").depends_on("b"),
                ModuleDescriptor::new("b").depends_on("a"),
            ],
            &[],
        );

        orch.register("p", &["x"]).await.unwrap();
        let err = orch.register("p", &["a"]).await.unwrap_err();
        assert!(matches!(err, CoreError::CircularDependency(_)));
        assert_eq!(orch.load_order("p").await, vec!["x"]);

        assert!(orch.register("q", &["b"]).await.is_err());
        assert_eq!(orch.owners().await, vec!["p"]);
    }

    #[tokio::test]
    async fn test_boot_unknown_owner() {
        let orch = orchestrator(vec![], &[]);
        assert!(matches!(
            orch.boot("ghost").await,
            Err(CoreError::OwnerNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_boot_is_idempotent() {
        let orch = orchestrator(
            vec![
                ModuleDescriptor::new("a"),
                ModuleDescriptor::new("b").depends_on("a"),
            ],
            &[],
        );
        orch.register("p", &["b"]).await.unwrap();

        let first = orch.boot("p").await.unwrap();
        assert_eq!(first.booted, vec!["a", "b"]);
        assert!(first.is_clean());

        let second = orch.boot("p").await.unwrap();
        assert!(second.booted.is_empty());
        assert_eq!(orch.loaded_modules("p").await, vec!["a", "b"]);
        assert_eq!(orch.module_state("p", "b").await, Some(ModuleState::Running));
    }

    #[tokio::test]
    async fn test_unknown_factory_type_is_contained() {
        let registry = DescriptorRegistry::builder()
            .descriptor(ModuleDescriptor::new("a"))
            .descriptor(ModuleDescriptor::new("b").depends_on("a"))
            .build()
            .unwrap();
        let orch = ModuleOrchestrator::new(Arc::new(registry), Arc::new(FactoryTable::new()));
        orch.register("p", &["b"]).await.unwrap();

        let report = orch.boot("p").await.unwrap();
        assert_eq!(report.failed, vec!["a"]);
        assert_eq!(report.contained, vec!["b"]);
        assert_eq!(orch.cannot_load("p").await, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_shutdown_module_errors() {
        let orch = orchestrator(
            vec![
                ModuleDescriptor::new("a"),
                ModuleDescriptor::new("b").depends_on("a"),
                ModuleDescriptor::new("perm").immutable(),
            ],
            &[],
        );
        orch.register("p", &["b", "perm"]).await.unwrap();
        orch.boot("p").await.unwrap();

        assert!(matches!(
            orch.shutdown_module("p", "perm").await,
            Err(CoreError::ImmutableShutdown(_))
        ));
        assert!(matches!(
            orch.shutdown_module("p", "a").await,
            Err(CoreError::ModuleHasDependents { dependents: 1, .. })
        ));
        assert!(matches!(
            orch.shutdown_module("q", "a").await,
            Err(CoreError::OwnerNotFound(_))
        ));
        assert_eq!(orch.loaded_modules("p").await, vec!["a", "b", "perm"]);

        let report = orch.shutdown_module("p", "b").await.unwrap();
        assert_eq!(report.shut_down, vec!["a", "b"]);
        assert!(matches!(
            orch.shutdown_module("p", "b").await,
            Err(CoreError::ModuleNotLoaded { .. })
        ));
    }

    #[tokio::test]
    async fn test_shutdown_owner_discards_context() {
        let orch = orchestrator(
            vec![
                ModuleDescriptor::new("a"),
                ModuleDescriptor::new("perm").immutable(),
                ModuleDescriptor::new("b").with_dependencies(["a", "perm"]),
            ],
            &[],
        );
        orch.register("p", &["b"]).await.unwrap();
        orch.boot("p").await.unwrap();

        let report = orch.shutdown_owner("p").await.unwrap();
        assert_eq!(report.shut_down, vec!["a", "b", "perm"]);
        assert_eq!(report.skipped_immutable, vec!["perm"]);
        assert!(orch.owners().await.is_empty());
        assert_eq!(orch.depended_by("a").await, 0);
    }

    #[tokio::test]
    async fn test_missing_dependency_is_reported() {
        let orch = orchestrator(
            vec![
                ModuleDescriptor::new("a"),
                ModuleDescriptor::new("b").depends_on("a"),
            ],
            &[],
        );
        orch.register("p", &["b"]).await.unwrap();
        orch.boot("p").await.unwrap();

        let a = orch.instance("p", "a").await.unwrap();
        orch.owners
            .write()
            .await
            .get_mut("p")
            .unwrap()
            .remove_loaded(a.instance_id());

        let report = orch.shutdown_module("p", "b").await.unwrap();
        assert_eq!(report.shut_down, vec!["b"]);
        assert_eq!(report.missing, vec!["a"]);
    }
}
