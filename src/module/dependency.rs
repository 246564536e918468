//! 模块依赖管理
//!
//! 本模块提供模块依赖关系的图结构，以及按所属者展开加载顺序的构建器。
//!
//! # 主要组件
//!
//! - [`DependencyGraph`] - 依赖关系图，记录正向/反向边，支持环检测和传递闭包查询
//! - [`DependencyGraphBuilder`] - 把请求的模块类型展开为依赖优先的加载顺序
//!
//! 所有遍历都使用显式栈完成，畸形的依赖声明只会得到一个错误，而不会耗尽调用栈。
//!
//! # 示例
//!
//! ```rust
//! use chips_modkit::module::dependency::DependencyGraph;
//!
//! let mut graph = DependencyGraph::new();
//! graph.add_dependency("economy", "storage");
//!
//! assert_eq!(graph.get_dependencies("economy"), ["storage".to_string()]);
//! assert_eq!(graph.get_dependents("storage"), ["economy".to_string()]);
//! assert!(!graph.has_cycle());
//! ```

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::{debug, trace};

use crate::module::registry::DescriptorRegistry;
use crate::utils::{CoreError, Result};

/// 模块依赖关系图
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// 正向边：模块类型 -> 该模块依赖的类型
    edges: HashMap<String, Vec<String>>,
    /// 反向边：模块类型 -> 依赖该模块的类型
    reverse_edges: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    /// 创建一个空的依赖图
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加模块节点，已存在时不做任何事
    pub fn add_module(&mut self, module_type: &str) {
        self.edges.entry(module_type.to_string()).or_default();
        self.reverse_edges.entry(module_type.to_string()).or_default();
    }

    /// 添加依赖关系：`module_type` 依赖 `dependency`
    ///
    /// 两端节点不存在时自动添加，重复的边会被忽略。
    pub fn add_dependency(&mut self, module_type: &str, dependency: &str) {
        self.add_module(module_type);
        self.add_module(dependency);

        let deps = self.edges.entry(module_type.to_string()).or_default();
        if !deps.iter().any(|d| d == dependency) {
            deps.push(dependency.to_string());
        }

        let dependents = self.reverse_edges.entry(dependency.to_string()).or_default();
        if !dependents.iter().any(|d| d == module_type) {
            dependents.push(module_type.to_string());
        }
    }

    /// 直接依赖，保持声明顺序
    pub fn get_dependencies(&self, module_type: &str) -> &[String] {
        self.edges.get(module_type).map(Vec::as_slice).unwrap_or(&[])
    }

    /// 直接依赖方
    pub fn get_dependents(&self, module_type: &str) -> &[String] {
        self.reverse_edges
            .get(module_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// 所有传递依赖，按依赖优先的顺序返回（不含自身）
    pub fn get_all_dependencies(&self, module_type: &str) -> Vec<String> {
        let mut result = Vec::new();
        let mut visited: HashSet<&str> = HashSet::from([module_type]);
        let mut stack: Vec<(&str, usize)> = vec![(module_type, 0)];

        while let Some((current, cursor)) = stack.last_mut() {
            let next = self.get_dependencies(current).get(*cursor);
            *cursor += 1;
            match next {
                Some(dep) => {
                    if visited.insert(dep.as_str()) {
                        stack.push((dep.as_str(), 0));
                    }
                }
                None => {
                    if let Some((done, _)) = stack.pop() {
                        if done != module_type {
                            result.push(done.to_string());
                        }
                    }
                }
            }
        }

        result
    }

    /// 所有传递依赖方（不含自身），按广度优先的发现顺序返回
    pub fn get_all_dependents(&self, module_type: &str) -> Vec<String> {
        let mut result = Vec::new();
        let mut visited: HashSet<&str> = HashSet::from([module_type]);
        let mut queue: VecDeque<&str> = VecDeque::from([module_type]);

        while let Some(current) = queue.pop_front() {
            for dependent in self.get_dependents(current) {
                if visited.insert(dependent.as_str()) {
                    result.push(dependent.clone());
                    queue.push_back(dependent.as_str());
                }
            }
        }

        result
    }

    /// 是否存在循环依赖
    pub fn has_cycle(&self) -> bool {
        self.find_cycle().is_some()
    }

    /// 查找一条循环依赖路径
    ///
    /// 返回的路径首尾相同，例如 `["a", "b", "a"]`。为了结果稳定，按类型名排序后依次作为起点。
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let mut roots: Vec<&String> = self.edges.keys().collect();
        roots.sort();

        let mut finished: HashSet<&str> = HashSet::new();
        for root in roots {
            if finished.contains(root.as_str()) {
                continue;
            }

            let mut path: Vec<(&str, usize)> = vec![(root.as_str(), 0)];
            let mut on_path: HashSet<&str> = HashSet::from([root.as_str()]);

            while let Some((current, cursor)) = path.last_mut() {
                let next = self.get_dependencies(current).get(*cursor);
                *cursor += 1;
                match next {
                    Some(dep) if on_path.contains(dep.as_str()) => {
                        return Some(cycle_path(path.iter().map(|(n, _)| *n), dep));
                    }
                    Some(dep) if !finished.contains(dep.as_str()) => {
                        on_path.insert(dep.as_str());
                        path.push((dep.as_str(), 0));
                    }
                    Some(_) => {}
                    None => {
                        if let Some((done, _)) = path.pop() {
                            on_path.remove(done);
                            finished.insert(done);
                        }
                    }
                }
            }
        }

        None
    }

    /// 是否包含指定模块
    pub fn contains_module(&self, module_type: &str) -> bool {
        self.edges.contains_key(module_type)
    }

    /// 模块数量
    pub fn module_count(&self) -> usize {
        self.edges.len()
    }

    /// 图是否为空
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

/// 从路径中截取以 `repeated` 开始的环，并在末尾闭合
fn cycle_path<'a>(path: impl Iterator<Item = &'a str>, repeated: &str) -> Vec<String> {
    let mut cycle: Vec<String> = path
        .skip_while(|n| *n != repeated)
        .map(str::to_string)
        .collect();
    cycle.push(repeated.to_string());
    cycle
}

/// 加载顺序构建器
///
/// 针对单个所属者，把请求的模块类型展开为完整的传递闭包：依赖总是先于依赖方出现，
/// 管理器命名空间中的类型被跳过，未在描述表中声明的类型只展开为自身。
pub struct DependencyGraphBuilder<'a> {
    registry: &'a DescriptorRegistry,
}

impl<'a> DependencyGraphBuilder<'a> {
    /// 基于描述表创建构建器
    pub fn new(registry: &'a DescriptorRegistry) -> Self {
        Self { registry }
    }

    /// 展开单个模块类型的加载顺序
    pub fn expand(&self, module_type: &str) -> Result<Vec<String>> {
        self.extend(&[], &[module_type])
    }

    /// 在已有加载顺序之后合并新请求的模块类型
    ///
    /// 已有条目保持原位且不会重复出现；新类型按请求顺序展开后追加到末尾。
    ///
    /// # Errors
    ///
    /// 展开路径上出现重复访问时返回 [`CoreError::CircularDependency`]，此时不产生任何部分结果。
    pub fn extend<S: AsRef<str>>(&self, existing: &[String], requested: &[S]) -> Result<Vec<String>> {
        let mut order: Vec<String> = existing.to_vec();
        let mut placed: HashSet<String> = existing.iter().cloned().collect();

        for module_type in requested {
            let module_type = module_type.as_ref();
            if placed.contains(module_type) {
                trace!(module_type, "已在加载顺序中，跳过");
                continue;
            }
            self.expand_into(module_type, &mut order, &mut placed)?;
        }

        debug!(
            added = order.len() - existing.len(),
            total = order.len(),
            "加载顺序展开完成"
        );
        Ok(order)
    }

    fn expand_into(
        &self,
        root: &str,
        order: &mut Vec<String>,
        placed: &mut HashSet<String>,
    ) -> Result<()> {
        let mut stack: Vec<(String, usize)> = vec![(root.to_string(), 0)];
        let mut on_path: HashSet<String> = HashSet::from([root.to_string()]);

        while let Some((current, cursor)) = stack.last_mut() {
            let next = self
                .registry
                .dependencies_of(current.as_str())
                .get(*cursor)
                .cloned();
            *cursor += 1;

            match next {
                Some(dep) => {
                    if placed.contains(&dep) {
                        continue;
                    }
                    if on_path.contains(&dep) {
                        let cycle = cycle_path(stack.iter().map(|(n, _)| n.as_str()), &dep);
                        return Err(CoreError::CircularDependency(cycle.join(" -> ")));
                    }
                    on_path.insert(dep.clone());
                    stack.push((dep, 0));
                }
                None => {
                    if let Some((done, _)) = stack.pop() {
                        on_path.remove(&done);
                        placed.insert(done.clone());
                        order.push(done);
                    }
                }
            }
        }

        Ok(())
    }
}
