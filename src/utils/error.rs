//! 模块编排引擎错误类型定义
//!
//! 本模块定义了引擎中使用的所有错误类型。
//!
//! 传播策略：单个模块的失败（构造失败、依赖缺失）都在模块粒度被隔离，
//! 只有依赖图构建错误（循环依赖）会上报给 `register` 的调用方。

use thiserror::Error;

/// 引擎核心错误类型
#[derive(Error, Debug)]
pub enum CoreError {
    // ==================== 依赖图错误 ====================

    /// 循环依赖
    #[error("检测到循环依赖: {0}")]
    CircularDependency(String),

    /// 无效的模块描述
    #[error("无效的模块描述: {0}")]
    InvalidDescriptor(String),

    // ==================== 模块生命周期错误 ====================

    /// 模块构造或启用失败
    #[error("模块构造失败: '{module_type}' - {reason}")]
    ModuleConstructionFailed {
        /// 模块类型
        module_type: String,
        /// 失败原因
        reason: String,
    },

    /// 不可变模块不能单独关闭
    #[error("模块 '{0}' 为不可变模块，只能随所属者整体关闭")]
    ImmutableShutdown(String),

    /// 模块仍被其他已加载模块依赖
    #[error("模块 '{module}' 仍被 {dependents} 个已加载模块依赖，无法关闭")]
    ModuleHasDependents {
        /// 模块类型
        module: String,
        /// 依赖该模块的已加载实例数
        dependents: usize,
    },

    /// 声明的依赖从未被加载
    #[error("依赖模块未加载: 所属者 '{owner}' 的 '{module_type}'")]
    DependencyNotLoaded {
        /// 所属者
        owner: String,
        /// 模块类型
        module_type: String,
    },

    /// 模块未加载
    #[error("模块未加载: 所属者 '{owner}' 的 '{module_type}'")]
    ModuleNotLoaded {
        /// 所属者
        owner: String,
        /// 模块类型
        module_type: String,
    },

    /// 所属者不存在
    #[error("所属者未注册: '{0}'")]
    OwnerNotFound(String),

    // ==================== 配置错误 ====================

    /// 配置加载失败
    #[error("配置加载失败: {0}")]
    ConfigLoadFailed(String),

    /// 配置值无效
    #[error("配置值无效: '{key}' - {reason}")]
    InvalidConfigValue {
        /// 配置键
        key: String,
        /// 原因
        reason: String,
    },

    // ==================== IO 和序列化错误 ====================

    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON 序列化/反序列化错误
    #[error("JSON 错误: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML 序列化/反序列化错误
    #[error("YAML 错误: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // ==================== 通用错误 ====================

    /// 初始化失败
    #[error("初始化失败: {0}")]
    InitFailed(String),

    /// 其他错误（模块钩子通常经由 anyhow 返回）
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// 引擎操作结果类型别名
pub type Result<T> = std::result::Result<T, CoreError>;

/// 错误码常量
pub mod error_code {
    // 模块错误 (MODULE-xxx)
    /// 模块未加载
    pub const MODULE_NOT_LOADED: &str = "MODULE-001";
    /// 模块构造或启用失败
    pub const MODULE_CONSTRUCTION_FAILED: &str = "MODULE-002";
    /// 循环依赖
    pub const MODULE_CIRCULAR_DEPENDENCY: &str = "MODULE-003";
    /// 不可变模块不能单独关闭
    pub const MODULE_IMMUTABLE: &str = "MODULE-004";
    /// 模块仍被依赖
    pub const MODULE_HAS_DEPENDENTS: &str = "MODULE-005";
    /// 依赖未加载
    pub const MODULE_DEPENDENCY_NOT_LOADED: &str = "MODULE-006";
    /// 描述无效
    pub const MODULE_INVALID_DESCRIPTOR: &str = "MODULE-007";

    // 所属者错误 (OWNER-xxx)
    /// 所属者未注册
    pub const OWNER_NOT_FOUND: &str = "OWNER-001";

    // 配置错误 (CONFIG-xxx)
    /// 配置文件读取失败
    pub const CONFIG_LOAD_FAILED: &str = "CONFIG-001";
    /// 配置值无效
    pub const CONFIG_INVALID_VALUE: &str = "CONFIG-002";

    // 核心错误 (CORE-xxx)
    /// 初始化失败
    pub const CORE_INIT_FAILED: &str = "CORE-001";
}

impl CoreError {
    /// 获取错误码
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::CircularDependency(_) => error_code::MODULE_CIRCULAR_DEPENDENCY,
            CoreError::InvalidDescriptor(_) => error_code::MODULE_INVALID_DESCRIPTOR,
            CoreError::ModuleConstructionFailed { .. } => error_code::MODULE_CONSTRUCTION_FAILED,
            CoreError::ImmutableShutdown(_) => error_code::MODULE_IMMUTABLE,
            CoreError::ModuleHasDependents { .. } => error_code::MODULE_HAS_DEPENDENTS,
            CoreError::DependencyNotLoaded { .. } => error_code::MODULE_DEPENDENCY_NOT_LOADED,
            CoreError::ModuleNotLoaded { .. } => error_code::MODULE_NOT_LOADED,
            CoreError::OwnerNotFound(_) => error_code::OWNER_NOT_FOUND,
            CoreError::ConfigLoadFailed(_) => error_code::CONFIG_LOAD_FAILED,
            CoreError::InvalidConfigValue { .. } => error_code::CONFIG_INVALID_VALUE,
            CoreError::InitFailed(_) => error_code::CORE_INIT_FAILED,
            _ => "UNKNOWN",
        }
    }

    /// 构造一个模块构造失败错误
    pub fn construction(module_type: impl Into<String>, reason: impl ToString) -> Self {
        CoreError::ModuleConstructionFailed {
            module_type: module_type.into(),
            reason: reason.to_string(),
        }
    }

    /// 是否为需要上报给调用方的依赖图错误
    pub fn is_graph_error(&self) -> bool {
        matches!(self, CoreError::CircularDependency(_))
    }
}
