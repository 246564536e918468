//! Chips ModKit 命令行入口
//!
//! 用于检查模块描述表、预览加载顺序和演练启动/关闭流程。
//!
//! # 命令概览
//!
//! - `version` - 显示版本信息
//! - `check-config` - 验证配置文件和描述表
//! - `plan` - 预览某个所属者的加载顺序
//! - `simulate` - 用空模块演练配置中全部所属者的启动和关闭
//!
//! # 使用示例
//!
//! ```bash
//! # 检查配置文件
//! chips-modkit check-config -c modules.yaml
//!
//! # 预览加载顺序
//! chips-modkit -c modules.yaml plan --owner shop economy
//!
//! # 演练，并让 storage 构造失败
//! chips-modkit -c modules.yaml simulate --fail storage
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use futures::FutureExt;
use tracing::{debug, info};

use chips_modkit::module::events::EventEnvelope;
use chips_modkit::module::DependencyGraphBuilder;
use chips_modkit::{
    CoreConfig, CoreError, DescriptorRegistry, FactoryTable, LogGuard, Logger, LoggerConfig,
    Module, ModuleOrchestrator,
};

/// Chips ModKit - 模块编排引擎
#[derive(Parser)]
#[command(name = "chips-modkit")]
#[command(version, about = "模块依赖展开与生命周期编排", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// 配置文件路径
    #[arg(short, long, default_value = "modules.yaml", global = true)]
    config: PathBuf,

    /// 日志级别 (trace, debug, info, warn, error)，覆盖配置文件中的设置
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// 开发模式（显示文件名和行号）
    #[arg(long, global = true)]
    dev: bool,

    /// 子命令
    #[command(subcommand)]
    command: Commands,
}

/// 可用的子命令
#[derive(Subcommand)]
enum Commands {
    /// 查看版本信息
    Version,

    /// 验证配置文件
    ///
    /// 解析配置并以严格模式构建描述表，报告循环依赖和未声明的依赖。
    CheckConfig {
        /// 配置文件路径（不指定则使用全局 -c 选项）
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// 预览加载顺序
    Plan {
        /// 所属者 ID
        #[arg(short, long, default_value = "cli")]
        owner: String,

        /// 请求的模块类型
        #[arg(required = true)]
        types: Vec<String>,
    },

    /// 演练启动和关闭
    ///
    /// 为描述表中的每个类型构造空模块，按配置中的注册计划启动所有所属者，
    /// 打印报告后整体关闭。
    Simulate {
        /// 让这些类型构造失败
        #[arg(long = "fail")]
        fail: Vec<String>,
    },
}

/// 演练用的空模块
struct StubModule;

impl Module for StubModule {}

fn print_version() {
    println!();
    println!("Chips ModKit - 模块编排引擎");
    println!("═══════════════════════════════════════");
    println!("  版本:     {}", chips_modkit::VERSION);
    println!("  目标平台: {}", std::env::consts::ARCH);
    println!("  操作系统: {}", std::env::consts::OS);
    println!("═══════════════════════════════════════");
    println!();
}

/// 检查配置文件
async fn check_config(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("检查配置文件: {}", path.display());
    println!();

    let config = match CoreConfig::from_file(path).await {
        Ok(config) => config,
        Err(e) => {
            println!("❌ 配置文件无效: {}", e);
            return Err(Box::new(e));
        }
    };

    let lenient = DescriptorRegistry::from_config(&config)?;
    println!("配置内容:");
    println!("────────────────────────────────────────");
    println!("  日志级别:       {}", config.logging.level);
    println!("  管理器命名空间: {:?}", config.engine.manager_namespaces);
    println!("  模块类型数:     {}", lenient.len());
    println!("  所属者计划数:   {}", config.owners.len());
    println!("────────────────────────────────────────");

    if let Err(e) = lenient.validate() {
        println!("❌ 描述表无效 [{}]: {}", e.error_code(), e);
        return Err(Box::new(e));
    }

    let builder = DependencyGraphBuilder::new(&lenient);
    for plan in &config.owners {
        if let Err(e) = builder.extend(&[], &plan.modules[..]) {
            println!("❌ 所属者 '{}' 的注册计划无效: {}", plan.id, e);
            return Err(Box::new(e));
        }
    }

    println!("✅ 配置文件有效！");
    Ok(())
}

/// 打印加载顺序
async fn plan(config: CoreConfig, owner: &str, types: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let orchestrator = ModuleOrchestrator::from_config(&config, Arc::new(FactoryTable::new()))?;
    let order = orchestrator.register(owner, types).await?;

    println!("所属者 '{}' 的加载顺序:", owner);
    for (index, module_type) in order.iter().enumerate() {
        let marker = if orchestrator.registry().is_immutable(module_type) {
            " (不可变)"
        } else {
            ""
        };
        println!("  {:>3}. {}{}", index + 1, module_type, marker);
    }
    Ok(())
}

/// 演练启动和关闭
async fn simulate(config: CoreConfig, fail: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let mut factory = FactoryTable::new();
    for descriptor in &config.modules {
        let failing = fail.contains(&descriptor.id);
        let module_type = descriptor.id.clone();
        factory.insert(descriptor.id.clone(), move |_owner| {
            if failing {
                Err(CoreError::construction(&module_type, "演练中指定失败"))
            } else {
                Ok(Box::new(StubModule) as Box<dyn Module>)
            }
        });
    }

    let mut orchestrator = ModuleOrchestrator::from_config(&config, Arc::new(factory))?;
    orchestrator.set_event_publisher(|event| {
        async move {
            let envelope = EventEnvelope::from(event);
            match serde_json::to_string(&envelope) {
                Ok(json) => debug!(event = %json, "生命周期事件"),
                Err(e) => debug!(error = %e, "事件序列化失败"),
            }
        }
        .boxed()
    });

    orchestrator.register_owners(&config.owners).await?;

    for owner in orchestrator.owners().await {
        let report = orchestrator.boot(&owner).await?;
        println!("[{}] 启动报告:", owner);
        println!("{}", serde_json::to_string_pretty(&report)?);

        let failures = orchestrator.failures(&owner).await;
        if !failures.is_empty() {
            println!("[{}] 失败日志:", owner);
            println!("{}", serde_json::to_string_pretty(&failures)?);
        }
    }

    for owner in orchestrator.owners().await {
        let report = orchestrator.shutdown_owner(&owner).await?;
        println!("[{}] 关闭报告:", owner);
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    Ok(())
}

/// 加载配置文件，不存在时使用默认配置
async fn load_config(config_path: &Path) -> Result<CoreConfig, Box<dyn std::error::Error>> {
    if config_path.exists() {
        Ok(CoreConfig::from_file(config_path).await?)
    } else {
        Ok(CoreConfig::default())
    }
}

/// 按配置文件初始化日志，命令行参数优先
fn init_logging(config: &CoreConfig, level: Option<&str>, dev: bool) -> chips_modkit::Result<LogGuard> {
    let mut logger_config = LoggerConfig::from_log_config(&config.logging);
    if let Some(level) = level {
        logger_config.level = level.to_string();
    }
    logger_config.show_file_line = dev;
    Logger::init(logger_config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Version => print_version(),

        // CheckConfig 不需要日志
        Commands::CheckConfig { config } => {
            let config_path = config.unwrap_or(cli.config);
            check_config(&config_path).await?;
        }

        Commands::Plan { owner, types } => {
            let config = load_config(&cli.config).await?;
            let _guard = init_logging(&config, cli.log_level.as_deref(), cli.dev)?;
            info!(path = %cli.config.display(), loaded = config.config_path.is_some(), "配置已就绪");
            plan(config, &owner, &types).await?;
        }

        Commands::Simulate { fail } => {
            let config = load_config(&cli.config).await?;
            let _guard = init_logging(&config, cli.log_level.as_deref(), cli.dev)?;
            info!(path = %cli.config.display(), loaded = config.config_path.is_some(), "配置已就绪");
            simulate(config, &fail).await?;
        }
    }

    Ok(())
}
