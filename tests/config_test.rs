//! 配置加载集成测试
//!
//! 测试从 YAML/JSON 文件加载描述表、合并配置，并据此驱动编排器的完整流程

use std::sync::Arc;

use chips_modkit::module::{DescriptorRegistry, FactoryTable};
use chips_modkit::{CoreConfig, CoreError, Module, ModuleDescriptor, ModuleOrchestrator};
use tempfile::TempDir;

struct Noop;

impl Module for Noop {}

fn noop_factory(types: &[&str]) -> Arc<FactoryTable> {
    let mut factory = FactoryTable::new();
    for module_type in types {
        factory.insert(*module_type, |_| Ok(Box::new(Noop) as Box<dyn Module>));
    }
    Arc::new(factory)
}

const YAML_CONFIG: &str = r#"
logging:
  level: debug
engine:
  manager_namespaces: ["manager.", "infra."]
modules:
  - id: storage
    dependencies: [infra.database]
  - id: economy
    dependencies: [storage]
    metadata:
      name: Economy
      version: "2.1.0"
      authors: [alice]
  - id: permissions
    immutable: true
  - id: shop
    dependencies: [economy, permissions]
owners:
  - id: shop-plugin
    modules: [shop]
  - id: bank-plugin
    modules: [economy]
"#;

/// 测试 YAML 配置驱动的完整流程
#[tokio::test]
async fn test_yaml_config_end_to_end() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("modules.yaml");
    tokio::fs::write(&path, YAML_CONFIG).await.unwrap();

    let config = CoreConfig::from_file(&path).await.unwrap();
    assert_eq!(config.config_path.as_deref(), Some(path.as_path()));
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.modules.len(), 4);
    assert_eq!(config.modules[1].metadata.version, "2.1.0");

    let orch = ModuleOrchestrator::from_config(
        &config,
        noop_factory(&["storage", "economy", "permissions", "shop"]),
    )
    .unwrap();
    orch.register_owners(&config.owners).await.unwrap();

    assert_eq!(
        orch.load_order("shop-plugin").await,
        vec!["storage", "economy", "permissions", "shop"]
    );
    assert_eq!(orch.load_order("bank-plugin").await, vec!["storage", "economy"]);

    for owner in orch.owners().await {
        assert!(orch.boot(&owner).await.unwrap().is_clean());
    }

    // economy 被 shop-plugin 的 shop 依赖
    assert_eq!(orch.depended_by("economy").await, 1);
    assert_eq!(orch.depended_by("storage").await, 2);

    let economy = orch.instance("bank-plugin", "economy").await.unwrap();
    assert_eq!(economy.metadata().name, "Economy");

    for owner in orch.owners().await {
        orch.shutdown_owner(&owner).await.unwrap();
    }
    assert!(orch.owners().await.is_empty());
}

/// 测试 JSON 格式配置
#[tokio::test]
async fn test_json_config_format() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("modules.json");

    let json_content = r#"{
        "engine": { "strict_validation": true },
        "modules": [
            { "id": "a" },
            { "id": "b", "dependencies": ["a", "manager.scheduler"] }
        ],
        "owners": [ { "id": "p", "modules": ["b"] } ]
    }"#;
    tokio::fs::write(&path, json_content).await.unwrap();

    let config = CoreConfig::from_file(&path).await.unwrap();
    assert!(config.engine.strict_validation);
    assert_eq!(config.engine.manager_namespaces, vec!["manager."]);
    assert_eq!(config.logging.level, "info");

    // 严格模式下管理器命名空间依赖不算未声明
    let registry = DescriptorRegistry::from_config(&config).unwrap();
    assert_eq!(registry.dependencies_of("b"), ["a".to_string()]);
}

/// 测试严格模式拒绝循环依赖
#[tokio::test]
async fn test_strict_validation_rejects_cycle() {
    let yaml = r#"
engine:
  strict_validation: true
modules:
  - id: a
    dependencies: [b]
  - id: b
    dependencies: [a]
"#;
    let config = CoreConfig::from_str_with_format(yaml, false).unwrap();

    let err = DescriptorRegistry::from_config(&config).unwrap_err();
    assert!(matches!(err, CoreError::CircularDependency(_)));
    assert_eq!(err.error_code(), "MODULE-003");

    // 非严格模式下构建成功，注册时才失败
    let mut lenient = config.clone();
    lenient.engine.strict_validation = false;
    let orch = ModuleOrchestrator::from_config(&lenient, noop_factory(&["a", "b"])).unwrap();
    assert!(matches!(
        orch.register("p", &["a"]).await,
        Err(CoreError::CircularDependency(_))
    ));
}

/// 测试配置校验
#[tokio::test]
async fn test_config_validation() {
    let yaml = r#"
modules:
  - id: ""
"#;
    let err = CoreConfig::from_str_with_format(yaml, false).unwrap_err();
    assert!(matches!(err, CoreError::InvalidConfigValue { .. }));

    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("missing.yaml");
    let err = CoreConfig::from_file(&missing).await.unwrap_err();
    assert!(matches!(err, CoreError::ConfigLoadFailed(_)));

    let broken = temp_dir.path().join("broken.yaml");
    tokio::fs::write(&broken, "modules: [").await.unwrap();
    let err = CoreConfig::from_file(&broken).await.unwrap_err();
    assert!(matches!(err, CoreError::Yaml(_)));
}

/// 测试配置合并
#[tokio::test]
async fn test_config_merge() {
    let mut base = CoreConfig::from_str_with_format(YAML_CONFIG, false).unwrap();

    let overlay = CoreConfig::builder()
        .module(ModuleDescriptor::new("economy"))
        .module(ModuleDescriptor::new("auction").depends_on("shop"))
        .owner("shop-plugin", ["shop", "auction"])
        .build();
    base.merge(overlay);

    // 覆盖后 economy 不再依赖 storage
    let economy = base.modules.iter().find(|d| d.id == "economy").unwrap();
    assert!(economy.dependencies.is_empty());
    assert_eq!(base.modules.len(), 5);
    assert_eq!(base.logging.level, "debug");
    assert_eq!(base.engine.manager_namespaces, vec!["manager.", "infra."]);

    let shop_plan = base.owners.iter().find(|o| o.id == "shop-plugin").unwrap();
    assert_eq!(shop_plan.modules, vec!["shop", "auction"]);
}
