//! 模块实例 ID 生成
//!
//! 每个被构造出来的模块实例都带有一个唯一 ID，用于区分同一类型
//! 在不同所属者下、或在多次启动/关闭循环中产生的不同实例。

/// 实例 ID 前缀
const INSTANCE_PREFIX: &str = "mi-";

/// 生成 UUID v4 字符串
pub fn generate_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// 生成模块实例 ID
///
/// 格式：`mi-` + 去掉连字符的 UUID v4（共 35 个字符）
///
/// # Example
///
/// ```
/// use chips_modkit::utils::id::{generate_instance_id, is_valid_instance_id};
///
/// let id = generate_instance_id();
/// assert!(is_valid_instance_id(&id));
/// ```
pub fn generate_instance_id() -> String {
    format!("{}{}", INSTANCE_PREFIX, uuid::Uuid::new_v4().simple())
}

/// 验证实例 ID 格式是否有效
pub fn is_valid_instance_id(id: &str) -> bool {
    match id.strip_prefix(INSTANCE_PREFIX) {
        Some(rest) => rest.len() == 32 && rest.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generate_instance_id_format() {
        let id = generate_instance_id();
        assert_eq!(id.len(), 35);
        assert!(is_valid_instance_id(&id));
    }

    #[test]
    fn test_instance_id_uniqueness() {
        let ids: HashSet<String> = (0..1000).map(|_| generate_instance_id()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_invalid_instance_ids() {
        assert!(!is_valid_instance_id(""));
        assert!(!is_valid_instance_id("mi-xyz"));
        assert!(!is_valid_instance_id(&generate_uuid()));
    }

    #[test]
    fn test_generate_uuid() {
        let uuid = generate_uuid();
        assert_eq!(uuid.len(), 36);
        assert!(uuid.contains('-'));
    }
}
