use super::{ConfigError, ConfigResult};
use crate::impl_default;
use serde::{Deserialize, Serialize};

/// 运行时配置
///
/// 所有大小以字节为单位，0 表示沿用运行时自身的默认值。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// 脚本堆内存上限
    pub memory_limit: usize,

    /// 脚本调用栈上限
    pub max_stack_size: usize,

    /// 触发垃圾回收的分配阈值
    pub gc_threshold: usize,
}

impl_default!(RuntimeConfig {
    memory_limit: 64 * 1024 * 1024,
    max_stack_size: 1024 * 1024,
    gc_threshold: 0,
});

/// 可接受的最小堆内存上限
pub const MIN_MEMORY_LIMIT: usize = 1024 * 1024;

/// 可接受的最小调用栈上限
pub const MIN_STACK_SIZE: usize = 64 * 1024;

impl RuntimeConfig {
    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        if self.memory_limit != 0 && self.memory_limit < MIN_MEMORY_LIMIT {
            return Err(ConfigError::ValidationError(format!(
                "memory_limit must be 0 or at least {} bytes",
                MIN_MEMORY_LIMIT
            )));
        }
        if self.max_stack_size != 0 && self.max_stack_size < MIN_STACK_SIZE {
            return Err(ConfigError::ValidationError(format!(
                "max_stack_size must be 0 or at least {} bytes",
                MIN_STACK_SIZE
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unlimited_is_valid() {
        let config = RuntimeConfig {
            memory_limit: 0,
            max_stack_size: 0,
            gc_threshold: 0,
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_tiny_limits_rejected() {
        let config = RuntimeConfig {
            memory_limit: 4096,
            ..RuntimeConfig::default()
        };
        assert!(config.validate().is_err());

        let config = RuntimeConfig {
            max_stack_size: 1024,
            ..RuntimeConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
