use super::{ConfigError, ConfigResult};
use crate::impl_default;
use serde::{Deserialize, Serialize};

/// 值转换配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarshalConfig {
    /// 对象/数组的最大嵌套深度，超过部分转换为 Null
    pub max_depth: usize,
}

impl_default!(MarshalConfig { max_depth: 64 });

/// 嵌套深度上限的上界
pub const MAX_DEPTH_LIMIT: usize = 1024;

impl MarshalConfig {
    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_depth == 0 || self.max_depth > MAX_DEPTH_LIMIT {
            return Err(ConfigError::ValidationError(format!(
                "max_depth must be between 1 and {}",
                MAX_DEPTH_LIMIT
            )));
        }
        Ok(())
    }
}
