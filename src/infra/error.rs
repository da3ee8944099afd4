// src/infra/error.rs

use thiserror::Error;

pub type ThResult<T> = Result<T, ThError>;

/// 统一错误分类
///
/// 所有失败均同步上抛给调用方，不重试、不降级：
/// 模型要求每一步都处于完全有效的状态。
#[derive(Debug, Error)]
pub enum ThError {
    #[error("IO 错误 ({context}): {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("配置错误: {0}")]
    Config(String),

    /// 时间越界：起始时间不在可用时间轴内，或 advance 超出 end_time
    #[error("时间越界: {0}")]
    Range(String),

    /// 访问未注册的变量名，或数据源中缺失所请求的变量
    #[error("变量未找到: {0}")]
    NotFound(String),

    /// 多个数据源在时间或空间索引上不一致（构造期失败）
    #[error("坐标轴不一致: {0}")]
    MisalignedAxes(String),

    /// 时间轴相邻间隔不恒定，无法推断固定步长（构造期失败）
    #[error("时间步长不一致: {0}")]
    InconsistentTimestep(String),

    #[error("数据加载失败 ({source_name}): {message}")]
    DataLoad {
        source_name: String,
        message: String,
    },

    #[error("验证失败: {0}")]
    Validation(String),
}

impl ThError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn range(msg: impl Into<String>) -> Self {
        Self::Range(msg.into())
    }

    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound(name.into())
    }

    pub fn misaligned(msg: impl Into<String>) -> Self {
        Self::MisalignedAxes(msg.into())
    }

    pub fn inconsistent_timestep(msg: impl Into<String>) -> Self {
        Self::InconsistentTimestep(msg.into())
    }

    pub fn data_load(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DataLoad {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

impl From<std::io::Error> for ThError {
    fn from(e: std::io::Error) -> Self {
        Self::Io {
            context: "IO 操作".into(),
            source: e,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ThError::range("advance 超出 end_time");
        assert!(err.to_string().contains("时间越界"));

        let err = ThError::not_found("foo");
        assert!(err.to_string().contains("foo"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let th_err: ThError = io_err.into();
        assert!(matches!(th_err, ThError::Io { .. }));
    }

    #[test]
    fn test_data_load_context() {
        let err = ThError::data_load("cbh.nc", "缺失变量 prcp");
        let msg = err.to_string();
        assert!(msg.contains("cbh.nc"));
        assert!(msg.contains("prcp"));
    }
}
