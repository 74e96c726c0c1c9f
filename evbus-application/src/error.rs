use evbus_domain::error::EvbusError;

#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("bus: {0}")]
    Bus(#[from] EvbusError),

    #[error("validation: {0}")]
    Validation(String),

    #[error("command failed: command={command}, reason={reason}")]
    CommandFailed {
        command: &'static str,
        reason: String,
    },
}

impl AppError {
    /// 总线基础设施故障可重试；其余按业务失败处理
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Bus(err) => err.is_retryable(),
            _ => false,
        }
    }
}
