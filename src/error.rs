use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("账号存储错误: {0}")]
    Storage(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl AppError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// 存储文件内容无法使用（格式/版本不对），调用方应按“不存在”处理。
    pub fn is_malformed_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}
