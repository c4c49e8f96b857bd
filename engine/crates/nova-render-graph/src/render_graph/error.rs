//! 可恢复的错误
//!
//! 连线错误（重复注册、类型不匹配、跨线程使用等）属于调用方的静态 bug，直接 panic；
//! 这里只包含每帧都可能合理出现、调用方可以降级处理的情况，
//! 例如第一帧时某个资源的生产者还没有运行过。

#[derive(Debug, thiserror::Error)]
pub enum RgError {
    #[error("resource {0} not found")]
    ResourceNotFound(String),

    #[error("resource {0} is not an image")]
    NotAnImage(String),

    #[error("resource {0} is not a buffer")]
    NotABuffer(String),
}

pub type RgResult<T> = Result<T, RgError>;
