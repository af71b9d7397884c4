//! 后备存储：可执行镜像与交换镜像所在的文件系统
//!
//! 接口仿照 `INode::read_at` / `write_at`，打开的文件由 [`Arc`] 持有，
//! 最后一个引用释放即为关闭。

mod file_ext;
mod host;
mod mem;

use std::sync::Arc;
use thiserror::Error;

pub use file_ext::OpenFileExt;
pub use host::HostFileSystem;
pub use mem::MemFileSystem;

pub type Result<T> = core::result::Result<T, StorageError>;

/// 后备存储的错误
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("file {0} not found")]
    NotFound(String),
    #[error("file {0} already exists")]
    AlreadyExists(String),
    /// 读写的字节数与请求的不一致
    #[error("short transfer: expected {expected} bytes, got {actual}")]
    ShortTransfer { expected: usize, actual: usize },
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// 一个已打开的文件
pub trait OpenFile: Send + Sync {
    /// 从 `offset` 开始读入 `buf`，返回实际读到的字节数
    fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<usize>;
    /// 从 `offset` 开始写入 `buf`，必要时扩展文件，返回写入的字节数
    fn write_at(&self, offset: usize, buf: &[u8]) -> Result<usize>;
    /// 文件当前长度
    fn len(&self) -> Result<usize>;
}

pub trait FileSystem: Send + Sync {
    fn open(&self, name: &str) -> Result<Arc<dyn OpenFile>>;
    /// 创建一个长度为 `size` 的全零文件
    fn create(&self, name: &str, size: usize) -> Result<()>;
    fn remove(&self, name: &str) -> Result<()>;
}
