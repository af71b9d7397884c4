//! 地址空间与地址转换
//!
//! 每个用户程序有一个 [`AddrSpace`]，由 [`AddrSpaceManager`] 登记并以 [`AsHandle`] 引用。
//! 页表是 [`TranslationEntry`] 的线性数组，下标即虚拟页号。

mod addr_space;
mod manager;
mod page_table_entry;
mod segment;
mod translate;

pub use addr_space::{AddrSpace, LoadError};
pub use manager::{AddrSpaceManager, AsHandle, StaleHandle};
pub use page_table_entry::{Flags, TranslationEntry};
pub use segment::{Segment, SegmentKind, SegmentMap};
pub use translate::{translate, AccessMode, TranslationFault};
