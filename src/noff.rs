//! NOFF 可执行文件头 [`NoffHeader`]
//!
//! 文件头由魔数和四个段描述组成，依次为代码段、已初始化数据段、只读数据段、
//! 未初始化数据段；每个段描述为 `(virtual_addr, in_file_addr, size)` 三个字。
//! 若文件的字节序与宿主不同，魔数会呈现为字节反转的形式，此时所有字段都要先转换。

use byteorder::{ByteOrder, NativeEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;
use thiserror::Error;

pub const NOFF_MAGIC: u32 = 0x00ba_dfad;

/// 文件头的字节数：魔数加 4 个段，每段 3 个字
pub const NOFF_HEADER_SIZE: usize = 4 + 4 * 3 * 4;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum NoffError {
    #[error("executable header truncated")]
    Truncated,
    #[error("bad magic number {0:#010x}")]
    BadMagic(u32),
}

/// 可执行文件中的一个段
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct NoffSegment {
    pub virtual_addr: u32,
    pub in_file_addr: u32,
    pub size: u32,
}

impl NoffSegment {
    fn swapped(self) -> Self {
        Self {
            virtual_addr: self.virtual_addr.swap_bytes(),
            in_file_addr: self.in_file_addr.swap_bytes(),
            size: self.size.swap_bytes(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct NoffHeader {
    pub code: NoffSegment,
    pub init_data: NoffSegment,
    pub readonly_data: NoffSegment,
    pub uninit_data: NoffSegment,
}

impl NoffHeader {
    /// 解析文件开头的 [`NOFF_HEADER_SIZE`] 个字节
    pub fn parse(bytes: &[u8]) -> Result<Self, NoffError> {
        if bytes.len() < NOFF_HEADER_SIZE {
            return Err(NoffError::Truncated);
        }
        let mut cursor = Cursor::new(bytes);
        let mut word = || {
            cursor
                .read_u32::<NativeEndian>()
                .map_err(|_| NoffError::Truncated)
        };
        let magic = word()?;
        let mut segment = || -> Result<NoffSegment, NoffError> {
            Ok(NoffSegment {
                virtual_addr: word()?,
                in_file_addr: word()?,
                size: word()?,
            })
        };
        let header = Self {
            code: segment()?,
            init_data: segment()?,
            readonly_data: segment()?,
            uninit_data: segment()?,
        };
        if magic == NOFF_MAGIC {
            Ok(header)
        } else if magic.swap_bytes() == NOFF_MAGIC {
            Ok(header.swapped())
        } else {
            Err(NoffError::BadMagic(magic))
        }
    }

    fn swapped(self) -> Self {
        Self {
            code: self.code.swapped(),
            init_data: self.init_data.swapped(),
            readonly_data: self.readonly_data.swapped(),
            uninit_data: self.uninit_data.swapped(),
        }
    }

    /// 全部段的大小之和（不含栈）
    pub fn total_size(&self) -> usize {
        [self.code, self.init_data, self.readonly_data, self.uninit_data]
            .iter()
            .map(|segment| segment.size as usize)
            .sum()
    }
}

/// 构造 NOFF 镜像，段内容依次紧跟在文件头之后
#[derive(Default)]
pub struct NoffBuilder {
    code: (u32, Vec<u8>),
    init_data: (u32, Vec<u8>),
    readonly_data: (u32, Vec<u8>),
    uninit_data: (u32, u32),
}

impl NoffBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn code(mut self, virtual_addr: u32, bytes: &[u8]) -> Self {
        self.code = (virtual_addr, bytes.to_vec());
        self
    }

    pub fn init_data(mut self, virtual_addr: u32, bytes: &[u8]) -> Self {
        self.init_data = (virtual_addr, bytes.to_vec());
        self
    }

    pub fn readonly_data(mut self, virtual_addr: u32, bytes: &[u8]) -> Self {
        self.readonly_data = (virtual_addr, bytes.to_vec());
        self
    }

    pub fn uninit_data(mut self, virtual_addr: u32, size: u32) -> Self {
        self.uninit_data = (virtual_addr, size);
        self
    }

    /// 以字节序 `B` 写出完整的镜像
    pub fn build<B: ByteOrder>(&self) -> Vec<u8> {
        let mut header = Vec::with_capacity(NOFF_HEADER_SIZE);
        let mut body = Vec::new();
        let put = |header: &mut Vec<u8>, virtual_addr: u32, in_file_addr: u32, size: u32| {
            for word in [virtual_addr, in_file_addr, size].iter() {
                // 写入 Vec 不会失败
                let _ = header.write_u32::<B>(*word);
            }
        };
        let _ = header.write_u32::<B>(NOFF_MAGIC);
        for (virtual_addr, bytes) in [&self.code, &self.init_data, &self.readonly_data].iter() {
            let offset = (NOFF_HEADER_SIZE + body.len()) as u32;
            put(&mut header, *virtual_addr, offset, bytes.len() as u32);
            body.extend_from_slice(bytes);
        }
        let (virtual_addr, size) = self.uninit_data;
        put(&mut header, virtual_addr, 0, size);
        header.extend_from_slice(&body);
        header
    }
}
