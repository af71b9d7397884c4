//! 程序段 [`Segment`] 与段表 [`SegmentMap`]

use crate::memory::address::VirtualAddress;
use crate::memory::range::Range;
use crate::noff::{NoffHeader, NoffSegment};

/// 有文件内容的三类段，顺序即查找的优先级
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SegmentKind {
    Code,
    InitData,
    ReadOnlyData,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Segment {
    pub kind: SegmentKind,
    pub range: Range<VirtualAddress>,
    /// 段首字节在可执行文件中的偏移
    pub file_offset: usize,
}

impl Segment {
    fn from_noff(kind: SegmentKind, segment: &NoffSegment) -> Self {
        let start = segment.virtual_addr as usize;
        Self {
            kind,
            range: Range::from(start..start + segment.size as usize),
            file_offset: segment.in_file_addr as usize,
        }
    }

    /// `address` 在文件中的位置
    pub fn file_offset_of(&self, address: VirtualAddress) -> Option<usize> {
        if self.range.contains(address) {
            Some(self.file_offset + (address - self.range.start))
        } else {
            None
        }
    }
}

/// 代码段、已初始化数据段、只读数据段在虚拟空间和文件中的位置
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SegmentMap {
    pub code: Segment,
    pub init_data: Segment,
    pub readonly_data: Segment,
}

impl SegmentMap {
    pub fn from_header(header: &NoffHeader) -> Self {
        Self {
            code: Segment::from_noff(SegmentKind::Code, &header.code),
            init_data: Segment::from_noff(SegmentKind::InitData, &header.init_data),
            readonly_data: Segment::from_noff(SegmentKind::ReadOnlyData, &header.readonly_data),
        }
    }

    /// 按优先级排列的段
    pub fn iter(&self) -> impl Iterator<Item = &Segment> {
        vec![&self.code, &self.init_data, &self.readonly_data].into_iter()
    }

    /// 找到包含 `address` 的第一个段，返回段与文件偏移；不属于任何段的是匿名内存
    pub fn locate(&self, address: VirtualAddress) -> Option<(&Segment, usize)> {
        self.iter()
            .find_map(|segment| segment.file_offset_of(address).map(|offset| (segment, offset)))
    }

    /// 是否有两个非空段互相重叠
    pub fn has_overlap(&self) -> bool {
        let segments: Vec<_> = self.iter().filter(|s| !s.range.is_empty()).collect();
        segments.iter().enumerate().any(|(i, a)| {
            segments[i + 1..]
                .iter()
                .any(|b| a.range.overlap_with(&b.range))
        })
    }
}
