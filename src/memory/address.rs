//! 地址与页号的类型 [`VirtualAddress`] [`PhysicalAddress`] [`VirtualPageNumber`] [`PhysicalPageNumber`]

use super::config::PAGE_SIZE;
use core::fmt;

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalAddress(pub usize);

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualAddress(pub usize);

/// 物理页号，即物理页帧在全局页帧表中的下标
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalPageNumber(pub usize);

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualPageNumber(pub usize);

impl PhysicalAddress {
    pub fn page_offset(&self) -> usize {
        self.0 % PAGE_SIZE
    }
}

impl VirtualAddress {
    pub fn page_offset(&self) -> usize {
        self.0 % PAGE_SIZE
    }
}

impl PhysicalPageNumber {
    /// 页帧起始地址加上页内偏移
    pub fn address_at(self, offset: usize) -> PhysicalAddress {
        PhysicalAddress(self.0 * PAGE_SIZE + offset)
    }
}

impl VirtualPageNumber {
    /// 该页在交换镜像中的偏移（与虚拟页一一对应）
    pub fn file_offset(self) -> usize {
        self.0 * PAGE_SIZE
    }
}

macro_rules! implement_address_to_page_number {
    ($address_type: ty, $page_number_type: ty) => {
        impl From<$page_number_type> for $address_type {
            fn from(page_number: $page_number_type) -> Self {
                Self(page_number.0 * PAGE_SIZE)
            }
        }
        impl $page_number_type {
            /// 地址转页号, 向下取整
            pub const fn floor(address: $address_type) -> Self {
                Self(address.0 / PAGE_SIZE)
            }
            /// 地址转页号, 向上取整
            pub const fn ceil(address: $address_type) -> Self {
                Self(address.0 / PAGE_SIZE + (address.0 % PAGE_SIZE != 0) as usize)
            }
        }
    };
}
implement_address_to_page_number! {PhysicalAddress, PhysicalPageNumber}
implement_address_to_page_number! {VirtualAddress, VirtualPageNumber}

macro_rules! implement_usize_operations {
    ($type_name: ty) => {
        impl core::ops::Add<usize> for $type_name {
            type Output = Self;
            fn add(self, other: usize) -> Self::Output {
                Self(self.0 + other)
            }
        }
        /// `+=`
        impl core::ops::AddAssign<usize> for $type_name {
            fn add_assign(&mut self, rhs: usize) {
                self.0 += rhs;
            }
        }
        /// `-`
        impl core::ops::Sub<$type_name> for $type_name {
            type Output = usize;
            fn sub(self, other: $type_name) -> Self::Output {
                self.0 - other.0
            }
        }
        /// 和 usize 相互转换
        impl From<usize> for $type_name {
            fn from(value: usize) -> Self {
                Self(value)
            }
        }
        /// 和 usize 相互转换
        impl From<$type_name> for usize {
            fn from(value: $type_name) -> Self {
                value.0
            }
        }
        impl fmt::Display for $type_name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:#x}", self.0)
            }
        }
    };
}

implement_usize_operations! {PhysicalAddress}
implement_usize_operations! {PhysicalPageNumber}
implement_usize_operations! {VirtualAddress}
implement_usize_operations! {VirtualPageNumber}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floor_and_ceil() {
        assert_eq!(VirtualPageNumber::floor(VirtualAddress(140)), VirtualPageNumber(1));
        assert_eq!(VirtualPageNumber::ceil(VirtualAddress(140)), VirtualPageNumber(2));
        assert_eq!(VirtualPageNumber::ceil(VirtualAddress(256)), VirtualPageNumber(2));
        assert_eq!(VirtualPageNumber::floor(VirtualAddress(127)), VirtualPageNumber(0));
    }

    #[test]
    fn frame_address() {
        assert_eq!(PhysicalPageNumber(7).address_at(12), PhysicalAddress(908));
        assert_eq!(PhysicalAddress::from(PhysicalPageNumber(2)), PhysicalAddress(256));
        assert_eq!(VirtualPageNumber(3).file_offset(), 384);
    }
}
