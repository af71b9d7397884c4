//! 跨模块的分页场景

use crate::fs::{FileSystem, MemFileSystem};
use crate::kernel::Kernel;
use crate::memory::address::{PhysicalPageNumber, VirtualAddress, VirtualPageNumber};
use crate::memory::config::{MachineConfig, PAGE_SIZE};
use crate::memory::fault::{FaultError, FaultResolution};
use crate::memory::frame::FrameOwner;
use crate::memory::mapping::AccessMode;
use crate::noff::NoffBuilder;
use byteorder::NativeEndian;
use hashbrown::HashMap;
use proptest::prelude::*;
use std::sync::Arc;

fn kernel(frames: usize, programs: &[(&str, Vec<u8>)]) -> (Kernel, Arc<MemFileSystem>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let fs = Arc::new(MemFileSystem::new());
    for (name, image) in programs {
        fs.insert(name, image.clone());
    }
    let config = MachineConfig::default().with_phys_pages(frames);
    (Kernel::new(config, fs.clone()).unwrap(), fs)
}

/// 只有栈的程序：8 页
fn stack_only() -> Vec<u8> {
    NoffBuilder::new().build::<NativeEndian>()
}

fn pattern(page: usize, word: usize) -> u32 {
    ((page as u32) << 16) | (word as u32 * 3 + 1)
}

#[test]
fn load_maps_nothing() {
    let (mut kernel, _) = kernel(8, &[("p", stack_only())]);
    let handle = kernel.load("p").unwrap();
    let space = kernel.space(handle).unwrap();
    assert_eq!(space.num_pages(), 8);
    assert_eq!(space.resident_pages(), 0);
    assert_eq!(kernel.frames().free_count(), 8);
    assert_eq!(kernel.stats().faults, 0);
}

#[test]
fn fault_maps_page_to_lowest_free_frame() {
    let (mut kernel, _) = kernel(8, &[("p", stack_only())]);
    let handle = kernel.load("p").unwrap();
    let address = VirtualAddress(3 * PAGE_SIZE + 12);
    assert!(kernel.translate(handle, address, AccessMode::Read).is_err());
    let resolution = kernel.resolve_fault(handle, address).unwrap();
    assert_eq!(
        resolution,
        FaultResolution::FreeFrame {
            frame: PhysicalPageNumber(0)
        }
    );
    let physical = kernel.translate(handle, address, AccessMode::Read).unwrap();
    assert_eq!(physical.0, 12);
    assert_eq!(
        kernel.frames().owner(PhysicalPageNumber(0)),
        Some(FrameOwner {
            space: handle,
            vpn: VirtualPageNumber(3)
        })
    );
}

#[test]
fn fault_on_resident_page_changes_nothing() {
    let (mut kernel, _) = kernel(8, &[("p", stack_only())]);
    let handle = kernel.load("p").unwrap();
    let first = kernel.resolve_fault(handle, VirtualAddress(0)).unwrap();
    let recency = kernel.frames().recency(first.frame());
    assert_eq!(
        kernel.resolve_fault(handle, VirtualAddress(4)).unwrap(),
        FaultResolution::AlreadyResident {
            frame: first.frame()
        }
    );
    assert_eq!(kernel.verify(), Ok(()));
    assert_eq!(kernel.frames().free_count(), 7);
    assert_eq!(kernel.frames().owner(PhysicalPageNumber(1)), None);
    assert_eq!(kernel.frames().recency(first.frame()), recency);
    assert_eq!(kernel.stats().faults, 1);
}

#[test]
fn fault_outside_space_is_address_error() {
    let (mut kernel, _) = kernel(8, &[("p", stack_only())]);
    let handle = kernel.load("p").unwrap();
    assert!(matches!(
        kernel.resolve_fault(handle, VirtualAddress(8 * PAGE_SIZE)),
        Err(FaultError::AddressError(_))
    ));
    assert_eq!(kernel.frames().free_count(), 8);
}

#[test]
fn page_in_follows_segments() {
    let code: Vec<u8> = (0..200).map(|i| i as u8).collect();
    let data: Vec<u8> = (0..100).map(|i| (i * 7 + 3) as u8).collect();
    let rodata = [0xee; 10];
    let image = NoffBuilder::new()
        .code(0, &code)
        .init_data(200, &data)
        .readonly_data(300, &rodata)
        .uninit_data(310, 50)
        .build::<NativeEndian>();
    let (mut kernel, _) = kernel(16, &[("p", image)]);
    kernel.exec("p").unwrap();

    let num_pages = kernel.space(kernel.machine().active().unwrap()).unwrap().num_pages();
    assert_eq!(num_pages, 11);
    let mut expected = vec![0u8; num_pages * PAGE_SIZE];
    expected[..200].copy_from_slice(&code);
    expected[200..300].copy_from_slice(&data);
    expected[300..310].copy_from_slice(&rodata);

    for (address, byte) in expected.iter().enumerate() {
        assert_eq!(
            kernel.read_mem(VirtualAddress(address), 1).unwrap(),
            *byte as u32,
            "byte at {:#x}",
            address
        );
    }
    assert_eq!(kernel.stats().faults, num_pages as u64);
}

#[test]
fn eviction_round_trip() {
    let (mut kernel, _) = kernel(8, &[("a", stack_only()), ("b", stack_only())]);
    let a = kernel.exec("a").unwrap();
    for page in 0..8 {
        for word in 0..PAGE_SIZE / 4 {
            let address = VirtualAddress(page * PAGE_SIZE + word * 4);
            kernel.write_mem(address, 4, pattern(page, word)).unwrap();
        }
    }
    assert_eq!(kernel.frames().free_count(), 0);

    let b = kernel.exec("b").unwrap();
    // 最早装入的是 a 的第 0 页
    assert_eq!(
        kernel.resolve_fault(b, VirtualAddress(0)).unwrap(),
        FaultResolution::Evicted {
            frame: PhysicalPageNumber(0),
            victim: FrameOwner {
                space: a,
                vpn: VirtualPageNumber(0)
            },
            written_back: true,
        }
    );
    let evicted = kernel
        .space(a)
        .unwrap()
        .entry(VirtualPageNumber(0))
        .unwrap()
        .clone();
    assert!(!evicted.is_valid());
    assert!(evicted.is_swapped());
    for page in 0..8 {
        assert_eq!(kernel.read_mem(VirtualAddress(page * PAGE_SIZE), 4).unwrap(), 0);
    }
    assert_eq!(kernel.space(a).unwrap().resident_pages(), 0);

    kernel.switch_to(a).unwrap();
    for page in 0..8 {
        for word in 0..PAGE_SIZE / 4 {
            let address = VirtualAddress(page * PAGE_SIZE + word * 4);
            assert_eq!(kernel.read_mem(address, 4).unwrap(), pattern(page, word));
        }
    }
    let stats = kernel.stats();
    assert_eq!(stats.write_backs, 8);
    assert_eq!(stats.evictions, 16);
    assert_eq!(stats.free_frame_faults, 8);
    assert_eq!(kernel.verify(), Ok(()));
}

#[test]
fn clean_victim_is_not_written_back() {
    let image = NoffBuilder::new()
        .code(0, &[0x5a; 8 * 128])
        .build::<NativeEndian>();
    let (mut kernel, fs) = kernel(16, &[("a", image), ("b", stack_only())]);
    let a = kernel.exec("a").unwrap();
    let swap = kernel.space(a).unwrap().swap_file().to_string();
    let pages = kernel.space(a).unwrap().num_pages();
    for page in 0..pages {
        kernel.read_mem(VirtualAddress(page * PAGE_SIZE), 1).unwrap();
    }
    kernel.exec("b").unwrap();
    for page in 0..8 {
        kernel.read_mem(VirtualAddress(page * PAGE_SIZE), 1).unwrap();
    }
    assert_eq!(kernel.stats().write_backs, 0);
    assert!(fs.contents(&swap).unwrap().iter().all(|&b| b == 0));
    kernel.switch_to(a).unwrap();
    assert_eq!(kernel.read_mem(VirtualAddress(0), 1).unwrap(), 0x5a);
    assert!(!kernel
        .space(a)
        .unwrap()
        .entry(VirtualPageNumber(0))
        .unwrap()
        .is_swapped());
}

#[test]
fn exit_releases_every_frame() {
    let (mut kernel, fs) = kernel(8, &[("a", stack_only()), ("b", stack_only())]);
    let a = kernel.exec("a").unwrap();
    for page in 0..5 {
        kernel.write_mem(VirtualAddress(page * PAGE_SIZE), 4, 9).unwrap();
    }
    let b = kernel.exec("b").unwrap();
    for page in 0..3 {
        kernel.write_mem(VirtualAddress(page * PAGE_SIZE), 4, 7).unwrap();
    }
    let swap = kernel.space(a).unwrap().swap_file().to_string();
    kernel.exit(a).unwrap();
    assert_eq!(kernel.frames().owned_by(a).count(), 0);
    assert_eq!(kernel.frames().free_count(), 5);
    assert!(!fs.exists(&swap));
    // 释放的页帧内容已清零
    for frame in 0..8 {
        let frame = PhysicalPageNumber(frame);
        if kernel.frames().owner(frame).is_none() {
            assert!(kernel.machine().memory.frame(frame).iter().all(|&b| b == 0));
        }
    }
    assert_eq!(kernel.machine().active(), Some(b));
    assert_eq!(kernel.verify(), Ok(()));
    assert!(kernel.exit(a).is_err());
}

#[test]
fn write_back_failure_keeps_victim_mapped() {
    let (mut kernel, fs) = kernel(8, &[("a", stack_only()), ("b", stack_only())]);
    let a = kernel.exec("a").unwrap();
    for page in 0..8 {
        kernel.write_mem(VirtualAddress(page * PAGE_SIZE), 4, 1).unwrap();
    }
    let swap = kernel.space(a).unwrap().swap_file().to_string();
    fs.remove(&swap).unwrap();
    let b = kernel.load("b").unwrap();
    assert!(matches!(
        kernel.resolve_fault(b, VirtualAddress(0)),
        Err(FaultError::Storage { .. })
    ));
    assert_eq!(kernel.space(a).unwrap().resident_pages(), 8);
    assert_eq!(kernel.verify(), Ok(()));
}

proptest! {
    #[test]
    fn frames_stay_exclusive(
        ops in proptest::collection::vec((0usize..3, 0usize..8, any::<bool>()), 1..150)
    ) {
        let programs = [("p0", stack_only()), ("p1", stack_only()), ("p2", stack_only())];
        let (mut kernel, _) = kernel(8, &programs);
        let handles: Vec<_> = programs
            .iter()
            .map(|(name, _)| kernel.load(name).unwrap())
            .collect();
        let mut shadow: HashMap<(usize, usize), u32> = HashMap::new();
        for (step, (process, page, write)) in ops.into_iter().enumerate() {
            kernel.switch_to(handles[process]).unwrap();
            let address = VirtualAddress(page * PAGE_SIZE + 8);
            if write {
                let value = step as u32 + 1;
                kernel.write_mem(address, 4, value).unwrap();
                shadow.insert((process, page), value);
            } else {
                let value = kernel.read_mem(address, 4).unwrap();
                prop_assert_eq!(value, shadow.get(&(process, page)).copied().unwrap_or(0));
            }
            prop_assert_eq!(kernel.verify(), Ok(()));
            let resident: usize = handles
                .iter()
                .map(|handle| kernel.space(*handle).unwrap().resident_pages())
                .sum();
            prop_assert_eq!(resident + kernel.frames().free_count(), 8);
        }
    }
}
