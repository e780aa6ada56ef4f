use super::*;
use alloc::vec::Vec;
use crate::error::IonErrorNum;
use crate::memory::{MapFlags, PAGE_SIZE};
use crate::tests::*;
use crate::tiler::container::SoftTiler;
use crate::tiler::TilerFormat;

const MB: usize = 1024 * 1024;

fn platform_data() -> IonPlatformData {
    IonPlatformData::new(vec![
        PlatformHeap::new(HeapId::Tiler, "tiler", CARVEOUT_BASE, 16 * MB),
        PlatformHeap::new(HeapId::NonsecureTiler, "nonsecure_tiler", CARVEOUT_BASE + 16 * MB, 8 * MB),
        PlatformHeap::new(HeapId::TilerReservation, "tiler_reservation", 0, 0),
    ])
}

fn registry() -> HeapRegistry<SoftTiler> {
    init_logging();
    HeapRegistry::init(&platform_data(), Arc::new(SoftTiler::new()), memory_map()).unwrap()
}

#[test]
fn test_init_creates_every_heap() {
    let registry = registry();
    assert_eq!(registry.heap_count(), 3);
    assert_eq!(registry.heap(HeapId::Tiler).unwrap().name(), "tiler");
    assert_eq!(
        registry.heap(HeapId::NonsecureTiler).unwrap().pool().unwrap().total_pages(),
        8 * MB / PAGE_SIZE
    );
    assert!(registry.heap(HeapId::SecureInput).is_none());
}

#[test]
fn test_duplicate_heap() {
    let mut registry = registry();
    let dup = PlatformHeap::new(HeapId::Tiler, "tiler2", 0xc000_0000, MB);
    assert_eq!(registry.create_heap(&dup).unwrap_err().num, IonErrorNum::EEXIST);
}

#[test]
fn test_allocate_query_free() {
    let mut registry = registry();
    let handle = registry
        .allocate(HeapId::Tiler, &TilerAllocRequest::new(TilerFormat::Bit16, 640, 480))
        .unwrap();
    assert_eq!(registry.buffer_count(), 1);

    let buffer = registry.buffer(handle).unwrap();
    let (start, vsize) = (buffer.tiler_start(), buffer.vsize());
    assert_eq!(registry.phys(handle).unwrap(), (start, vsize));
    assert_eq!(registry.vinfo(handle).unwrap(), (PAGE_SIZE, vsize));
    assert_eq!(vsize, 480 * PAGE_SIZE);
    let pages = registry.tiler_pages(handle).unwrap();
    assert_eq!(pages.len() * PAGE_SIZE, vsize);
    assert_eq!(pages[0], start);
    assert_eq!(registry.sg_table(handle).unwrap().nents(), 1);

    registry.free(handle).unwrap();
    assert_eq!(registry.buffer_count(), 0);
    assert_eq!(registry.free(handle).unwrap_err().num, IonErrorNum::ENOENT);
    assert_eq!(registry.phys(handle).unwrap_err().num, IonErrorNum::ENOENT);
    assert_eq!(registry.tiler_pages(handle).unwrap_err().num, IonErrorNum::ENOENT);
}

#[test]
fn test_allocate_from_unknown_heap() {
    let mut registry = registry();
    let err = registry
        .allocate(HeapId::LargeSurfaces, &TilerAllocRequest::linear(PAGE_SIZE))
        .unwrap_err();
    assert_eq!(err.num, IonErrorNum::ENODEV);
}

#[test]
fn test_handles_are_unique() {
    let mut registry = registry();
    let a = registry.allocate(HeapId::Tiler, &TilerAllocRequest::linear(PAGE_SIZE)).unwrap();
    let b = registry.allocate(HeapId::Tiler, &TilerAllocRequest::linear(PAGE_SIZE)).unwrap();
    assert_ne!(a, b);
    assert_ne!(a.raw(), 0);
    registry.free(a).unwrap();
    let c = registry.allocate(HeapId::NonsecureTiler, &TilerAllocRequest::linear(PAGE_SIZE)).unwrap();
    assert_ne!(b, c);
    registry.free(b).unwrap();
    registry.free(c).unwrap();
}

#[test]
fn test_destroy_busy_heap() {
    let mut registry = registry();
    let handle = registry
        .allocate(HeapId::NonsecureTiler, &TilerAllocRequest::new(TilerFormat::Bit32, 64, 64))
        .unwrap();
    assert_eq!(registry.destroy_heap(HeapId::NonsecureTiler).unwrap_err().num, IonErrorNum::EBUSY);
    registry.free(handle).unwrap();
    registry.destroy_heap(HeapId::NonsecureTiler).unwrap();
    assert!(registry.heap(HeapId::NonsecureTiler).is_none());
    assert_eq!(registry.destroy_heap(HeapId::NonsecureTiler).unwrap_err().num, IonErrorNum::ENOENT);
}

#[test]
fn test_map_user_through_handle() {
    let mut registry = registry();
    let handle = registry.allocate(HeapId::Tiler, &TilerAllocRequest::linear(2 * PAGE_SIZE)).unwrap();
    let vma = VmArea {
        start: 0x1000_0000,
        end: 0x1000_0000 + 2 * PAGE_SIZE,
        pgoff: 0,
        flags: MapFlags::READ,
    };
    let mut mapper = RecordingMapper::default();
    registry.map_user(handle, &vma, &mut mapper).unwrap();
    assert_eq!(mapper.calls.len(), 1);
    registry.free(handle).unwrap();
}

#[test]
fn test_free_restores_pools() {
    let mut registry = registry();
    let pool = registry.heap(HeapId::Tiler).unwrap().pool().unwrap().clone();
    let before = pool.free_pages();
    let handles: Vec<_> = (1..6)
        .map(|i| {
            registry
                .allocate(HeapId::Tiler, &TilerAllocRequest::new(TilerFormat::Bit8, 100 * i, 50 * i))
                .unwrap()
        })
        .collect();
    assert!(pool.free_pages() < before);
    for handle in handles {
        registry.free(handle).unwrap();
    }
    assert_eq!(pool.free_pages(), before);
}
