use kernel_alloc::{FrameArena, FramePool, FramePoolError, PhysMapper, PoolId};
use kernel_info::memory::MemoryLayout;
use kernel_memory_addresses::{FrameNumber, VirtualAddress};
use kernel_vmem::page_table::directory::{DirectoryIndex, PageDirectory};
use kernel_vmem::{
    FaultResolution, Lookup, MemorySystem, PageFaultError, PagingError, RecordingMmu, VmPool, dispatch_fault,
};

const HEAP_BASE: u32 = 0x4000_0000;

/// Kernel pool `512..1024`, process pool `1024..1024+process_frames`, no hole.
fn boot(ram: &FrameArena, process_frames: u32) -> MemorySystem<'_, FrameArena, RecordingMmu> {
    let layout = MemoryLayout::DEFAULT
        .with_process_pool(FrameNumber::new(1024), process_frames)
        .with_memory_hole(None);
    unsafe { MemorySystem::bootstrap(ram, RecordingMmu::new(), &layout) }.expect("bootstrap")
}

fn process_free(mem: &MemorySystem<'_, FrameArena, RecordingMmu>) -> u32 {
    let id: PoolId = mem.paging.config().process_pool;
    mem.paging.frame_pools().get(id).map(FramePool::free_frames).expect("process pool")
}

fn directory_entries(ram: &FrameArena, mem: &MemorySystem<'_, FrameArena, RecordingMmu>) -> usize {
    let dir: &PageDirectory = unsafe { ram.frame_to_mut(mem.kernel_table.directory_frame()) };
    dir.present_count()
}

fn directory_user_bit(ram: &FrameArena, mem: &MemorySystem<'_, FrameArena, RecordingMmu>, va: VirtualAddress) -> bool {
    let dir: &PageDirectory = unsafe { ram.frame_to_mut(mem.kernel_table.directory_frame()) };
    dir.get(DirectoryIndex::from(va)).flags().user_access()
}

fn read_fault() -> PageFaultError {
    PageFaultError::new()
}

fn user_write_fault() -> PageFaultError {
    PageFaultError::new().with_write(true).with_user(true)
}

#[test]
fn first_fault_installs_leaf_table_and_backing_frame() {
    let ram = FrameArena::new(FrameNumber::new(512), 1536);
    let mut mem = boot(&ram, 1024);
    let table = mem.kernel_table;
    let process = mem.paging.config().process_pool;
    let mut heap = VmPool::new(&mut mem.paging, VirtualAddress::new(HEAP_BASE), 1 << 20, process, table)
        .expect("heap");
    let region = heap.allocate(4 * 4096).expect("region");

    assert_eq!(mem.paging.lookup(table, region), Ok(Lookup::NoLeafTable));
    let free_before = process_free(&mem);
    let dirs_before = directory_entries(&ram, &mem);

    let first = mem.paging.handle_fault(region, read_fault()).expect("first fault");
    assert_eq!(
        first,
        FaultResolution::LeafTableCreated {
            table: FrameNumber::new(1024),
            frame: FrameNumber::new(1025)
        }
    );
    assert_eq!(process_free(&mem), free_before - 2);
    assert_eq!(directory_entries(&ram, &mem), dirs_before + 1);

    let next = VirtualAddress::new(region.as_u32() + 0x1000);
    let second = mem.paging.handle_fault(next, read_fault()).expect("second fault");
    assert_eq!(second, FaultResolution::PageMapped { frame: FrameNumber::new(1026) });
    assert_eq!(process_free(&mem), free_before - 3);
    assert_eq!(directory_entries(&ram, &mem), dirs_before + 1);

    let pa = table.translate(&ram, VirtualAddress::new(next.as_u32() + 0x123));
    assert_eq!(pa.map(|p| p.as_u32()), Some(1026 * 4096 + 0x123));

    // Untouched pages of the new leaf table stay absent, tagged for user access.
    let untouched = VirtualAddress::new(region.as_u32() + 0x2000);
    match mem.paging.lookup(table, untouched) {
        Ok(Lookup::Absent { entry, .. }) => assert!(entry.flags().user_access()),
        other => panic!("unexpected lookup {other:?}"),
    }
}

#[test]
fn repeated_fault_on_backed_page_changes_nothing() {
    let ram = FrameArena::new(FrameNumber::new(512), 1536);
    let mut mem = boot(&ram, 1024);
    let va = VirtualAddress::new(HEAP_BASE + 0x5000);

    mem.paging.handle_fault(va, read_fault()).expect("backed");
    let free = process_free(&mem);

    assert_eq!(mem.paging.handle_fault(va, read_fault()), Ok(FaultResolution::AlreadyMapped));
    assert_eq!(process_free(&mem), free);
}

#[test]
fn protection_violation_is_ignored() {
    let ram = FrameArena::new(FrameNumber::new(512), 1536);
    let mut mem = boot(&ram, 1024);
    let free = process_free(&mem);

    let res = mem
        .paging
        .handle_fault(VirtualAddress::new(HEAP_BASE), PageFaultError::new().with_present(true).with_write(true));
    assert_eq!(res, Ok(FaultResolution::ProtectionViolation));
    assert_eq!(process_free(&mem), free);
    assert_eq!(mem.paging.lookup(mem.kernel_table, VirtualAddress::new(HEAP_BASE)), Ok(Lookup::NoLeafTable));
}

#[test]
fn illegal_access_mutates_nothing() {
    let ram = FrameArena::new(FrameNumber::new(512), 1536);
    let mut mem = boot(&ram, 1024);
    let table = mem.kernel_table;
    let process = mem.paging.config().process_pool;
    VmPool::new(&mut mem.paging, VirtualAddress::new(HEAP_BASE), 1 << 20, process, table).expect("heap");

    // Process pool bitmap lives in kernel frame 513.
    let bitmap_before: Vec<u32> = (0..64).map(|i| ram.read_u32(FrameNumber::new(513), i * 4)).collect();
    let free = process_free(&mem);
    let dirs = directory_entries(&ram, &mem);

    let outside = VirtualAddress::new(0x8000_0000);
    assert_eq!(
        mem.paging.handle_fault(outside, user_write_fault()),
        Err(PagingError::IllegalAccess(outside))
    );

    let bitmap_after: Vec<u32> = (0..64).map(|i| ram.read_u32(FrameNumber::new(513), i * 4)).collect();
    assert_eq!(bitmap_before, bitmap_after);
    assert_eq!(process_free(&mem), free);
    assert_eq!(directory_entries(&ram, &mem), dirs);
}

#[test]
#[should_panic(expected = "unrecoverable page fault")]
fn dispatch_treats_illegal_access_as_fatal() {
    let ram = FrameArena::new(FrameNumber::new(512), 1536);
    let mut mem = boot(&ram, 1024);
    let table = mem.kernel_table;
    let process = mem.paging.config().process_pool;
    VmPool::new(&mut mem.paging, VirtualAddress::new(HEAP_BASE), 1 << 20, process, table).expect("heap");

    dispatch_fault(&mut mem.paging, VirtualAddress::new(0x8000_0000), 0b010);
}

#[test]
fn dispatch_returns_resolution_for_legal_faults() {
    let ram = FrameArena::new(FrameNumber::new(512), 1536);
    let mut mem = boot(&ram, 1024);

    let res = dispatch_fault(&mut mem.paging, VirtualAddress::new(HEAP_BASE), 0b110);
    assert!(matches!(res, FaultResolution::LeafTableCreated { .. }));
}

#[test]
fn user_faults_grant_user_access_along_the_walk() {
    let ram = FrameArena::new(FrameNumber::new(512), 1536);
    let mut mem = boot(&ram, 1024);
    let kernel_va = VirtualAddress::new(HEAP_BASE);
    let user_va = VirtualAddress::new(HEAP_BASE + 0x1000);

    mem.paging.handle_fault(kernel_va, read_fault()).expect("kernel fault");
    assert!(!directory_user_bit(&ram, &mem, kernel_va));

    mem.paging.handle_fault(user_va, user_write_fault()).expect("user fault");
    assert!(directory_user_bit(&ram, &mem, user_va));

    match mem.paging.lookup(mem.kernel_table, user_va) {
        Ok(Lookup::Mapped { entry, .. }) => {
            assert!(entry.flags().user_access());
            assert!(entry.flags().writable());
        }
        other => panic!("unexpected lookup {other:?}"),
    }
}

#[test]
fn exhaustion_rolls_back_the_leaf_table() {
    let ram = FrameArena::new(FrameNumber::new(512), 520);
    let mut mem = boot(&ram, 8);

    // Three leaf tables with one page each, plus one more page: 7 frames.
    for base in [0x4000_0000, 0x4040_0000, 0x4080_0000] {
        mem.paging.handle_fault(VirtualAddress::new(base), read_fault()).expect("fault");
    }
    mem.paging.handle_fault(VirtualAddress::new(0x4000_1000), read_fault()).expect("fault");
    assert_eq!(process_free(&mem), 1);

    let res = mem.paging.handle_fault(VirtualAddress::new(0x40C0_0000), read_fault());
    assert_eq!(
        res,
        Err(PagingError::FramePool(FramePoolError::Exhausted { requested: 1, free: 0 }))
    );
    assert_eq!(process_free(&mem), 1);
    assert_eq!(
        mem.paging.lookup(mem.kernel_table, VirtualAddress::new(0x40C0_0000)),
        Ok(Lookup::NoLeafTable)
    );
}

#[test]
fn faults_are_served_everywhere_without_vm_pools() {
    let ram = FrameArena::new(FrameNumber::new(512), 1536);
    let mut mem = boot(&ram, 1024);

    let res = mem.paging.handle_fault(VirtualAddress::new(0xC000_0000), read_fault());
    assert!(matches!(res, Ok(FaultResolution::LeafTableCreated { .. })));
}
