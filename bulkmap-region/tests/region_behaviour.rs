//! Behavioural tests for creating, releasing, and moving memory regions.

use bulkmap_region::{MappingMode, MemoryRegion};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use std::cell::RefCell;
use tempfile::NamedTempFile;

#[fixture]
fn region() -> RefCell<Option<MemoryRegion>> {
    RefCell::new(None)
}

#[fixture]
fn taken() -> RefCell<Option<MemoryRegion>> {
    RefCell::new(None)
}

#[fixture]
fn backing() -> RefCell<Option<NamedTempFile>> {
    RefCell::new(None)
}

#[given("an anonymous region of 4096 bytes")]
fn given_anonymous_region(#[from(region)] region: &RefCell<Option<MemoryRegion>>) {
    let created =
        MemoryRegion::anonymous(4096, MappingMode::WritePrivate).expect("anonymous mapping");
    *region.borrow_mut() = Some(created);
}

#[given("an empty backing file")]
fn given_empty_file(#[from(backing)] backing: &RefCell<Option<NamedTempFile>>) {
    *backing.borrow_mut() = Some(NamedTempFile::new().expect("create temp file"));
}

#[when("the region is unmapped twice")]
fn when_unmapped_twice(#[from(region)] region: &RefCell<Option<MemoryRegion>>) {
    let mut guard = region.borrow_mut();
    let live = guard.as_mut().expect("region created");
    live.unmap().expect("first unmap");
    live.unmap().expect("second unmap");
}

#[when("100 bytes are mapped shared at offset 8192")]
fn when_file_mapped(
    #[from(backing)] backing: &RefCell<Option<NamedTempFile>>,
    #[from(region)] region: &RefCell<Option<MemoryRegion>>,
) {
    let file = backing.borrow();
    let handle = file.as_ref().expect("backing file created").as_file();
    let mapped =
        MemoryRegion::with_file(100, MappingMode::WriteShared, handle, 8192).expect("file mapping");
    *region.borrow_mut() = Some(mapped);
}

#[when("the region is taken")]
fn when_taken(
    #[from(region)] region: &RefCell<Option<MemoryRegion>>,
    #[from(taken)] taken: &RefCell<Option<MemoryRegion>>,
) {
    let moved = region.borrow_mut().as_mut().expect("region created").take();
    *taken.borrow_mut() = Some(moved);
}

#[then("the region is invalid")]
fn then_invalid(#[from(region)] region: &RefCell<Option<MemoryRegion>>) {
    let guard = region.borrow();
    let live = guard.as_ref().expect("region created");
    assert!(!live.is_valid(), "expected the region to be released");
    assert!(live.as_slice().is_empty());
}

#[then("the backing file holds at least 8292 bytes")]
fn then_file_grown(#[from(backing)] backing: &RefCell<Option<NamedTempFile>>) {
    let file = backing.borrow();
    let len = file
        .as_ref()
        .expect("backing file created")
        .as_file()
        .metadata()
        .expect("file metadata")
        .len();
    assert!(len >= 8292, "expected the file to cover the mapping, got {len}");
}

#[then("the region reports a size of 100 bytes")]
fn then_region_size(#[from(region)] region: &RefCell<Option<MemoryRegion>>) {
    let guard = region.borrow();
    let live = guard.as_ref().expect("region created");
    assert!(live.is_valid());
    assert_eq!(live.size(), 100);
    assert_eq!(live.offset(), 8192);
}

#[then("the taken region is valid with a size of 4096 bytes")]
fn then_taken_valid(#[from(taken)] taken: &RefCell<Option<MemoryRegion>>) {
    let guard = taken.borrow();
    let moved = guard.as_ref().expect("region taken");
    assert!(moved.is_valid());
    assert_eq!(moved.size(), 4096);
    assert_eq!(moved.mode(), MappingMode::WritePrivate);
}

#[scenario(path = "tests/features/memory_region.feature", index = 0)]
fn scenario_unmap_anonymous(
    region: RefCell<Option<MemoryRegion>>,
    taken: RefCell<Option<MemoryRegion>>,
    backing: RefCell<Option<NamedTempFile>>,
) {
    let _ = (region, taken, backing);
}

#[scenario(path = "tests/features/memory_region.feature", index = 1)]
fn scenario_grow_backing_file(
    region: RefCell<Option<MemoryRegion>>,
    taken: RefCell<Option<MemoryRegion>>,
    backing: RefCell<Option<NamedTempFile>>,
) {
    let _ = (region, taken, backing);
}

#[scenario(path = "tests/features/memory_region.feature", index = 2)]
fn scenario_take_region(
    region: RefCell<Option<MemoryRegion>>,
    taken: RefCell<Option<MemoryRegion>>,
    backing: RefCell<Option<NamedTempFile>>,
) {
    let _ = (region, taken, backing);
}
