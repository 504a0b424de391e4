//! End-to-end Mach-O loading against crafted 64-bit images.

mod common;

use binscope::prelude::*;

#[test]
fn text_segment_layout() {
    let mut program = Program::new("tool");
    load_bytes(common::macho::with_symbols(), &mut program).unwrap();

    // initprot 5 = R|X
    let regions = program.memory_map().regions();
    assert_eq!(regions.len(), 1);
    assert_eq!(
        regions[0],
        MemoryRegion {
            start: 0x1_0000_0000,
            size: 0x1000,
            readable: true,
            writable: false,
            executable: true,
        }
    );

    // file-backed bytes and the vmsize tail
    let segments = program.memory_image().segments();
    assert_eq!(segments.len(), 2);
    assert_eq!(segments[0].start(), 0x1_0000_0000);
    assert_eq!(segments[0].data().len(), 0x800);
    assert_eq!(segments[1].start(), 0x1_0000_0800);
    assert_eq!(segments[1].data().len(), 0x800);
    assert_eq!(program.memory_image().read_u64(0x1_0000_0800), Some(0));

    let spaces = program.address_spaces();
    assert_eq!(spaces.len(), 1);
    assert_eq!(spaces[0].name(), "image");
    assert_eq!(spaces[0].base(), 0x1_0000_0000);
    assert_eq!(spaces[0].size(), 0x1000);

    let raw_segments = program.segments();
    assert_eq!(raw_segments.len(), 1);
    assert_eq!(raw_segments[0].vaddr, 0x1_0000_0000);
    assert_eq!(raw_segments[0].memsz, 0x1000);
    assert_eq!(raw_segments[0].filesz, 0x800);
    assert_eq!(raw_segments[0].flags, 5);

    let sections = program.sections();
    assert_eq!(sections.len(), 1);
    assert_eq!(sections[0].name, "__text");
    assert_eq!(sections[0].address, 0x1_0000_0400);
    assert_eq!(sections[0].size, 0x100);
}

#[test]
fn nlist_entries_become_function_symbols() {
    let mut program = Program::new("tool");
    load_bytes(common::macho::with_symbols(), &mut program).unwrap();

    let symbols = program.symbols();
    assert_eq!(symbols.len(), 2);
    assert_eq!(symbols[0].name, "_main");
    assert_eq!(symbols[0].address, 0x1_0000_0400);
    assert_eq!(symbols[0].kind, SymbolKind::Function);
    assert_eq!(symbols[1].name, "_helper");
    assert_eq!(symbols[1].address, 0x1_0000_0410);
}

#[test]
fn local_relocations_are_recorded_but_not_applied() {
    let mut program = Program::new("tool");
    load_bytes(common::macho::with_symbols(), &mut program).unwrap();

    let relocations = program.relocations();
    assert_eq!(relocations.len(), 1);
    assert_eq!(relocations[0].address, 0x10);
    assert!(!relocations[0].applied);
    assert_eq!(relocations[0].note, "macho reloc");
}

#[test]
fn bss_only_segment_zero_fills() {
    let mut program = Program::new("bss");
    load_bytes(common::macho::bss_only_segment(), &mut program).unwrap();

    // filesize 0, vmsize 0x1000: one zero-fill segment, one region
    let segments = program.memory_image().segments();
    assert_eq!(segments.len(), 1);
    assert_eq!(segments[0].start(), 0x1_0000_0000);
    assert_eq!(segments[0].data().len(), 0x1000);
    assert!(segments[0].data().iter().all(|&b| b == 0));

    assert_eq!(program.memory_map().regions().len(), 1);
    assert!(program.memory_map().regions()[0].writable);
    assert_eq!(program.address_spaces().len(), 1);
}

#[test]
fn big_endian_magic_is_rejected() {
    // MH_CIGAM_64: a byte-swapped header this loader does not accept
    let mut data = common::macho::with_symbols();
    data[0..4].copy_from_slice(&[0xFE, 0xED, 0xFA, 0xCF]);
    let mut program = Program::new("swapped");
    assert!(load_bytes(data, &mut program).is_err());
}

#[test]
fn loading_twice_is_deterministic() {
    let data = common::macho::with_symbols();

    let mut first = Program::new("tool");
    load_bytes(data.clone(), &mut first).unwrap();
    let mut second = Program::new("tool");
    load_bytes(data, &mut second).unwrap();

    assert_eq!(format!("{:?}", first.symbols()), format!("{:?}", second.symbols()));
    assert_eq!(
        format!("{:?}", first.memory_image().segments()),
        format!("{:?}", second.memory_image().segments())
    );
    assert_eq!(
        format!("{:?}", first.relocations()),
        format!("{:?}", second.relocations())
    );
}
