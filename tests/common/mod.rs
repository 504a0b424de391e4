//! Crafted-binary builders shared by the integration tests.
//!
//! Every builder assembles a complete, self-consistent container image in memory so
//! the tests exercise the same byte-level paths a real executable would, without
//! shipping sample binaries.

/// Little-endian byte-buffer builder.
pub struct Buf {
    data: Vec<u8>,
}

#[allow(dead_code)]
impl Buf {
    pub fn new() -> Buf {
        Buf { data: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn u8(&mut self, value: u8) {
        self.data.push(value);
    }

    pub fn u16(&mut self, value: u16) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn u32(&mut self, value: u32) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn u64(&mut self, value: u64) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn i64(&mut self, value: i64) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// A fixed-width name field, NUL-padded to `width`.
    pub fn name(&mut self, name: &str, width: usize) {
        assert!(name.len() <= width);
        self.data.extend_from_slice(name.as_bytes());
        self.data.resize(self.data.len() + (width - name.len()), 0);
    }

    pub fn zeros(&mut self, count: usize) {
        self.data.resize(self.data.len() + count, 0);
    }

    pub fn pad_to(&mut self, offset: usize) {
        assert!(self.data.len() <= offset, "layout overlap at {offset:#x}");
        self.data.resize(offset, 0);
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}

// ================================================================================================
// ELF
// ================================================================================================

#[allow(dead_code)]
pub mod elf {
    use super::Buf;

    const EHDR_SIZE: usize = 0x40;
    const PHDR_SIZE: usize = 0x38;
    const SHDR_SIZE: usize = 0x40;

    fn ehdr(buf: &mut Buf, e_type: u16, phnum: u16, shoff: u64, shnum: u16, shstrndx: u16) {
        buf.bytes(&[0x7F, b'E', b'L', b'F', 2, 1, 1, 0]);
        buf.zeros(8);
        buf.u16(e_type);
        buf.u16(0x3E); // EM_X86_64
        buf.u32(1);
        buf.u64(0x400000); // entry
        buf.u64(EHDR_SIZE as u64); // phoff: program headers follow the ELF header
        buf.u64(shoff);
        buf.u32(0);
        buf.u16(EHDR_SIZE as u16);
        buf.u16(PHDR_SIZE as u16);
        buf.u16(phnum);
        buf.u16(SHDR_SIZE as u16);
        buf.u16(shnum);
        buf.u16(shstrndx);
    }

    fn phdr(buf: &mut Buf, flags: u32, offset: u64, vaddr: u64, filesz: u64, memsz: u64) {
        buf.u32(1); // PT_LOAD
        buf.u32(flags);
        buf.u64(offset);
        buf.u64(vaddr);
        buf.u64(vaddr);
        buf.u64(filesz);
        buf.u64(memsz);
        buf.u64(0x1000);
    }

    fn shdr(
        buf: &mut Buf,
        name: u32,
        sh_type: u32,
        offset: u64,
        size: u64,
        link: u32,
        entsize: u64,
    ) {
        buf.u32(name);
        buf.u32(sh_type);
        buf.u64(0); // flags
        buf.u64(0); // addr
        buf.u64(offset);
        buf.u64(size);
        buf.u32(link);
        buf.u32(0); // info
        buf.u64(8); // addralign
        buf.u64(entsize);
    }

    /// Scenario: `ET_EXEC`, one `PT_LOAD` `{vaddr 0x400000, filesz 0x100,
    /// memsz 0x1000, R|X}`, no section headers. The payload bytes count up from 0.
    pub fn minimal_exec() -> Vec<u8> {
        let mut buf = Buf::new();
        ehdr(&mut buf, 2, 1, 0, 0, 0);
        let payload_off = (EHDR_SIZE + PHDR_SIZE) as u64;
        phdr(&mut buf, 0x5, payload_off, 0x400000, 0x100, 0x1000);
        for i in 0..0x100_u32 {
            buf.u8(i as u8);
        }
        buf.into_vec()
    }

    /// Scenario: `ET_DYN` with one `PT_LOAD` at `vaddr 0x1000` and one
    /// `R_X86_64_RELATIVE` record `{r_offset 0x100, addend 0x1234}` in a `.rela.dyn`
    /// section with no associated symbol table.
    pub fn shared_object_with_relative_reloc() -> Vec<u8> {
        let shoff = (EHDR_SIZE + PHDR_SIZE) as u64; // 0x78
        let rela_off = shoff + 3 * SHDR_SIZE as u64; // 0x138
        let shstrtab_off = rela_off + 24; // 0x150
        let shstrtab = b"\0.rela.dyn\0.shstrtab\0";
        let seg_off = 0x200_u64;

        let mut buf = Buf::new();
        ehdr(&mut buf, 3, 1, shoff, 3, 2);
        phdr(&mut buf, 0x6, seg_off, 0x1000, 0x2000, 0x2000);

        buf.zeros(SHDR_SIZE); // null section
        shdr(&mut buf, 1, 4, rela_off, 24, 0, 24); // .rela.dyn -> SHT_NULL "symtab"
        shdr(&mut buf, 11, 3, shstrtab_off, shstrtab.len() as u64, 0, 0); // .shstrtab

        // Elf64_Rela: R_X86_64_RELATIVE at module offset 0x100
        buf.u64(0x100);
        buf.u64(8);
        buf.i64(0x1234);

        buf.bytes(shstrtab);
        buf.pad_to(seg_off as usize);
        for i in 0..0x2000_u32 {
            buf.u8((i % 251) as u8);
        }
        buf.into_vec()
    }

    /// `ET_EXEC` carrying a symbol table and DWARF sections: one `FUNC` symbol
    /// (`main`), one sized `OBJECT` symbol (`counter`), and a compile unit of the
    /// given `version` with a `subprogram` -> `base_type` pair plus a v4 line
    /// program.
    pub fn exec_with_debug(dwarf_version: u16) -> Vec<u8> {
        // .symtab: null entry, main (FUNC), counter (OBJECT, 8 bytes)
        let mut symtab = Buf::new();
        symtab.zeros(24);
        symtab.u32(1); // name "main"
        symtab.u8(0x12); // GLOBAL | FUNC
        symtab.u8(0);
        symtab.u16(1);
        symtab.u64(0x400010);
        symtab.u64(0x20);
        symtab.u32(6); // name "counter"
        symtab.u8(0x11); // GLOBAL | OBJECT
        symtab.u8(0);
        symtab.u16(2);
        symtab.u64(0x400080);
        symtab.u64(8);
        let symtab = symtab.into_vec();

        let strtab = b"\0main\0counter\0".to_vec();

        // .debug_abbrev: compile_unit(stmt_list), subprogram(name, low/high_pc,
        // type), base_type(name, byte_size)
        let debug_abbrev: Vec<u8> = vec![
            1, 0x11, 1, 0x10, 0x17, 0, 0, // CU, children, stmt_list:sec_offset
            2, 0x2E, 0, 0x03, 0x08, 0x11, 0x01, 0x12, 0x06, 0x49, 0x13, 0, 0,
            3, 0x24, 0, 0x03, 0x08, 0x0B, 0x0B, 0, 0,
            0,
        ];

        // .debug_info: unit header (11 bytes), then the DIE stream
        let mut dies = Buf::new();
        dies.u8(1); // compile_unit at offset 11
        dies.u32(4); // stmt_list -> line program at offset 4
        dies.u8(2); // subprogram at offset 16
        dies.bytes(b"main\0");
        dies.u64(0x400500);
        dies.u32(0x20); // high_pc, data4 -> offset form
        dies.u32(38); // type ref -> base_type DIE
        dies.u8(3); // base_type at offset 38
        dies.bytes(b"int\0");
        dies.u8(4);
        dies.u8(0); // end of compile_unit children
        let dies = dies.into_vec();

        let mut debug_info = Buf::new();
        debug_info.u32(dies.len() as u32 + 7);
        debug_info.u16(dwarf_version);
        debug_info.u32(0); // abbrev offset
        debug_info.u8(8); // address size
        debug_info.bytes(&dies);
        let debug_info = debug_info.into_vec();

        // .debug_line: 4 pad bytes, then a v4 program committing two rows
        let mut line_header = Buf::new();
        line_header.u8(1); // min_inst_length
        line_header.u8(1); // max_ops_per_inst
        line_header.u8(1); // default_is_stmt
        line_header.u8((-5_i8) as u8); // line_base
        line_header.u8(14); // line_range
        line_header.u8(13); // opcode_base
        line_header.bytes(&[0, 1, 1, 1, 1, 0, 0, 0, 1, 0, 0, 1]);
        line_header.u8(0); // no include dirs
        line_header.bytes(b"a.c\0");
        line_header.bytes(&[0, 0, 0]); // dir_index, mtime, length
        line_header.u8(0); // end of file list
        let line_header = line_header.into_vec();

        let opcodes: &[u8] = &[1, 0xCB]; // copy, then special opcode 0xCB

        let mut debug_line = Buf::new();
        debug_line.u32(0); // pad so the program sits at a non-zero offset
        debug_line.u32((2 + 4 + line_header.len() + opcodes.len()) as u32);
        debug_line.u16(4);
        debug_line.u32(line_header.len() as u32);
        debug_line.bytes(&line_header);
        debug_line.bytes(opcodes);
        let debug_line = debug_line.into_vec();

        let shstrtab =
            b"\0.symtab\0.strtab\0.debug_info\0.debug_abbrev\0.debug_line\0.shstrtab\0".to_vec();

        // layout: headers, section header table, section blobs, load segment
        let shoff = (EHDR_SIZE + PHDR_SIZE) as u64;
        let blob_base = shoff as usize + 7 * SHDR_SIZE;
        let symtab_off = blob_base;
        let strtab_off = symtab_off + symtab.len();
        let info_off = strtab_off + strtab.len();
        let abbrev_off = info_off + debug_info.len();
        let line_off = abbrev_off + debug_abbrev.len();
        let shstrtab_off = line_off + debug_line.len();
        let payload_off = shstrtab_off + shstrtab.len();

        let mut buf = Buf::new();
        ehdr(&mut buf, 2, 1, shoff, 7, 6);
        phdr(&mut buf, 0x5, payload_off as u64, 0x400000, 0x100, 0x100);

        buf.zeros(SHDR_SIZE);
        shdr(&mut buf, 1, 2, symtab_off as u64, symtab.len() as u64, 2, 24);
        shdr(&mut buf, 9, 3, strtab_off as u64, strtab.len() as u64, 0, 0);
        shdr(&mut buf, 17, 1, info_off as u64, debug_info.len() as u64, 0, 0);
        shdr(&mut buf, 29, 1, abbrev_off as u64, debug_abbrev.len() as u64, 0, 0);
        shdr(&mut buf, 43, 1, line_off as u64, debug_line.len() as u64, 0, 0);
        shdr(&mut buf, 55, 3, shstrtab_off as u64, shstrtab.len() as u64, 0, 0);

        buf.bytes(&symtab);
        buf.bytes(&strtab);
        buf.bytes(&debug_info);
        buf.bytes(&debug_abbrev);
        buf.bytes(&debug_line);
        buf.bytes(&shstrtab);
        buf.zeros(0x100); // the loadable payload
        buf.into_vec()
    }
}

// ================================================================================================
// PE
// ================================================================================================

#[allow(dead_code)]
pub mod pe {
    use super::Buf;

    pub const IMAGE_BASE: u64 = 0x1_4000_0000;

    pub struct SectionSpec {
        pub name: &'static str,
        pub virtual_address: u32,
        pub virtual_size: u32,
        pub size_of_raw_data: u32,
        pub pointer_to_raw_data: u32,
        pub characteristics: u32,
    }

    /// PE32+ skeleton: DOS header at 0, NT headers at 0x40, `size_of_headers`
    /// 0x200. `dirs` assigns `(index, rva, size)` data-directory entries.
    pub fn pe64(sections: &[SectionSpec], dirs: &[(usize, u32, u32)]) -> Buf {
        let mut dir_table = [(0_u32, 0_u32); 16];
        for &(index, rva, size) in dirs {
            dir_table[index] = (rva, size);
        }

        let mut buf = Buf::new();
        // DOS header
        buf.bytes(b"MZ");
        buf.pad_to(0x3C);
        buf.u32(0x40); // e_lfanew
        // NT signature + file header
        buf.bytes(b"PE\0\0");
        buf.u16(0x8664);
        buf.u16(sections.len() as u16);
        buf.u32(0);
        buf.u32(0);
        buf.u32(0);
        buf.u16(240); // size_of_optional_header (PE32+)
        buf.u16(0x0022);
        // optional header
        buf.u16(0x20B);
        buf.u8(14);
        buf.u8(0);
        buf.u32(0x200); // size_of_code
        buf.u32(0x200); // size_of_initialized_data
        buf.u32(0);
        buf.u32(0x1000); // entry point
        buf.u32(0x1000); // base_of_code
        buf.u64(IMAGE_BASE);
        buf.u32(0x1000); // section_alignment
        buf.u32(0x200); // file_alignment
        buf.u16(6);
        buf.u16(0);
        buf.u16(0);
        buf.u16(0);
        buf.u16(6);
        buf.u16(0);
        buf.u32(0);
        buf.u32(0x3000); // size_of_image
        buf.u32(0x200); // size_of_headers
        buf.u32(0);
        buf.u16(3); // subsystem
        buf.u16(0);
        buf.u64(0x100000);
        buf.u64(0x1000);
        buf.u64(0x100000);
        buf.u64(0x1000);
        buf.u32(0);
        buf.u32(16); // number_of_rva_and_sizes
        for (rva, size) in dir_table {
            buf.u32(rva);
            buf.u32(size);
        }
        // section table
        for sec in sections {
            buf.name(sec.name, 8);
            buf.u32(sec.virtual_size);
            buf.u32(sec.virtual_address);
            buf.u32(sec.size_of_raw_data);
            buf.u32(sec.pointer_to_raw_data);
            buf.u32(0);
            buf.u32(0);
            buf.u16(0);
            buf.u16(0);
            buf.u32(sec.characteristics);
        }
        buf
    }

    /// Scenario: one `.text` section and a base-relocation directory holding one
    /// HIGHLOW entry at `image_base + 0x1008`, followed by a zero-sized terminator
    /// block.
    pub fn with_base_relocs() -> Vec<u8> {
        let mut buf = pe64(
            &[SectionSpec {
                name: ".text",
                virtual_address: 0x1000,
                virtual_size: 0x200,
                size_of_raw_data: 0x200,
                pointer_to_raw_data: 0x200,
                characteristics: 0x6000_0020,
            }],
            &[(5, 0x1000, 18)],
        );

        buf.pad_to(0x200);
        // reloc block: one HIGHLOW entry at page offset 8 - the entry word itself
        // is the u32 the fixup round-trips
        buf.u32(0x1000); // page_rva
        buf.u32(10); // block_size: header + one entry
        buf.u16(0x3008);
        // terminator block with block_size == 0
        buf.u32(0);
        buf.u32(0);
        buf.pad_to(0x400);
        buf.into_vec()
    }

    /// Two sections with an export (`frob`), one import (`user32.dll!MessageBoxA`)
    /// and a CodeView `RSDS` debug entry pointing at `out\app.pdb`.
    pub fn with_symbols_and_pdb() -> Vec<u8> {
        let mut buf = pe64(
            &[
                SectionSpec {
                    name: ".text",
                    virtual_address: 0x1000,
                    virtual_size: 0x200,
                    size_of_raw_data: 0x200,
                    pointer_to_raw_data: 0x200,
                    characteristics: 0x6000_0020,
                },
                SectionSpec {
                    name: ".rdata",
                    virtual_address: 0x2000,
                    virtual_size: 0x200,
                    size_of_raw_data: 0x200,
                    pointer_to_raw_data: 0x400,
                    characteristics: 0x4000_0040,
                },
            ],
            &[(0, 0x2000, 0x28), (1, 0x2050, 0x28), (6, 0x20D0, 0x1C)],
        );

        buf.pad_to(0x200);
        buf.zeros(0x200); // .text raw data

        // .rdata @ file 0x400 == rva 0x2000
        // export directory
        buf.u32(0); // characteristics
        buf.u32(0); // timestamp
        buf.u16(0);
        buf.u16(0);
        buf.u32(0); // name
        buf.u32(1); // ordinal base
        buf.u32(1); // number_of_functions
        buf.u32(1); // number_of_names
        buf.u32(0x2028); // address_of_functions
        buf.u32(0x2030); // address_of_names
        buf.u32(0x2034); // address_of_name_ordinals
        buf.pad_to(0x428);
        buf.u32(0x1000); // function RVA
        buf.pad_to(0x430);
        buf.u32(0x2040); // name RVA
        buf.pad_to(0x434);
        buf.u16(0); // ordinal
        buf.pad_to(0x440);
        buf.bytes(b"frob\0");

        // import descriptor array + terminator
        buf.pad_to(0x450);
        buf.u32(0x2078); // original_first_thunk
        buf.u32(0);
        buf.u32(0);
        buf.u32(0x2090); // dll name RVA
        buf.u32(0x20A0); // first_thunk
        buf.zeros(20); // sentinel descriptor
        buf.pad_to(0x478);
        buf.u64(0x20B0); // thunk -> hint/name
        buf.u64(0); // thunk terminator
        buf.pad_to(0x490);
        buf.bytes(b"user32.dll\0");
        buf.pad_to(0x4B0);
        buf.u16(0); // hint
        buf.bytes(b"MessageBoxA\0");

        // debug directory: one CodeView entry
        buf.pad_to(0x4D0);
        buf.u32(0);
        buf.u32(0);
        buf.u16(0);
        buf.u16(0);
        buf.u32(2); // type: CodeView
        buf.u32(0x40); // size_of_data
        buf.u32(0x2100); // address_of_raw_data
        buf.u32(0x500); // pointer_to_raw_data

        // RSDS record: magic, GUID, age, path
        buf.pad_to(0x500);
        buf.bytes(b"RSDS");
        buf.zeros(16); // GUID
        buf.u32(1); // age
        buf.bytes(b"out\\app.pdb\0");
        buf.pad_to(0x600);
        buf.into_vec()
    }
}

// ================================================================================================
// Mach-O
// ================================================================================================

#[allow(dead_code)]
pub mod macho {
    use super::Buf;

    fn header(buf: &mut Buf, ncmds: u32, sizeofcmds: u32) {
        buf.u32(0xFEED_FACF);
        buf.u32(0x0100_0007); // CPU_TYPE_X86_64
        buf.u32(3);
        buf.u32(2); // MH_EXECUTE
        buf.u32(ncmds);
        buf.u32(sizeofcmds);
        buf.u32(0);
        buf.u32(0); // reserved
    }

    #[allow(clippy::too_many_arguments)]
    fn segment(
        buf: &mut Buf,
        name: &str,
        nsects: u32,
        vmaddr: u64,
        vmsize: u64,
        fileoff: u64,
        filesize: u64,
        initprot: u32,
    ) {
        buf.u32(0x19); // LC_SEGMENT_64
        buf.u32(72 + nsects * 80);
        buf.name(name, 16);
        buf.u64(vmaddr);
        buf.u64(vmsize);
        buf.u64(fileoff);
        buf.u64(filesize);
        buf.u32(7); // maxprot
        buf.u32(initprot);
        buf.u32(nsects);
        buf.u32(0);
    }

    /// Scenario: one `__TEXT` segment `{vmaddr 0x100000000, vmsize 0x1000,
    /// filesize 0x800, initprot R|X}` with an inline `__text` section, a symbol
    /// table (`_main`, `_helper`) and one local relocation record.
    pub fn with_symbols() -> Vec<u8> {
        let mut buf = Buf::new();
        header(&mut buf, 3, 152 + 24 + 80);

        segment(&mut buf, "__TEXT", 1, 0x1_0000_0000, 0x1000, 0x400, 0x800, 5);
        // inline Section64
        buf.name("__text", 16);
        buf.name("__TEXT", 16);
        buf.u64(0x1_0000_0400);
        buf.u64(0x100);
        buf.u32(0x500); // file offset
        buf.u32(4); // align
        buf.u32(0); // reloff
        buf.u32(0); // nreloc
        buf.u32(0x8000_0400); // flags
        buf.u32(0);
        buf.u32(0);
        buf.u32(0);

        // LC_SYMTAB
        buf.u32(0x2);
        buf.u32(24);
        buf.u32(0x120); // symoff
        buf.u32(2); // nsyms
        buf.u32(0x140); // stroff
        buf.u32(15); // strsize

        // LC_DYSYMTAB, only the local-relocation tail is populated
        buf.u32(0xB);
        buf.u32(80);
        buf.zeros(64);
        buf.u32(0x150); // locreloff
        buf.u32(1); // nlocrel

        // nlist_64 entries
        buf.pad_to(0x120);
        buf.u32(1); // "_main"
        buf.u8(0x0F);
        buf.u8(1);
        buf.u16(0);
        buf.u64(0x1_0000_0400);
        buf.u32(7); // "_helper"
        buf.u8(0x0F);
        buf.u8(1);
        buf.u16(0);
        buf.u64(0x1_0000_0410);

        buf.pad_to(0x140);
        buf.bytes(b"\0_main\0_helper\0");

        // one RelocationInfo: r_address 0x10, length 3 (packed bitfield)
        buf.pad_to(0x150);
        buf.u32(0x10);
        buf.u32(3 << 25);

        buf.pad_to(0x400);
        for i in 0..0x800_u32 {
            buf.u8((i % 247) as u8);
        }
        buf.into_vec()
    }

    /// Boundary: a segment with `filesize 0` and `vmsize 0x1000` - pure BSS.
    pub fn bss_only_segment() -> Vec<u8> {
        let mut buf = Buf::new();
        header(&mut buf, 1, 72);
        segment(&mut buf, "__DATA", 0, 0x1_0000_0000, 0x1000, 0, 0, 3);
        buf.into_vec()
    }
}
