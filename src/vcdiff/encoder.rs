// Window encoder: turns a list of instructions over one target window into
// the three VCDIFF sections and the window header.

use super::address_cache::AddressCache;
use super::checksum::adler32;
use super::code_table::{self, ADD, CodeTable, COPY, Instruction, RUN};
use super::header::{CopyWindow, FileHeader, WindowHeader};
use super::varint;

/// The source segment a window's COPY addresses refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceWindow {
    pub len: u64,
    pub offset: u64,
}

/// Bytes of the file header written before the first window.
pub fn file_header() -> Vec<u8> {
    let mut out = Vec::with_capacity(5);
    FileHeader::default().write_to(&mut out);
    out
}

pub struct WindowEncoder {
    data: Vec<u8>,
    inst: Vec<u8>,
    addr: Vec<u8>,
    cache: AddressCache,
    table: &'static CodeTable,
    /// Last instruction, held back in case it pairs with the next one.
    pending: Option<(u8, u32)>,
    source: Option<SourceWindow>,
    target_len: u64,
    checksum: bool,
}

impl WindowEncoder {
    pub fn new(source: Option<SourceWindow>, checksum: bool) -> Self {
        Self {
            data: Vec::new(),
            inst: Vec::new(),
            addr: Vec::new(),
            cache: AddressCache::new(),
            table: code_table::default_code_table(),
            pending: None,
            source,
            target_len: 0,
            checksum,
        }
    }

    #[inline]
    fn here(&self) -> u64 {
        self.source.map_or(0, |s| s.len) + self.target_len
    }

    pub fn add(&mut self, literal: &[u8]) {
        if literal.is_empty() {
            return;
        }
        self.data.extend_from_slice(literal);
        self.queue(ADD, literal.len() as u32);
    }

    pub fn run(&mut self, len: u32, byte: u8) {
        if len == 0 {
            return;
        }
        self.data.push(byte);
        self.queue(RUN, len);
    }

    /// COPY `len` bytes from `addr` in the source+target address space.
    pub fn copy(&mut self, len: u32, addr: u64) {
        if len == 0 {
            return;
        }
        let (mode, encoded) = self.cache.encode(addr, self.here());
        encoded.write_to(&mut self.addr);
        self.queue(COPY + mode, len);
    }

    /// Encode `instructions`, taking ADD and RUN bytes from `target` in order.
    pub fn extend(&mut self, target: &[u8], instructions: &[Instruction]) {
        let mut pos = 0usize;
        for inst in instructions {
            let len = inst.len() as usize;
            match *inst {
                Instruction::Add { .. } => self.add(&target[pos..pos + len]),
                Instruction::Run { len } => self.run(len, target[pos]),
                Instruction::Copy { len, addr } => self.copy(len, addr),
            }
            pos += len;
        }
        debug_assert_eq!(pos, target.len());
    }

    fn queue(&mut self, itype: u8, size: u32) {
        self.target_len += u64::from(size);
        match self.pending.take() {
            Some(prev) => match self.table.double(prev, (itype, size)) {
                Some(op) => self.inst.push(op),
                None => {
                    self.emit_single(prev);
                    self.pending = Some((itype, size));
                }
            },
            None => self.pending = Some((itype, size)),
        }
    }

    fn emit_single(&mut self, (itype, size): (u8, u32)) {
        let (op, explicit) = self.table.single(itype, size);
        self.inst.push(op);
        if explicit {
            varint::push_u64(&mut self.inst, u64::from(size));
        }
    }

    /// Close the window. `target` is the window's full content, used for the
    /// checksum.
    pub fn finish(mut self, target: &[u8]) -> Vec<u8> {
        if let Some(prev) = self.pending.take() {
            self.emit_single(prev);
        }
        debug_assert_eq!(self.target_len, target.len() as u64);

        let header = WindowHeader {
            copy_window: self.source.map(|s| CopyWindow {
                len: s.len,
                offset: s.offset,
                from_target: false,
            }),
            target_window_len: self.target_len,
            del_ind: 0,
            data_len: self.data.len() as u64,
            inst_len: self.inst.len() as u64,
            addr_len: self.addr.len() as u64,
            adler32: self.checksum.then(|| adler32(target)),
        };
        let mut out =
            Vec::with_capacity(32 + self.data.len() + self.inst.len() + self.addr.len());
        header.write_to(&mut out);
        out.extend_from_slice(&self.data);
        out.extend_from_slice(&self.inst);
        out.extend_from_slice(&self.addr);
        out
    }
}
