// VCDIFF decoder: reads windows from a byte stream and rebuilds the target,
// fetching COPY source bytes through a `SourceProvider`.

use std::io::{self, Read};

use log::{trace, warn};

use super::address_cache::{AddressCache, AddressError};
use super::checksum::adler32;
use super::code_table::{self, ADD, COPY, CodeTable, NOOP, RUN};
use super::header::{CopyWindow, FileHeader, WindowHeader};
use super::varint::{self, VarIntError};

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("checksum mismatch: expected {expected:#010X}, got {actual:#010X}")]
    ChecksumMismatch { expected: u32, actual: u32 },
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl From<VarIntError> for DecodeError {
    fn from(e: VarIntError) -> Self {
        Self::InvalidInput(format!("instruction section: {e}"))
    }
}

impl From<AddressError> for DecodeError {
    fn from(e: AddressError) -> Self {
        Self::InvalidInput(e.to_string())
    }
}

/// Random access to the source a delta was computed against.
pub trait SourceProvider {
    /// Fill all of `buf` with source bytes starting at `offset`. Running past
    /// the end of the source is an error.
    fn read_source(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), DecodeError>;
}

impl SourceProvider for &[u8] {
    fn read_source(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), DecodeError> {
        let start = usize::try_from(offset).unwrap_or(usize::MAX);
        let bytes = start
            .checked_add(buf.len())
            .and_then(|end| self.get(start..end))
            .ok_or_else(|| {
                DecodeError::InvalidInput(format!(
                    "COPY of {} bytes at source offset {offset} exceeds source length {}",
                    buf.len(),
                    self.len()
                ))
            })?;
        buf.copy_from_slice(bytes);
        Ok(())
    }
}

/// Reads `len` bytes without trusting `len` for the allocation size.
fn read_section<R: Read + ?Sized>(r: &mut R, len: u64, what: &str) -> Result<Vec<u8>, DecodeError> {
    let mut buf = Vec::new();
    r.take(len).read_to_end(&mut buf)?;
    if (buf.len() as u64) < len {
        return Err(DecodeError::InvalidInput(format!(
            "{what} section truncated ({} of {len} bytes)",
            buf.len()
        )));
    }
    Ok(buf)
}

/// Window-at-a-time decoder over a delta stream.
pub struct StreamDecoder<R> {
    reader: R,
    header: Option<FileHeader>,
    verify_checksum: bool,
    cache: AddressCache,
    table: &'static CodeTable,
    copy_buf: Vec<u8>,
    windows: u64,
}

impl<R: Read> StreamDecoder<R> {
    pub fn new(reader: R, verify_checksum: bool) -> Self {
        Self {
            reader,
            header: None,
            verify_checksum,
            cache: AddressCache::new(),
            table: code_table::default_code_table(),
            copy_buf: Vec::new(),
            windows: 0,
        }
    }

    /// Parse the file header if it has not been read yet.
    pub fn read_header(&mut self) -> Result<&FileHeader, DecodeError> {
        if self.header.is_none() {
            self.header = Some(FileHeader::read_from(&mut self.reader)?);
        }
        Ok(self.header.get_or_insert_with(FileHeader::default))
    }

    pub fn windows_decoded(&self) -> u64 {
        self.windows
    }

    /// Decode the next window into `out` (cleared first). Returns `false`
    /// once the stream has no more windows.
    pub fn next_window(
        &mut self,
        source: &mut dyn SourceProvider,
        out: &mut Vec<u8>,
    ) -> Result<bool, DecodeError> {
        self.read_header()?;
        out.clear();

        let Some(hdr) = WindowHeader::read_from(&mut self.reader)? else {
            return Ok(false);
        };
        if hdr.del_ind != 0 {
            return Err(DecodeError::Unsupported(format!(
                "secondary compression (delta indicator {:#04X})",
                hdr.del_ind
            )));
        }
        if let Some(CopyWindow {
            from_target: true, ..
        }) = hdr.copy_window
        {
            return Err(DecodeError::Unsupported("VCD_TARGET copy windows".into()));
        }
        if hdr.data_len > hdr.target_window_len {
            return Err(DecodeError::InvalidInput(format!(
                "data section of {} bytes for a {} byte window",
                hdr.data_len, hdr.target_window_len
            )));
        }

        let data = read_section(&mut self.reader, hdr.data_len, "data")?;
        let inst = read_section(&mut self.reader, hdr.inst_len, "instruction")?;
        let addr = read_section(&mut self.reader, hdr.addr_len, "address")?;

        self.cache.reset();
        out.reserve(hdr.target_window_len as usize);
        self.execute(&hdr, source, &data, &inst, &addr, out)?;

        if self.verify_checksum
            && let Some(expected) = hdr.adler32
        {
            let actual = adler32(out);
            if actual != expected {
                warn!(
                    "window {}: checksum mismatch (expected {expected:#010X}, got {actual:#010X})",
                    self.windows
                );
                return Err(DecodeError::ChecksumMismatch { expected, actual });
            }
        }

        trace!(
            "window {}: {} target bytes from {} instruction bytes",
            self.windows,
            out.len(),
            inst.len()
        );
        self.windows += 1;
        Ok(true)
    }

    fn execute(
        &mut self,
        hdr: &WindowHeader,
        source: &mut dyn SourceProvider,
        mut data: &[u8],
        mut inst: &[u8],
        mut addr: &[u8],
        out: &mut Vec<u8>,
    ) -> Result<(), DecodeError> {
        let (src_len, src_offset) = hdr.copy_window.map_or((0, 0), |w| (w.len, w.offset));
        let target_len = hdr.target_window_len;

        while let Some((&opcode, rest)) = inst.split_first() {
            inst = rest;
            let entry = self.table.entry(opcode);
            for (itype, table_size) in [(entry.type1, entry.size1), (entry.type2, entry.size2)] {
                if itype == NOOP {
                    continue;
                }
                let size = if table_size == 0 {
                    let (v, used) = varint::read_u32(inst)?;
                    inst = &inst[used..];
                    v
                } else {
                    u32::from(table_size)
                };
                let len = size as usize;
                if out.len() as u64 + u64::from(size) > target_len {
                    return Err(DecodeError::InvalidInput(format!(
                        "instruction overruns the {target_len} byte target window"
                    )));
                }

                match itype {
                    ADD => {
                        let (bytes, rest) = take(data, len, "data")?;
                        out.extend_from_slice(bytes);
                        data = rest;
                    }
                    RUN => {
                        let (byte, rest) = take(data, 1, "data")?;
                        out.resize(out.len() + len, byte[0]);
                        data = rest;
                    }
                    _ => {
                        let here = src_len.checked_add(out.len() as u64).ok_or_else(|| {
                            DecodeError::InvalidInput(format!(
                                "source window of {src_len} bytes leaves no room for the target"
                            ))
                        })?;
                        let a = self.cache.decode(itype - COPY, here, &mut addr)?;
                        if a < src_len {
                            if u64::from(size) > src_len - a {
                                return Err(DecodeError::InvalidInput(format!(
                                    "COPY at {a} crosses the end of the {src_len} byte source window"
                                )));
                            }
                            self.copy_buf.resize(len, 0);
                            source.read_source(src_offset.saturating_add(a), &mut self.copy_buf)?;
                            out.extend_from_slice(&self.copy_buf);
                        } else {
                            // May overlap the bytes it produces.
                            let from = (a - src_len) as usize;
                            for i in 0..len {
                                let b = out[from + i];
                                out.push(b);
                            }
                        }
                    }
                }
            }
        }

        if out.len() as u64 != target_len {
            return Err(DecodeError::InvalidInput(format!(
                "window produced {} of {target_len} bytes",
                out.len()
            )));
        }
        if !data.is_empty() || !addr.is_empty() {
            return Err(DecodeError::InvalidInput(
                "unused bytes left in data or address section".into(),
            ));
        }
        Ok(())
    }
}

fn take<'a>(buf: &'a [u8], n: usize, what: &str) -> Result<(&'a [u8], &'a [u8]), DecodeError> {
    if buf.len() < n {
        return Err(DecodeError::InvalidInput(format!("{what} section exhausted")));
    }
    Ok(buf.split_at(n))
}

/// Decode a complete in-memory delta against an in-memory source.
pub fn decode_memory(delta: &[u8], source: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let mut decoder = StreamDecoder::new(delta, true);
    let mut source = source;
    let mut window = Vec::new();
    let mut target = Vec::new();
    while decoder.next_window(&mut source, &mut window)? {
        target.extend_from_slice(&window);
    }
    Ok(target)
}
