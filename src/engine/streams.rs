// std::io views over callback handles, and the decode-side source cache.
//
// A failing callback is carried inside an `io::Error` as a
// `CallbackFailure`, so the exact status survives any layer of
// `Read`/`Write` plumbing and can be recovered with `callback_status`.

use std::io::{self, Read, Write};

use log::{debug, trace};

use super::{EngineError, HandleId, SEEK_CUR, Status, StreamCallbacks};
use crate::vcdiff::{DecodeError, SourceProvider};

#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("stream callback returned {0}")]
pub struct CallbackFailure(pub Status);

fn failure(status: Status) -> io::Error {
    io::Error::other(CallbackFailure(status))
}

/// The callback status carried by `e`, if it came from a callback.
pub fn callback_status(e: &io::Error) -> Option<Status> {
    e.get_ref()?
        .downcast_ref::<CallbackFailure>()
        .map(|f| f.0)
}

fn check(status: Status) -> io::Result<()> {
    if status.is_success() {
        Ok(())
    } else {
        Err(failure(status))
    }
}

/// `Read` over a registered handle. Each `read` is one callback.
pub struct CallbackReader<'a> {
    io: &'a dyn StreamCallbacks,
    handle: HandleId,
}

impl<'a> CallbackReader<'a> {
    pub fn new(io: &'a dyn StreamCallbacks, handle: HandleId) -> Self {
        Self { io, handle }
    }
}

impl Read for CallbackReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut nread = 0;
        check(self.io.read(buf, &mut nread, self.handle))?;
        Ok(nread)
    }
}

/// `Write` over a registered handle. Each `write` is one all-or-nothing
/// callback.
pub struct CallbackWriter<'a> {
    io: &'a dyn StreamCallbacks,
    handle: HandleId,
    written: u64,
}

impl<'a> CallbackWriter<'a> {
    pub fn new(io: &'a dyn StreamCallbacks, handle: HandleId) -> Self {
        Self {
            io,
            handle,
            written: 0,
        }
    }

    pub fn bytes_written(&self) -> u64 {
        self.written
    }
}

impl Write for CallbackWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        check(self.io.write(buf, self.handle))?;
        self.written += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Read a handle to its end, `block` bytes per callback.
pub fn read_to_end(
    io: &dyn StreamCallbacks,
    handle: HandleId,
    block: usize,
) -> Result<Vec<u8>, EngineError> {
    let mut data = Vec::new();
    loop {
        let start = data.len();
        data.resize(start + block, 0);
        let mut nread = 0;
        let status = io.read(&mut data[start..], &mut nread, handle);
        if !status.is_success() {
            return Err(EngineError::Callback(status));
        }
        data.truncate(start + nread);
        if nread < block {
            return Ok(data);
        }
    }
}

enum Access {
    Unprobed,
    /// One cached block; the stream is moved with relative seeks.
    Seekable {
        pos: u64,
        block: Vec<u8>,
        block_start: u64,
    },
    /// Everything read so far stays in memory.
    Sequential { loaded: Vec<u8>, eof: bool },
}

/// Source for the VCDIFF decoder, read through callbacks.
///
/// The first access probes the handle with a zero `SEEK_CUR` seek. A
/// seekable base is then read block by block on demand; a base that
/// reports `InvalidHandle` to the probe is read forward only. Offsets are
/// relative to the position the stream had when decoding started.
pub struct SourceBlocks<'a> {
    io: &'a dyn StreamCallbacks,
    handle: HandleId,
    block_size: usize,
    access: Access,
}

impl<'a> SourceBlocks<'a> {
    pub fn new(io: &'a dyn StreamCallbacks, handle: HandleId, block_size: usize) -> Self {
        Self {
            io,
            handle,
            block_size: block_size.max(1),
            access: Access::Unprobed,
        }
    }

    /// `Some(true)` once the base was found to be seekable, `None` before the
    /// first access.
    pub fn is_seekable(&self) -> Option<bool> {
        match self.access {
            Access::Unprobed => None,
            Access::Seekable { .. } => Some(true),
            Access::Sequential { .. } => Some(false),
        }
    }

    fn probe(&mut self) -> io::Result<()> {
        self.access = match self.io.seek(0, SEEK_CUR, self.handle) {
            Status::Success => Access::Seekable {
                pos: 0,
                block: Vec::new(),
                block_start: 0,
            },
            Status::InvalidHandle => {
                debug!("base {} is not seekable; reading it sequentially", self.handle);
                Access::Sequential {
                    loaded: Vec::new(),
                    eof: false,
                }
            }
            status => return Err(failure(status)),
        };
        Ok(())
    }

    fn read_block(&self, buf: &mut Vec<u8>) -> io::Result<usize> {
        buf.resize(self.block_size, 0);
        let mut nread = 0;
        check(self.io.read(buf, &mut nread, self.handle))?;
        buf.truncate(nread);
        Ok(nread)
    }
}

fn short_source(offset: u64, len: usize) -> DecodeError {
    DecodeError::InvalidInput(format!(
        "COPY of {len} bytes at source offset {offset} runs past the end of the base"
    ))
}

impl SourceProvider for SourceBlocks<'_> {
    fn read_source(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), DecodeError> {
        if matches!(self.access, Access::Unprobed) {
            self.probe()?;
        }
        let block_size = self.block_size as u64;

        // Take the state out so `read_block` can borrow `self`.
        let mut access = std::mem::replace(&mut self.access, Access::Unprobed);
        let result = match &mut access {
            Access::Seekable {
                pos,
                block,
                block_start,
            } => {
                let mut filled = 0;
                let mut result: Result<(), DecodeError> = Ok(());
                while filled < buf.len() {
                    let at = offset.saturating_add(filled as u64);
                    let want = at - at % block_size;
                    if block.is_empty() || *block_start != want {
                        let Some(delta) = i64::try_from(want)
                            .ok()
                            .zip(i64::try_from(*pos).ok())
                            .and_then(|(want, pos)| want.checked_sub(pos))
                        else {
                            result = Err(short_source(offset, buf.len()));
                            break;
                        };
                        if let Err(e) = check(self.io.seek(delta, SEEK_CUR, self.handle))
                            .and_then(|()| self.read_block(block))
                        {
                            block.clear();
                            result = Err(e.into());
                            break;
                        }
                        trace!("base block at {want}: {} bytes", block.len());
                        *block_start = want;
                        *pos = want + block.len() as u64;
                    }
                    let within = (at - *block_start) as usize;
                    if within >= block.len() {
                        result = Err(short_source(offset, buf.len()));
                        break;
                    }
                    let n = (block.len() - within).min(buf.len() - filled);
                    buf[filled..filled + n].copy_from_slice(&block[within..within + n]);
                    filled += n;
                }
                result
            }
            Access::Sequential { loaded, eof } => {
                let end = offset.saturating_add(buf.len() as u64);
                let mut chunk = Vec::new();
                let mut result: Result<(), DecodeError> = Ok(());
                while (loaded.len() as u64) < end && !*eof {
                    match self.read_block(&mut chunk) {
                        Ok(n) => {
                            loaded.extend_from_slice(&chunk);
                            *eof = n < self.block_size;
                        }
                        Err(e) => {
                            result = Err(e.into());
                            break;
                        }
                    }
                }
                if result.is_ok() {
                    if (loaded.len() as u64) < end {
                        result = Err(short_source(offset, buf.len()));
                    } else {
                        buf.copy_from_slice(&loaded[offset as usize..end as usize]);
                    }
                }
                result
            }
            Access::Unprobed => Ok(()),
        };
        self.access = access;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    /// In-memory callbacks over a single handle, optionally seekable.
    struct Memory {
        data: Vec<u8>,
        pos: RefCell<usize>,
        seekable: bool,
        reads: RefCell<usize>,
        written: RefCell<Vec<u8>>,
    }

    impl Memory {
        fn new(data: &[u8], seekable: bool) -> Self {
            Self {
                data: data.to_vec(),
                pos: RefCell::new(0),
                seekable,
                reads: RefCell::new(0),
                written: RefCell::new(Vec::new()),
            }
        }
    }

    impl StreamCallbacks for Memory {
        fn read(&self, buf: &mut [u8], nread: &mut usize, _: HandleId) -> Status {
            *self.reads.borrow_mut() += 1;
            let mut pos = self.pos.borrow_mut();
            let n = buf.len().min(self.data.len() - *pos);
            buf[..n].copy_from_slice(&self.data[*pos..*pos + n]);
            *pos += n;
            *nread = n;
            Status::Success
        }

        fn write(&self, buf: &[u8], _: HandleId) -> Status {
            self.written.borrow_mut().extend_from_slice(buf);
            Status::Success
        }

        fn seek(&self, offset: i64, origin: i16, _: HandleId) -> Status {
            if !self.seekable {
                return Status::InvalidHandle;
            }
            assert_eq!(origin, SEEK_CUR);
            let mut pos = self.pos.borrow_mut();
            *pos = (*pos as i64 + offset) as usize;
            Status::Success
        }
    }

    const H: HandleId = HandleId::from_raw(1);

    #[test]
    fn reader_reports_callback_failure() {
        struct Broken;
        impl StreamCallbacks for Broken {
            fn read(&self, _: &mut [u8], _: &mut usize, _: HandleId) -> Status {
                Status::InternalIo
            }
            fn write(&self, _: &[u8], _: HandleId) -> Status {
                Status::InvalidHandle
            }
            fn seek(&self, _: i64, _: i16, _: HandleId) -> Status {
                Status::InternalIo
            }
        }
        let err = CallbackReader::new(&Broken, H).read(&mut [0; 4]).unwrap_err();
        assert_eq!(callback_status(&err), Some(Status::InternalIo));
        let err = CallbackWriter::new(&Broken, H).write_all(b"x").unwrap_err();
        assert_eq!(
            EngineError::from(err).code(),
            Status::InvalidHandle.code()
        );
    }

    #[test]
    fn writer_counts_bytes() {
        let mem = Memory::new(b"", false);
        let mut w = CallbackWriter::new(&mem, H);
        w.write_all(b"hello ").unwrap();
        w.write_all(b"world").unwrap();
        assert_eq!(w.bytes_written(), 11);
        assert_eq!(*mem.written.borrow(), b"hello world");
    }

    #[test]
    fn read_to_end_uses_block_sized_callbacks() {
        let mem = Memory::new(&[7u8; 100], false);
        let data = read_to_end(&mem, H, 32).unwrap();
        assert_eq!(data.len(), 100);
        assert_eq!(*mem.reads.borrow(), 4);
    }

    #[test]
    fn seekable_source_reads_any_offset() {
        let bytes: Vec<u8> = (0..=255).collect();
        let mem = Memory::new(&bytes, true);
        let mut src = SourceBlocks::new(&mem, H, 16);
        let mut buf = [0u8; 20];
        src.read_source(200, &mut buf).unwrap();
        assert_eq!(&buf[..], &bytes[200..220]);
        src.read_source(3, &mut buf).unwrap();
        assert_eq!(&buf[..], &bytes[3..23]);
        assert_eq!(src.is_seekable(), Some(true));
        assert!(matches!(
            src.read_source(250, &mut buf),
            Err(DecodeError::InvalidInput(_))
        ));
    }

    #[test]
    fn offset_beyond_seek_range_is_invalid_input() {
        let mem = Memory::new(b"small base", true);
        let mut src = SourceBlocks::new(&mem, H, 16);
        let mut buf = [0u8; 4];
        assert!(matches!(
            src.read_source(1 << 63, &mut buf),
            Err(DecodeError::InvalidInput(_))
        ));
        assert_eq!(*mem.reads.borrow(), 0);
        src.read_source(6, &mut buf).unwrap();
        assert_eq!(&buf, b"base");
    }

    #[test]
    fn sequential_source_falls_back() {
        let bytes: Vec<u8> = (0..100).collect();
        let mem = Memory::new(&bytes, false);
        let mut src = SourceBlocks::new(&mem, H, 8);
        let mut buf = [0u8; 10];
        src.read_source(50, &mut buf).unwrap();
        assert_eq!(&buf[..], &bytes[50..60]);
        src.read_source(0, &mut buf).unwrap();
        assert_eq!(&buf[..], &bytes[..10]);
        assert_eq!(src.is_seekable(), Some(false));
        assert!(src.read_source(95, &mut buf).is_err());
    }
}
