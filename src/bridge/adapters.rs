//! The read, write and seek callbacks the engine drives.
//!
//! Each adapter resolves a handle, performs one I/O primitive on the
//! application stream and flattens the outcome into a [`Status`]. The
//! detail that does not fit in a status is logged at debug level.

use std::io::{self, Read, Seek, SeekFrom, Write};

use log::{debug, trace, warn};

use super::registry::{Capabilities, HandleRegistry, Stream};
use crate::engine::{HandleId, SEEK_CUR, SEEK_END, SEEK_SET, Status, StreamCallbacks};

/// Fill `buf` as far as the stream allows. Stops early only at end of
/// stream or on an error; `Interrupted` is retried. Returns the byte count
/// alongside the outcome so a failing read still reports what it got.
pub fn read_full<R: Read + ?Sized>(r: &mut R, buf: &mut [u8]) -> (usize, io::Result<()>) {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return (filled, Err(e)),
        }
    }
    (filled, Ok(()))
}

/// Map an origin selector to a `SeekFrom`. `None` for an unknown origin or a
/// negative absolute offset.
pub fn seek_from(offset: i64, origin: i16) -> Option<SeekFrom> {
    match origin {
        SEEK_SET => u64::try_from(offset).ok().map(SeekFrom::Start),
        SEEK_CUR => Some(SeekFrom::Current(offset)),
        SEEK_END => Some(SeekFrom::End(offset)),
        _ => None,
    }
}

pub fn read_adapter(
    registry: &HandleRegistry<'_>,
    buf: &mut [u8],
    nread: &mut usize,
    handle: HandleId,
) -> Status {
    *nread = 0;
    let outcome = registry.resolve(handle, Capabilities::READABLE, |stream| match stream {
        Stream::Reader(r) => read_full(&mut **r, buf),
        Stream::SeekableReader(r) => read_full(&mut **r, buf),
        Stream::Writer(_) => (0, Err(io::Error::other("stream is not readable"))),
    });
    match outcome {
        Err(e) => {
            debug!("read {handle}: {e}");
            e.into()
        }
        Ok((n, result)) => {
            *nread = n;
            match result {
                Ok(()) => Status::Success,
                Err(e) => {
                    debug!("read {handle}: failed after {n} bytes: {e}");
                    Status::InternalIo
                }
            }
        }
    }
}

pub fn write_adapter(registry: &HandleRegistry<'_>, buf: &[u8], handle: HandleId) -> Status {
    let outcome = registry.resolve(handle, Capabilities::WRITABLE, |stream| match stream {
        Stream::Writer(w) => w.write_all(buf),
        _ => Err(io::Error::other("stream is not writable")),
    });
    match outcome {
        Err(e) => {
            debug!("write {handle}: {e}");
            e.into()
        }
        Ok(Ok(())) => Status::Success,
        Ok(Err(e)) => {
            debug!("write {handle}: {} bytes: {e}", buf.len());
            Status::InternalIo
        }
    }
}

pub fn seek_adapter(
    registry: &HandleRegistry<'_>,
    offset: i64,
    origin: i16,
    handle: HandleId,
) -> Status {
    let outcome = registry.resolve(handle, Capabilities::SEEKABLE, |stream| {
        let Stream::SeekableReader(s) = stream else {
            return Some(Err(io::Error::other("stream is not seekable")));
        };
        let pos = seek_from(offset, origin)?;
        Some(s.seek(pos))
    });
    match outcome {
        Err(e) => {
            debug!("seek {handle}: {e}");
            e.into()
        }
        Ok(None) => {
            warn!("seek {handle}: unsupported origin {origin} with offset {offset}");
            Status::InternalIo
        }
        Ok(Some(Ok(pos))) => {
            trace!("seek {handle}: now at {pos}");
            Status::Success
        }
        Ok(Some(Err(e))) => {
            debug!("seek {handle}: {e}");
            Status::InternalIo
        }
    }
}

impl StreamCallbacks for HandleRegistry<'_> {
    fn read(&self, buf: &mut [u8], nread: &mut usize, handle: HandleId) -> Status {
        let status = read_adapter(self, buf, nread, handle);
        trace!("read {handle}: {} of {} bytes, {status}", *nread, buf.len());
        status
    }

    fn write(&self, buf: &[u8], handle: HandleId) -> Status {
        let status = write_adapter(self, buf, handle);
        trace!("write {handle}: {} bytes, {status}", buf.len());
        status
    }

    fn seek(&self, offset: i64, origin: i16, handle: HandleId) -> Status {
        seek_adapter(self, offset, origin, handle)
    }
}
