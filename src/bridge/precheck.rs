//! Empty-delta detection before a decode.
//!
//! One byte is peeked from the delta. At end of stream the decode stops with
//! [`Error::DeltaIsEmpty`]. Otherwise the byte is put back: a seekable delta
//! is moved back to the offset it had before the peek, and a sequential one
//! is replaced by a chain that yields the peeked byte first.

use std::io::{self, Cursor, Read, Seek, SeekFrom};

use log::debug;

use super::registry::{ReadSeek, Stream};
use super::{Error, Input};

/// A delta known to hold at least one byte, positioned at its start.
pub enum PreparedDelta<'a> {
    Seekable(&'a mut dyn ReadSeek),
    Rechained(io::Chain<Cursor<[u8; 1]>, &'a mut dyn Read>),
}

impl PreparedDelta<'_> {
    pub fn as_stream(&mut self) -> Stream<'_> {
        match self {
            PreparedDelta::Seekable(r) => Stream::SeekableReader(&mut **r),
            PreparedDelta::Rechained(c) => Stream::Reader(c),
        }
    }

    pub fn is_rechained(&self) -> bool {
        matches!(self, PreparedDelta::Rechained(_))
    }
}

fn peek_byte<R: Read + ?Sized>(r: &mut R) -> io::Result<Option<u8>> {
    let mut byte = [0u8; 1];
    loop {
        match r.read(&mut byte) {
            Ok(0) => return Ok(None),
            Ok(_) => return Ok(Some(byte[0])),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

pub fn prepare_delta(delta: Input<'_>) -> Result<PreparedDelta<'_>, Error> {
    match delta {
        Input::Seekable(r) => {
            let start = r.stream_position().map_err(Error::DeltaPeek)?;
            if peek_byte(&mut *r).map_err(Error::DeltaPeek)?.is_none() {
                return Err(Error::DeltaIsEmpty);
            }
            r.seek(SeekFrom::Start(start))
                .map_err(Error::DeltaRestore)?;
            debug!("delta peeked and restored to offset {start}");
            Ok(PreparedDelta::Seekable(r))
        }
        Input::Sequential(r) => {
            let Some(first) = peek_byte(&mut *r).map_err(Error::DeltaPeek)? else {
                return Err(Error::DeltaIsEmpty);
            };
            debug!("delta is not seekable; re-chaining the peeked byte");
            Ok(PreparedDelta::Rechained(Cursor::new([first]).chain(r)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Seekable stream whose seeks always fail.
    struct NoRewind(Cursor<Vec<u8>>);

    impl Read for NoRewind {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.0.read(buf)
        }
    }

    impl Seek for NoRewind {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            match pos {
                SeekFrom::Current(0) => self.0.stream_position(),
                _ => Err(io::Error::other("rewind refused")),
            }
        }
    }

    #[test]
    fn empty_inputs_are_rejected() {
        let mut seekable = Cursor::new(Vec::<u8>::new());
        assert!(matches!(
            prepare_delta(Input::seekable(&mut seekable)),
            Err(Error::DeltaIsEmpty)
        ));
        let mut sequential = io::empty();
        assert!(matches!(
            prepare_delta(Input::reader(&mut sequential)),
            Err(Error::DeltaIsEmpty)
        ));
    }

    #[test]
    fn seekable_delta_returns_to_its_original_offset() {
        let mut c = Cursor::new(b"..payload".to_vec());
        c.set_position(2);
        let prepared = prepare_delta(Input::seekable(&mut c)).unwrap();
        assert!(!prepared.is_rechained());
        drop(prepared);
        assert_eq!(c.position(), 2);
    }

    #[test]
    fn sequential_delta_yields_every_byte() {
        let mut r: &[u8] = b"payload";
        let mut prepared = prepare_delta(Input::reader(&mut r)).unwrap();
        assert!(prepared.is_rechained());
        let mut out = Vec::new();
        match prepared.as_stream() {
            Stream::Reader(s) => s.read_to_end(&mut out).unwrap(),
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(out, b"payload");
    }

    #[test]
    fn restore_failure_is_reported() {
        let mut r = NoRewind(Cursor::new(b"x".to_vec()));
        assert!(matches!(
            prepare_delta(Input::seekable(&mut r)),
            Err(Error::DeltaRestore(_))
        ));
    }

    #[test]
    fn peek_failure_is_reported() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::other("gone"))
            }
        }
        let mut r = Broken;
        assert!(matches!(
            prepare_delta(Input::reader(&mut r)),
            Err(Error::DeltaPeek(_))
        ));
    }
}
