//! Stream bridge: runs a [`DeltaEngine`] against application streams.
//!
//! Each call registers its streams in a fresh [`HandleRegistry`], hands the
//! engine only the handle ids plus the registry as its callback table, and
//! releases every handle before returning. The engine's numeric status is
//! turned into an [`Error`] that keeps the raw code.
//!
//! ```
//! use deltabridge::bridge::{self, Input};
//!
//! let base = b"hello old world".to_vec();
//! let target = b"hello new world".to_vec();
//!
//! let mut delta = Vec::new();
//! bridge::encode(Input::reader(&mut &base[..]), Input::reader(&mut &target[..]), &mut delta)?;
//!
//! let mut out = Vec::new();
//! bridge::decode(Input::reader(&mut &base[..]), Input::reader(&mut &delta[..]), &mut out)?;
//! assert_eq!(out, target);
//! # Ok::<(), deltabridge::bridge::Error>(())
//! ```

pub mod adapters;
pub mod precheck;
pub mod registry;

pub use precheck::{PreparedDelta, prepare_delta};
pub use registry::{
    Capabilities, HandleGuard, HandleRegistry, ReadSeek, RegistryError, Stream,
};

use std::fmt;
use std::io::{self, Read, Seek, Write};

use log::debug;

use crate::engine::{
    DeltaEngine, EngineOptions, HandleId, StreamCallbacks, VcdiffEngine, XD3_INTERNAL,
    XD3_INVALID_HANDLE,
};

/// An application stream supplied as engine input.
pub enum Input<'a> {
    Sequential(&'a mut dyn Read),
    Seekable(&'a mut dyn ReadSeek),
}

impl<'a> Input<'a> {
    /// A forward-only reader.
    pub fn reader<R: Read + 'a>(r: &'a mut R) -> Self {
        Input::Sequential(r)
    }

    /// A reader that can also seek.
    pub fn seekable<R: Read + Seek + 'a>(r: &'a mut R) -> Self {
        Input::Seekable(r)
    }

    pub fn capabilities(&self) -> Capabilities {
        match self {
            Input::Sequential(_) => Capabilities::READABLE,
            Input::Seekable(_) => Capabilities::READABLE | Capabilities::SEEKABLE,
        }
    }

    pub fn as_stream(&mut self) -> Stream<'_> {
        match self {
            Input::Sequential(r) => Stream::Reader(&mut **r),
            Input::Seekable(r) => Stream::SeekableReader(&mut **r),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Encode,
    Decode,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Encode => "encode",
            Operation::Decode => "decode",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("delta is empty")]
    DeltaIsEmpty,
    #[error("reading the first delta byte: {0}")]
    DeltaPeek(#[source] io::Error),
    #[error("restoring the delta position: {0}")]
    DeltaRestore(#[source] io::Error),
    #[error("{op}: a callback received an invalid stream handle (code {code})")]
    InvalidHandle { op: Operation, code: i32 },
    #[error("{op}: stream I/O failed (code {code})")]
    InternalIo { op: Operation, code: i32 },
    #[error("{op}: engine failed with code {code}")]
    Engine { op: Operation, code: i32 },
    #[error("flushing output: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// The raw engine status, for errors reported by the engine.
    pub fn code(&self) -> Option<i32> {
        match self {
            Error::InvalidHandle { code, .. }
            | Error::InternalIo { code, .. }
            | Error::Engine { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn operation(&self) -> Option<Operation> {
        match self {
            Error::InvalidHandle { op, .. }
            | Error::InternalIo { op, .. }
            | Error::Engine { op, .. } => Some(*op),
            Error::DeltaIsEmpty | Error::DeltaPeek(_) | Error::DeltaRestore(_) => {
                Some(Operation::Decode)
            }
            Error::Io(_) => None,
        }
    }
}

/// Map an engine status to a result.
pub fn check(op: Operation, code: i32) -> Result<(), Error> {
    match code {
        0 => Ok(()),
        XD3_INVALID_HANDLE => Err(Error::InvalidHandle { op, code }),
        XD3_INTERNAL => Err(Error::InternalIo { op, code }),
        _ => Err(Error::Engine { op, code }),
    }
}

/// Register three streams, run `call` with their ids and release them again
/// whatever happens.
fn run_with_handles<'s>(
    streams: [Stream<'s>; 3],
    call: impl FnOnce(&dyn StreamCallbacks, [HandleId; 3]) -> i32,
) -> i32 {
    let registry = HandleRegistry::new();
    let code = {
        let [a, b, c] = streams;
        let guards = [
            registry.acquire(a),
            registry.acquire(b),
            registry.acquire(c),
        ];
        let ids = guards.each_ref().map(HandleGuard::id);
        debug!("handles {} {} {} registered", ids[0], ids[1], ids[2]);
        call(&registry, ids)
    };
    debug_assert!(registry.is_empty(), "handles outlived the call");
    code
}

/// Drives one engine over application streams.
#[derive(Debug, Clone, Default)]
pub struct Bridge<E = VcdiffEngine> {
    engine: E,
}

impl Bridge<VcdiffEngine> {
    pub fn with_options(options: EngineOptions) -> Self {
        Self::new(VcdiffEngine::new(options))
    }
}

impl<E: DeltaEngine> Bridge<E> {
    pub fn new(engine: E) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Write to `delta` the difference that turns `base` into `target`.
    pub fn encode<W: Write>(
        &self,
        mut base: Input<'_>,
        mut target: Input<'_>,
        delta: &mut W,
    ) -> Result<(), Error> {
        let code = run_with_handles(
            [base.as_stream(), target.as_stream(), Stream::Writer(&mut *delta)],
            |io, [base, target, delta]| self.engine.encode(io, base, target, delta),
        );
        debug!("encode returned {code}");
        check(Operation::Encode, code)?;
        delta.flush()?;
        Ok(())
    }

    /// Rebuild into `target` the data `delta` describes relative to `base`.
    ///
    /// An empty delta fails with [`Error::DeltaIsEmpty`] without running the
    /// engine.
    pub fn decode<W: Write>(
        &self,
        mut base: Input<'_>,
        delta: Input<'_>,
        target: &mut W,
    ) -> Result<(), Error> {
        let mut delta = prepare_delta(delta)?;
        let code = run_with_handles(
            [base.as_stream(), delta.as_stream(), Stream::Writer(&mut *target)],
            |io, [base, delta, target]| self.engine.decode(io, base, delta, target),
        );
        debug!("decode returned {code}");
        check(Operation::Decode, code)?;
        target.flush()?;
        Ok(())
    }
}

/// [`Bridge::encode`] with the default engine.
pub fn encode<W: Write>(base: Input<'_>, target: Input<'_>, delta: &mut W) -> Result<(), Error> {
    Bridge::<VcdiffEngine>::default().encode(base, target, delta)
}

/// [`Bridge::decode`] with the default engine.
pub fn decode<W: Write>(base: Input<'_>, delta: Input<'_>, target: &mut W) -> Result<(), Error> {
    Bridge::<VcdiffEngine>::default().decode(base, delta, target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{SEEK_SET, Status, XD3_INVALID_INPUT};
    use std::cell::Cell;
    use std::io::Cursor;

    /// Engine stub that records its calls and copies input to output.
    #[derive(Default)]
    struct Echo {
        calls: Cell<u32>,
        result: i32,
    }

    impl Echo {
        fn pump(&self, io: &dyn StreamCallbacks, from: HandleId, to: HandleId) -> i32 {
            self.calls.set(self.calls.get() + 1);
            let mut buf = [0u8; 3];
            loop {
                let mut n = 0;
                let status = io.read(&mut buf, &mut n, from);
                if !status.is_success() {
                    return status.code();
                }
                if n == 0 {
                    break;
                }
                let status = io.write(&buf[..n], to);
                if !status.is_success() {
                    return status.code();
                }
            }
            self.result
        }
    }

    impl DeltaEngine for Echo {
        fn encode(&self, io: &dyn StreamCallbacks, _: HandleId, t: HandleId, d: HandleId) -> i32 {
            self.pump(io, t, d)
        }

        fn decode(&self, io: &dyn StreamCallbacks, _: HandleId, d: HandleId, t: HandleId) -> i32 {
            self.pump(io, d, t)
        }
    }

    #[test]
    fn empty_delta_never_reaches_the_engine() {
        let bridge = Bridge::new(Echo::default());
        let mut out = Vec::new();
        let err = bridge
            .decode(
                Input::reader(&mut io::empty()),
                Input::reader(&mut io::empty()),
                &mut out,
            )
            .unwrap_err();
        assert!(matches!(err, Error::DeltaIsEmpty));
        assert_eq!(bridge.engine().calls.get(), 0);
    }

    #[test]
    fn rechained_delta_is_passed_through_whole() {
        let bridge = Bridge::new(Echo::default());
        let mut out = Vec::new();
        bridge
            .decode(
                Input::reader(&mut io::empty()),
                Input::reader(&mut &b"abcdefgh"[..]),
                &mut out,
            )
            .unwrap();
        assert_eq!(out, b"abcdefgh");
        assert_eq!(bridge.engine().calls.get(), 1);
    }

    #[test]
    fn status_codes_become_error_kinds() {
        assert!(check(Operation::Encode, 0).is_ok());
        assert!(matches!(
            check(Operation::Decode, XD3_INVALID_HANDLE),
            Err(Error::InvalidHandle {
                op: Operation::Decode,
                code: -17715
            })
        ));
        assert!(matches!(
            check(Operation::Encode, XD3_INTERNAL),
            Err(Error::InternalIo { .. })
        ));
        let err = check(Operation::Decode, XD3_INVALID_INPUT).unwrap_err();
        assert!(matches!(err, Error::Engine { .. }));
        assert_eq!(err.code(), Some(XD3_INVALID_INPUT));
        assert_eq!(err.operation(), Some(Operation::Decode));
    }

    #[test]
    fn engine_failure_keeps_its_code() {
        let bridge = Bridge::new(Echo {
            result: -1,
            ..Default::default()
        });
        let mut out = Vec::new();
        let err = bridge
            .encode(
                Input::reader(&mut io::empty()),
                Input::reader(&mut &b"x"[..]),
                &mut out,
            )
            .unwrap_err();
        assert_eq!(err.code(), Some(-1));
    }

    #[test]
    fn handles_are_gone_after_the_call() {
        struct Snoop(Cell<Option<HandleId>>);
        impl DeltaEngine for Snoop {
            fn encode(&self, io: &dyn StreamCallbacks, b: HandleId, _: HandleId, _: HandleId) -> i32 {
                self.0.set(Some(b));
                io.seek(0, SEEK_SET, b).code()
            }
            fn decode(&self, _: &dyn StreamCallbacks, _: HandleId, _: HandleId, _: HandleId) -> i32 {
                0
            }
        }

        let bridge = Bridge::new(Snoop(Cell::new(None)));
        let mut base = Cursor::new(b"base".to_vec());
        let mut out = Vec::new();
        bridge
            .encode(
                Input::seekable(&mut base),
                Input::reader(&mut io::empty()),
                &mut out,
            )
            .unwrap();
        let stale = bridge.engine().0.get().unwrap();

        // A new call starts a new registry; the old id means nothing there.
        let reg = HandleRegistry::new();
        let mut n = 0;
        assert_eq!(reg.read(&mut [0; 1], &mut n, stale), Status::InvalidHandle);
    }

    #[test]
    fn non_seekable_base_cannot_seek() {
        struct SeekBase;
        impl DeltaEngine for SeekBase {
            fn encode(&self, io: &dyn StreamCallbacks, b: HandleId, _: HandleId, _: HandleId) -> i32 {
                io.seek(0, SEEK_SET, b).code()
            }
            fn decode(&self, _: &dyn StreamCallbacks, _: HandleId, _: HandleId, _: HandleId) -> i32 {
                0
            }
        }
        let mut out = Vec::new();
        let err = Bridge::new(SeekBase)
            .encode(
                Input::reader(&mut io::empty()),
                Input::reader(&mut io::empty()),
                &mut out,
            )
            .unwrap_err();
        assert!(matches!(err, Error::InvalidHandle { op: Operation::Encode, .. }));
    }
}
