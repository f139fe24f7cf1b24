// Engine contract: the boundary between the stream bridge and a delta engine.
//
// An engine never touches application streams. It is handed opaque
// `HandleId`s and performs every read, write and seek through a
// `StreamCallbacks` implementation, returning a numeric status when done.
// Status numbering follows xdelta3's `xd3_rvalues`.

mod streams;
mod vcdiff_engine;

pub use streams::{CallbackFailure, CallbackReader, CallbackWriter, SourceBlocks, callback_status};
pub use vcdiff_engine::{EngineSummary, VcdiffEngine};

use std::io;

// ---------------------------------------------------------------------------
// Status codes
// ---------------------------------------------------------------------------

/// Internal error; also reported by the adapters for stream I/O failures.
pub const XD3_INTERNAL: i32 = -17710;
/// Invalid configuration.
pub const XD3_INVALID: i32 = -17711;
/// Malformed delta or a delta that does not match the supplied base.
pub const XD3_INVALID_INPUT: i32 = -17712;
/// Delta uses a feature this engine does not implement.
pub const XD3_UNIMPLEMENTED: i32 = -17714;
/// Callback received a handle that is unknown or lacks the needed capability.
pub const XD3_INVALID_HANDLE: i32 = -17715;

/// Seek origins understood by [`StreamCallbacks::seek`].
pub const SEEK_SET: i16 = 0;
pub const SEEK_CUR: i16 = 1;
pub const SEEK_END: i16 = 2;

/// Result of a single stream callback.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Success = 0,
    InternalIo = XD3_INTERNAL,
    InvalidHandle = XD3_INVALID_HANDLE,
}

impl Status {
    /// The raw numeric code passed across the engine boundary.
    #[inline]
    pub const fn code(self) -> i32 {
        self as i32
    }

    #[inline]
    pub const fn is_success(self) -> bool {
        matches!(self, Status::Success)
    }

    /// Map a raw code back to a callback status, if it is one.
    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Status::Success),
            XD3_INTERNAL => Some(Status::InternalIo),
            XD3_INVALID_HANDLE => Some(Status::InvalidHandle),
            _ => None,
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Success => write!(f, "success"),
            Status::InternalIo => write!(f, "internal I/O error ({})", self.code()),
            Status::InvalidHandle => write!(f, "invalid stream handle ({})", self.code()),
        }
    }
}

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

/// Opaque identifier of a stream registered for the duration of one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(u64);

impl HandleId {
    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn into_raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for HandleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Callback and engine traits
// ---------------------------------------------------------------------------

/// The three I/O primitives an engine may invoke on a registered stream.
///
/// Buffers are only borrowed for the duration of a call.
pub trait StreamCallbacks {
    /// Fill `buf` from the stream behind `handle`, storing the byte count in
    /// `nread`. A short count means the stream reached its end.
    fn read(&self, buf: &mut [u8], nread: &mut usize, handle: HandleId) -> Status;

    /// Write all of `buf` to the stream behind `handle`.
    fn write(&self, buf: &[u8], handle: HandleId) -> Status;

    /// Reposition the stream behind `handle`. `origin` is one of
    /// [`SEEK_SET`], [`SEEK_CUR`], [`SEEK_END`].
    fn seek(&self, offset: i64, origin: i16, handle: HandleId) -> Status;
}

/// A delta engine driven entirely through [`StreamCallbacks`].
///
/// Both entry points return `0` on success and a non-zero diagnostic code
/// otherwise. A failing callback status is returned unchanged.
pub trait DeltaEngine {
    fn encode(
        &self,
        io: &dyn StreamCallbacks,
        base: HandleId,
        target: HandleId,
        delta: HandleId,
    ) -> i32;

    fn decode(
        &self,
        io: &dyn StreamCallbacks,
        base: HandleId,
        delta: HandleId,
        target: HandleId,
    ) -> i32;
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Hard upper bound on a target window (matches xdelta3 XD3_HARDMAXWINSIZE).
pub const MAX_WINDOW_SIZE: usize = 1 << 24;

/// Configuration for [`VcdiffEngine`].
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Matching level (0-9). 0 disables source matching.
    pub level: u32,
    /// Target bytes requested per read callback when encoding; also the
    /// delta read-buffer size when decoding.
    pub window_size: usize,
    /// Base bytes requested per read callback.
    pub source_block_size: usize,
    /// Emit an Adler-32 checksum per window.
    pub checksum: bool,
    /// Verify Adler-32 checksums while decoding.
    pub verify_checksum: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            level: 6,
            window_size: 1 << 23, // 8 MiB
            source_block_size: 1 << 16,
            checksum: true,
            verify_checksum: true,
        }
    }
}

impl EngineOptions {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.level > 9 {
            return Err(EngineError::InvalidConfig(format!(
                "level {} is outside 0..=9",
                self.level
            )));
        }
        if self.window_size == 0 || self.window_size > MAX_WINDOW_SIZE {
            return Err(EngineError::InvalidConfig(format!(
                "window size {} is outside 1..={MAX_WINDOW_SIZE}",
                self.window_size
            )));
        }
        if self.source_block_size == 0 {
            return Err(EngineError::InvalidConfig(
                "source block size must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure inside an engine call, before it is flattened to a status code.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("stream callback failed: {0}")]
    Callback(Status),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("checksum mismatch: expected {expected:#010X}, got {actual:#010X}")]
    ChecksumMismatch { expected: u32, actual: u32 },
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// The status code reported across the engine boundary.
    pub fn code(&self) -> i32 {
        match self {
            Self::Callback(status) => status.code(),
            Self::InvalidConfig(_) => XD3_INVALID,
            Self::InvalidInput(_) | Self::ChecksumMismatch { .. } => XD3_INVALID_INPUT,
            Self::Unsupported(_) => XD3_UNIMPLEMENTED,
            Self::Internal(_) => XD3_INTERNAL,
        }
    }
}

impl From<io::Error> for EngineError {
    fn from(e: io::Error) -> Self {
        if let Some(status) = callback_status(&e) {
            return Self::Callback(status);
        }
        match e.kind() {
            io::ErrorKind::UnexpectedEof => Self::InvalidInput("truncated delta".into()),
            io::ErrorKind::InvalidData => Self::InvalidInput(e.to_string()),
            io::ErrorKind::Unsupported => Self::Unsupported(e.to_string()),
            _ => Self::Internal(e.to_string()),
        }
    }
}

impl From<crate::vcdiff::DecodeError> for EngineError {
    fn from(e: crate::vcdiff::DecodeError) -> Self {
        use crate::vcdiff::DecodeError;
        match e {
            DecodeError::Io(e) => e.into(),
            DecodeError::InvalidInput(msg) => Self::InvalidInput(msg),
            DecodeError::ChecksumMismatch { expected, actual } => {
                Self::ChecksumMismatch { expected, actual }
            }
            DecodeError::Unsupported(msg) => Self::Unsupported(msg),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
