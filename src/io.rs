// File and in-memory helpers on top of the stream bridge.
//
// `encode_file()` / `decode_file()` open the three files with buffered
// wrappers and run one bridge call. Base and delta files are handed over as
// seekable streams. Target and output bytes are counted, and hashed with
// SHA-256 when the `file-io` feature is enabled, as they flow through.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::debug;
#[cfg(feature = "file-io")]
use sha2::Digest;

use crate::bridge::{self, Bridge, Input};
use crate::engine::EngineOptions;

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Statistics returned by `encode_file()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeStats {
    pub base_size: u64,
    /// Bytes the engine read from the target.
    pub target_size: u64,
    pub delta_size: u64,
    /// SHA-256 of the target (if `file-io` feature is enabled).
    pub target_sha256: Option<[u8; 32]>,
}

/// Statistics returned by `decode_file()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeStats {
    pub base_size: u64,
    pub delta_size: u64,
    /// Bytes the engine wrote to the output.
    pub output_size: u64,
    /// SHA-256 of the reconstructed output (if `file-io` feature is enabled).
    pub output_sha256: Option<[u8; 32]>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum IoError {
    #[error("{}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Bridge(#[from] bridge::Error),
}

impl IoError {
    /// The engine status behind the failure, if the engine produced one.
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::Bridge(e) => e.code(),
            _ => None,
        }
    }
}

const BUF_SIZE: usize = 64 * 1024; // 64 KiB

fn open(path: &Path) -> Result<File, IoError> {
    File::open(path).map_err(|source| IoError::Open {
        path: path.to_path_buf(),
        source,
    })
}

fn create(path: &Path) -> Result<File, IoError> {
    File::create(path).map_err(|source| IoError::Open {
        path: path.to_path_buf(),
        source,
    })
}

// ---------------------------------------------------------------------------
// Metered stream
// ---------------------------------------------------------------------------

/// Counts, and optionally hashes, the bytes passing through a reader or
/// writer. Seeking is passed through and resets nothing, so only wrap
/// streams that are consumed front to back when the digest matters.
pub struct MeteredStream<S> {
    inner: S,
    bytes: u64,
    #[cfg(feature = "file-io")]
    hasher: sha2::Sha256,
}

impl<S> MeteredStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            bytes: 0,
            #[cfg(feature = "file-io")]
            hasher: sha2::Sha256::new(),
        }
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Byte count, SHA-256 (when enabled) and the wrapped stream.
    pub fn finish(self) -> (u64, Option<[u8; 32]>, S) {
        #[cfg(feature = "file-io")]
        let digest = Some(self.hasher.finalize().into());
        #[cfg(not(feature = "file-io"))]
        let digest = None;
        (self.bytes, digest, self.inner)
    }

    fn record(&mut self, buf: &[u8]) {
        self.bytes += buf.len() as u64;
        #[cfg(feature = "file-io")]
        self.hasher.update(buf);
    }
}

impl<S: Read> Read for MeteredStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.record(&buf[..n]);
        Ok(n)
    }
}

impl<S: Write> Write for MeteredStream<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.record(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<S: Seek> Seek for MeteredStream<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

// ---------------------------------------------------------------------------
// encode_file / decode_file
// ---------------------------------------------------------------------------

/// Encode the delta from `base_path` to `target_path` into `delta_path`.
pub fn encode_file(
    base_path: &Path,
    target_path: &Path,
    delta_path: &Path,
    opts: EngineOptions,
) -> Result<EncodeStats, IoError> {
    let base_file = open(base_path)?;
    let base_size = base_file.metadata()?.len();
    let mut base = BufReader::with_capacity(BUF_SIZE, base_file);

    let mut target = MeteredStream::new(BufReader::with_capacity(BUF_SIZE, open(target_path)?));
    let mut delta = MeteredStream::new(BufWriter::with_capacity(BUF_SIZE, create(delta_path)?));

    Bridge::with_options(opts).encode(
        Input::seekable(&mut base),
        Input::reader(&mut target),
        &mut delta,
    )?;

    let (target_size, target_sha256, _) = target.finish();
    let stats = EncodeStats {
        base_size,
        target_size,
        delta_size: delta.bytes(),
        target_sha256,
    };
    debug!("encoded {} -> {}: {stats:?}", target_path.display(), delta_path.display());
    Ok(stats)
}

/// Decode `delta_path` against `base_path` into `output_path`.
pub fn decode_file(
    base_path: &Path,
    delta_path: &Path,
    output_path: &Path,
    opts: EngineOptions,
) -> Result<DecodeStats, IoError> {
    let base_file = open(base_path)?;
    let base_size = base_file.metadata()?.len();
    let mut base = BufReader::with_capacity(BUF_SIZE, base_file);

    let delta_file = open(delta_path)?;
    let delta_size = delta_file.metadata()?.len();
    let mut delta = BufReader::with_capacity(BUF_SIZE, delta_file);

    let mut output = MeteredStream::new(BufWriter::with_capacity(BUF_SIZE, create(output_path)?));

    Bridge::with_options(opts).decode(
        Input::seekable(&mut base),
        Input::seekable(&mut delta),
        &mut output,
    )?;

    let (output_size, output_sha256, _) = output.finish();
    let stats = DecodeStats {
        base_size,
        delta_size,
        output_size,
        output_sha256,
    };
    debug!("decoded {} -> {}: {stats:?}", delta_path.display(), output_path.display());
    Ok(stats)
}

// ---------------------------------------------------------------------------
// In-memory helpers
// ---------------------------------------------------------------------------

/// Encode in memory with a seekable base.
pub fn encode_bytes(base: &[u8], target: &[u8], opts: EngineOptions) -> Result<Vec<u8>, bridge::Error> {
    let mut delta = Vec::new();
    Bridge::with_options(opts).encode(
        Input::seekable(&mut Cursor::new(base)),
        Input::reader(&mut &target[..]),
        &mut delta,
    )?;
    Ok(delta)
}

/// Decode in memory with a seekable base.
pub fn decode_bytes(base: &[u8], delta: &[u8], opts: EngineOptions) -> Result<Vec<u8>, bridge::Error> {
    let mut target = Vec::new();
    Bridge::with_options(opts).decode(
        Input::seekable(&mut Cursor::new(base)),
        Input::seekable(&mut Cursor::new(delta)),
        &mut target,
    )?;
    Ok(target)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
