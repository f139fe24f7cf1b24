// VCDIFF engine driven through stream callbacks.
//
// Encoding loads the base, indexes it once, then reads the target one
// window at a time and writes one VCDIFF window per read. Decoding
// streams windows off the delta and fetches base bytes on demand.

use std::io::{BufReader, Write};

use log::{debug, trace};

use super::streams::{self, CallbackReader, CallbackWriter, SourceBlocks};
use super::{DeltaEngine, EngineError, EngineOptions, HandleId, StreamCallbacks};
use crate::hash::{BlockMatcher, config_for_level, literal_instructions};
use crate::vcdiff::{SourceWindow, StreamDecoder, WindowEncoder, file_header};

/// Totals reported by a successful engine call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineSummary {
    pub windows: u64,
    pub bytes_written: u64,
}

#[derive(Debug, Clone, Default)]
pub struct VcdiffEngine {
    options: EngineOptions,
}

impl VcdiffEngine {
    pub fn new(options: EngineOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Encode with the error left structured.
    pub fn try_encode(
        &self,
        io: &dyn StreamCallbacks,
        base: HandleId,
        target: HandleId,
        delta: HandleId,
    ) -> Result<EngineSummary, EngineError> {
        let opts = &self.options;
        opts.validate()?;

        let source = streams::read_to_end(io, base, opts.source_block_size)?;
        let matcher = (opts.level > 0 && !source.is_empty())
            .then(|| BlockMatcher::new(&source, config_for_level(opts.level)));
        let source_window = matcher.as_ref().map(|_| SourceWindow {
            len: source.len() as u64,
            offset: 0,
        });
        debug!(
            "encode: base {} bytes, level {}, window {} bytes",
            source.len(),
            opts.level,
            opts.window_size
        );

        let mut out = CallbackWriter::new(io, delta);
        out.write_all(&file_header())?;

        let mut window = vec![0u8; opts.window_size];
        let mut windows = 0u64;
        loop {
            let mut nread = 0;
            let status = io.read(&mut window, &mut nread, target);
            if !status.is_success() {
                return Err(EngineError::Callback(status));
            }
            // An empty target still gets one (empty) window.
            if nread == 0 && windows > 0 {
                break;
            }

            let chunk = &window[..nread];
            let instructions = match &matcher {
                Some(m) => m.find_matches(chunk),
                None => literal_instructions(chunk),
            };
            let mut enc = WindowEncoder::new(source_window, opts.checksum);
            enc.extend(chunk, &instructions);
            let encoded = enc.finish(chunk);
            trace!(
                "window {windows}: {} target bytes, {} instructions, {} encoded bytes",
                chunk.len(),
                instructions.len(),
                encoded.len()
            );
            out.write_all(&encoded)?;
            windows += 1;

            if nread < window.len() {
                break;
            }
        }

        Ok(EngineSummary {
            windows,
            bytes_written: out.bytes_written(),
        })
    }

    /// Decode with the error left structured.
    pub fn try_decode(
        &self,
        io: &dyn StreamCallbacks,
        base: HandleId,
        delta: HandleId,
        target: HandleId,
    ) -> Result<EngineSummary, EngineError> {
        let opts = &self.options;
        opts.validate()?;

        let reader = BufReader::with_capacity(opts.window_size, CallbackReader::new(io, delta));
        let mut decoder = StreamDecoder::new(reader, opts.verify_checksum);
        decoder.read_header()?;

        let mut source = SourceBlocks::new(io, base, opts.source_block_size);
        let mut out = CallbackWriter::new(io, target);
        let mut window = Vec::new();
        while decoder.next_window(&mut source, &mut window)? {
            out.write_all(&window)?;
        }

        debug!(
            "decode: {} windows, {} target bytes",
            decoder.windows_decoded(),
            out.bytes_written()
        );
        Ok(EngineSummary {
            windows: decoder.windows_decoded(),
            bytes_written: out.bytes_written(),
        })
    }
}

fn flatten(op: &str, result: Result<EngineSummary, EngineError>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(e) => {
            debug!("{op} failed: {e}");
            e.code()
        }
    }
}

impl DeltaEngine for VcdiffEngine {
    fn encode(
        &self,
        io: &dyn StreamCallbacks,
        base: HandleId,
        target: HandleId,
        delta: HandleId,
    ) -> i32 {
        flatten("encode", self.try_encode(io, base, target, delta))
    }

    fn decode(
        &self,
        io: &dyn StreamCallbacks,
        base: HandleId,
        delta: HandleId,
        target: HandleId,
    ) -> i32 {
        flatten("decode", self.try_decode(io, base, delta, target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{
        SEEK_CUR, SEEK_END, SEEK_SET, Status, XD3_INVALID, XD3_INVALID_INPUT,
    };
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// Three in-memory streams keyed by handle. Handle 1 is the base, 2 the
    /// input (target or delta), 3 the output.
    struct Streams {
        bufs: RefCell<HashMap<u64, (Vec<u8>, usize)>>,
        base_seekable: bool,
    }

    impl Streams {
        fn new(base: &[u8], input: &[u8], base_seekable: bool) -> Self {
            let mut bufs = HashMap::new();
            bufs.insert(1, (base.to_vec(), 0));
            bufs.insert(2, (input.to_vec(), 0));
            bufs.insert(3, (Vec::new(), 0));
            Self {
                bufs: RefCell::new(bufs),
                base_seekable,
            }
        }

        fn output(&self) -> Vec<u8> {
            self.bufs.borrow()[&3].0.clone()
        }
    }

    impl StreamCallbacks for Streams {
        fn read(&self, buf: &mut [u8], nread: &mut usize, h: HandleId) -> Status {
            let mut bufs = self.bufs.borrow_mut();
            let Some((data, pos)) = bufs.get_mut(&h.into_raw()) else {
                return Status::InvalidHandle;
            };
            let n = buf.len().min(data.len() - *pos);
            buf[..n].copy_from_slice(&data[*pos..*pos + n]);
            *pos += n;
            *nread = n;
            Status::Success
        }

        fn write(&self, buf: &[u8], h: HandleId) -> Status {
            if h.into_raw() != 3 {
                return Status::InvalidHandle;
            }
            if let Some((data, _)) = self.bufs.borrow_mut().get_mut(&3) {
                data.extend_from_slice(buf);
            }
            Status::Success
        }

        fn seek(&self, offset: i64, origin: i16, h: HandleId) -> Status {
            if h.into_raw() != 1 || !self.base_seekable {
                return Status::InvalidHandle;
            }
            let mut bufs = self.bufs.borrow_mut();
            let (data, pos) = bufs.get_mut(&1).unwrap();
            let new = match origin {
                SEEK_SET => offset,
                SEEK_CUR => *pos as i64 + offset,
                SEEK_END => data.len() as i64 + offset,
                _ => return Status::InternalIo,
            };
            if new < 0 {
                return Status::InternalIo;
            }
            *pos = new as usize;
            Status::Success
        }
    }

    const BASE: HandleId = HandleId::from_raw(1);
    const INPUT: HandleId = HandleId::from_raw(2);
    const OUTPUT: HandleId = HandleId::from_raw(3);

    fn encode(engine: &VcdiffEngine, base: &[u8], target: &[u8]) -> Vec<u8> {
        let s = Streams::new(base, target, false);
        assert_eq!(engine.encode(&s, BASE, INPUT, OUTPUT), 0);
        s.output()
    }

    fn decode(engine: &VcdiffEngine, base: &[u8], delta: &[u8], seekable: bool) -> Result<Vec<u8>, i32> {
        let s = Streams::new(base, delta, seekable);
        match engine.decode(&s, BASE, INPUT, OUTPUT) {
            0 => Ok(s.output()),
            code => Err(code),
        }
    }

    #[test]
    fn round_trip_small_windows() {
        let engine = VcdiffEngine::new(EngineOptions {
            window_size: 64,
            source_block_size: 16,
            ..Default::default()
        });
        let base: Vec<u8> = (0..1000u32).map(|i| (i * 7 % 251) as u8).collect();
        let mut target = base.clone();
        target[500..520].fill(b'!');
        target.extend_from_slice(b"tail");
        let delta = encode(&engine, &base, &target);
        assert_eq!(decode(&engine, &base, &delta, true).unwrap(), target);
        assert_eq!(decode(&engine, &base, &delta, false).unwrap(), target);
    }

    #[test]
    fn empty_target_produces_one_window() {
        let engine = VcdiffEngine::default();
        let delta = encode(&engine, b"base", b"");
        assert!(delta.len() > 5);
        assert_eq!(decode(&engine, b"base", &delta, true).unwrap(), b"");
    }

    #[test]
    fn level_zero_has_no_copies() {
        let engine = VcdiffEngine::new(EngineOptions {
            level: 0,
            ..Default::default()
        });
        let data = vec![42u8; 300];
        let delta = encode(&engine, &data, &data);
        // Decodes even against an empty base.
        assert_eq!(decode(&engine, b"", &delta, true).unwrap(), data);
    }

    #[test]
    fn wrong_base_is_invalid_input() {
        let engine = VcdiffEngine::default();
        let base = b"the quick brown fox jumps over the lazy dog, again and again".repeat(4);
        let delta = encode(&engine, &base, &base);
        assert_eq!(decode(&engine, b"", &delta, true), Err(XD3_INVALID_INPUT));
    }

    #[test]
    fn invalid_options_report_xd3_invalid() {
        let engine = VcdiffEngine::new(EngineOptions {
            window_size: 0,
            ..Default::default()
        });
        let s = Streams::new(b"", b"", true);
        assert_eq!(engine.encode(&s, BASE, INPUT, OUTPUT), XD3_INVALID);
    }

    #[test]
    fn callback_status_is_returned_verbatim() {
        let engine = VcdiffEngine::default();
        let s = Streams::new(b"", b"abc", true);
        // Handle 9 was never registered.
        let code = engine.encode(&s, BASE, INPUT, HandleId::from_raw(9));
        assert_eq!(code, Status::InvalidHandle.code());
    }
}
