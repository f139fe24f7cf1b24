// VCDIFF (RFC 3284) wire format, as produced and consumed by `VcdiffEngine`.
//
// - `varint`        base-128 integers
// - `code_table`    default instruction code table
// - `address_cache` NEAR/SAME COPY address modes
// - `header`        file and window headers
// - `checksum`      per-window Adler-32
// - `encoder`       window emission from an instruction list
// - `decoder`       window reconstruction against a source provider

pub mod address_cache;
pub mod checksum;
pub mod code_table;
pub mod decoder;
pub mod encoder;
pub mod header;
pub mod varint;

pub use code_table::Instruction;
pub use decoder::{DecodeError, SourceProvider, StreamDecoder, decode_memory};
pub use encoder::{SourceWindow, WindowEncoder, file_header};
pub use header::{FileHeader, VCDIFF_MAGIC, WindowHeader};
