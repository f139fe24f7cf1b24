// Source matching for the VCDIFF encoder.
//
// - `config`  matcher profiles per compression level
// - `rolling` Rabin-Karp rolling fingerprint
// - `matcher` source index and target scan producing instructions

pub mod config;
pub mod matcher;
pub mod rolling;

pub use config::{MatcherConfig, config_for_level};
pub use matcher::{BlockMatcher, literal_instructions};
