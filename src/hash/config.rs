// Matcher profiles selected by compression level.

/// Shortest source match worth a COPY.
pub const MIN_MATCH: usize = 4;

/// Shortest repeat of one byte worth a RUN.
pub const MIN_RUN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatcherConfig {
    pub name: &'static str,
    /// Bytes covered by one fingerprint.
    pub look: usize,
    /// Distance between indexed source positions. Any match at least
    /// `look + step - 1` long is guaranteed to be found.
    pub step: usize,
}

pub const FASTEST: MatcherConfig = MatcherConfig {
    name: "fastest",
    look: 32,
    step: 32,
};

pub const FASTER: MatcherConfig = MatcherConfig {
    name: "faster",
    look: 24,
    step: 16,
};

pub const FAST: MatcherConfig = MatcherConfig {
    name: "fast",
    look: 16,
    step: 16,
};

pub const DEFAULT: MatcherConfig = MatcherConfig {
    name: "default",
    look: 16,
    step: 8,
};

pub const SLOW: MatcherConfig = MatcherConfig {
    name: "slow",
    look: 8,
    step: 4,
};

/// Profile for a level in 1..=9. Level 0 does no matching at all and never
/// reaches this function.
pub fn config_for_level(level: u32) -> MatcherConfig {
    match level {
        0 | 1 => FASTEST,
        2 => FASTER,
        3..=5 => FAST,
        6 => DEFAULT,
        _ => SLOW,
    }
}
