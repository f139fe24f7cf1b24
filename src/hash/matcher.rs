// Source block matcher: indexes fingerprints of the source at a fixed stride,
// then scans the target with a rolling fingerprint, verifying and extending
// every hit in both directions.

use super::config::{MIN_MATCH, MIN_RUN, MatcherConfig};
use super::rolling::RollingHash;
use crate::vcdiff::Instruction;

/// Position stored in a table slot is offset by one so that 0 means empty.
const EMPTY: u64 = 0;

pub struct BlockMatcher<'a> {
    source: &'a [u8],
    hasher: RollingHash,
    table: Vec<u64>,
    shift: u32,
}

impl<'a> BlockMatcher<'a> {
    pub fn new(source: &'a [u8], config: MatcherConfig) -> Self {
        let hasher = RollingHash::new(config.look);
        let entries = (source.len() / config.step).max(1);
        let bits = (entries * 2).next_power_of_two().trailing_zeros().clamp(10, 30);
        let mut matcher = Self {
            source,
            hasher,
            table: vec![EMPTY; 1 << bits],
            shift: 32 - bits,
        };

        let look = config.look;
        if source.len() >= look {
            for pos in (0..=source.len() - look).step_by(config.step) {
                let slot = matcher.slot(matcher.hasher.hash(&source[pos..]));
                // Earliest position wins.
                if matcher.table[slot] == EMPTY {
                    matcher.table[slot] = pos as u64 + 1;
                }
            }
        }
        matcher
    }

    #[inline]
    fn slot(&self, h: u32) -> usize {
        (h.wrapping_mul(0x9E37_79B1) >> self.shift) as usize
    }

    /// Cover all of `target` with COPY (from the source), RUN and ADD
    /// instructions. COPY addresses are source offsets.
    pub fn find_matches(&self, target: &[u8]) -> Vec<Instruction> {
        let look = self.hasher.look();
        let mut out = Vec::new();
        let mut literal_start = 0;
        let mut pos = 0;

        if target.len() >= look {
            let mut h = self.hasher.hash(target);
            loop {
                if let Some((start, src, len)) = self.try_match(target, pos, literal_start, h) {
                    push_literal(&mut out, &target[literal_start..start]);
                    out.push(Instruction::Copy {
                        len: len as u32,
                        addr: src as u64,
                    });
                    pos = start + len;
                    literal_start = pos;
                    if pos + look > target.len() {
                        break;
                    }
                    h = self.hasher.hash(&target[pos..]);
                    continue;
                }
                if pos + look >= target.len() {
                    break;
                }
                h = self.hasher.roll(h, target[pos], target[pos + look]);
                pos += 1;
            }
        }

        push_literal(&mut out, &target[literal_start..]);
        out
    }

    /// Verify the candidate for the window at `pos` and extend it. Returns
    /// `(target_start, source_start, len)`.
    fn try_match(
        &self,
        target: &[u8],
        pos: usize,
        literal_start: usize,
        h: u32,
    ) -> Option<(usize, usize, usize)> {
        let look = self.hasher.look();
        let stored = self.table[self.slot(h)];
        if stored == EMPTY {
            return None;
        }
        let src = (stored - 1) as usize;
        if self.source[src..src + look] != target[pos..pos + look] {
            return None;
        }

        let forward = self.source[src + look..]
            .iter()
            .zip(&target[pos + look..])
            .take_while(|(a, b)| a == b)
            .count();
        let backward = self.source[..src]
            .iter()
            .rev()
            .zip(target[literal_start..pos].iter().rev())
            .take_while(|(a, b)| a == b)
            .count();

        let len = look + forward + backward;
        (len >= MIN_MATCH).then_some((pos - backward, src - backward, len))
    }
}

/// Instructions for bytes with no source match: runs of one byte become RUN,
/// everything else ADD.
pub fn literal_instructions(bytes: &[u8]) -> Vec<Instruction> {
    let mut out = Vec::new();
    push_literal(&mut out, bytes);
    out
}

fn push_literal(out: &mut Vec<Instruction>, bytes: &[u8]) {
    let mut add_start = 0;
    let mut i = 0;
    while i < bytes.len() {
        let run = bytes[i..].iter().take_while(|&&b| b == bytes[i]).count();
        if run >= MIN_RUN {
            push_add(out, i - add_start);
            out.push(Instruction::Run { len: run as u32 });
            add_start = i + run;
        }
        i += run;
    }
    push_add(out, bytes.len() - add_start);
}

fn push_add(out: &mut Vec<Instruction>, len: usize) {
    if len == 0 {
        return;
    }
    if let Some(Instruction::Add { len: prev }) = out.last_mut() {
        *prev += len as u32;
    } else {
        out.push(Instruction::Add { len: len as u32 });
    }
}
