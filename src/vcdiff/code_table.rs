// Default VCDIFF code table (RFC 3284 section 5.6) plus an opcode index
// used by the window encoder to pick single and paired instructions.

use std::collections::HashMap;
use std::sync::LazyLock;

pub const NOOP: u8 = 0;
pub const ADD: u8 = 1;
pub const RUN: u8 = 2;
/// COPY with address mode `m` is stored as `COPY + m`.
pub const COPY: u8 = 3;

/// Shortest COPY the default table encodes with an implicit size.
pub const MIN_MATCH: u8 = 4;

const NEAR_MODES: u8 = 4;
const SAME_MODES: u8 = 3;
const COPY_MODES: u8 = 2 + NEAR_MODES + SAME_MODES;

/// One opcode: up to two (type, size) pairs. A size of 0 means the size
/// follows in the instruction section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CodeTableEntry {
    pub type1: u8,
    pub size1: u8,
    pub type2: u8,
    pub size2: u8,
}

/// A decoded instruction. COPY addresses are already resolved to positions
/// in the combined source+target address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Add { len: u32 },
    Run { len: u32 },
    Copy { len: u32, addr: u64 },
}

impl Instruction {
    #[inline]
    pub fn len(&self) -> u32 {
        match *self {
            Instruction::Add { len } | Instruction::Run { len } | Instruction::Copy { len, .. } => {
                len
            }
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct CodeTable {
    entries: [CodeTableEntry; 256],
    singles: HashMap<(u8, u8), u8>,
    doubles: HashMap<(u8, u8, u8, u8), u8>,
}

impl CodeTable {
    #[inline]
    pub fn entry(&self, opcode: u8) -> CodeTableEntry {
        self.entries[opcode as usize]
    }

    /// Opcode for a lone instruction, and whether its size must be written
    /// explicitly.
    pub fn single(&self, itype: u8, size: u32) -> (u8, bool) {
        if let Ok(small) = u8::try_from(size)
            && small != 0
            && let Some(&op) = self.singles.get(&(itype, small))
        {
            return (op, false);
        }
        // Every type has a size-0 form.
        (self.singles[&(itype, 0)], true)
    }

    /// Opcode encoding two instructions at once, when the table has one.
    pub fn double(&self, first: (u8, u32), second: (u8, u32)) -> Option<u8> {
        let s1 = u8::try_from(first.1).ok()?;
        let s2 = u8::try_from(second.1).ok()?;
        self.doubles.get(&(first.0, s1, second.0, s2)).copied()
    }
}

fn build() -> CodeTable {
    let mut list = Vec::with_capacity(256);
    let single = |type1, size1| CodeTableEntry {
        type1,
        size1,
        ..Default::default()
    };

    list.push(single(RUN, 0));
    list.extend((0..=17).map(|s| single(ADD, s)));
    for mode in 0..COPY_MODES {
        list.push(single(COPY + mode, 0));
        list.extend((MIN_MATCH..MIN_MATCH + 15).map(|s| single(COPY + mode, s)));
    }
    // ADD then COPY.
    for mode in 0..COPY_MODES {
        let max_copy = if mode < 2 + NEAR_MODES { 6 } else { 4 };
        for add in 1..=4 {
            for copy in MIN_MATCH..=max_copy {
                list.push(CodeTableEntry {
                    type1: ADD,
                    size1: add,
                    type2: COPY + mode,
                    size2: copy,
                });
            }
        }
    }
    // COPY of 4 then ADD of 1, one per mode.
    for mode in 0..COPY_MODES {
        list.push(CodeTableEntry {
            type1: COPY + mode,
            size1: MIN_MATCH,
            type2: ADD,
            size2: 1,
        });
    }
    debug_assert_eq!(list.len(), 256);

    let mut entries = [CodeTableEntry::default(); 256];
    let mut singles = HashMap::new();
    let mut doubles = HashMap::new();
    for (op, e) in list.into_iter().enumerate() {
        let op = op as u8;
        entries[op as usize] = e;
        if e.type2 == NOOP {
            singles.entry((e.type1, e.size1)).or_insert(op);
        } else {
            doubles
                .entry((e.type1, e.size1, e.type2, e.size2))
                .or_insert(op);
        }
    }
    CodeTable {
        entries,
        singles,
        doubles,
    }
}

pub fn default_code_table() -> &'static CodeTable {
    static TABLE: LazyLock<CodeTable> = LazyLock::new(build);
    &TABLE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc_layout_spot_checks() {
        let t = default_code_table();
        assert_eq!(t.entry(0), CodeTableEntry { type1: RUN, ..Default::default() });
        assert_eq!(t.entry(1).type1, ADD);
        assert_eq!(t.entry(18), CodeTableEntry { type1: ADD, size1: 17, ..Default::default() });
        assert_eq!(t.entry(19), CodeTableEntry { type1: COPY, ..Default::default() });
        assert_eq!(t.entry(20).size1, 4);
        // First ADD+COPY pair and last COPY+ADD pair.
        assert_eq!(
            t.entry(163),
            CodeTableEntry { type1: ADD, size1: 1, type2: COPY, size2: 4 }
        );
        assert_eq!(
            t.entry(255),
            CodeTableEntry { type1: COPY + 8, size1: 4, type2: ADD, size2: 1 }
        );
    }

    #[test]
    fn single_lookup_falls_back_to_explicit_size() {
        let t = default_code_table();
        assert_eq!(t.single(ADD, 5), (6, false));
        assert_eq!(t.single(ADD, 18), (1, true));
        assert_eq!(t.single(RUN, 3), (0, true));
        assert_eq!(t.single(COPY, 3), (19, true));
        assert_eq!(t.single(COPY, 300), (19, true));
    }

    #[test]
    fn double_lookup() {
        let t = default_code_table();
        assert_eq!(t.double((ADD, 1), (COPY, 4)), Some(163));
        assert_eq!(t.double((ADD, 5), (COPY, 4)), None);
        assert_eq!(t.double((COPY + 8, 4), (ADD, 1)), Some(255));
        assert_eq!(t.double((RUN, 4), (ADD, 1)), None);
    }
}
