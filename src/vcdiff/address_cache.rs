// NEAR/SAME address cache (RFC 3284 section 5.3) with the default sizes
// (4 near slots, 3 same groups), giving nine COPY address modes:
//
//   0     SELF  absolute address
//   1     HERE  here - value
//   2..=5 NEAR  near[mode - 2] + value
//   6..=8 SAME  same[(mode - 6) * 256 + byte]

use super::varint::{self, VarIntError};

pub const VCD_SELF: u8 = 0;
pub const VCD_HERE: u8 = 1;

const S_NEAR: usize = 4;
const S_SAME: usize = 3;
const SAME_BASE: u8 = 2 + S_NEAR as u8;

/// How an address is written into the address section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodedAddr {
    VarInt(u64),
    Byte(u8),
}

impl EncodedAddr {
    pub fn write_to(self, out: &mut Vec<u8>) {
        match self {
            EncodedAddr::VarInt(v) => varint::push_u64(out, v),
            EncodedAddr::Byte(b) => out.push(b),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("invalid address mode {0}")]
    InvalidMode(u8),
    #[error("address section: {0}")]
    VarInt(#[from] VarIntError),
    #[error("address {addr} is not before the current position {here}")]
    OutOfRange { addr: u64, here: u64 },
}

#[derive(Clone)]
pub struct AddressCache {
    near: [u64; S_NEAR],
    same: Vec<u64>,
    next_slot: usize,
}

impl Default for AddressCache {
    fn default() -> Self {
        Self::new()
    }
}

impl AddressCache {
    pub fn new() -> Self {
        Self {
            near: [0; S_NEAR],
            same: vec![0; S_SAME * 256],
            next_slot: 0,
        }
    }

    /// Clear state; done at the start of every window.
    pub fn reset(&mut self) {
        self.near = [0; S_NEAR];
        self.same.fill(0);
        self.next_slot = 0;
    }

    #[inline]
    fn update(&mut self, addr: u64) {
        self.near[self.next_slot] = addr;
        self.next_slot = (self.next_slot + 1) % S_NEAR;
        let idx = (addr % self.same.len() as u64) as usize;
        self.same[idx] = addr;
    }

    /// Choose the cheapest mode for `addr` given the current position `here`.
    pub fn encode(&mut self, addr: u64, here: u64) -> (u8, EncodedAddr) {
        debug_assert!(addr < here);

        let slot = (addr % self.same.len() as u64) as usize;
        if self.same[slot] == addr {
            let mode = SAME_BASE + (slot / 256) as u8;
            self.update(addr);
            return (mode, EncodedAddr::Byte((slot % 256) as u8));
        }

        let mut best = (VCD_SELF, addr);
        let mut consider = |mode: u8, value: u64| {
            if value < best.1 {
                best = (mode, value);
            }
        };
        consider(VCD_HERE, here - addr);
        for (i, &near) in self.near.iter().enumerate() {
            if addr >= near {
                consider(2 + i as u8, addr - near);
            }
        }

        self.update(addr);
        (best.0, EncodedAddr::VarInt(best.1))
    }

    /// Decode one address in `mode`, consuming bytes from the front of `input`.
    pub fn decode(&mut self, mode: u8, here: u64, input: &mut &[u8]) -> Result<u64, AddressError> {
        let addr = if mode < SAME_BASE {
            let (value, used) = varint::read_u64(input)?;
            *input = &input[used..];
            match mode {
                VCD_SELF => value,
                VCD_HERE => here
                    .checked_sub(value)
                    .ok_or(AddressError::OutOfRange { addr: value, here })?,
                _ => self.near[(mode - 2) as usize].wrapping_add(value),
            }
        } else if mode < SAME_BASE + S_SAME as u8 {
            let (&byte, rest) = input
                .split_first()
                .ok_or(AddressError::VarInt(VarIntError::Underflow))?;
            *input = rest;
            self.same[(mode - SAME_BASE) as usize * 256 + byte as usize]
        } else {
            return Err(AddressError::InvalidMode(mode));
        };

        if addr >= here {
            return Err(AddressError::OutOfRange { addr, here });
        }
        self.update(addr);
        Ok(addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_all(addrs: &[(u64, u64)]) -> (Vec<u8>, Vec<u8>) {
        let mut cache = AddressCache::new();
        let mut modes = Vec::new();
        let mut bytes = Vec::new();
        for &(addr, here) in addrs {
            let (mode, enc) = cache.encode(addr, here);
            modes.push(mode);
            enc.write_to(&mut bytes);
        }
        (modes, bytes)
    }

    #[test]
    fn repeated_address_uses_same_cache() {
        let (modes, bytes) = encode_all(&[(1000, 5000), (1000, 6000)]);
        assert!(modes[1] >= SAME_BASE);
        assert_eq!(bytes.len(), 2 + 1);
    }

    #[test]
    fn near_address_prefers_small_offset() {
        let mut cache = AddressCache::new();
        cache.encode(100_000, 200_000);
        let (mode, enc) = cache.encode(100_010, 200_100);
        assert_eq!(mode, 2);
        assert_eq!(enc, EncodedAddr::VarInt(10));
    }

    #[test]
    fn decoder_mirrors_encoder() {
        let addrs = [(0, 10), (5, 20), (5, 30), (17, 40), (3, 1000), (990, 1000)];
        let (modes, bytes) = encode_all(&addrs);
        let mut cache = AddressCache::new();
        let mut input = &bytes[..];
        for (&(addr, here), mode) in addrs.iter().zip(modes) {
            assert_eq!(cache.decode(mode, here, &mut input).unwrap(), addr);
        }
        assert!(input.is_empty());
    }

    #[test]
    fn rejects_bad_mode_and_forward_reference() {
        let mut cache = AddressCache::new();
        assert_eq!(
            cache.decode(9, 10, &mut &[0u8][..]),
            Err(AddressError::InvalidMode(9))
        );
        assert_eq!(
            cache.decode(VCD_SELF, 10, &mut &[20u8][..]),
            Err(AddressError::OutOfRange { addr: 20, here: 10 })
        );
    }
}
