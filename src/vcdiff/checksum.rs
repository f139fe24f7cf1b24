// Adler-32 of a target window, as carried by the VCD_ADLER32 extension.

#[cfg(feature = "adler32")]
pub fn adler32(data: &[u8]) -> u32 {
    let mut hasher = simd_adler32::Adler32::new();
    hasher.write(data);
    hasher.finish()
}

#[cfg(not(feature = "adler32"))]
pub fn adler32(data: &[u8]) -> u32 {
    const MOD: u32 = 65_521;
    // Largest block that cannot overflow `b` before reducing.
    const NMAX: usize = 5552;
    let (mut a, mut b) = (1u32, 0u32);
    for chunk in data.chunks(NMAX) {
        for &byte in chunk {
            a += u32::from(byte);
            b += a;
        }
        a %= MOD;
        b %= MOD;
    }
    (b << 16) | a
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_values() {
        assert_eq!(adler32(b""), 1);
        assert_eq!(adler32(b"Wikipedia"), 0x11E6_0398);
    }

    #[test]
    fn long_input_does_not_overflow() {
        let data = vec![0xFFu8; 100_000];
        let a = adler32(&data);
        assert_eq!(a & 0xFFFF, ((1 + 255 * 100_000u64) % 65_521) as u32);
    }
}
