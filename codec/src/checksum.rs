//! 16-bit one's-complement checksum over the framed region, rendered as
//! four uppercase hex ASCII bytes on the wire.

/// Sums `data` as big-endian 16-bit words (zero-padding an odd tail),
/// folds carries back in and complements the result.
pub fn ones_complement(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;

    let mut words = data.chunks_exact(2);
    for w in &mut words {
        sum += u32::from(u16::from_be_bytes([w[0], w[1]]));
    }

    if let &[tail] = words.remainder() {
        sum += u32::from(u16::from_be_bytes([tail, 0]));
    }

    while sum > 0xffff {
        sum = (sum & 0xffff) + (sum >> 16);
    }

    !(sum as u16)
}

pub fn checksum_ascii(data: &[u8]) -> [u8; 4] {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";

    let sum = ones_complement(data);

    [
        HEX[usize::from(sum >> 12)],
        HEX[usize::from((sum >> 8) & 0xf)],
        HEX[usize::from((sum >> 4) & 0xf)],
        HEX[usize::from(sum & 0xf)],
    ]
}

/// Parses the four checksum characters trailing a frame. `None` if any
/// byte is not an ASCII hex digit.
pub fn parse_checksum(ascii: &[u8]) -> Option<u16> {
    debug_assert_eq!(ascii.len(), 4);

    ascii.iter().try_fold(0u16, |acc, &b| {
        let nibble = char::from(b).to_digit(16)?;
        Some((acc << 4) | nibble as u16)
    })
}
