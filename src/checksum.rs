pub fn set_checksum(data: &mut [u8], location: usize) {
    data[location * 2] = 0;
    data[location * 2 + 1] = 0;

    let sum = checksum(data);
    data[location * 2..location * 2 + 2].copy_from_slice(&sum.to_be_bytes());
}

pub fn checksum(data: &[u8]) -> u16 {
    let mut sum = sum_be_words(data);
    while sum >> 16 != 0 {
        sum = (sum >> 16) + (sum & 0xFFFF);
    }

    !sum as u16
}

pub fn verify(data: &[u8]) -> bool {
    checksum(data) == 0
}

/// Sum all words (16 bit chunks) in the given data. Each word is treated as
/// big endian; an odd trailing byte is the high half of a final word.
fn sum_be_words(data: &[u8]) -> u32 {
    data.chunks(2)
        .map(|word| match *word {
            [wh] => u16::from_be_bytes([wh, 0]),
            [wh, wl] => u16::from_be_bytes([wh, wl]),
            _ => unreachable!(),
        })
        .fold(0u32, |acc, w| acc.wrapping_add(w as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc1071_example() {
        // Worked example from RFC 1071 section 3.
        let data = [0x00, 0x01, 0xf2, 0x03, 0xf4, 0xf5, 0xf6, 0xf7];
        assert_eq!(checksum(&data), !0xddf2);
    }

    #[test]
    fn odd_length_pads_low_byte() {
        assert_eq!(checksum(&[0xab]), !0xab00);
        assert_eq!(checksum(&[0x12, 0x34, 0x56]), !(0x1234u16 + 0x5600));
    }

    #[test]
    fn empty_buffer() {
        assert_eq!(checksum(&[]), 0xFFFF);
    }

    #[test]
    fn set_checksum_ignores_previous_value() {
        let mut a = [8, 0, 0, 0, 0x12, 0x34, 0x00, 0x01];
        let mut b = [8, 0, 0xde, 0xad, 0x12, 0x34, 0x00, 0x01];
        set_checksum(&mut a, 1);
        set_checksum(&mut b, 1);
        assert_eq!(a, b);
        assert!(verify(&a));
    }

    #[test]
    fn corruption_is_detected() {
        let mut packet = [8, 0, 0, 0, 0xbe, 0xef, 0x00, 0x07, 0x61, 0x62, 0x63];
        set_checksum(&mut packet, 1);
        assert!(verify(&packet));

        packet[9] ^= 0x10;
        assert!(!verify(&packet));
    }
}
