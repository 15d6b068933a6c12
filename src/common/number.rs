/// Splits a number into a vector of bytes.
/// Each byte in the vector is layed out as follows:
/// ```plain
/// CDDDDDDD
/// ```
/// Where C is the last-byte flag, and D are data bits,
/// most significant group first.
/// These sequences are designed to be insertable into byte streams.
/// For example, `256` would become `[0b0000_0010, 0b1000_0000]`.
pub fn split_number(n: usize) -> Vec<u8> {
    let mut bytes = vec![];
    let mut i = n;
    let chunk = 0b1000_0000;

    loop {
        let low = i % chunk; // get next 7 bits in usize
        i /= chunk; // shift right by 7

        // set high bit on the first group pushed, which ends up last
        bytes.push(if bytes.is_empty() { chunk + low } else { low } as u8);

        // like a do-while
        // makes sure a number is always pushed
        if i == 0 {
            break;
        }
    }

    // reverse chain so high bit byte is last
    bytes.reverse();
    bytes
}

/// This takes a stream of bytes, and builds the next number in it.
/// Returns the number and the count of bytes eaten,
/// or `None` if the stream ends before a byte with the last-byte flag,
/// or the number does not fit in a `usize`.
pub fn build_number(bytes: &[u8]) -> Option<(usize, usize)> {
    let mut i: usize = 0;
    let chunk = 0b1000_0000;

    for (eaten, byte) in bytes.iter().enumerate() {
        // shift left by 7
        i = i.checked_mul(chunk as usize)?;

        // check if this byte is the last byte in the sequence
        // you pass remaining bytecode, so early breaking is important
        if *byte >= chunk {
            i = i.checked_add((*byte - chunk) as usize)?;
            return Some((i, eaten + 1));
        } else {
            i = i.checked_add(*byte as usize)?;
        }
    }

    None
}
