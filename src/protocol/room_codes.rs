use rand::RngExt;

/// Length of generated private-room codes.
pub const ROOM_CODE_LENGTH: usize = 8;

/// Generate an 8-character upper-case alphanumeric room code.
///
/// `rand::rng()` is a CSPRNG, so codes are not guessable from earlier ones.
pub fn generate_room_code() -> String {
    const ALPHANUMERIC_CHARS: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    let mut rng = rand::rng();
    (0..ROOM_CODE_LENGTH)
        .map(|_| {
            let idx = rng.random_range(0..ALPHANUMERIC_CHARS.len());
            // SAFETY: `idx` is produced by `random_range(0..len)`, so it is
            // always within [0, len).
            #[allow(clippy::indexing_slicing)]
            let ch = ALPHANUMERIC_CHARS[idx] as char;
            ch
        })
        .collect()
}

/// Normalize a user-supplied room code for lookup.
pub fn normalize_room_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_eight_uppercase_alphanumerics() {
        for _ in 0..32 {
            let code = generate_room_code();
            assert_eq!(code.len(), ROOM_CODE_LENGTH);
            assert!(code
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        }
    }

    #[test]
    fn normalization_uppercases_and_trims() {
        assert_eq!(normalize_room_code(" ab23cd45 "), "AB23CD45");
    }
}
