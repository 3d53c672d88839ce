//! Random code generation for redemption and invite codes.

use rand::Rng;

/// Unambiguous alphabet for invite codes (no 0/O, 1/I).
pub const INVITE_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const INVITE_CODE_LEN: usize = 8;

/// 128 random bits as 32 lowercase hex characters.
pub fn generate_redemption_code() -> String {
    let bytes: [u8; 16] = rand::random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

pub fn generate_invite_code() -> String {
    let mut rng = rand::thread_rng();
    (0..INVITE_CODE_LEN)
        .map(|_| INVITE_CODE_ALPHABET[rng.gen_range(0..INVITE_CODE_ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redemption_code_is_lower_hex() {
        let code = generate_redemption_code();
        assert_eq!(code.len(), 32);
        assert!(code.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn invite_code_uses_alphabet() {
        let code = generate_invite_code();
        assert_eq!(code.len(), INVITE_CODE_LEN);
        assert!(code.bytes().all(|b| INVITE_CODE_ALPHABET.contains(&b)));
    }

    #[test]
    fn codes_differ() {
        assert_ne!(generate_redemption_code(), generate_redemption_code());
    }
}
