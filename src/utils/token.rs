use rand::{rngs::OsRng, RngCore};

/// Bytes of entropy behind every invite token.
pub const INVITE_TOKEN_BYTES: usize = 32;

pub fn generate_invite_token() -> String {
    let mut bytes = [0u8; INVITE_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
