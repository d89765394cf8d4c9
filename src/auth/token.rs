use rand::rngs::OsRng;
use rand::RngCore;

/// Generate an opaque token of `length` random bytes, hex-encoded
/// (`2 * length` characters). Used for verification codes and session ids.
///
/// There is no error path: if the OS entropy source fails, `OsRng` aborts the
/// process, which is the right outcome for a credential generator.
pub fn generate(length: usize) -> String {
    let mut bytes = vec![0u8; length];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
