// src/access_code.rs

use rand::Rng;

use crate::config::ACCESS_CODE_LENGTH;

/// Code alphabet: uppercase alphanumerics minus the easily-confused
/// 0/O and 1/I.
const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Produces one candidate access code. Uniqueness is not guaranteed here;
/// the caller retries against the unique column constraint.
pub fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..ACCESS_CODE_LENGTH)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}
