//! Name generation for objects created with `generateName`.

use rand::Rng;

const MAX_NAME_LENGTH: usize = 63;
const RANDOM_LENGTH: usize = 5;
const MAX_GENERATED_NAME_LENGTH: usize = MAX_NAME_LENGTH - RANDOM_LENGTH;

// Consonants and digits only, so generated suffixes never spell words.
const ALPHANUMS: &[u8] = b"bcdfghjklmnpqrstvwxz2456789";

/// Append a random suffix to `base`, truncating `base` so the result fits in 63 characters.
pub fn simple_name(base: &str) -> String {
    let base = if base.len() > MAX_GENERATED_NAME_LENGTH {
        let mut end = MAX_GENERATED_NAME_LENGTH;
        while !base.is_char_boundary(end) {
            end -= 1;
        }
        &base[..end]
    } else {
        base
    };

    let mut rng = rand::thread_rng();
    let suffix: String = (0..RANDOM_LENGTH)
        .map(|_| ALPHANUMS[rng.gen_range(0..ALPHANUMS.len())] as char)
        .collect();

    format!("{}{}", base, suffix)
}
