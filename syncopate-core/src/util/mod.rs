mod id;

pub use id::*;

use rand::distributions::Alphanumeric;
use rand::Rng;

/// How many characters a generated room code has.
pub const ROOM_CODE_LENGTH: usize = 6;

/// Generates a short shareable room code.
///
/// Uniqueness is not guaranteed here; the registry treats an existing code as
/// a lookup, so a collision simply joins the existing room.
pub fn generate_room_code() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ROOM_CODE_LENGTH)
        .map(|c| (c as char).to_ascii_uppercase())
        .collect()
}

#[cfg(test)]
mod test {
    use super::{generate_room_code, ROOM_CODE_LENGTH};

    #[test]
    fn room_codes_are_short_and_uppercase() {
        let code = generate_room_code();

        assert_eq!(code.len(), ROOM_CODE_LENGTH);
        assert!(code.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(code, code.to_ascii_uppercase());
    }
}
