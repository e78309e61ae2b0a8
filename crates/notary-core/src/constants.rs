pub const HASH_SIZE: usize = 32;
pub const HASH_HEX_SIZE: usize = HASH_SIZE * 2;
pub const GENESIS_BODY: &[u8] = b"Genesis Block";
pub const CHALLENGE_TAG: &str = "starRegistry";
pub const VALIDATION_WINDOW_SECS: u64 = 300;
