pub const BIT_SECURITY_LEVEL: usize = 128;

pub const PRF_KEY_BYTE_LEN: usize = (2 * BIT_SECURITY_LEVEL) / 8;
pub const DERIVATION_KEY_BYTE_LEN: usize = PRF_KEY_BYTE_LEN;
pub const SEARCH_TOKEN_BYTE_LEN: usize = (2 * BIT_SECURITY_LEVEL) / 8;
pub const UPDATE_TOKEN_BYTE_LEN: usize = BIT_SECURITY_LEVEL / 8;
pub const KEYWORD_TOKEN_BYTE_LEN: usize = (2 * BIT_SECURITY_LEVEL) / 8;

pub const INDEX_BYTE_LEN: usize = std::mem::size_of::<u64>();
pub const TAG_BYTE_LEN: usize = BIT_SECURITY_LEVEL / 8;
pub const PUNCT_KEY_BYTE_LEN: usize = (2 * BIT_SECURITY_LEVEL) / 8;
pub const KEY_SHARE_BYTE_LEN: usize = PUNCT_KEY_BYTE_LEN + TAG_BYTE_LEN;
pub const CIPHERTEXT_BYTE_LEN: usize = TAG_BYTE_LEN + 2 * INDEX_BYTE_LEN;
pub const CACHED_RESULT_BYTE_LEN: usize = INDEX_BYTE_LEN + TAG_BYTE_LEN;

pub const TOKEN_TREE_KEY_BYTE_LEN: usize = (2 * BIT_SECURITY_LEVEL) / 8;
pub const TOKEN_TREE_MAX_DEPTH: u8 = 48;

/// TurboSHAKE128 domain separators, one per purpose. Must lie in `0x01..=0x7f`.
pub const PRF_DOMAIN_SEPARATOR: u8 = 0x1a;
pub const TOKEN_TREE_DOMAIN_SEPARATOR: u8 = 0x2b;

pub const DEFAULT_MAX_ADD_COUNT: u32 = 1 << 24;
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;
