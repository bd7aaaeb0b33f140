use super::params::{CIPHERTEXT_BYTE_LEN, KEY_SHARE_BYTE_LEN, PUNCT_KEY_BYTE_LEN, TAG_BYTE_LEN};

pub type DocIndex = u64;
pub type Tag = [u8; TAG_BYTE_LEN];
pub type PunctKey = [u8; PUNCT_KEY_BYTE_LEN];
pub type KeyShare = [u8; KEY_SHARE_BYTE_LEN];
pub type Ciphertext = [u8; CIPHERTEXT_BYTE_LEN];

/// Puncturable encryption of document indices.
///
/// Every ciphertext is bound to a tag. The key of one keyword version is split in shares: the initial share, handed
/// to the server at search time, plus one share per deletion, each puncturing the key at one tag. A decryptor folded
/// from the initial share and all `deletion_count` puncturing shares decrypts exactly those ciphertexts whose tag
/// was never punctured. A decryptor missing any share decrypts nothing.
pub trait PuncturableEncryption: Send + Sync {
    type Decryptor: PuncturableDecryption;

    /// Share to combine with the `deletion_count` shares issued by `inc_puncture`.
    fn initial_keyshare(&self, key: &PunctKey, deletion_count: u32) -> KeyShare;

    fn encrypt(&self, key: &PunctKey, index: DocIndex, tag: &Tag) -> Ciphertext;

    /// Share puncturing `key` at `tag`. `deletion_index` counts deletions from 1.
    fn inc_puncture(&self, key: &PunctKey, deletion_index: u32, tag: &Tag) -> KeyShare;

    fn ciphertext_tag(&self, ciphertext: &Ciphertext) -> Tag;

    fn key_share_tag(&self, key_share: &KeyShare) -> Tag;

    fn decryptor(&self, initial: &KeyShare, punctures: &[KeyShare]) -> Self::Decryptor;
}

pub trait PuncturableDecryption: Send + Sync {
    /// `None` both for punctured tags and for ciphertexts under another key.
    fn decrypt(&self, ciphertext: &Ciphertext) -> Option<DocIndex>;
}
