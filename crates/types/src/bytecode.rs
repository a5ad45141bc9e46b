//! Versioned content hashing of L2 contract bytecode.

use sha2::{Digest, Sha256};

use crate::H256;

/// Version marker of the bytecode hash format, stored in its first two bytes.
pub const BYTECODE_HASH_VERSION: [u8; 2] = [1, 0];

pub const MAX_BYTECODE_LENGTH_IN_WORDS: usize = (1 << 16) - 1;
pub const MAX_BYTECODE_LENGTH_BYTES: usize = MAX_BYTECODE_LENGTH_IN_WORDS * 32;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum InvalidBytecodeError {
    #[error("Bytecode length is not divisible by 32")]
    InvalidBytecodeAlignment,
    #[error("Bytecode has even number of 32-byte words")]
    EvenWordCount,
    #[error("Bytecode too long: {0} words, while max {1} allowed")]
    BytecodeTooLarge(usize, usize),
}

/// Checks the format invariants the execution layer imposes on deployable bytecode:
/// 32-byte alignment, an odd word count, and a word count that fits the hash format.
pub fn validate_bytecode(code: &[u8]) -> Result<(), InvalidBytecodeError> {
    if code.len() % 32 != 0 {
        return Err(InvalidBytecodeError::InvalidBytecodeAlignment);
    }
    let word_count = code.len() / 32;
    if word_count % 2 == 0 {
        return Err(InvalidBytecodeError::EvenWordCount);
    }
    if word_count > MAX_BYTECODE_LENGTH_IN_WORDS {
        return Err(InvalidBytecodeError::BytecodeTooLarge(
            word_count,
            MAX_BYTECODE_LENGTH_IN_WORDS,
        ));
    }
    Ok(())
}

/// Hashes the provided bytecode.
///
/// The result is not a plain SHA-256: the first two bytes carry the hash format
/// version, the next two the bytecode length in 32-byte words (big-endian), and
/// only the remaining 28 bytes come from the digest.
pub fn hash_bytecode(code: &[u8]) -> Result<H256, InvalidBytecodeError> {
    validate_bytecode(code)?;

    let len_in_words = (code.len() / 32) as u16;
    let mut output: [u8; 32] = Sha256::digest(code).into();
    output[0..2].copy_from_slice(&BYTECODE_HASH_VERSION);
    output[2..4].copy_from_slice(&len_in_words.to_be_bytes());
    Ok(H256(output))
}

pub fn bytecode_len_in_words(bytecode_hash: &H256) -> u16 {
    u16::from_be_bytes([bytecode_hash[2], bytecode_hash[3]])
}

pub fn bytecode_len_in_bytes(bytecode_hash: H256) -> usize {
    bytecode_len_in_words(&bytecode_hash) as usize * 32
}
