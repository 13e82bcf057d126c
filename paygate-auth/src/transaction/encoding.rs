//! Canonical byte encoding of a transaction.
//!
//! These are the exact bytes a device signs and the verifier checks. The
//! layout is fixed; any change breaks signatures produced by other
//! implementations.
//!
//! Wire format (all multi-byte integers are big-endian):
//!
//! | Field        | Size | Description                         |
//! |--------------|------|-------------------------------------|
//! | item_id      | 8    | Purchased item (u64 BE)             |
//! | user_id_len  | 2    | Byte length of user_id (u16 BE)     |
//! | user_id      | var  | UTF-8 user identifier               |
//! | client_nonce | 8    | Per-attempt random nonce (u64 BE)   |
//!
//! This matches `writeLong(item) / writeUTF(user) / writeLong(nonce)` of a
//! Java `DataOutputStream` for any user id without U+0000 or characters
//! outside the Basic Multilingual Plane, which Java encodes differently.

use super::{ClientNonce, Transaction, TransactionError};

/// Maximum user id length in bytes (fits in the u16 length prefix).
pub const MAX_USER_ID_LEN: usize = u16::MAX as usize;

const FIXED_LEN: usize = 8 + 2 + 8;

/// Build the canonical byte string for a transaction.
#[must_use]
pub fn canonical_encoding(transaction: &Transaction) -> Vec<u8> {
    let user_id = transaction.user_id().as_bytes();
    let mut msg = Vec::with_capacity(FIXED_LEN + user_id.len());

    // Item id (8 bytes, big-endian)
    msg.extend_from_slice(&transaction.item_id().to_be_bytes());

    // User id (2-byte length, big-endian + UTF-8)
    // Safety: Transaction construction validated user_id.len() <= 65535
    msg.extend_from_slice(&(user_id.len() as u16).to_be_bytes());
    msg.extend_from_slice(user_id);

    // Client nonce (8 bytes, big-endian)
    msg.extend_from_slice(&transaction.client_nonce().value().to_be_bytes());

    msg
}

/// Parse a canonical byte string back into a transaction.
///
/// # Errors
///
/// Returns `TransactionError::Malformed` if the input is truncated, has
/// trailing bytes, or the user id is not UTF-8, and the usual construction
/// errors if the decoded user id is empty.
pub fn decode_canonical(bytes: &[u8]) -> Result<Transaction, TransactionError> {
    if bytes.len() < FIXED_LEN {
        return Err(TransactionError::Malformed);
    }

    let (item, rest) = bytes.split_at(8);
    let (len, rest) = rest.split_at(2);
    let user_len = usize::from(u16::from_be_bytes([len[0], len[1]]));

    if rest.len() != user_len + 8 {
        return Err(TransactionError::Malformed);
    }
    let (user, nonce) = rest.split_at(user_len);

    let item_id = u64::from_be_bytes(item.try_into().map_err(|_| TransactionError::Malformed)?);
    let nonce = u64::from_be_bytes(nonce.try_into().map_err(|_| TransactionError::Malformed)?);
    let user_id = std::str::from_utf8(user).map_err(|_| TransactionError::Malformed)?;

    Transaction::with_nonce(user_id, item_id, ClientNonce::from_u64(nonce))
}
