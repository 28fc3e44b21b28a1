use soroban_sdk::{BytesN, Env, String};

use crate::error::Error;

pub const MAX_SYMBOL_LEN: u32 = 8;

/// Canonical storage form of a currency symbol: ASCII letters folded to
/// uppercase in a zero-padded 8-byte array, so "eur", "Eur" and "EUR" all
/// address the same record.
///
/// # Errors
/// - `EncodingTooLong`: symbol is empty or longer than 8 bytes
pub fn canonical_symbol(env: &Env, symbol: &String) -> Result<BytesN<8>, Error> {
    let len = symbol.len();
    if len == 0 || len > MAX_SYMBOL_LEN {
        return Err(Error::EncodingTooLong);
    }

    let mut buf = [0u8; 8];
    symbol.copy_into_slice(&mut buf[..len as usize]);

    for byte in buf.iter_mut() {
        if byte.is_ascii_lowercase() {
            *byte = byte.to_ascii_uppercase();
        }
    }

    Ok(BytesN::from_array(env, &buf))
}

/// Readable form of a canonical symbol with the zero padding stripped.
pub fn symbol_string(env: &Env, canonical: &BytesN<8>) -> String {
    let buf = canonical.to_array();

    let mut len = buf.len();
    while len > 0 && buf[len - 1] == 0 {
        len -= 1;
    }

    String::from_bytes(env, &buf[..len])
}
