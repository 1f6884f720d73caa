#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

#[cfg(not(target_arch = "wasm32"))]
use uuid::Uuid;

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_namespace = ["self", "crypto"])]
    fn randomUUID() -> String;
}

/// Length of an auto-generated document id, matching what the hosted database hands out.
pub const DOCUMENT_ID_LEN: usize = 20;

const ALPHABET: &[u8; 62] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

pub fn get_uuid() -> String {
    #[cfg(target_arch = "wasm32")]
    {
        randomUUID()
    }

    #[cfg(not(target_arch = "wasm32"))]
    {
        Uuid::new_v4().to_string()
    }
}

/// A 20-character alphanumeric id for a new document.
pub fn get_document_id() -> String {
    // two v4 uuids give 244 random bits; 20 base-62 characters need about 120
    let bits = format!("{}{}", get_uuid(), get_uuid()).replace('-', "");
    bits.as_bytes()
        .chunks(3)
        .take(DOCUMENT_ID_LEN)
        .map(|chunk| {
            let value = chunk.iter().fold(0usize, |acc, &c| {
                acc * 16 + (c as char).to_digit(16).unwrap_or(0) as usize
            });
            ALPHABET[value % ALPHABET.len()] as char
        })
        .collect()
}
