// src/store/codec.rs

//! Record encoding. Everything that goes through a `RecordStore` is JSON.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::errors::Result;

pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(bytes)?)
}
