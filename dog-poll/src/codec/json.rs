use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{codec::{Decoder, Pollable}, Status};

impl<T> Decoder<T>
where
    T: Pollable + DeserializeOwned + 'static,
{
    /// JSON decoder for a typed result schema
    pub fn json() -> Self {
        Decoder::new(|bytes: &[u8]| {
            let result: T = serde_json::from_slice(bytes).ok()?;
            Some((result.status(), result))
        })
    }
}

impl Decoder<Value> {
    /// Schema-less JSON decoder.
    ///
    /// Requires an object with a string `status` field; everything else in
    /// the body is handed to the delegate untouched.
    pub fn json_value() -> Self {
        Decoder::new(|bytes: &[u8]| {
            let value: Value = serde_json::from_slice(bytes).ok()?;
            let status = Status::parse(value.get("status")?.as_str()?);
            Some((status, value))
        })
    }
}
