pub mod json;

use std::fmt;
use std::sync::Arc;

use crate::Status;

/// A decoded response payload that exposes the server's lifecycle status
pub trait Pollable {
    fn status(&self) -> Status;
}

type DecodeFn<R> = dyn Fn(&[u8]) -> Option<(Status, R)> + Send + Sync;

/// Decode function turning response bytes into a status and a result.
///
/// `None` means the bytes could not be decoded; the engine treats that the
/// same as an empty response. Each result schema supplies its own decoder,
/// so the engine stays monomorphic over `R` without a codec registry.
pub struct Decoder<R> {
    decode: Arc<DecodeFn<R>>,
}

impl<R> Decoder<R> {
    pub fn new<F>(decode: F) -> Self
    where
        F: Fn(&[u8]) -> Option<(Status, R)> + Send + Sync + 'static,
    {
        Self {
            decode: Arc::new(decode),
        }
    }

    pub fn decode(&self, bytes: &[u8]) -> Option<(Status, R)> {
        (self.decode)(bytes)
    }
}

impl<R> Clone for Decoder<R> {
    fn clone(&self) -> Self {
        Self {
            decode: self.decode.clone(),
        }
    }
}

impl<R> fmt::Debug for Decoder<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decoder").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_decoder() {
        let decoder = Decoder::new(|bytes: &[u8]| {
            let text = std::str::from_utf8(bytes).ok()?;
            let (status, rest) = text.split_once(':')?;
            Some((Status::parse(status), rest.to_string()))
        });

        assert_eq!(
            decoder.decode(b"finished:done"),
            Some((Status::Finished, "done".to_string()))
        );
        assert_eq!(decoder.decode(b"no separator"), None);
        assert_eq!(decoder.clone().decode(&[0xff, 0xfe]), None);
    }
}
