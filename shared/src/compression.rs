//! Zlib framing of directory payloads.

use crate::error::PayloadError;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{self, Read, Write};

/// Largest inflated payload accepted from the directory.
pub const MAX_INFLATED_SIZE: usize = 4 * 1024 * 1024;

/// Compresses at the best ratio.
pub fn deflate(data: &[u8]) -> Result<Vec<u8>, PayloadError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(data).map_err(PayloadError::Compression)?;
    encoder.finish().map_err(PayloadError::Compression)
}

/// Inflates a zlib stream, failing if the output would exceed
/// [`MAX_INFLATED_SIZE`].
pub fn inflate(data: &[u8]) -> Result<Vec<u8>, PayloadError> {
    let mut decoder = ZlibDecoder::new(data).take(MAX_INFLATED_SIZE as u64 + 1);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(PayloadError::Compression)?;
    if out.len() > MAX_INFLATED_SIZE {
        return Err(PayloadError::Compression(io::Error::new(
            io::ErrorKind::InvalidData,
            "inflated payload too large",
        )));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inflate_restores_payload() {
        let json = br#"{"servers":[]}"#;
        let packed = deflate(json).unwrap();
        assert_eq!(&packed[..1], &[0x78]);
        assert_eq!(inflate(&packed).unwrap(), json);
    }

    #[test]
    fn test_inflate_rejects_garbage() {
        assert!(matches!(
            inflate(b"definitely not zlib"),
            Err(PayloadError::Compression(_))
        ));
    }

    #[test]
    fn test_inflate_enforces_limit() {
        let huge = vec![b'a'; MAX_INFLATED_SIZE + 10];
        let packed = deflate(&huge).unwrap();
        assert!(packed.len() < 64 * 1024);
        assert!(inflate(&packed).is_err());
    }
}
