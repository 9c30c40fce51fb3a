//! Hex Tag-Length-Value codec
//!
//! Stream records relayed by the solver carry the tracker's original
//! payloads as hex strings of concatenated TLV records:
//! `tag (1 byte) | length (1 byte) | value (length bytes)`.
//! Decoding consumes the string strictly left to right. Input ending
//! exactly on a tag boundary terminates the stream normally; input
//! ending mid-record is a [`TlvError::Truncated`].

use thiserror::Error;

/// Hex characters per tag field
const TAG_CHARS: usize = 2;
/// Hex characters per length field
const LENGTH_CHARS: usize = 2;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TlvError {
    #[error("truncated TLV record: {field} needs {expected} hex chars, found {found}")]
    Truncated {
        field: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("invalid hex in TLV {field}: {text:?}")]
    InvalidHex { field: &'static str, text: String },
}

/// One decoded record. `value` borrows the `2 * length` hex characters
/// from the input; `raw` is the full record slice, so re-encoding is
/// exact even for mixed-case input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlvRecord<'a> {
    pub tag: u8,
    pub length: usize,
    pub value: &'a str,
    raw: &'a str,
}

impl<'a> TlvRecord<'a> {
    /// The record's value decoded to raw bytes
    pub fn value_bytes(&self) -> Result<Vec<u8>, TlvError> {
        hex::decode(self.value).map_err(|_| TlvError::InvalidHex {
            field: "value",
            text: self.value.to_string(),
        })
    }

    /// The original wire substring this record was decoded from
    pub fn encode(&self) -> &'a str {
        self.raw
    }
}

/// Render a record as wire hex (lowercase)
pub fn encode_record(tag: u8, value: &[u8]) -> String {
    format!("{:02x}{:02x}{}", tag, value.len(), hex::encode(value))
}

/// Lazy iterator over the records of a hex TLV string. Restartable by
/// calling [`records`] again on the same input. After yielding an error
/// the iterator is exhausted.
pub struct TlvRecords<'a> {
    rest: &'a str,
    failed: bool,
}

/// Decode `payload` as a TLV stream
pub fn records(payload: &str) -> TlvRecords<'_> {
    TlvRecords {
        rest: payload,
        failed: false,
    }
}

impl<'a> TlvRecords<'a> {
    fn take(&mut self, field: &'static str, chars: usize) -> Result<&'a str, TlvError> {
        match self.rest.get(..chars) {
            Some(taken) => {
                self.rest = &self.rest[chars..];
                Ok(taken)
            }
            None => Err(TlvError::Truncated {
                field,
                expected: chars,
                found: self.rest.len(),
            }),
        }
    }

    fn next_record(&mut self) -> Result<TlvRecord<'a>, TlvError> {
        let start = self.rest;
        let tag_hex = self.take("tag", TAG_CHARS)?;
        let tag = u8::from_str_radix(tag_hex, 16).map_err(|_| TlvError::InvalidHex {
            field: "tag",
            text: tag_hex.to_string(),
        })?;
        let length_hex = self.take("length", LENGTH_CHARS)?;
        let length = usize::from_str_radix(length_hex, 16).map_err(|_| TlvError::InvalidHex {
            field: "length",
            text: length_hex.to_string(),
        })?;
        let value = self.take("value", length * 2)?;
        Ok(TlvRecord {
            tag,
            length,
            value,
            raw: &start[..TAG_CHARS + LENGTH_CHARS + length * 2],
        })
    }
}

impl<'a> Iterator for TlvRecords<'a> {
    type Item = Result<TlvRecord<'a>, TlvError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.rest.is_empty() {
            return None;
        }
        match self.next_record() {
            Ok(record) => Some(Ok(record)),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_stream_yields_nothing() {
        assert_eq!(records("").count(), 0);
    }

    #[test]
    fn test_single_record() {
        let recs: Vec<_> = records("0d01a5").collect::<Result<_, _>>().unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].tag, 0x0D);
        assert_eq!(recs[0].length, 1);
        assert_eq!(recs[0].value, "a5");
    }

    #[test]
    fn test_multiple_records_in_wire_order() {
        // 0D len=1, 0A len=4, 0B len=2; ends exactly on a tag boundary
        let input = "0d01130a04000009600b020dac";
        let recs: Vec<_> = records(input).collect::<Result<_, _>>().unwrap();
        assert_eq!(recs.len(), 3);
        assert_eq!(recs[0].tag, 0x0D);
        assert_eq!(recs[1].tag, 0x0A);
        assert_eq!(recs[1].value, "00000960");
        assert_eq!(recs[2].tag, 0x0B);
        assert_eq!(recs[2].value, "0dac");
    }

    #[test]
    fn test_reencode_reproduces_original_substring() {
        let input = "0E0C0123456789ABCDEF012345670901aa";
        let recs: Vec<_> = records(input).collect::<Result<_, _>>().unwrap();
        let rejoined: String = recs.iter().map(|r| r.encode()).collect();
        assert_eq!(rejoined, input);
    }

    #[test]
    fn test_zero_length_value() {
        let recs: Vec<_> = records("0500").collect::<Result<_, _>>().unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].length, 0);
        assert_eq!(recs[0].value, "");
    }

    #[test]
    fn test_truncated_mid_value() {
        let results: Vec<_> = records("0d01130904aabb").collect();
        assert!(results[0].is_ok());
        assert_eq!(
            results[1],
            Err(TlvError::Truncated {
                field: "value",
                expected: 8,
                found: 4,
            })
        );
        // iterator is exhausted after the error
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_truncated_mid_length() {
        let results: Vec<_> = records("0d").collect();
        assert_eq!(
            results[0],
            Err(TlvError::Truncated {
                field: "length",
                expected: 2,
                found: 0,
            })
        );
    }

    #[test]
    fn test_truncated_mid_tag() {
        let results: Vec<_> = records("0d01130").collect();
        assert!(results[0].is_ok());
        assert_eq!(
            results[1],
            Err(TlvError::Truncated {
                field: "tag",
                expected: 2,
                found: 1,
            })
        );
    }

    #[test]
    fn test_invalid_hex_tag() {
        let results: Vec<_> = records("zz01aa").collect();
        assert!(matches!(
            results[0],
            Err(TlvError::InvalidHex { field: "tag", .. })
        ));
    }

    #[test]
    fn test_encode_record_round_trip() {
        let wire = encode_record(0x0B, &[0x0D, 0xAC]);
        assert_eq!(wire, "0b020dac");
        let recs: Vec<_> = records(&wire).collect::<Result<_, _>>().unwrap();
        assert_eq!(recs[0].value_bytes().unwrap(), vec![0x0D, 0xAC]);
    }
}
