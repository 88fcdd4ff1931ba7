//! Base64 codec transform (spec.md §4.6.1 "base64 auto-insertion").

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::buffer::Buffer;
use crate::error::TransformError;

use super::TransformStage;

/// Single-shot like the cipher and XSLT stages: base64 needs its complete
/// input to produce valid output (a partial quad can't be decoded), so it
/// accumulates across calls and only emits on `last=true`.
#[derive(Debug, Default)]
pub struct Base64Stage;

impl TransformStage for Base64Stage {
    fn name(&self) -> &'static str {
        "base64"
    }

    fn execute(
        &mut self,
        in_buf: &mut Buffer,
        out_buf: &mut Buffer,
        encode: bool,
        last: bool,
    ) -> Result<(), TransformError> {
        if !last {
            return Ok(());
        }

        if encode {
            let encoded = STANDARD.encode(in_buf.data());
            out_buf.append(encoded.as_bytes());
        } else {
            let filtered: Vec<u8> =
                in_buf.data().iter().copied().filter(|b| !b.is_ascii_whitespace()).collect();
            let decoded = STANDARD.decode(&filtered)?;
            out_buf.append(&decoded);
        }
        in_buf.remove_head(in_buf.size());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_then_decode_round_trips() {
        let mut encode_stage = Base64Stage;
        let mut in_buf = Buffer::from(b"Hello, World!".to_vec());
        let mut out_buf = Buffer::new();
        encode_stage.execute(&mut in_buf, &mut out_buf, true, true).unwrap();

        let mut decode_stage = Base64Stage;
        let mut in_buf2 = Buffer::from(out_buf.into_vec());
        let mut out_buf2 = Buffer::new();
        decode_stage.execute(&mut in_buf2, &mut out_buf2, false, true).unwrap();

        assert_eq!(out_buf2.data(), b"Hello, World!");
    }

    #[test]
    fn decode_ignores_embedded_whitespace() {
        let mut stage = Base64Stage;
        let encoded = base64::engine::general_purpose::STANDARD.encode(b"abc");
        let with_newlines = encoded.chars().collect::<Vec<_>>().chunks(2).map(|c| c.iter().collect::<String>()).collect::<Vec<_>>().join("\n");
        let mut in_buf = Buffer::from(with_newlines.into_bytes());
        let mut out_buf = Buffer::new();
        stage.execute(&mut in_buf, &mut out_buf, false, true).unwrap();
        assert_eq!(out_buf.data(), b"abc");
    }

    #[test]
    fn no_output_before_last() {
        let mut stage = Base64Stage;
        let mut in_buf = Buffer::from(b"partial".to_vec());
        let mut out_buf = Buffer::new();
        stage.execute(&mut in_buf, &mut out_buf, true, false).unwrap();
        assert!(out_buf.is_empty());
    }
}
