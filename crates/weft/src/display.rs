use bstr::ByteSlice;

pub struct ByteSliceDisplay<'a>(&'a [u8]);

impl<'a> std::fmt::Display for ByteSliceDisplay<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        display_byte_literal(f, "\"", self.0)
    }
}

pub trait ByteSliceExt {
    fn display(&self) -> ByteSliceDisplay;
}

impl ByteSliceExt for [u8] {
    fn display(&self) -> ByteSliceDisplay {
        ByteSliceDisplay(self)
    }
}

/// Writes `bytes` between two `delimiter`s, escaping control characters and invalid utf8.
pub fn display_byte_literal(
    buf: &mut dyn std::fmt::Write,
    delimiter: &str,
    bytes: &[u8],
) -> std::fmt::Result {
    buf.write_str(delimiter)?;
    for chunk in ByteSlice::utf8_chunks(bytes) {
        for ch in chunk.valid().chars() {
            write!(buf, "{}", ch.escape_debug())?;
        }
        for byte in chunk.invalid() {
            write!(buf, "\\x{:02X}", byte)?;
        }
    }
    buf.write_str(delimiter)
}

#[test]
fn test_display_escapes() {
    assert_eq!(b"a\nb".display().to_string(), "\"a\\nb\"");
    assert_eq!(b"\xFFx"[..].display().to_string(), "\"\\xFFx\"");
}
