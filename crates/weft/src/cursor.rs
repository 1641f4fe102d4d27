#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct CursorPosition {
    position: u32,
}

/// Byte cursor over the whole input. Inputs are limited to `u32::MAX` bytes.
pub struct Cursor<'a> {
    position: u32,
    /// High-water mark, backtracking never lowers it.
    max_position: u32,
    bytes: &'a [u8],
}

impl<'a> Cursor<'a> {
    pub fn new(bytes: &'a [u8]) -> Cursor<'a> {
        debug_assert!(u32::try_from(bytes.len()).is_ok());
        Cursor {
            position: 0,
            max_position: 0,
            bytes,
        }
    }

    fn update_max_position(&mut self) {
        self.max_position = std::cmp::max(self.max_position, self.position);
    }

    pub fn save_position(&self) -> CursorPosition {
        CursorPosition {
            position: self.position,
        }
    }

    pub fn restore_position(&mut self, state: CursorPosition) {
        self.update_max_position();
        self.position = state.position;
    }

    /// Moves to a position previously reached by a memoized match.
    pub fn jump_to(&mut self, position: u32) {
        debug_assert!(position as usize <= self.bytes.len());
        self.position = position;
        self.update_max_position();
    }

    pub fn position(&self) -> u32 {
        self.position
    }

    pub fn max_position(&self) -> u32 {
        std::cmp::max(self.max_position, self.position)
    }

    pub fn is_eof(&self) -> bool {
        self.position as usize == self.bytes.len()
    }

    pub fn remaining(&self) -> &'a [u8] {
        &self.bytes[self.position as usize..]
    }

    pub fn advance(&mut self, count: u32) -> bool {
        let new_position = self.position + count;
        if new_position as usize > self.bytes.len() {
            return false;
        } else {
            self.position = new_position;
            self.update_max_position();
            return true;
        }
    }

    pub fn peek_byte(&self) -> Option<u8> {
        self.remaining().first().copied()
    }

    /// The next `count` bytes without consuming them.
    pub fn peek_bytes(&self, count: usize) -> Option<&'a [u8]> {
        self.remaining().get(..count)
    }

    /// The next unicode scalar value and its encoded length, `None` on invalid utf8.
    pub fn peek_char(&self) -> Option<(char, u32)> {
        let (char, size) = bstr::decode_utf8(self.remaining());
        char.map(|c| (c, size as u32))
    }

    /// Consumes `literal` if the input continues with it.
    pub fn consume(&mut self, literal: &[u8]) -> bool {
        match self.remaining().starts_with(literal) {
            true => self.advance(literal.len() as u32),
            false => false,
        }
    }

    /// Skips every character contained in `set`.
    pub fn skip_chars(&mut self, set: &str) {
        if set.is_empty() {
            return;
        }
        loop {
            let skip = match self.peek_byte() {
                Some(byte) if byte.is_ascii() => match set.as_bytes().contains(&byte) {
                    true => 1,
                    false => break,
                },
                Some(_) => match self.peek_char() {
                    Some((char, size)) if set.contains(char) => size,
                    _ => break,
                },
                None => break,
            };
            self.advance(skip);
        }
    }
}

#[test]
fn test_cursor_high_water_mark() {
    let mut cursor = Cursor::new(b"ab \t\ncd");
    let start = cursor.save_position();

    assert!(cursor.consume(b"ab"));
    cursor.skip_chars(" \t\n");
    assert_eq!(cursor.position(), 5);
    assert!(!cursor.consume(b"ce"));

    cursor.restore_position(start);
    assert_eq!(cursor.position(), 0);
    assert_eq!(cursor.max_position(), 5);
}

#[test]
fn test_cursor_chars() {
    let mut cursor = Cursor::new("é\u{3000}x".as_bytes());
    assert_eq!(cursor.peek_char(), Some(('é', 2)));
    cursor.skip_chars("é\u{3000}");
    assert_eq!(cursor.peek_byte(), Some(b'x'));
    assert!(cursor.advance(1));
    assert!(cursor.is_eof());
    assert!(!cursor.advance(1));
}
