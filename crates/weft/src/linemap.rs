use bstr::ByteSlice;

/// The type of a byte offset into the input
pub type Offset = u32;

/// Use this for human output text spans.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
pub struct CodePointPos {
    /// zero-based line index
    pub line: u32,
    /// zero-based column offset relative to the start of the line, unicode code points (variable length)
    pub character: u32,
}

#[derive(Clone, Copy)]
pub struct LineInfo {
    /// index of the line within the input
    pub line: u32,
    /// byte offset of the start of the line
    pub line_start: Offset,
    /// Does the line contain non-ascii bytes?
    pub is_unicode: bool,
}

pub struct LineMap {
    lines: Vec<(Offset, bool)>,
}

impl LineMap {
    /// `src` needn't be valid utf8, invalid sequences count as one character each.
    pub fn new(src: &[u8]) -> Self {
        debug_assert!(src.len() <= Offset::MAX as usize);
        let mut lines = Vec::new();

        let mut prev_end = 0;
        let mut saw_unicode = false;
        let mut bytes = src.iter().copied().enumerate();

        // we recognize \r\n  \n  \r as newlines
        while let Some((mut i, b)) = bytes.next() {
            match b {
                b'\n' | b'\r' => {
                    if b == b'\r' {
                        if let Some((new_i, b'\n')) = bytes.clone().next() {
                            bytes.next();
                            i = new_i;
                        }
                    }
                    lines.push((prev_end, saw_unicode));
                    saw_unicode = false;
                    prev_end = i as Offset + 1;
                }
                _ => {
                    if b >= 128 {
                        saw_unicode = true;
                    }
                }
            }
        }

        lines.push((prev_end, saw_unicode));

        Self { lines }
    }
    /// Returns zero-based Line and Column offset in unicode codepoints. Offset is clamped to the end of `src`
    pub fn offset_to_codepoint(&self, src: &[u8], offset: Offset) -> CodePointPos {
        let offset = Offset::min(offset, src.len() as Offset);

        let LineInfo {
            line,
            line_start,
            is_unicode,
        } = self.offset_to_line(offset);

        let character = match is_unicode {
            true => src[line_start as usize..offset as usize].chars().count() as u32,
            false => offset - line_start,
        };

        CodePointPos { line, character }
    }
    /// Find the line which contains the offset
    pub fn offset_to_line(&self, byte_offset: Offset) -> LineInfo {
        let index = self.lines.binary_search_by_key(&byte_offset, |a| a.0);
        let line = match index {
            Ok(a) => a,
            Err(a) => a - 1,
        };
        let (line_start, is_unicode) = self.lines[line];
        debug_assert!(line_start <= byte_offset);

        LineInfo {
            line: line as u32,
            line_start,
            is_unicode,
        }
    }
    pub fn line_start(&self, line: u32) -> Offset {
        self.lines[line as usize].0
    }
    pub fn line_end(&self, src: &[u8], line: u32) -> Offset {
        self.lines
            .get((line + 1) as usize)
            .map(|line| line.0)
            .unwrap_or(src.len() as Offset)
    }
    /// The line's bytes without its line terminator.
    pub fn line_bytes<'a>(&self, src: &'a [u8], line: u32) -> &'a [u8] {
        let start = self.line_start(line);
        let end = self.line_end(src, line);
        let mut bytes = &src[start as usize..end as usize];
        while let [rest @ .., b'\n' | b'\r'] = bytes {
            bytes = rest;
        }
        bytes
    }
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }
}

#[test]
fn test_line_lookup() {
    let str = "abcd\nì\r\n\nế".as_bytes();
    let mapping = LineMap::new(str);

    let test = |offset: Offset, (l, c): (u32, u32)| {
        let res = mapping.offset_to_codepoint(str, offset);
        let expected = CodePointPos {
            line: l,
            character: c,
        };
        assert_eq!(expected, res);
    };

    test(0, (0, 0));
    test(4, (0, 4));
    test(5, (1, 0));
    test(7, (1, 1));
    test(9, (2, 0));
    test(10, (3, 0));
    test(13, (3, 1));
    assert_eq!(mapping.line_count(), 4);
    assert_eq!(mapping.line_bytes(str, 1), "ì".as_bytes());
}
