use serde::Serialize;

/// A raw attribute as written in a start tag, before its value is parsed.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RawAttribute {
    pub name: String,
    /// `None` for a bare attribute such as `<input disabled>`.
    pub value: Option<String>,
    /// Byte offset of the value (or of the name, for bare attributes).
    pub offset: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum Token {
    Text {
        content: String,
        offset: usize,
    },
    /// The trimmed source between `{{` and `}}`.
    Tag {
        content: String,
        offset: usize,
    },
    Comment {
        content: String,
        offset: usize,
    },
    Doctype {
        content: String,
        offset: usize,
    },
    StartTag {
        name: String,
        attributes: Vec<RawAttribute>,
        self_closing: bool,
        offset: usize,
    },
    EndTag {
        name: String,
        offset: usize,
    },
    Eof {
        offset: usize,
    },
}

/// Byte offsets of line starts, for turning a position into line and column.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct LineOffsets(pub Vec<u32>);

impl LineOffsets {
    #[must_use]
    pub fn from_source(source: &str) -> Self {
        let mut offsets = Self::default();
        let bytes = source.as_bytes();
        for (i, byte) in bytes.iter().enumerate() {
            let starts_line = match byte {
                b'\n' => true,
                b'\r' => bytes.get(i + 1) != Some(&b'\n'),
                _ => false,
            };
            if starts_line {
                offsets.add_line(u32::try_from(i + 1).unwrap_or(u32::MAX));
            }
        }
        offsets
    }

    pub fn add_line(&mut self, offset: u32) {
        self.0.push(offset);
    }

    /// 1-based line and 0-based column of a byte position.
    #[must_use]
    pub fn position_to_line_col(&self, position: usize) -> (usize, usize) {
        let position = u32::try_from(position).unwrap_or(u32::MAX);
        let line = match self.0.binary_search(&position) {
            Ok(exact_line) => exact_line,
            Err(0) => 0,
            Err(next_line) => next_line - 1,
        };
        let col = position - self.0[line];
        (line + 1, col as usize)
    }
}

impl Default for LineOffsets {
    fn default() -> Self {
        Self(vec![0])
    }
}
