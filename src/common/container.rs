use std::{
    collections::BTreeMap,
    fmt::{self, Display, Formatter},
};

use thiserror::Error;

use crate::common::{
    number::{build_number, split_number},
    opcode::{Opcode, Operand},
    span::Position,
    translation::TranslationTable,
};

/// The first four bytes of every container.
pub const MAGIC: u32 = u32::from_le_bytes(*b"QUIL");

/// A debug delta byte of this value is followed by a varint holding the full delta.
const DELTA_ESCAPE: u8 = 0xFF;

/// The part of a container being read when decoding failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    Header,
    Translations,
    Strings,
    Labels,
    Positions,
}

impl Display for Segment {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Segment::Header => "header",
            Segment::Translations => "translation segment",
            Segment::Strings => "string pool",
            Segment::Labels => "label table",
            Segment::Positions => "debug-position table",
        };
        write!(f, "{}", name)
    }
}

/// Raised when bytes can not be decoded as a container.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("bad magic number {found:#010x}, expected {expected:#010x}")]
    BadMagic { found: u32, expected: u32 },
    #[error("container truncated while reading the {0}")]
    Truncated(Segment),
    #[error("invalid UTF-8 text in the {0}")]
    InvalidUtf8(Segment),
    #[error("value out of range in the {0}")]
    OutOfRange(Segment),
}

/// Maps a code offset to the source position of the instruction there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugPosition {
    pub offset: usize,
    pub position: Position,
}

/// Represents a compiled script:
/// the four segments plus the code stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Container {
    /// Content hash of the source this container was compiled from.
    pub hash: u32,
    /// Default-language text of every translatable string.
    pub translations: TranslationTable,
    /// Ordered, deduplicated pool of plain strings.
    pub strings: Vec<String>,
    /// Label id to absolute code offset.
    pub labels: BTreeMap<usize, usize>,
    /// Sorted by ascending offset.
    pub positions: Vec<DebugPosition>,
    pub code: Vec<u8>,
}

fn write_string(bytes: &mut Vec<u8>, string: &str) {
    bytes.append(&mut split_number(string.len()));
    bytes.extend_from_slice(string.as_bytes());
}

/// A cursor over container bytes.
struct Reader<'a> {
    bytes: &'a [u8],
    index: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize, segment: Segment) -> Result<&'a [u8], FormatError> {
        let end = self
            .index
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or(FormatError::Truncated(segment))?;
        let taken = &self.bytes[self.index..end];
        self.index = end;
        Ok(taken)
    }

    fn byte(&mut self, segment: Segment) -> Result<u8, FormatError> {
        Ok(self.take(1, segment)?[0])
    }

    fn u32(&mut self, segment: Segment) -> Result<u32, FormatError> {
        let mut buffer = [0; 4];
        buffer.copy_from_slice(self.take(4, segment)?);
        Ok(u32::from_le_bytes(buffer))
    }

    fn u64(&mut self, segment: Segment) -> Result<u64, FormatError> {
        let mut buffer = [0; 8];
        buffer.copy_from_slice(self.take(8, segment)?);
        Ok(u64::from_le_bytes(buffer))
    }

    fn number(&mut self, segment: Segment) -> Result<usize, FormatError> {
        let (number, eaten) =
            build_number(&self.bytes[self.index..]).ok_or(FormatError::Truncated(segment))?;
        self.index += eaten;
        Ok(number)
    }

    fn string(&mut self, segment: Segment) -> Result<String, FormatError> {
        let len = self.number(segment)?;
        let raw = self.take(len, segment)?;
        String::from_utf8(raw.to_vec()).map_err(|_| FormatError::InvalidUtf8(segment))
    }

    fn rest(&mut self) -> &'a [u8] {
        let rest = &self.bytes[self.index..];
        self.index = self.bytes.len();
        rest
    }
}

impl Container {
    /// Serializes the container.
    /// Layout, in order:
    /// ```plain
    /// magic         u32 LE
    /// hash          u32 LE
    /// translations  count, (id, length, UTF-8)*
    /// strings       count, (length, UTF-8)*
    /// labels        count, (id, u64 LE offset)*
    /// positions     count, (delta byte, line, column)*
    /// code          raw bytes to the end
    /// ```
    /// Counts, ids, lengths, lines and columns are varints.
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = vec![];
        bytes.extend_from_slice(&MAGIC.to_le_bytes());
        bytes.extend_from_slice(&self.hash.to_le_bytes());

        bytes.append(&mut split_number(self.translations.len()));
        for (id, text) in self.translations.iter() {
            bytes.append(&mut split_number(*id as usize));
            write_string(&mut bytes, text);
        }

        bytes.append(&mut split_number(self.strings.len()));
        for string in self.strings.iter() {
            write_string(&mut bytes, string);
        }

        bytes.append(&mut split_number(self.labels.len()));
        for (id, offset) in self.labels.iter() {
            bytes.append(&mut split_number(*id));
            bytes.extend_from_slice(&(*offset as u64).to_le_bytes());
        }

        bytes.append(&mut split_number(self.positions.len()));
        let mut last = 0;
        for entry in self.positions.iter() {
            let delta = entry.offset - last;
            if delta < DELTA_ESCAPE as usize {
                bytes.push(delta as u8);
            } else {
                bytes.push(DELTA_ESCAPE);
                bytes.append(&mut split_number(delta));
            }
            bytes.append(&mut split_number(entry.position.line));
            bytes.append(&mut split_number(entry.position.column));
            last = entry.offset;
        }

        bytes.extend_from_slice(&self.code);
        bytes
    }

    /// Deserializes a container, failing fast on the first malformed segment.
    /// All four segments are decoded before the code stream is taken.
    pub fn decode(bytes: &[u8]) -> Result<Container, FormatError> {
        let mut reader = Reader { bytes, index: 0 };

        let found = reader.u32(Segment::Header)?;
        if found != MAGIC {
            return Err(FormatError::BadMagic { found, expected: MAGIC });
        }
        let hash = reader.u32(Segment::Header)?;

        let mut translations = TranslationTable::new();
        for _ in 0..reader.number(Segment::Translations)? {
            let id = u32::try_from(reader.number(Segment::Translations)?)
                .map_err(|_| FormatError::OutOfRange(Segment::Translations))?;
            let text = reader.string(Segment::Translations)?;
            translations.insert(id, &text);
        }

        let mut strings = vec![];
        for _ in 0..reader.number(Segment::Strings)? {
            strings.push(reader.string(Segment::Strings)?);
        }

        let mut labels = BTreeMap::new();
        for _ in 0..reader.number(Segment::Labels)? {
            let id = reader.number(Segment::Labels)?;
            let offset = usize::try_from(reader.u64(Segment::Labels)?)
                .map_err(|_| FormatError::OutOfRange(Segment::Labels))?;
            labels.insert(id, offset);
        }

        let mut positions = vec![];
        let mut offset: usize = 0;
        for _ in 0..reader.number(Segment::Positions)? {
            let delta = match reader.byte(Segment::Positions)? {
                DELTA_ESCAPE => reader.number(Segment::Positions)?,
                small => small as usize,
            };
            offset = offset
                .checked_add(delta)
                .ok_or(FormatError::OutOfRange(Segment::Positions))?;
            let line = reader.number(Segment::Positions)?;
            let column = reader.number(Segment::Positions)?;
            positions.push(DebugPosition { offset, position: Position::new(line, column) });
        }

        let code = reader.rest().to_vec();

        Ok(Container { hash, translations, strings, labels, positions, code })
    }

    /// Resolves a label id to an absolute code offset.
    pub fn label(&self, id: usize) -> Option<usize> {
        self.labels.get(&id).copied()
    }

    /// The source position of the instruction at, or most recently before, `offset`.
    pub fn position_at(&self, offset: usize) -> Option<Position> {
        let index = self.positions.partition_point(|entry| entry.offset <= offset);
        if index == 0 {
            None
        } else {
            Some(self.positions[index - 1].position)
        }
    }

    /// Writes one instruction starting at `index`,
    /// returning the index of the next one.
    fn dump_instruction(&self, f: &mut Formatter<'_>, index: usize) -> Result<usize, fmt::Error> {
        let byte = self.code[index];
        write!(f, "{:>6}  ", index)?;

        let opcode = match Opcode::from_byte(byte) {
            Some(opcode) => opcode,
            None => {
                writeln!(f, "??      \t{:#04x}", byte)?;
                return Ok(index + 1);
            },
        };

        let operands = &self.code[index + 1..];
        let name = format!("{:?}", opcode);
        let eaten = match opcode.operand() {
            Operand::None => {
                writeln!(f, "{}", name)?;
                0
            },
            Operand::Integer | Operand::Float if operands.len() < 8 => {
                writeln!(f, "{:<16}\t<truncated>", name)?;
                operands.len()
            },
            Operand::Integer => {
                let mut buffer = [0; 8];
                buffer.copy_from_slice(&operands[..8]);
                writeln!(f, "{:<16}\t{}", name, i64::from_le_bytes(buffer))?;
                8
            },
            Operand::Float => {
                let mut buffer = [0; 8];
                buffer.copy_from_slice(&operands[..8]);
                writeln!(f, "{:<16}\t{:?}", name, f64::from_le_bytes(buffer))?;
                8
            },
            Operand::Varint => match build_number(operands) {
                None => {
                    writeln!(f, "{:<16}\t<truncated>", name)?;
                    operands.len()
                },
                Some((number, eaten)) => {
                    let detail = match opcode {
                        Opcode::LoadString => self
                            .strings
                            .get(number)
                            .map(|s| format!("{:?}", s))
                            .unwrap_or_else(|| "<missing>".to_string()),
                        Opcode::LoadTranslatable => u32::try_from(number)
                            .ok()
                            .and_then(|id| self.translations.get(id))
                            .map(|s| format!("{:?}", s))
                            .unwrap_or_else(|| "<missing>".to_string()),
                        _ => self
                            .label(number)
                            .map(|offset| format!("-> {}", offset))
                            .unwrap_or_else(|| "<unresolved>".to_string()),
                    };
                    writeln!(f, "{:<16}\t{}\t{}", name, number, detail)?;
                    eaten
                },
            },
        };

        Ok(index + 1 + eaten)
    }
}

impl Display for Container {
    /// Dumps the container for inspection.
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "Container {:#010x}", self.hash)?;
        writeln!(
            f,
            "{} translations, {} strings, {} labels, {} bytes of code",
            self.translations.len(),
            self.strings.len(),
            self.labels.len(),
            self.code.len(),
        )?;
        writeln!(f, "Offset  Inst.           \tArg?\tValue?")?;
        writeln!(f, "---")?;

        let mut index = 0;
        while index < self.code.len() {
            index = self.dump_instruction(f, index)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;

    fn sample() -> Container {
        let mut translations = TranslationTable::new();
        translations.insert(0, "Hello");
        translations.insert(7, "こんにちは");

        Container {
            hash: 0xDEAD_BEEF,
            translations,
            strings: vec!["x".to_string(), "".to_string()],
            labels: vec![(0, 3), (1, 1024)].into_iter().collect(),
            positions: vec![
                DebugPosition { offset: 0, position: Position::new(0, 0) },
                DebugPosition { offset: 4, position: Position::new(1, 2) },
                DebugPosition { offset: 1000, position: Position::new(300, 41) },
            ],
            code: vec![
                Opcode::LoadString as u8, 0x80,
                Opcode::LoadInteger1 as u8,
                Opcode::Add as u8,
                Opcode::Pop as u8,
            ],
        }
    }

    #[test]
    fn magic_is_quil() {
        assert_eq!(&MAGIC.to_le_bytes(), b"QUIL");
    }

    #[test]
    fn encode_decode() {
        let container = sample();
        let decoded = Container::decode(&container.encode()).unwrap();
        assert_eq!(decoded, container);
    }

    #[test]
    fn wide_debug_deltas_use_the_escape() {
        let container = sample();
        let bytes = container.encode();
        assert!(bytes.contains(&DELTA_ESCAPE));
        assert_eq!(Container::decode(&bytes).unwrap().positions, container.positions);
    }

    #[test]
    fn bad_magic() {
        let mut bytes = sample().encode();
        bytes[0] = b'X';
        assert!(matches!(Container::decode(&bytes), Err(FormatError::BadMagic { .. })));
    }

    #[test]
    fn truncated() {
        let bytes = sample().encode();
        assert_eq!(Container::decode(&bytes[..2]), Err(FormatError::Truncated(Segment::Header)));
        assert_eq!(
            Container::decode(&bytes[..10]),
            Err(FormatError::Truncated(Segment::Translations)),
        );
    }

    #[test]
    fn invalid_utf8() {
        let container = Container {
            strings: vec!["ab".to_string()],
            ..Default::default()
        };
        let mut bytes = container.encode();
        // header, empty translations, one string of length two
        let text = 4 + 4 + 1 + 1 + 1;
        bytes[text] = 0xC3;
        bytes[text + 1] = 0x28;
        assert_eq!(Container::decode(&bytes), Err(FormatError::InvalidUtf8(Segment::Strings)));
    }

    #[test]
    fn position_lookup() {
        let container = sample();
        assert_eq!(container.position_at(0), Some(Position::new(0, 0)));
        assert_eq!(container.position_at(3), Some(Position::new(0, 0)));
        assert_eq!(container.position_at(4), Some(Position::new(1, 2)));
        assert_eq!(container.position_at(5000), Some(Position::new(300, 41)));
        assert_eq!(Container::default().position_at(0), None);
    }

    #[test]
    fn dump() {
        let dumped = sample().to_string();
        assert!(dumped.contains("LoadString"));
        assert!(dumped.contains("\"x\""));
        assert!(dumped.contains("Pop"));
    }

    proptest! {
        #[test]
        fn decoding_garbage_does_not_panic(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
            let _ = Container::decode(&bytes);
        }

        #[test]
        fn decoding_garbage_after_magic_does_not_panic(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
            let mut prefixed = MAGIC.to_le_bytes().to_vec();
            prefixed.extend(bytes);
            let _ = Container::decode(&prefixed);
        }
    }
}
