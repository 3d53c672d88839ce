//! Legacy binary Word (.doc) files.
//!
//! A .doc is an OLE compound file. The body text sits in the
//! `WordDocument` stream, scattered across pieces; the piece table lives
//! in the `0Table` or `1Table` stream at the offset recorded in the FIB
//! (file information block) at the head of `WordDocument`.

use std::io::{Cursor, Read};

use encoding_rs::{UTF_16LE, WINDOWS_1252};

use super::ExtractError;

/// Word 97 and later.
const WORD_MAGIC: u16 = 0xA5EC;
const FLAG_ENCRYPTED: u16 = 0x0100;
const FLAG_TABLE_ONE: u16 = 0x0200;
/// `ccpText`: character count of the main document.
const OFFSET_CCP_TEXT: usize = 0x004C;
/// `fcClx`, followed by `lcbClx`.
const OFFSET_CLX: usize = 0x01A2;
const PIECE_COMPRESSED: u32 = 0x4000_0000;
const MAX_STREAM_BYTES: u64 = 64 * 1024 * 1024;

fn corrupt(msg: impl Into<String>) -> ExtractError {
    ExtractError::Doc(msg.into())
}

fn u16_at(bytes: &[u8], at: usize) -> Option<u16> {
    bytes.get(at..at + 2).map(|b| u16::from_le_bytes([b[0], b[1]]))
}

fn u32_at(bytes: &[u8], at: usize) -> Option<u32> {
    bytes
        .get(at..at + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

struct Fib {
    table_one: bool,
    main_chars: u32,
    clx_offset: usize,
    clx_len: usize,
}

impl Fib {
    fn parse(word: &[u8]) -> Result<Self, ExtractError> {
        let magic = u16_at(word, 0).ok_or_else(|| corrupt("WordDocument stream is empty"))?;
        if magic != WORD_MAGIC {
            return Err(corrupt(format!("unsupported Word format 0x{magic:04X}")));
        }
        let flags = u16_at(word, 0x0A).unwrap_or(0);
        if flags & FLAG_ENCRYPTED != 0 {
            return Err(corrupt("document is encrypted"));
        }
        let clx_offset = u32_at(word, OFFSET_CLX).ok_or_else(|| corrupt("FIB truncated"))?;
        let clx_len = u32_at(word, OFFSET_CLX + 4).ok_or_else(|| corrupt("FIB truncated"))?;
        Ok(Self {
            table_one: flags & FLAG_TABLE_ONE != 0,
            main_chars: u32_at(word, OFFSET_CCP_TEXT).unwrap_or(0),
            clx_offset: clx_offset as usize,
            clx_len: clx_len as usize,
        })
    }

    fn table_stream(&self) -> &'static str {
        if self.table_one {
            "/1Table"
        } else {
            "/0Table"
        }
    }
}

/// A run of characters `[start, end)` stored at `offset` in `WordDocument`.
#[derive(Debug, PartialEq)]
struct Piece {
    start: u32,
    end: u32,
    offset: usize,
    compressed: bool,
}

impl Piece {
    fn decode(&self, word: &[u8], limit: u32) -> String {
        let end = self.end.min(limit);
        if end <= self.start {
            return String::new();
        }
        let chars = (end - self.start) as usize;
        let len = if self.compressed { chars } else { chars * 2 };
        let Some(available) = word.get(self.offset..) else {
            return String::new();
        };
        let raw = &available[..len.min(available.len())];
        let encoding = if self.compressed { WINDOWS_1252 } else { UTF_16LE };
        encoding.decode_without_bom_handling(raw).0.into_owned()
    }
}

/// Walk the CLX: skip property runs (`0x01`), then read the piece table
/// (`0x02`).
fn piece_table(clx: &[u8]) -> Result<Vec<Piece>, ExtractError> {
    let mut pos = 0;
    while let Some(&kind) = clx.get(pos) {
        match kind {
            0x01 => {
                let size = u16_at(clx, pos + 1).ok_or_else(|| corrupt("CLX truncated"))?;
                pos += 3 + size as usize;
            }
            0x02 => {
                let size = u32_at(clx, pos + 1).ok_or_else(|| corrupt("CLX truncated"))?;
                let start = pos + 5;
                let plc = clx
                    .get(start..start + size as usize)
                    .ok_or_else(|| corrupt("piece table truncated"))?;
                return Ok(pieces(plc));
            }
            other => return Err(corrupt(format!("unexpected CLX entry 0x{other:02X}"))),
        }
    }
    Err(corrupt("no piece table"))
}

/// `n + 1` character positions followed by `n` 8-byte piece descriptors.
fn pieces(plc: &[u8]) -> Vec<Piece> {
    let count = plc.len().saturating_sub(4) / 12;
    let descriptors = (count + 1) * 4;
    (0..count)
        .filter_map(|i| {
            let start = u32_at(plc, i * 4)?;
            let end = u32_at(plc, (i + 1) * 4)?;
            let fc = u32_at(plc, descriptors + i * 8 + 2)?;
            let compressed = fc & PIECE_COMPRESSED != 0;
            let offset = if compressed {
                ((fc & !PIECE_COMPRESSED) / 2) as usize
            } else {
                fc as usize
            };
            Some(Piece {
                start,
                end,
                offset,
                compressed,
            })
        })
        .collect()
}

/// Turn Word's control characters into plain lines: paragraph, line and
/// page breaks become newlines, cell marks become tabs, and field codes are
/// dropped while their displayed results are kept.
fn plain_lines(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut fields: Vec<bool> = Vec::new();
    for c in raw.chars() {
        match c {
            '\u{13}' => fields.push(true),
            '\u{14}' => {
                if let Some(in_code) = fields.last_mut() {
                    *in_code = false;
                }
            }
            '\u{15}' => {
                fields.pop();
            }
            _ if fields.iter().any(|in_code| *in_code) => {}
            '\r' | '\n' | '\u{0B}' | '\u{0C}' => out.push('\n'),
            '\u{07}' => out.push('\t'),
            '\t' => out.push('\t'),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    out.lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn read_stream(
    file: &mut cfb::CompoundFile<Cursor<&[u8]>>,
    path: &str,
) -> Result<Vec<u8>, ExtractError> {
    let stream = file
        .open_stream(path)
        .map_err(|e| corrupt(format!("missing {path} stream: {e}")))?;
    let mut buf = Vec::new();
    stream.take(MAX_STREAM_BYTES).read_to_end(&mut buf)?;
    Ok(buf)
}

/// Main-document text of a Word 97+ file.
pub fn doc_text(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut file = cfb::CompoundFile::open(Cursor::new(bytes))
        .map_err(|e| corrupt(format!("not an OLE compound file: {e}")))?;
    let word = read_stream(&mut file, "/WordDocument")?;
    let fib = Fib::parse(&word)?;
    let table = read_stream(&mut file, fib.table_stream())?;
    let clx = table
        .get(fib.clx_offset..fib.clx_offset + fib.clx_len)
        .ok_or_else(|| corrupt("CLX lies outside the table stream"))?;

    let limit = if fib.main_chars == 0 {
        u32::MAX
    } else {
        fib.main_chars
    };
    let raw: String = piece_table(clx)?
        .iter()
        .map(|piece| piece.decode(&word, limit))
        .collect();
    Ok(plain_lines(&raw))
}
