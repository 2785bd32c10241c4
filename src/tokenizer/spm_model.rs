//! Reader/writer for the subset of the SentencePiece `ModelProto` protobuf
//! that segmentation needs.
//!
//! Only field 1 of `ModelProto` (repeated `SentencePiece`) is decoded. Within
//! each piece, `piece = 1`, `score = 2` and `type = 3` are read. Every other
//! field (trainer spec, normalizer spec, ...) is skipped by wire type.

use crate::error::{Result, TaskError};
use std::path::Path;

/// Kind of a SentencePiece entry, as numbered in the protobuf enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PieceType {
    #[default]
    Normal,
    Unknown,
    Control,
    UserDefined,
    Unused,
    Byte,
}

impl PieceType {
    fn from_wire(v: u64) -> Self {
        match v {
            2 => Self::Unknown,
            3 => Self::Control,
            4 => Self::UserDefined,
            5 => Self::Unused,
            6 => Self::Byte,
            _ => Self::Normal,
        }
    }

    fn to_wire(self) -> u64 {
        match self {
            Self::Normal => 1,
            Self::Unknown => 2,
            Self::Control => 3,
            Self::UserDefined => 4,
            Self::Unused => 5,
            Self::Byte => 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentencePiece {
    pub piece: String,
    pub score: f32,
    pub kind: PieceType,
}

impl SentencePiece {
    pub fn new(piece: impl Into<String>, score: f32, kind: PieceType) -> Self {
        Self {
            piece: piece.into(),
            score,
            kind,
        }
    }
}

/// Decoded model: pieces in id order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelProto {
    pub pieces: Vec<SentencePiece>,
}

const WIRE_VARINT: u8 = 0;
const WIRE_FIXED64: u8 = 1;
const WIRE_LEN: u8 = 2;
const WIRE_FIXED32: u8 = 5;

impl ModelProto {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            TaskError::Config(format!(
                "Failed to read SentencePiece model '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::decode(&bytes).map_err(|e| match e {
            TaskError::Config(msg) => {
                TaskError::Config(format!("{} ({})", msg, path.display()))
            }
            other => other,
        })
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = WireReader::new(bytes);
        let mut pieces = Vec::new();
        while !reader.is_done() {
            let (field, wire) = reader.key()?;
            if field == 1 && wire == WIRE_LEN {
                pieces.push(decode_piece(reader.bytes()?)?);
            } else {
                reader.skip(wire)?;
            }
        }
        Ok(Self { pieces })
    }

    /// Serialize back to protobuf. Only the fields this module reads are
    /// written.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for p in &self.pieces {
            let mut inner = Vec::new();
            put_key(&mut inner, 1, WIRE_LEN);
            put_varint(&mut inner, p.piece.len() as u64);
            inner.extend_from_slice(p.piece.as_bytes());
            put_key(&mut inner, 2, WIRE_FIXED32);
            inner.extend_from_slice(&p.score.to_le_bytes());
            put_key(&mut inner, 3, WIRE_VARINT);
            put_varint(&mut inner, p.kind.to_wire());

            put_key(&mut out, 1, WIRE_LEN);
            put_varint(&mut out, inner.len() as u64);
            out.extend_from_slice(&inner);
        }
        out
    }
}

fn decode_piece(bytes: &[u8]) -> Result<SentencePiece> {
    let mut reader = WireReader::new(bytes);
    let mut piece = SentencePiece::new(String::new(), 0.0, PieceType::Normal);
    while !reader.is_done() {
        let (field, wire) = reader.key()?;
        match (field, wire) {
            (1, WIRE_LEN) => {
                piece.piece = String::from_utf8(reader.bytes()?.to_vec())
                    .map_err(|_| malformed("piece is not valid UTF-8"))?;
            }
            (2, WIRE_FIXED32) => piece.score = f32::from_le_bytes(reader.fixed32()?),
            (3, WIRE_VARINT) => piece.kind = PieceType::from_wire(reader.varint()?),
            _ => reader.skip(wire)?,
        }
    }
    Ok(piece)
}

fn malformed(what: &str) -> TaskError {
    TaskError::Config(format!("Malformed SentencePiece model: {}", what))
}

struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn is_done(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn varint(&mut self) -> Result<u64> {
        let mut value = 0u64;
        for shift in (0..64).step_by(7) {
            let byte = *self
                .buf
                .get(self.pos)
                .ok_or_else(|| malformed("truncated varint"))?;
            self.pos += 1;
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(malformed("varint overflow"))
    }

    fn key(&mut self) -> Result<(u64, u8)> {
        let key = self.varint()?;
        Ok((key >> 3, (key & 0x7) as u8))
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| malformed("truncated field"))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.varint()? as usize;
        self.take(len)
    }

    fn fixed32(&mut self) -> Result<[u8; 4]> {
        let mut out = [0u8; 4];
        out.copy_from_slice(self.take(4)?);
        Ok(out)
    }

    fn skip(&mut self, wire: u8) -> Result<()> {
        match wire {
            WIRE_VARINT => self.varint().map(|_| ()),
            WIRE_FIXED64 => self.take(8).map(|_| ()),
            WIRE_LEN => self.bytes().map(|_| ()),
            WIRE_FIXED32 => self.take(4).map(|_| ()),
            other => Err(malformed(&format!("unsupported wire type {}", other))),
        }
    }
}

fn put_varint(out: &mut Vec<u8>, mut v: u64) {
    while v >= 0x80 {
        out.push((v as u8) | 0x80);
        v >>= 7;
    }
    out.push(v as u8);
}

fn put_key(out: &mut Vec<u8>, field: u64, wire: u8) {
    put_varint(out, (field << 3) | u64::from(wire));
}
