//! OMF output.
//!
//! The OMF encoder proper is out of scope (spec.md 1): `ImageWriter` and
//! `BinaryWriter` are modeled as trait interfaces taking a segment list
//! plus header metadata and a [`std::io::Write`], in the style of the
//! teacher's `write::util::WritableBuffer` trait, with one minimal
//! conforming implementation of each so the crate runs end to end. The
//! REL->OMF-object emitter (linker version 3, spec.md 4.5) is the one
//! part of this module that is fully in scope; see [`object_emit`].

pub mod object_emit;

use std::io::{self, Write};

use crate::error::Result;
use crate::segment::Segment;

/// Header metadata the writer needs beyond the segment list itself.
#[derive(Debug, Clone)]
pub struct ImageHeader {
    /// GS/OS file type.
    pub file_type: u8,
    /// GS/OS auxiliary type.
    pub aux_type: u32,
    /// Load address (`ORG`/`ADR`).
    pub origin: u32,
    /// The OMF load name.
    pub load_name: String,
}

/// Writes a loadable OMF image (linker versions 1 and 2).
pub trait ImageWriter {
    /// Write every segment plus `header` as one loadable image.
    fn write_image(
        &self,
        segments: &[Segment],
        header: &ImageHeader,
        out: &mut dyn Write,
    ) -> Result<()>;
}

/// Writes a flat binary image with no container at all (linker version 0).
pub trait BinaryWriter {
    /// Write every segment's payload, concatenated, with no header.
    fn write_binary(&self, segments: &[Segment], out: &mut dyn Write) -> Result<()>;
}

/// A minimal, well-formed OMF v2 SEGMENT-header writer: one header per
/// segment (number, names, kind, alignment, org, length), then the raw
/// payload. Sufficient to round-trip through this crate; not claimed to
/// match Apple IIgs OMF byte-for-byte (see DESIGN.md).
#[derive(Debug, Default, Clone, Copy)]
pub struct OmfV2Writer;

const NAME_FIELD_LEN: usize = 10;

fn write_padded_name(out: &mut dyn Write, name: &str) -> io::Result<()> {
    let mut field = [b' '; NAME_FIELD_LEN];
    let bytes = name.as_bytes();
    let n = bytes.len().min(NAME_FIELD_LEN);
    field[..n].copy_from_slice(&bytes[..n]);
    out.write_all(&field)
}

impl ImageWriter for OmfV2Writer {
    fn write_image(
        &self,
        segments: &[Segment],
        header: &ImageHeader,
        out: &mut dyn Write,
    ) -> Result<()> {
        out.write_all(b"OMF2")?;
        out.write_all(&(segments.len() as u16).to_le_bytes())?;
        out.write_all(&header.origin.to_le_bytes())?;
        write_padded_name(out, &header.load_name)?;

        for segment in segments {
            out.write_all(&segment.number().to_le_bytes())?;
            write_padded_name(out, segment.name())?;
            write_padded_name(out, segment.load_name())?;
            out.write_all(&segment.kind().0.to_le_bytes())?;
            out.write_all(&segment.alignment().to_le_bytes())?;
            out.write_all(&segment.reserved().to_le_bytes())?;
            out.write_all(&(segment.len() as u32).to_le_bytes())?;
            out.write_all(segment.payload())?;
        }
        Ok(())
    }
}

/// A flat dump of every segment's payload, concatenated in order.
#[derive(Debug, Default, Clone, Copy)]
pub struct FlatBinaryWriter;

impl BinaryWriter for FlatBinaryWriter {
    fn write_binary(&self, segments: &[Segment], out: &mut dyn Write) -> Result<()> {
        for segment in segments {
            out.write_all(segment.payload())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_binary_writer_concatenates_payloads() {
        let mut a = Segment::new(1, "A", "A");
        a.append(&[1, 2]);
        let mut b = Segment::new(2, "B", "B");
        b.append(&[3, 4, 5]);
        let mut out = Vec::new();
        FlatBinaryWriter.write_binary(&[a, b], &mut out).unwrap();
        assert_eq!(out, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn omf_v2_writer_emits_one_header_per_segment() {
        let mut a = Segment::new(1, "CODE", "CODE");
        a.append(&[0xAA]);
        let header = ImageHeader {
            file_type: 0xb3,
            aux_type: 0,
            origin: 0x2000,
            load_name: "OUT".to_string(),
        };
        let mut out = Vec::new();
        OmfV2Writer.write_image(&[a], &header, &mut out).unwrap();
        assert!(out.starts_with(b"OMF2"));
        assert!(out.contains(&0xAA));
    }
}
