//! Output segments.
//!
//! A [`Segment`] owns the growing payload bytes that units are decoded
//! into, plus the side lists of relocations the resolver produces once
//! every unit has contributed. `SegmentList` is the process-wide ordered
//! collection the script interpreter and the direct-file driver both
//! mutate (spec.md 3: "Owns the ordered list of output segments").

use crate::reloc::{InterReloc, IntraReloc, PendingReloc, UnresolvedReloc};

/// 16-bit OMF segment-kind attribute. Only the bit this crate inspects
/// (bank-size limited, bit 0) is named; the rest round-trip opaquely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SegmentKind(
    /// The raw 16-bit attribute value.
    pub u16,
);

impl SegmentKind {
    /// Default "no special memory" kind.
    pub const DEFAULT: SegmentKind = SegmentKind(0);

    /// True if this kind limits the segment to a single 64K bank
    /// (spec.md 3 invariant: payload length must then be <= 65535).
    pub fn is_bank_limited(self) -> bool {
        self.0 & 0x0001 != 0
    }
}

/// One output segment: a contiguous region of the final artifact.
#[derive(Debug, Clone)]
pub struct Segment {
    number: u16,
    name: String,
    load_name: String,
    kind: SegmentKind,
    alignment: u32,
    reserved: u32,
    payload: Vec<u8>,
    intra: Vec<IntraReloc>,
    inter: Vec<InterReloc>,
    unresolved: Vec<UnresolvedReloc>,
    pending: Vec<PendingReloc>,
}

impl Segment {
    /// Create a new, empty segment.
    pub fn new(number: u16, name: impl Into<String>, load_name: impl Into<String>) -> Self {
        Segment {
            number,
            name: name.into(),
            load_name: load_name.into(),
            kind: SegmentKind::DEFAULT,
            alignment: 0,
            reserved: 0,
            payload: Vec::new(),
            intra: Vec::new(),
            inter: Vec::new(),
            unresolved: Vec::new(),
            pending: Vec::new(),
        }
    }

    /// The segment's 1-based number.
    pub fn number(&self) -> u16 {
        self.number
    }

    /// The segment's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The segment's OMF load name.
    pub fn load_name(&self) -> &str {
        &self.load_name
    }

    /// Rename the segment.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Change the segment's OMF load name.
    pub fn set_load_name(&mut self, name: impl Into<String>) {
        self.load_name = name.into();
    }

    /// The segment's kind attribute.
    pub fn kind(&self) -> SegmentKind {
        self.kind
    }

    /// Set the segment's kind attribute (`KND` contract, spec.md 4.4).
    pub fn set_kind(&mut self, kind: SegmentKind) {
        self.kind = kind;
    }

    /// The segment's alignment, 0 or a power of two.
    pub fn alignment(&self) -> u32 {
        self.alignment
    }

    /// Set the alignment. Must be 0 or a power of two (`ALI` contract,
    /// spec.md 4.4); the caller is responsible for validating that.
    pub fn set_alignment(&mut self, alignment: u32) {
        self.alignment = alignment;
    }

    /// The `DS` reserved-space byte count accumulated so far.
    pub fn reserved(&self) -> u32 {
        self.reserved
    }

    /// Set the `DS` reserved-space byte count.
    pub fn set_reserved(&mut self, reserved: u32) {
        self.reserved = reserved;
    }

    /// The segment's current payload length, i.e. where the next unit
    /// will begin.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// True if the segment has no payload bytes yet.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// The segment's payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Append raw bytes (used by the REL decoder and by `IMP`), returning
    /// the offset they were placed at.
    pub fn append(&mut self, bytes: &[u8]) -> u32 {
        let offset = self.payload.len() as u32;
        self.payload.extend_from_slice(bytes);
        offset
    }

    /// Extend the payload with `count` copies of `fill` (DS-fill padding,
    /// and the `DS` opcode's reserved space).
    pub fn fill(&mut self, count: usize, fill: u8) {
        self.payload.resize(self.payload.len() + count, fill);
    }

    /// Overwrite `width` little-endian bytes at `offset` (absolute-symbol
    /// fixup, spec.md 4.3).
    pub fn patch(&mut self, offset: usize, width: usize, value: u32) {
        let bytes = value.to_le_bytes();
        self.payload[offset..offset + width].copy_from_slice(&bytes[..width]);
    }

    /// Zero `len` bytes at `offset` (the decoder clears the inline addend
    /// once it has been read out, spec.md 4.2.2).
    pub fn zero(&mut self, offset: usize, len: usize) {
        for b in &mut self.payload[offset..offset + len] {
            *b = 0;
        }
    }

    /// Record a relocation still awaiting its target's definition.
    pub fn push_pending(&mut self, reloc: PendingReloc) {
        self.pending.push(reloc);
    }

    /// Drain every pending relocation, for the resolver to consume.
    pub fn take_pending(&mut self) -> Vec<PendingReloc> {
        std::mem::take(&mut self.pending)
    }

    /// The relocations still awaiting resolution.
    pub fn pending(&self) -> &[PendingReloc] {
        &self.pending
    }

    /// Record an intra-segment relocation.
    pub fn push_intra(&mut self, reloc: IntraReloc) {
        self.intra.push(reloc);
    }

    /// Record an inter-segment relocation.
    pub fn push_inter(&mut self, reloc: InterReloc) {
        self.inter.push(reloc);
    }

    /// Record a relocation left unresolved (`allow_unresolved` mode).
    pub fn push_unresolved(&mut self, reloc: UnresolvedReloc) {
        self.unresolved.push(reloc);
    }

    /// The resolved intra-segment relocations.
    pub fn intra(&self) -> &[IntraReloc] {
        &self.intra
    }

    /// The resolved inter-segment relocations.
    pub fn inter(&self) -> &[InterReloc] {
        &self.inter
    }

    /// The relocations left unresolved (`allow_unresolved` mode).
    pub fn unresolved(&self) -> &[UnresolvedReloc] {
        &self.unresolved
    }

    /// Sort the resolved/unresolved reloc lists by ascending offset
    /// (spec.md 4.3, invariant 6).
    pub fn sort_relocs(&mut self) {
        self.intra.sort_by_key(|r| r.offset);
        self.inter.sort_by_key(|r| r.offset);
        self.unresolved.sort_by_key(|r| r.offset);
    }

    /// Check the bank-size invariant (spec.md 3): bank-limited segments
    /// may not exceed 65535 bytes.
    pub fn check_bank_size(&self) -> crate::Result<()> {
        if self.kind.is_bank_limited() && self.payload.len() > 0xffff {
            return Err(crate::Error::resolve(format!(
                "segment '{}' exceeds one bank: {} bytes",
                self.name,
                self.payload.len()
            )));
        }
        Ok(())
    }
}

/// The ordered collection of output segments for one link run.
#[derive(Debug, Default)]
pub struct SegmentList {
    segments: Vec<Segment>,
}

impl SegmentList {
    /// Create an empty segment list.
    pub fn new() -> Self {
        SegmentList::default()
    }

    /// Start a new segment, appending it to the list and returning its
    /// index. `new_segment(reset=true)` in spec.md 5 corresponds to
    /// calling this after having cleared the list.
    pub fn push(&mut self, name: impl Into<String>, load_name: impl Into<String>) -> usize {
        let number = self.segments.len() as u16 + 1;
        self.segments.push(Segment::new(number, name, load_name));
        self.segments.len() - 1
    }

    /// Borrow the segment at `index`.
    pub fn get(&self, index: usize) -> &Segment {
        &self.segments[index]
    }

    /// Mutably borrow the segment at `index`.
    pub fn get_mut(&mut self, index: usize) -> &mut Segment {
        &mut self.segments[index]
    }

    /// Number of segments in the list.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// True if the list has no segments yet.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Iterate over every segment in order.
    pub fn iter(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter()
    }

    /// Borrow every segment as a slice, in order.
    pub fn as_slice(&self) -> &[Segment] {
        &self.segments
    }

    /// Drop the last segment if it is empty (`END` in mode 2 per spec.md
    /// 4.4: "drop the empty trailing segment and write the file").
    pub fn drop_trailing_if_empty(&mut self) {
        if matches!(self.segments.last(), Some(s) if s.is_empty()) {
            self.segments.pop();
        }
    }

    /// Reset to an empty list, for the mode 0/1/3 `SAV`/`END` boundary
    /// (spec.md 5: "reset at the start of each SAV/END boundary").
    pub fn reset(&mut self) {
        self.segments.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_returns_prior_length() {
        let mut seg = Segment::new(1, "CODE", "CODE");
        assert_eq!(seg.append(&[1, 2, 3]), 0);
        assert_eq!(seg.append(&[4, 5]), 3);
        assert_eq!(seg.payload(), &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn patch_writes_little_endian() {
        let mut seg = Segment::new(1, "CODE", "CODE");
        seg.append(&[0, 0, 0]);
        seg.patch(0, 2, 0x1234);
        assert_eq!(seg.payload(), &[0x34, 0x12, 0]);
    }

    #[test]
    fn bank_limited_rejects_oversize_payload() {
        let mut seg = Segment::new(1, "CODE", "CODE");
        seg.set_kind(SegmentKind(0x0001));
        seg.fill(0x10000, 0);
        assert!(seg.check_bank_size().is_err());
    }

    #[test]
    fn sort_relocs_orders_by_offset() {
        let mut seg = Segment::new(1, "CODE", "CODE");
        seg.push_intra(IntraReloc {
            width: crate::reloc::Width::One,
            offset: 5,
            shift: 0,
            value: 0,
        });
        seg.push_intra(IntraReloc {
            width: crate::reloc::Width::One,
            offset: 1,
            shift: 0,
            value: 0,
        });
        seg.sort_relocs();
        assert_eq!(seg.intra()[0].offset, 1);
        assert_eq!(seg.intra()[1].offset, 5);
    }

    #[test]
    fn drop_trailing_if_empty_removes_only_empty_last() {
        let mut list = SegmentList::new();
        list.push("a", "a");
        let idx = list.push("b", "b");
        list.get_mut(idx).append(&[1]);
        let idx2 = list.push("c", "c");
        let _ = idx2;
        list.drop_trailing_if_empty();
        assert_eq!(list.len(), 2);
    }
}
