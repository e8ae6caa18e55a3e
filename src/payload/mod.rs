//! Growable byte buffer with placeholder-patching semantics (Component B).

mod patch;

pub use patch::patch;

/// A growable binary buffer with absolute-offset placement, gap filling, and
/// in-place marker patching.
///
/// Backed by `Vec<u8>`. The growth policy (double capacity starting at 256
/// bytes until it covers the requested size) is applied explicitly rather
/// than delegated to `Vec::reserve`, matching the spec's documented growth
/// contract.
#[derive(Debug, Default, Clone)]
pub struct Payload {
    data: Vec<u8>,
}

const INITIAL_CAPACITY: usize = 256;

/// Shellcode-template marker convention: a 64-bit placeholder carrying a
/// small id in its low bits, so multiple markers can coexist in one
/// template and still be told apart by [`Payload::patch_u64`].
pub const fn marker64(id: u32) -> u64 {
    0xCAFEBABE_00000000 | id as u64
}

/// Shellcode-template marker convention for 32-bit placeholders.
pub const fn marker32(id: u16) -> u32 {
    0x1337_0000 | id as u32
}

impl Payload {
    /// Creates an empty payload.
    pub fn new() -> Self {
        Payload { data: Vec::new() }
    }

    /// Current number of meaningful bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Borrows the payload's bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consumes the payload, returning the owned bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    fn ensure_capacity(&mut self, needed: usize) {
        if self.data.capacity() >= needed {
            return;
        }
        let mut cap = self.data.capacity().max(INITIAL_CAPACITY);
        while cap < needed {
            cap *= 2;
        }
        self.data.reserve(cap - self.data.len());
    }

    /// Appends `data` to the payload, growing capacity geometrically.
    pub fn push(&mut self, data: &[u8]) -> &mut Self {
        self.ensure_capacity(self.data.len() + data.len());
        self.data.extend_from_slice(data);
        self
    }

    /// Appends the bytes of `s`, without any terminator.
    pub fn push_str(&mut self, s: &str) -> &mut Self {
        self.push(s.as_bytes())
    }

    /// If `offset <= len()`, a no-op. Otherwise extends the payload to
    /// exactly `offset` bytes, filling the gap with `filler` tiled to
    /// length (last tile truncated), or zeros if `filler` is empty.
    pub fn fill_to(&mut self, offset: usize, filler: &[u8]) -> &mut Self {
        if offset <= self.data.len() {
            return self;
        }
        let gap = offset - self.data.len();
        self.ensure_capacity(offset);
        if filler.is_empty() {
            self.data.resize(offset, 0);
        } else if filler.len() == 1 {
            self.data.resize(offset, filler[0]);
        } else {
            let full_tiles = gap / filler.len();
            let remainder = gap % filler.len();
            for _ in 0..full_tiles {
                self.data.extend_from_slice(filler);
            }
            self.data.extend_from_slice(&filler[..remainder]);
        }
        self
    }

    /// `fill_to(offset, &[])` then `push(&val.to_ne_bytes())`.
    pub fn at_u8(&mut self, offset: usize, val: u8) -> &mut Self {
        self.fill_to(offset, &[]);
        self.push(&val.to_ne_bytes())
    }

    pub fn at_u16(&mut self, offset: usize, val: u16) -> &mut Self {
        self.fill_to(offset, &[]);
        self.push(&val.to_ne_bytes())
    }

    pub fn at_u32(&mut self, offset: usize, val: u32) -> &mut Self {
        self.fill_to(offset, &[]);
        self.push(&val.to_ne_bytes())
    }

    pub fn at_u64(&mut self, offset: usize, val: u64) -> &mut Self {
        self.fill_to(offset, &[]);
        self.push(&val.to_ne_bytes())
    }

    pub fn at_str(&mut self, offset: usize, s: &str) -> &mut Self {
        self.fill_to(offset, &[]);
        self.push_str(s)
    }

    /// In-place replace every non-overlapping occurrence of `marker` with
    /// `replacement` (see [`patch`] for the exact truncation/zero-pad rules).
    pub fn patch(&mut self, marker: &[u8], replacement: &[u8]) -> &mut Self {
        patch::patch(&mut self.data, marker, replacement);
        self
    }

    /// Width-specialized patch treating `marker`/`replacement` as native-order
    /// `u8` values.
    pub fn patch_u8(&mut self, marker: u8, replacement: u8) -> &mut Self {
        self.patch(&marker.to_ne_bytes(), &replacement.to_ne_bytes())
    }

    pub fn patch_u16(&mut self, marker: u16, replacement: u16) -> &mut Self {
        self.patch(&marker.to_ne_bytes(), &replacement.to_ne_bytes())
    }

    pub fn patch_u32(&mut self, marker: u32, replacement: u32) -> &mut Self {
        self.patch(&marker.to_ne_bytes(), &replacement.to_ne_bytes())
    }

    pub fn patch_u64(&mut self, marker: u64, replacement: u64) -> &mut Self {
        self.patch(&marker.to_ne_bytes(), &replacement.to_ne_bytes())
    }

    /// For each occurrence of `marker` at offset `m`, writes
    /// `target_offset - (m + marker_size)` truncated to the marker's width —
    /// the signed displacement from the instruction following the patch
    /// site to `target_offset`, matching x86 rel-immediate semantics.
    pub fn patch_rel8(&mut self, marker: u8, target_offset: i64) -> &mut Self {
        patch::patch_rel::<1>(&mut self.data, &marker.to_ne_bytes(), target_offset);
        self
    }

    pub fn patch_rel16(&mut self, marker: u16, target_offset: i64) -> &mut Self {
        patch::patch_rel::<2>(&mut self.data, &marker.to_ne_bytes(), target_offset);
        self
    }

    pub fn patch_rel32(&mut self, marker: u32, target_offset: i64) -> &mut Self {
        patch::patch_rel::<4>(&mut self.data, &marker.to_ne_bytes(), target_offset);
        self
    }

    pub fn patch_rel64(&mut self, marker: u64, target_offset: i64) -> &mut Self {
        patch::patch_rel::<8>(&mut self.data, &marker.to_ne_bytes(), target_offset);
        self
    }
}
