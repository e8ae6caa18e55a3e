/// In-place replace every non-overlapping occurrence of `marker` in `buf`.
///
/// Copies `min(marker.len(), replacement.len())` bytes per occurrence and
/// zero-fills any remainder up to `marker.len()`. Truncates: if
/// `replacement` is longer than `marker`, only `marker.len()` bytes are
/// written. The scan cursor advances by `marker.len()` past each hit, so
/// overlapping occurrences are not double-patched. No-op if `marker` is
/// empty or longer than `buf`.
pub fn patch(buf: &mut [u8], marker: &[u8], replacement: &[u8]) {
    if marker.is_empty() || buf.len() < marker.len() {
        return;
    }
    let copy_len = replacement.len().min(marker.len());
    let zero_len = marker.len() - copy_len;

    let mut pos = 0;
    while pos + marker.len() <= buf.len() {
        if &buf[pos..pos + marker.len()] == marker {
            buf[pos..pos + copy_len].copy_from_slice(&replacement[..copy_len]);
            for b in &mut buf[pos + copy_len..pos + copy_len + zero_len] {
                *b = 0;
            }
            pos += marker.len();
        } else {
            pos += 1;
        }
    }
}

/// Relative-displacement patch: for each occurrence of `marker` at offset
/// `m`, writes `target_offset - (m + WIDTH)` truncated to `WIDTH` bytes in
/// native order — the signed displacement from the instruction following
/// the patch site to `target_offset`.
pub(super) fn patch_rel<const WIDTH: usize>(buf: &mut [u8], marker: &[u8], target_offset: i64) {
    debug_assert_eq!(marker.len(), WIDTH);
    if marker.is_empty() || buf.len() < marker.len() {
        return;
    }

    let mut pos = 0;
    while pos + WIDTH <= buf.len() {
        if &buf[pos..pos + WIDTH] == marker {
            let disp = target_offset - (pos as i64 + WIDTH as i64);
            let bytes = disp.to_ne_bytes();
            buf[pos..pos + WIDTH].copy_from_slice(&bytes[..WIDTH]);
            pos += WIDTH;
        } else {
            pos += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_replace() {
        let mut buf = *b"Hello MARKER World";
        patch(&mut buf, b"MARKER", b"AXIUM!");
        assert_eq!(&buf, b"Hello AXIUM! World");
    }

    #[test]
    fn fixed_point_is_idempotent() {
        let mut buf = *b"XXXYYYXXX";
        let before = buf;
        patch(&mut buf, b"XXX", b"XXX");
        assert_eq!(buf, before);
    }

    #[test]
    fn truncates_longer_replacement() {
        let mut buf = *b"AAbbAA";
        patch(&mut buf, b"AA", b"ZZZZZ");
        assert_eq!(&buf, b"ZZbbZZ");
    }

    #[test]
    fn zero_pads_shorter_replacement() {
        let mut buf = [0xFFu8; 4];
        patch(&mut buf, &[0xFFu8; 4], &[0x11, 0x22]);
        assert_eq!(buf, [0x11, 0x22, 0, 0]);
    }

    #[test]
    fn empty_marker_is_noop() {
        let mut buf = *b"hello";
        let before = buf;
        patch(&mut buf, &[], b"x");
        assert_eq!(buf, before);
    }

    #[test]
    fn marker_longer_than_buffer_is_noop() {
        let mut buf = *b"ab";
        let before = buf;
        patch(&mut buf, b"abc", b"x");
        assert_eq!(buf, before);
    }

    #[test]
    fn overlapping_occurrences_advance_past_hit() {
        let mut buf = *b"aaaa";
        patch(&mut buf, b"aa", b"bb");
        // hits at 0 and 2, non-overlapping scan: "bb" + "bb"
        assert_eq!(&buf, b"bbbb");
    }
}
