//! Block-match delta generation
//!
//! The generator walks source and target in parallel windows. Within a
//! window pair it indexes fixed-size source blocks by an adler32-style
//! checksum, slides a rolling checksum across the target one byte at a
//! time, verifies candidate matches byte-for-byte, extends each match in
//! both directions, and emits source-copy instructions with new-data
//! gaps between them.

use crate::window::{DeltaOp, DeltaWindow};
use std::collections::HashMap;

/// Block size used to index the source view
const MATCH_BLOCKSIZE: usize = 64;

/// An adler32-style checksum over a [`MATCH_BLOCKSIZE`] window
///
/// `s1` sums the window's bytes and `s2` sums the running `s1` values,
/// both wrapping; sliding the window one byte updates both in constant
/// time, which is what lets the target scan advance bytewise while the
/// source stays indexed on its aligned block boundaries.
#[derive(Debug, Clone, Copy)]
struct RollingSum {
    s1: u32,
    s2: u32,
}

impl RollingSum {
    fn of(window: &[u8]) -> RollingSum {
        let mut sum = RollingSum { s1: 0, s2: 0 };
        for &byte in window {
            sum.s1 = sum.s1.wrapping_add(u32::from(byte));
            sum.s2 = sum.s2.wrapping_add(sum.s1);
        }
        sum
    }

    /// Slide the window one byte: drop `out` from the front, take `into`
    /// at the back
    fn roll(&mut self, out: u8, into: u8) {
        self.s1 = self
            .s1
            .wrapping_add(u32::from(into))
            .wrapping_sub(u32::from(out));
        self.s2 = self
            .s2
            .wrapping_add(self.s1)
            .wrapping_sub((MATCH_BLOCKSIZE as u32).wrapping_mul(u32::from(out)));
    }

    fn digest(&self) -> u32 {
        (self.s2 << 16) | (self.s1 & 0xffff)
    }
}

/// Produce svndiff windows transforming `source` into `target`
///
/// Windows cover at most `window_size` bytes of target text; window `i`
/// reads its source view from the same offset of the source. An empty
/// target yields no windows, and a zero `window_size` is treated as
/// unbounded, covering the whole target in one window.
pub fn diff_windows(source: &[u8], target: &[u8], window_size: usize) -> Vec<DeltaWindow> {
    let window_size = if window_size == 0 {
        target.len().max(1)
    } else {
        window_size
    };
    let mut windows = Vec::new();
    let mut offset = 0usize;
    while offset < target.len() {
        let tview_end = target.len().min(offset + window_size);
        let sview_end = source.len().min(offset + window_size);
        let sview = if offset < source.len() {
            &source[offset..sview_end]
        } else {
            &[][..]
        };
        windows.push(diff_one_window(
            offset as u64,
            sview,
            &target[offset..tview_end],
        ));
        offset = tview_end;
    }
    windows
}

/// Delta one window pair
fn diff_one_window(sview_offset: u64, sview: &[u8], tview: &[u8]) -> DeltaWindow {
    let mut ops: Vec<DeltaOp> = Vec::new();
    let mut new_data: Vec<u8> = Vec::new();

    if sview.len() < MATCH_BLOCKSIZE || tview.len() < MATCH_BLOCKSIZE {
        // Nothing worth matching; emit the target as new data.
        if !tview.is_empty() {
            ops.push(DeltaOp::New { len: tview.len() });
            new_data.extend_from_slice(tview);
        }
        return DeltaWindow {
            sview_offset,
            sview_len: sview.len(),
            tview_len: tview.len(),
            ops,
            new_data,
        };
    }

    // Index non-overlapping source blocks by checksum. Later blocks win
    // on collisions, which is harmless: every candidate is verified
    // byte-for-byte before use.
    let mut blocks: HashMap<u32, usize> = HashMap::new();
    let mut b = 0usize;
    while b + MATCH_BLOCKSIZE <= sview.len() {
        blocks.insert(RollingSum::of(&sview[b..b + MATCH_BLOCKSIZE]).digest(), b);
        b += MATCH_BLOCKSIZE;
    }

    let mut pending_new_start = 0usize; // start of the unmatched run
    let mut pos = 0usize;
    let mut sum = RollingSum::of(&tview[..MATCH_BLOCKSIZE]);
    while pos + MATCH_BLOCKSIZE <= tview.len() {
        let candidate = blocks.get(&sum.digest()).copied().filter(|&start| {
            sview[start..start + MATCH_BLOCKSIZE] == tview[pos..pos + MATCH_BLOCKSIZE]
        });
        let Some(src_start) = candidate else {
            if pos + MATCH_BLOCKSIZE < tview.len() {
                sum.roll(tview[pos], tview[pos + MATCH_BLOCKSIZE]);
            }
            pos += 1;
            continue;
        };

        // Extend the match forward past the block.
        let mut match_len = MATCH_BLOCKSIZE;
        while src_start + match_len < sview.len()
            && pos + match_len < tview.len()
            && sview[src_start + match_len] == tview[pos + match_len]
        {
            match_len += 1;
        }

        // Extend backward into the pending unmatched run.
        let mut src_begin = src_start;
        let mut tgt_begin = pos;
        while src_begin > 0
            && tgt_begin > pending_new_start
            && sview[src_begin - 1] == tview[tgt_begin - 1]
        {
            src_begin -= 1;
            tgt_begin -= 1;
            match_len += 1;
        }

        if tgt_begin > pending_new_start {
            let run = &tview[pending_new_start..tgt_begin];
            ops.push(DeltaOp::New { len: run.len() });
            new_data.extend_from_slice(run);
        }
        ops.push(DeltaOp::Source {
            offset: src_begin,
            len: match_len,
        });
        pos = tgt_begin + match_len;
        pending_new_start = pos;
        // The scan jumped; restart the rolling window at the new spot.
        if pos + MATCH_BLOCKSIZE <= tview.len() {
            sum = RollingSum::of(&tview[pos..pos + MATCH_BLOCKSIZE]);
        }
    }

    if pending_new_start < tview.len() {
        let run = &tview[pending_new_start..];
        ops.push(DeltaOp::New { len: run.len() });
        new_data.extend_from_slice(run);
    }

    DeltaWindow {
        sview_offset,
        sview_len: sview.len(),
        tview_len: tview.len(),
        ops,
        new_data,
    }
}
