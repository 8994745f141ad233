//! The svndiff window model
//!
//! A window reconstructs one contiguous range of the target fulltext from
//! three sources: a view into the source representation, the target bytes
//! produced earlier within the same window, and the window's own new-data
//! section.

use chronofs_core::{FsError, Result};

/// One window instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaOp {
    /// Copy `len` bytes from offset `offset` of the source view
    Source {
        /// Offset within the source view
        offset: usize,
        /// Number of bytes to copy
        len: usize,
    },
    /// Copy `len` bytes from offset `offset` of the target produced so
    /// far; the range may overlap the destination and is applied bytewise
    Target {
        /// Offset within the target produced so far
        offset: usize,
        /// Number of bytes to copy
        len: usize,
    },
    /// Copy the next `len` bytes of the window's new-data section
    New {
        /// Number of bytes to take from new data
        len: usize,
    },
}

impl DeltaOp {
    /// Output length of this instruction
    pub fn len(&self) -> usize {
        match *self {
            DeltaOp::Source { len, .. } | DeltaOp::Target { len, .. } | DeltaOp::New { len } => len,
        }
    }

    /// True for zero-length instructions
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One svndiff window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaWindow {
    /// Offset of the source view within the source fulltext
    pub sview_offset: u64,
    /// Length of the source view
    pub sview_len: usize,
    /// Length of target text this window reconstructs
    pub tview_len: usize,
    /// The instruction list
    pub ops: Vec<DeltaOp>,
    /// The new-data section
    pub new_data: Vec<u8>,
}

impl DeltaWindow {
    /// Apply this window against its source view, producing the target
    /// view bytes
    ///
    /// `source` must be exactly the window's source view. Instructions
    /// that step outside their views, or that do not produce exactly
    /// `tview_len` bytes, are reported as corrupt.
    pub fn apply(&self, source: &[u8]) -> Result<Vec<u8>> {
        if source.len() != self.sview_len {
            return Err(FsError::corrupt(format!(
                "svndiff window expects {} source bytes, got {}",
                self.sview_len,
                source.len()
            )));
        }
        let mut target = Vec::with_capacity(self.tview_len);
        let mut new_pos = 0usize;
        for op in &self.ops {
            match *op {
                DeltaOp::Source { offset, len } => {
                    let end = offset
                        .checked_add(len)
                        .filter(|&e| e <= source.len())
                        .ok_or_else(|| {
                            FsError::corrupt("svndiff source copy outside source view")
                        })?;
                    target.extend_from_slice(&source[offset..end]);
                }
                DeltaOp::Target { offset, len } => {
                    if offset >= target.len() {
                        return Err(FsError::corrupt(
                            "svndiff target copy starts past produced target",
                        ));
                    }
                    // Overlapping ranges replicate earlier output, so the
                    // copy must be bytewise.
                    for i in 0..len {
                        let b = target[offset + i];
                        target.push(b);
                    }
                }
                DeltaOp::New { len } => {
                    let end = new_pos
                        .checked_add(len)
                        .filter(|&e| e <= self.new_data.len())
                        .ok_or_else(|| FsError::corrupt("svndiff new copy outside new data"))?;
                    target.extend_from_slice(&self.new_data[new_pos..end]);
                    new_pos = end;
                }
            }
            if target.len() > self.tview_len {
                return Err(FsError::corrupt("svndiff window overruns its target view"));
            }
        }
        if target.len() != self.tview_len {
            return Err(FsError::corrupt(format!(
                "svndiff window produced {} bytes, target view is {}",
                target.len(),
                self.tview_len
            )));
        }
        if new_pos != self.new_data.len() {
            return Err(FsError::corrupt(
                "svndiff window leaves unconsumed new data",
            ));
        }
        Ok(target)
    }
}
