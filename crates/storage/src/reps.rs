//! Representations and their contents
//!
//! A representation either points at a fulltext string or carries a delta
//! chain: ordered chunks, each holding one svndiff window that
//! reconstructs a contiguous range of the fulltext against a source
//! representation.
//!
//! Reading a range out of a delta walks the chunk list, applies the
//! relevant windows, and obtains each window's source view by a recursive
//! ranged read on the source representation. The recursion is bounded by
//! `max_delta_chain`; past the bound the reader falls back to
//! reconstructing the source fulltext with an explicit chain walk, which
//! also detects cycles and reports them as corruption.
//!
//! Mutable representations are always fulltexts; deltification happens
//! after commit and atomically swaps a fulltext record for a delta record
//! when (and only when) the delta is actually smaller.

use crate::keys::{self, COUNTER_REP};
use crate::kv::{KvRead, Table, WriteScope};
use crate::strings;
use chronofs_core::{
    Cancel, Checksum, DeltaChunk, FsConfig, FsError, RepContents, RepKey, Representation, Result,
    TxnId,
};
use chronofs_delta::{decode_window, diff_windows, encode_window};
use std::collections::{HashMap, HashSet};

// =============================================================================
// Record access
// =============================================================================

/// Load a representation record
pub fn get_rep(view: &impl KvRead, key: &RepKey) -> Result<Representation> {
    let bytes = view
        .get(Table::Representations, key.as_str())
        .ok_or_else(|| FsError::NoSuchRepresentation {
            key: key.to_string(),
        })?;
    Ok(bincode::deserialize(&bytes)?)
}

/// Store a representation record under an existing key
pub fn put_rep(scope: &mut WriteScope<'_>, key: &RepKey, rep: &Representation) -> Result<()> {
    scope.put(Table::Representations, key.as_str(), bincode::serialize(rep)?);
    Ok(())
}

/// Store a representation record under a fresh key
pub fn put_new_rep(scope: &mut WriteScope<'_>, rep: &Representation) -> Result<RepKey> {
    let key = RepKey::new(keys::allocate(scope, COUNTER_REP)?);
    put_rep(scope, &key, rep)?;
    Ok(key)
}

/// Delete a representation record (the record only, not its strings)
pub fn delete_rep(scope: &mut WriteScope<'_>, key: &RepKey) -> Result<()> {
    get_rep(scope, key)?;
    scope.delete(Table::Representations, key.as_str());
    Ok(())
}

// =============================================================================
// Reading contents
// =============================================================================

/// The fulltext size of a representation
///
/// For a delta this is the end of the last chunk; overlapping windows
/// cannot disturb it as long as the chunks stay ordered.
pub fn rep_contents_size(view: &impl KvRead, key: &RepKey) -> Result<u64> {
    let rep = get_rep(view, key)?;
    match &rep.contents {
        RepContents::Fulltext { string_key } => strings::size(view, string_key),
        RepContents::Delta { chunks } => {
            let last = chunks
                .last()
                .ok_or_else(|| FsError::corrupt(format!("delta rep '{}' has no chunks", key)))?;
            Ok(last.text_offset + last.text_length)
        }
    }
}

/// Read `len` bytes starting at `offset` from the contents of `key`
///
/// A read past the end returns the available suffix (short count).
pub fn rep_read_range(
    view: &impl KvRead,
    config: &FsConfig,
    cancel: &Cancel,
    key: &RepKey,
    offset: u64,
    len: usize,
) -> Result<Vec<u8>> {
    cancel.check()?;
    read_range_inner(view, config, cancel, key, offset, len, 0)
}

/// The complete contents of a representation
pub fn rep_contents(
    view: &impl KvRead,
    config: &FsConfig,
    cancel: &Cancel,
    key: &RepKey,
) -> Result<Vec<u8>> {
    let size = rep_contents_size(view, key)?;
    let bytes = rep_read_range(view, config, cancel, key, 0, size as usize)?;
    if bytes.len() as u64 != size {
        return Err(FsError::corrupt(format!(
            "representation '{}' produced {} of {} bytes",
            key,
            bytes.len(),
            size
        )));
    }
    Ok(bytes)
}

fn read_range_inner(
    view: &impl KvRead,
    config: &FsConfig,
    cancel: &Cancel,
    key: &RepKey,
    offset: u64,
    len: usize,
    depth: usize,
) -> Result<Vec<u8>> {
    let rep = get_rep(view, key)?;
    match &rep.contents {
        RepContents::Fulltext { string_key } => strings::read(view, string_key, offset, len),
        RepContents::Delta { chunks } => {
            if chunks.is_empty() {
                return Err(FsError::corrupt(format!("delta rep '{}' has no chunks", key)));
            }
            let req_end = offset + len as u64;
            let mut out = Vec::with_capacity(len);
            for chunk in chunks {
                cancel.check()?;
                let chunk_end = chunk.text_offset + chunk.text_length;
                // Windows entirely before the range are skipped; windows
                // entirely after it end the walk.
                if chunk_end <= offset {
                    continue;
                }
                if chunk.text_offset >= req_end {
                    break;
                }

                let window_bytes = strings::read(
                    view,
                    &chunk.window_key,
                    0,
                    strings::size(view, &chunk.window_key)? as usize,
                )?;
                let mut pos = 0;
                let window = decode_window(&window_bytes, &mut pos)?;
                if window.tview_len as u64 != chunk.text_length {
                    return Err(FsError::corrupt(format!(
                        "delta chunk of rep '{}' disagrees with its window length",
                        key
                    )));
                }

                let source_view = if window.sview_len == 0 {
                    Vec::new()
                } else if depth + 1 >= config.max_delta_chain {
                    // Recursion bound hit: reconstruct the source fulltext
                    // with the explicit chain walk and slice the view out.
                    let full = reconstruct_fulltext(view, cancel, &chunk.source)?;
                    slice_view(&full, window.sview_offset, window.sview_len, &chunk.source)?
                } else {
                    read_range_inner(
                        view,
                        config,
                        cancel,
                        &chunk.source,
                        window.sview_offset,
                        window.sview_len,
                        depth + 1,
                    )?
                };
                if source_view.len() != window.sview_len {
                    return Err(FsError::corrupt(format!(
                        "source chain of rep '{}' is broken: wanted {} source bytes, got {}",
                        key,
                        window.sview_len,
                        source_view.len()
                    )));
                }

                let tview = window.apply(&source_view)?;

                // Copy the overlap of this window with the request.
                let copy_from = offset.saturating_sub(chunk.text_offset) as usize;
                let copy_to = (req_end.min(chunk_end) - chunk.text_offset) as usize;
                out.extend_from_slice(&tview[copy_from..copy_to]);
                if chunk_end >= req_end {
                    break;
                }
            }
            Ok(out)
        }
    }
}

fn slice_view(full: &[u8], offset: u64, len: usize, key: &RepKey) -> Result<Vec<u8>> {
    let start = offset as usize;
    let end = start.checked_add(len).filter(|&e| e <= full.len());
    match end {
        Some(end) => Ok(full[start..end].to_vec()),
        None => Err(FsError::corrupt(format!(
            "source view of rep '{}' lies outside its fulltext",
            key
        ))),
    }
}

/// Reconstruct the complete fulltext of a representation with an explicit
/// chain walk
///
/// Source fulltexts are memoized per representation key, and a visiting
/// set turns self- or mutual references into a *corrupt* error instead of
/// an infinite descent.
pub fn reconstruct_fulltext(view: &impl KvRead, cancel: &Cancel, key: &RepKey) -> Result<Vec<u8>> {
    let mut cache = HashMap::new();
    let mut visiting = HashSet::new();
    reconstruct_inner(view, cancel, key, &mut cache, &mut visiting)
}

fn reconstruct_inner(
    view: &impl KvRead,
    cancel: &Cancel,
    key: &RepKey,
    cache: &mut HashMap<RepKey, Vec<u8>>,
    visiting: &mut HashSet<RepKey>,
) -> Result<Vec<u8>> {
    if let Some(bytes) = cache.get(key) {
        return Ok(bytes.clone());
    }
    if !visiting.insert(key.clone()) {
        return Err(FsError::corrupt(format!(
            "representation '{}' participates in a delta cycle",
            key
        )));
    }
    let rep = get_rep(view, key)?;
    let full = match &rep.contents {
        RepContents::Fulltext { string_key } => {
            let size = strings::size(view, string_key)?;
            strings::read(view, string_key, 0, size as usize)?
        }
        RepContents::Delta { chunks } => {
            if chunks.is_empty() {
                return Err(FsError::corrupt(format!("delta rep '{}' has no chunks", key)));
            }
            let mut out = Vec::new();
            for chunk in chunks {
                cancel.check()?;
                if chunk.text_offset != out.len() as u64 {
                    return Err(FsError::corrupt(format!(
                        "delta chunks of rep '{}' are not contiguous",
                        key
                    )));
                }
                let window_bytes = strings::read(
                    view,
                    &chunk.window_key,
                    0,
                    strings::size(view, &chunk.window_key)? as usize,
                )?;
                let mut pos = 0;
                let window = decode_window(&window_bytes, &mut pos)?;
                let source_full = reconstruct_inner(view, cancel, &chunk.source, cache, visiting)?;
                let source_view =
                    slice_view(&source_full, window.sview_offset, window.sview_len, key)?;
                out.extend_from_slice(&window.apply(&source_view)?);
            }
            out
        }
    };
    visiting.remove(key);
    cache.insert(key.clone(), full.clone());
    Ok(full)
}

// =============================================================================
// Mutable representations
// =============================================================================

/// Obtain a representation that is mutable under `txn_id`
///
/// An already-mutable representation is returned as-is. An immutable one
/// is deep-copied as a fulltext (regardless of how the original stores
/// its data) under a fresh key carrying the transaction tag. With no
/// key at all, a fresh empty fulltext is created.
pub fn get_mutable_rep(
    scope: &mut WriteScope<'_>,
    config: &FsConfig,
    cancel: &Cancel,
    key: Option<&RepKey>,
    txn_id: &TxnId,
) -> Result<RepKey> {
    let rep = match key {
        Some(key) => {
            let rep = get_rep(scope, key)?;
            if rep.is_mutable(txn_id) {
                return Ok(key.clone());
            }
            match &rep.contents {
                RepContents::Fulltext { string_key } => {
                    let copied = strings::copy(scope, string_key)?;
                    Representation::fulltext(copied, Some(txn_id.clone()))
                }
                RepContents::Delta { .. } => {
                    let contents = rep_contents(scope, config, cancel, key)?;
                    let new_string = strings::append(scope, None, &contents)?;
                    Representation::fulltext(new_string, Some(txn_id.clone()))
                }
            }
        }
        None => {
            let new_string = strings::append(scope, None, &[])?;
            Representation::fulltext(new_string, Some(txn_id.clone()))
        }
    };
    put_new_rep(scope, &rep)
}

/// Append bytes to a mutable fulltext representation
pub fn rep_append(
    scope: &mut WriteScope<'_>,
    key: &RepKey,
    bytes: &[u8],
    txn_id: &TxnId,
) -> Result<()> {
    let rep = get_rep(scope, key)?;
    if !rep.is_mutable(txn_id) {
        return Err(FsError::not_mutable(format!("representation '{}'", key)));
    }
    match &rep.contents {
        RepContents::Fulltext { string_key } => {
            strings::append(scope, Some(string_key), bytes)?;
            Ok(())
        }
        // Mutable representations are created fulltext and stay fulltext;
        // a mutable delta cannot have been written by this code.
        RepContents::Delta { .. } => Err(FsError::corrupt(format!(
            "representation '{}' is both mutable and a delta",
            key
        ))),
    }
}

/// Reset a mutable representation to an empty fulltext
pub fn rep_contents_clear(scope: &mut WriteScope<'_>, key: &RepKey, txn_id: &TxnId) -> Result<()> {
    let rep = get_rep(scope, key)?;
    if !rep.is_mutable(txn_id) {
        return Err(FsError::not_mutable(format!("representation '{}'", key)));
    }
    match &rep.contents {
        RepContents::Fulltext { string_key } => strings::clear(scope, string_key),
        RepContents::Delta { .. } => {
            let old_keys = rep.string_keys();
            let new_string = strings::append(scope, None, &[])?;
            put_rep(
                scope,
                key,
                &Representation::fulltext(new_string, Some(txn_id.clone())),
            )?;
            for old in &old_keys {
                strings::delete(scope, old)?;
            }
            Ok(())
        }
    }
}

/// Delete a representation and its strings, but only when it is mutable
/// under `txn_id`
///
/// Immutable representations are silently left alone, so abort can walk
/// everything a transaction touched without special cases.
pub fn delete_rep_if_mutable(scope: &mut WriteScope<'_>, key: &RepKey, txn_id: &TxnId) -> Result<()> {
    let rep = get_rep(scope, key)?;
    if !rep.is_mutable(txn_id) {
        return Ok(());
    }
    for string_key in rep.string_keys() {
        strings::delete(scope, &string_key)?;
    }
    delete_rep(scope, key)
}

// =============================================================================
// Deltified storage
// =============================================================================

/// Re-store `target` as an svndiff delta against `source`
///
/// Both representations must be committed, on the same node's line of
/// history, and distinct: a representation deltified against itself
/// would leave no fulltext reachable in the chain. Fulltexts below the
/// configured minimum stay as they are: small files are cheaper to read
/// inline than through a chain. When the encoded delta is not smaller
/// than the existing storage, the freshly written windows are discarded
/// and the target keeps its current form.
pub fn rep_deltify(
    scope: &mut WriteScope<'_>,
    config: &FsConfig,
    cancel: &Cancel,
    target: &RepKey,
    source: &RepKey,
) -> Result<()> {
    if target == source {
        return Err(FsError::corrupt(format!(
            "attempt to deltify '{}' against itself",
            target
        )));
    }

    let size = rep_contents_size(scope, target)?;
    if size < config.deltify_min_size {
        return Ok(());
    }

    let source_full = rep_contents(scope, config, cancel, source)?;
    let target_full = rep_contents(scope, config, cancel, target)?;
    let digest = Checksum::md5(&target_full);

    let windows = diff_windows(&source_full, &target_full, config.delta_window_size);
    if windows.is_empty() {
        return Ok(());
    }

    // Buffer each window into its own string, tracking the total.
    let mut chunks = Vec::with_capacity(windows.len());
    let mut diff_size = 0u64;
    let mut text_offset = 0u64;
    for window in &windows {
        cancel.check()?;
        let encoded = encode_window(window);
        diff_size += encoded.len() as u64;
        let window_key = strings::append(scope, None, &encoded)?;
        chunks.push(DeltaChunk {
            text_offset,
            text_length: window.tview_len as u64,
            source: source.clone(),
            window_key,
            md5: digest,
        });
        text_offset += window.tview_len as u64;
    }

    // Compare against the actual storage the target occupies today.
    let old_rep = get_rep(scope, target)?;
    let old_keys = old_rep.string_keys();
    let mut old_size = 0u64;
    for key in &old_keys {
        old_size += strings::size(scope, key)?;
    }

    if diff_size >= old_size {
        tracing::debug!(%target, %source, diff_size, old_size, "deltification not smaller, keeping fulltext");
        for chunk in &chunks {
            strings::delete(scope, &chunk.window_key)?;
        }
        return Ok(());
    }

    put_rep(
        scope,
        target,
        &Representation {
            txn_id: None,
            contents: RepContents::Delta { chunks },
        },
    )?;
    for key in &old_keys {
        strings::delete(scope, key)?;
    }
    tracing::debug!(%target, %source, diff_size, old_size, "deltified representation");
    Ok(())
}

/// Rewrite a delta representation back into a fulltext
pub fn rep_undeltify(
    scope: &mut WriteScope<'_>,
    config: &FsConfig,
    cancel: &Cancel,
    key: &RepKey,
) -> Result<()> {
    let rep = get_rep(scope, key)?;
    if rep.is_fulltext() {
        return Ok(());
    }
    let old_keys = rep.string_keys();
    let contents = rep_contents(scope, config, cancel, key)?;
    let new_string = strings::append(scope, None, &contents)?;
    put_rep(scope, key, &Representation::fulltext(new_string, rep.txn_id))?;
    for old in &old_keys {
        strings::delete(scope, old)?;
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
