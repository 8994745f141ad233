//! The commit editor
//!
//! The editor protocol drives a transaction through baton-passing calls:
//! open the root, open or add directories and files beneath it, stream
//! text deltas into files, buffer property changes on the batons, and
//! close everything in bracketed order. `close_edit` commits and yields
//! the new revision number.
//!
//! Batons are owned values: directory and file batons hold their path and
//! their buffered property changes, which are applied when the baton is
//! closed. Dropping a baton without closing it simply discards the
//! buffered properties; the underlying transaction keeps any tree or
//! text changes already made.

use crate::txn::Transaction;
use chronofs_core::{path, Checksum, FsError, NodeKind, Result, Revnum};

/// A directory opened by the editor
#[derive(Debug)]
pub struct DirBaton {
    path: String,
    prop_changes: Vec<(String, Option<Vec<u8>>)>,
}

impl DirBaton {
    /// The directory's canonical path
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// A file opened by the editor
#[derive(Debug)]
pub struct FileBaton {
    path: String,
    prop_changes: Vec<(String, Option<Vec<u8>>)>,
}

impl FileBaton {
    /// The file's canonical path
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// A sink for one file's svndiff stream
///
/// Obtained from [`TxnEditor::apply_textdelta`]; feed it the raw svndiff
/// bytes and close it to apply the windows.
pub struct TextDeltaSink<'a> {
    txn: &'a Transaction,
    path: String,
    base_checksum: Option<Checksum>,
    buf: Vec<u8>,
}

impl TextDeltaSink<'_> {
    /// Append raw svndiff bytes
    pub fn write(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Decode and apply the buffered stream against the file
    pub fn close(self) -> Result<()> {
        self.txn
            .apply_text(&self.path, self.base_checksum.as_ref(), &self.buf)
    }
}

/// An editor bound to one transaction
///
/// Consumes the transaction; `close_edit` commits it, `abort_edit` purges
/// it.
#[derive(Debug)]
pub struct TxnEditor {
    txn: Transaction,
}

impl TxnEditor {
    /// Wrap a transaction in an editor
    pub fn new(txn: Transaction) -> TxnEditor {
        TxnEditor { txn }
    }

    /// The underlying transaction
    pub fn txn(&self) -> &Transaction {
        &self.txn
    }

    /// Open the root directory
    ///
    /// `base_rev` is the driver's idea of the tree it is editing; a value
    /// newer than the transaction's base is out of date.
    pub fn open_root(&mut self, base_rev: Revnum) -> Result<DirBaton> {
        if base_rev > self.txn.base_rev()? {
            return Err(FsError::OutOfDate { path: "/".into() });
        }
        Ok(DirBaton {
            path: "/".to_string(),
            prop_changes: Vec::new(),
        })
    }

    /// A base revision older than the node's created revision means the
    /// driver is editing a tree that has moved on underneath it.
    fn check_out_of_date(&self, target: &str, base_rev: Option<Revnum>) -> Result<()> {
        if let (Some(base_rev), Some(created_rev)) = (base_rev, self.txn.created_rev(target)?) {
            if base_rev < created_rev {
                return Err(FsError::OutOfDate {
                    path: target.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Delete an entry of an open directory
    pub fn delete_entry(
        &mut self,
        name: &str,
        base_rev: Option<Revnum>,
        parent: &DirBaton,
    ) -> Result<()> {
        let target = path::join(&parent.path, name);
        self.check_out_of_date(&target, base_rev)?;
        self.txn.delete(&target)
    }

    /// Add a directory, optionally copied from a committed revision
    pub fn add_directory(
        &mut self,
        name: &str,
        parent: &DirBaton,
        copy_from: Option<(&str, Revnum)>,
    ) -> Result<DirBaton> {
        let child_path = path::join(&parent.path, name);
        match copy_from {
            Some((from_path, from_rev)) => {
                self.txn.copy(from_rev, from_path, &child_path)?;
            }
            None => self.txn.make_dir(&child_path)?,
        }
        Ok(DirBaton {
            path: child_path,
            prop_changes: Vec::new(),
        })
    }

    /// Open an existing directory
    pub fn open_directory(
        &mut self,
        name: &str,
        parent: &DirBaton,
        base_rev: Option<Revnum>,
    ) -> Result<DirBaton> {
        let child_path = path::join(&parent.path, name);
        match self.txn.check_path(&child_path)? {
            Some(NodeKind::Dir) => {
                self.check_out_of_date(&child_path, base_rev)?;
                Ok(DirBaton {
                    path: child_path,
                    prop_changes: Vec::new(),
                })
            }
            Some(NodeKind::File) => Err(FsError::NotDirectory { path: child_path }),
            None => Err(FsError::PathNotFound { path: child_path }),
        }
    }

    /// Add a file, optionally copied from a committed revision
    pub fn add_file(
        &mut self,
        name: &str,
        parent: &DirBaton,
        copy_from: Option<(&str, Revnum)>,
    ) -> Result<FileBaton> {
        let child_path = path::join(&parent.path, name);
        match copy_from {
            Some((from_path, from_rev)) => {
                self.txn.copy(from_rev, from_path, &child_path)?;
            }
            None => self.txn.make_file(&child_path)?,
        }
        Ok(FileBaton {
            path: child_path,
            prop_changes: Vec::new(),
        })
    }

    /// Open an existing file
    pub fn open_file(
        &mut self,
        name: &str,
        parent: &DirBaton,
        base_rev: Option<Revnum>,
    ) -> Result<FileBaton> {
        let child_path = path::join(&parent.path, name);
        match self.txn.check_path(&child_path)? {
            Some(NodeKind::File) => {
                self.check_out_of_date(&child_path, base_rev)?;
                Ok(FileBaton {
                    path: child_path,
                    prop_changes: Vec::new(),
                })
            }
            Some(NodeKind::Dir) => Err(FsError::NotFile { path: child_path }),
            None => Err(FsError::PathNotFound { path: child_path }),
        }
    }

    /// Obtain the svndiff sink for a file's new contents
    pub fn apply_textdelta(
        &mut self,
        file: &FileBaton,
        base_checksum: Option<Checksum>,
    ) -> Result<TextDeltaSink<'_>> {
        Ok(TextDeltaSink {
            txn: &self.txn,
            path: file.path.clone(),
            base_checksum,
            buf: Vec::new(),
        })
    }

    /// Buffer a file property change; applied on `close_file`
    pub fn change_file_prop(&mut self, file: &mut FileBaton, name: &str, value: Option<Vec<u8>>) {
        file.prop_changes.push((name.to_string(), value));
    }

    /// Buffer a directory property change; applied on `close_directory`
    pub fn change_dir_prop(&mut self, dir: &mut DirBaton, name: &str, value: Option<Vec<u8>>) {
        dir.prop_changes.push((name.to_string(), value));
    }

    /// Close a file: apply its buffered properties and verify the
    /// driver's checksum of the final text
    pub fn close_file(&mut self, file: FileBaton, checksum: Option<&Checksum>) -> Result<()> {
        for (name, value) in &file.prop_changes {
            self.txn.set_node_prop(&file.path, name, value.as_deref())?;
        }
        self.txn.finalize_file(&file.path, checksum)
    }

    /// Close a directory: apply its buffered properties
    pub fn close_directory(&mut self, dir: DirBaton) -> Result<()> {
        for (name, value) in &dir.prop_changes {
            self.txn.set_node_prop(&dir.path, name, value.as_deref())?;
        }
        Ok(())
    }

    /// Commit the transaction, yielding the new revision number
    pub fn close_edit(self) -> Result<Revnum> {
        self.txn.commit()
    }

    /// Abort the edit and the underlying transaction
    pub fn abort_edit(self) -> Result<()> {
        self.txn.abort()
    }
}
