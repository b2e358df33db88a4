//! On-disk image of a built tree.
//!
//! Layout: the magic bytes, one version byte, then the `bincode` encoding of
//! the tree (fanout, height, root, nodes and entries). Saves write a sibling
//! temp file and rename it over the target, so a reader never observes a
//! partially written image. Loads re-check every structural invariant before
//! handing the tree out.

use super::tree::RTree;
use crate::error::{GeoscanError, Result};
use bytes::{BufMut, Bytes, BytesMut};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

const SNAPSHOT_MAGIC: &[u8] = b"GEOSCAN_RTREE";
const SNAPSHOT_VERSION: u8 = 1;

/// Encode `tree` as a snapshot image.
pub fn to_bytes(tree: &RTree) -> Result<Bytes> {
    let body = bincode::serialize(tree)?;
    let mut buf = BytesMut::with_capacity(SNAPSHOT_MAGIC.len() + 1 + body.len());
    buf.put_slice(SNAPSHOT_MAGIC);
    buf.put_u8(SNAPSHOT_VERSION);
    buf.put_slice(&body);
    Ok(buf.freeze())
}

/// Decode a snapshot image produced by [`to_bytes`].
pub fn from_bytes(data: &[u8]) -> Result<RTree> {
    let Some(rest) = data.strip_prefix(SNAPSHOT_MAGIC) else {
        return Err(GeoscanError::InvalidFormat);
    };
    let Some((&version, body)) = rest.split_first() else {
        return Err(GeoscanError::InvalidFormat);
    };
    if version != SNAPSHOT_VERSION {
        return Err(GeoscanError::InvalidFormat);
    }

    let tree: RTree = bincode::deserialize(body)?;
    if let Err(e) = tree.validate() {
        log::warn!("Rejecting R-tree snapshot that fails validation: {}", e);
        return Err(GeoscanError::InvalidFormat);
    }
    Ok(tree)
}

/// A tree image stored at a fixed path.
pub struct TreeSnapshot {
    path: PathBuf,
}

impl TreeSnapshot {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn load(&self) -> Result<RTree> {
        let mut reader = BufReader::new(File::open(&self.path)?);
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        let tree = from_bytes(&data)?;
        log::debug!(
            "Loaded R-tree snapshot from {}: {} entries",
            self.path.display(),
            tree.len()
        );
        Ok(tree)
    }

    pub fn save(&self, tree: &RTree) -> Result<()> {
        let image = to_bytes(tree)?;
        let temp_path = self.temp_path();

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&image)?;
        writer.flush()?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        drop(file);

        std::fs::rename(&temp_path, &self.path)?;
        self.sync_parent_dir()?;

        log::debug!(
            "Saved R-tree snapshot to {}: {} bytes",
            self.path.display(),
            image.len()
        );
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        if let Some(name) = temp.file_name() {
            let mut new_name = name.to_string_lossy().into_owned();
            new_name.push_str(".tmp");
            temp.set_file_name(new_name);
        }
        temp
    }

    fn sync_parent_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            let dir = File::open(parent)?;
            dir.sync_all()?;
        }
        Ok(())
    }
}
