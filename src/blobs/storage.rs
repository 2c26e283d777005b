//! Content-addressed image files.
//!
//! Each image lives at `<shard>/<hash>` as `IMG\0`, a format byte, the
//! little-endian content length, the content and a CRC32 of the content.
//! Files are written under a temporary name and renamed into place, so a
//! crash never leaves a partial file at the final path. Files from before
//! that rule, or damaged ones, are rewritten the next time the same image is
//! stored.

use crate::error::{Result, StoreError};
use crate::types::Hash;
use lru::LruCache;
use parking_lot::Mutex;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

const IMAGE_MAGIC: &[u8; 4] = b"IMG\0";

const IMAGE_FORMAT: u8 = 1;

/// magic + format + content length.
const HEADER_LEN: usize = 4 + 1 + 8;

const CHECKSUM_LEN: usize = 4;

const TMP_SUFFIX: &str = "tmp";

/// Image files keyed by the SHA-256 of their bytes, with an LRU cache of
/// recently used images.
pub struct BlobStorage {
    root: PathBuf,
    cache: Mutex<LruCache<Hash, Vec<u8>>>,
}

impl BlobStorage {
    pub fn new(root: impl AsRef<Path>, cache_size: usize) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;

        let capacity = NonZeroUsize::new(cache_size).unwrap_or(NonZeroUsize::MIN);

        Ok(Self {
            root,
            cache: Mutex::new(LruCache::new(capacity)),
        })
    }

    /// Store image bytes, returning their hash.
    ///
    /// An intact file for the same bytes is reused. A damaged one is
    /// replaced.
    pub fn store(&self, image: &[u8]) -> Result<Hash> {
        let hash = Hash::from_bytes(image);

        if self.cache.lock().contains(&hash) {
            return Ok(hash);
        }

        match self.load(&hash) {
            Ok(Some(_)) => return Ok(hash),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(%hash, "rewriting damaged image file: {e}");
            }
        }

        self.write_file(&hash, image)?;
        self.cache.lock().put(hash, image.to_vec());

        Ok(hash)
    }

    /// Image bytes for `hash`, or `None` if no file exists.
    pub fn get(&self, hash: &Hash) -> Result<Option<Vec<u8>>> {
        if let Some(image) = self.cache.lock().get(hash) {
            return Ok(Some(image.clone()));
        }

        self.load(hash)
    }

    /// Remove the image file. Returns whether one existed.
    pub fn delete(&self, hash: &Hash) -> Result<bool> {
        self.cache.lock().pop(hash);

        match fs::remove_file(self.file_path(hash)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Hashes of every image file on disk.
    pub fn list(&self) -> Result<Vec<Hash>> {
        let mut hashes = Vec::new();
        self.for_each_file(|path| {
            let name = path.file_name().map(|name| name.to_string_lossy());
            if let Some(Ok(hash)) = name.map(|name| Hash::from_hex(&name)) {
                hashes.push(hash);
            }
            Ok(())
        })?;
        Ok(hashes)
    }

    /// Bytes used by image files on disk.
    pub fn total_size(&self) -> Result<u64> {
        let mut total = 0;
        self.for_each_file(|path| {
            total += fs::metadata(path)?.len();
            Ok(())
        })?;
        Ok(total)
    }

    /// Read and verify the file for `hash`, caching the image on success.
    fn load(&self, hash: &Hash) -> Result<Option<Vec<u8>>> {
        let bytes = match fs::read(self.file_path(hash)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let image = decode_image(&bytes, hash)?;
        self.cache.lock().put(*hash, image.clone());

        Ok(Some(image))
    }

    fn write_file(&self, hash: &Hash, image: &[u8]) -> Result<()> {
        let path = self.file_path(hash);
        if let Some(shard) = path.parent() {
            fs::create_dir_all(shard)?;
        }

        let tmp_path = path.with_extension(TMP_SUFFIX);
        let mut file = File::create(&tmp_path)?;
        file.write_all(&encode_image(image))?;
        file.sync_all()?;

        fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    fn for_each_file(&self, mut f: impl FnMut(&Path) -> Result<()>) -> Result<()> {
        for shard in fs::read_dir(&self.root)? {
            let shard = shard?;
            if !shard.file_type()?.is_dir() {
                continue;
            }
            for entry in fs::read_dir(shard.path())? {
                let path = entry?.path();
                if path.extension().is_some_and(|ext| ext == TMP_SUFFIX) {
                    continue;
                }
                f(&path)?;
            }
        }
        Ok(())
    }

    fn file_path(&self, hash: &Hash) -> PathBuf {
        self.root.join(hash.shard_prefix()).join(hash.to_hex())
    }
}

fn encode_image(image: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_LEN + image.len() + CHECKSUM_LEN);
    buf.extend_from_slice(IMAGE_MAGIC);
    buf.push(IMAGE_FORMAT);
    buf.extend_from_slice(&(image.len() as u64).to_le_bytes());
    buf.extend_from_slice(image);
    buf.extend_from_slice(&crc32fast::hash(image).to_le_bytes());
    buf
}

fn decode_image(bytes: &[u8], hash: &Hash) -> Result<Vec<u8>> {
    if bytes.len() < HEADER_LEN + CHECKSUM_LEN {
        return Err(StoreError::Corruption(format!(
            "image {hash} is truncated ({} bytes)",
            bytes.len()
        )));
    }

    let (header, rest) = bytes.split_at(HEADER_LEN);
    if &header[..4] != IMAGE_MAGIC {
        return Err(StoreError::InvalidFormat("Invalid image magic".into()));
    }
    if header[4] != IMAGE_FORMAT {
        return Err(StoreError::InvalidFormat(format!(
            "Unsupported image format: {}",
            header[4]
        )));
    }

    let mut len_bytes = [0u8; 8];
    len_bytes.copy_from_slice(&header[5..HEADER_LEN]);
    let len = u64::from_le_bytes(len_bytes);
    if len != (rest.len() - CHECKSUM_LEN) as u64 {
        return Err(StoreError::Corruption(format!(
            "image {hash} declares {len} bytes, file holds {}",
            rest.len() - CHECKSUM_LEN
        )));
    }

    let (image, checksum) = rest.split_at(rest.len() - CHECKSUM_LEN);
    let mut checksum_bytes = [0u8; 4];
    checksum_bytes.copy_from_slice(checksum);
    let expected = u32::from_le_bytes(checksum_bytes);
    let got = crc32fast::hash(image);
    if expected != got {
        return Err(StoreError::ChecksumMismatch { expected, got });
    }

    let computed = Hash::from_bytes(image);
    if &computed != hash {
        return Err(StoreError::HashMismatch {
            expected: *hash,
            got: computed,
        });
    }

    Ok(image.to_vec())
}
