//! Byte sources the coordinator reads chunks from

use std::io::{self, SeekFrom};
use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::Mutex;

#[async_trait]
pub trait ChunkSource: Send + Sync {
    fn file_name(&self) -> &str;

    fn size(&self) -> u64;

    /// Read exactly `len` bytes starting at `offset`
    async fn read_chunk(&self, offset: u64, len: u64) -> io::Result<Bytes>;
}

fn check_range(offset: u64, len: u64, size: u64) -> io::Result<()> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("range {}+{} past end of {} bytes", offset, len, size),
        )),
    }
}

/// Local file, read one chunk at a time
pub struct FileSource {
    file_name: String,
    size: u64,
    file: Mutex<File>,
}

impl FileSource {
    pub async fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).await?;
        let size = file.metadata().await?.len();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Self {
            file_name,
            size,
            file: Mutex::new(file),
        })
    }
}

#[async_trait]
impl ChunkSource for FileSource {
    fn file_name(&self) -> &str {
        &self.file_name
    }

    fn size(&self) -> u64 {
        self.size
    }

    async fn read_chunk(&self, offset: u64, len: u64) -> io::Result<Bytes> {
        check_range(offset, len, self.size)?;

        let mut file = self.file.lock().await;
        file.seek(SeekFrom::Start(offset)).await?;

        let mut buf = vec![0u8; len as usize];
        file.read_exact(&mut buf).await?;
        Ok(Bytes::from(buf))
    }
}

/// In-memory bytes, mostly for tests
pub struct MemorySource {
    file_name: String,
    data: Bytes,
}

impl MemorySource {
    pub fn new(file_name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            data: data.into(),
        }
    }
}

#[async_trait]
impl ChunkSource for MemorySource {
    fn file_name(&self) -> &str {
        &self.file_name
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    async fn read_chunk(&self, offset: u64, len: u64) -> io::Result<Bytes> {
        check_range(offset, len, self.size())?;
        Ok(self.data.slice(offset as usize..(offset + len) as usize))
    }
}
