use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::PageId;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Block-level access to one page file. Page `n` lives at byte `n * page_size`.
pub struct PageManager {
    file: File,
    page_size: usize,
}

impl PageManager {
    pub fn create(path: &Path, page_size: usize) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        Ok(Self { file, page_size })
    }

    /// Open an existing file, creating it empty if it does not exist.
    pub fn open(path: &Path, page_size: usize) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        Ok(Self { file, page_size })
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Read exactly one page.
    pub fn read_page(&mut self, page_id: PageId) -> StorageResult<Vec<u8>> {
        let offset = self.page_offset(page_id);
        let file_size = self.file.metadata()?.len();

        if offset >= file_size {
            return Err(StorageError::PageOutOfRange {
                page_id,
                num_pages: self.pages_for(file_size),
            });
        }

        self.file.seek(SeekFrom::Start(offset))?;

        let mut buf = vec![0u8; self.page_size];
        let mut read = 0;
        while read < buf.len() {
            match self.file.read(&mut buf[read..])? {
                0 => break,
                n => read += n,
            }
        }
        if read != self.page_size {
            return Err(StorageError::ShortRead {
                page_id,
                read,
                expected: self.page_size,
            });
        }

        Ok(buf)
    }

    /// Write one page image, extending the file if the page lies past its end.
    pub fn write_page(&mut self, page_id: PageId, data: &[u8]) -> StorageResult<()> {
        if data.len() != self.page_size {
            return Err(StorageError::InvalidPageSize {
                expected: self.page_size,
                actual: data.len(),
            });
        }

        let offset = self.page_offset(page_id);
        let file_size = self.file.metadata()?.len();

        if offset >= file_size {
            self.file.set_len(offset + self.page_size as u64)?;
        }

        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        self.file.sync_data()?;

        Ok(())
    }

    /// `ceil(file_length / page_size)`.
    pub fn num_pages(&self) -> StorageResult<u32> {
        let file_size = self.file.metadata()?.len();
        Ok(self.pages_for(file_size))
    }

    fn pages_for(&self, file_size: u64) -> u32 {
        file_size.div_ceil(self.page_size as u64) as u32
    }

    fn page_offset(&self, page_id: PageId) -> u64 {
        page_id.page_number as u64 * self.page_size as u64
    }
}
