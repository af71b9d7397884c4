use super::{OpenFile, Result, StorageError};

/// 要求整块传输的读写：不足即视为存储故障
pub trait OpenFileExt {
    fn read_exact_at(&self, offset: usize, buf: &mut [u8]) -> Result<()>;
    fn write_all_at(&self, offset: usize, buf: &[u8]) -> Result<()>;
}

impl<F: OpenFile + ?Sized> OpenFileExt for F {
    fn read_exact_at(&self, offset: usize, buf: &mut [u8]) -> Result<()> {
        let actual = self.read_at(offset, buf)?;
        if actual == buf.len() {
            Ok(())
        } else {
            Err(StorageError::ShortTransfer {
                expected: buf.len(),
                actual,
            })
        }
    }

    fn write_all_at(&self, offset: usize, buf: &[u8]) -> Result<()> {
        let actual = self.write_at(offset, buf)?;
        if actual == buf.len() {
            Ok(())
        } else {
            Err(StorageError::ShortTransfer {
                expected: buf.len(),
                actual,
            })
        }
    }
}
