use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use async_trait::async_trait;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use parking_lot::Mutex;
use protocol::codec::{FixedCodec, BLOCK_FILE_CODEC_VERSION};
use protocol::traits::BlockStorage;
use protocol::types::{BlockHeight, BlockPair};
use protocol::{ProtocolResult};

use crate::error::StorageError;

/// Single append-only file per chain (§4.C, §6): a codec-version byte
/// followed by a sequence of `{ uint32_le length; bytes encoded_block_pair }`
/// records. The in-memory `index` maps height to file offset and is rebuilt
/// by scanning on open; there is no in-file index.
struct FileInner {
    file:        File,
    index:       Vec<u64>, // index[h - 1] = offset of the length prefix for height h
    top_height:  BlockHeight,
}

impl FileInner {
    fn open(path: &Path) -> Result<Self, StorageError> {
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)?;

        let len = file.metadata()?.len();
        if len == 0 {
            file.write_u8(BLOCK_FILE_CODEC_VERSION)?;
            file.sync_all()?;
        }

        let mut index = Vec::new();
        file.seek(SeekFrom::Start(1))?;
        loop {
            let offset = file.seek(SeekFrom::Current(0))?;
            match file.read_u32::<LittleEndian>() {
                Ok(record_len) => {
                    index.push(offset);
                    file.seek(SeekFrom::Current(i64::from(record_len)))?;
                }
                Err(ref err) if err.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(err) => return Err(err.into()),
            }
        }

        let top_height = index.len() as BlockHeight;
        Ok(FileInner { file, index, top_height })
    }

    fn read_block(&mut self, height: BlockHeight) -> Result<BlockPair, StorageError> {
        let offset = *self
            .index
            .get((height - 1) as usize)
            .ok_or(StorageError::NotFound(height))?;
        self.file.seek(SeekFrom::Start(offset))?;
        let len = self.file.read_u32::<LittleEndian>()?;
        let mut buf = vec![0u8; len as usize];
        self.file.read_exact(&mut buf)?;
        BlockPair::decode_fixed(bytes::Bytes::from(buf)).map_err(|e| StorageError::Codec(e.to_string()))
    }

    fn append(&mut self, pair: &BlockPair, max_block_size: u64) -> Result<(), StorageError> {
        let encoded = pair.encode_fixed().map_err(|e| StorageError::Codec(e.to_string()))?;
        if encoded.len() as u64 > max_block_size {
            return Err(StorageError::BlockTooLarge(pair.height()));
        }

        let offset = self.file.seek(SeekFrom::End(0))?;
        self.file.write_u32::<LittleEndian>(encoded.len() as u32)?;
        self.file.write_all(&encoded)?;
        self.file.sync_all()?;

        self.index.push(offset);
        self.top_height = pair.height();
        Ok(())
    }
}

pub struct BlockFileStorage {
    inner:                 Mutex<FileInner>,
    max_block_size:        u64,
    max_protocol_version:  u32,
}

impl BlockFileStorage {
    pub fn open(path: &Path, max_block_size: u64, max_protocol_version: u32) -> ProtocolResult<Self> {
        let inner = FileInner::open(path)?;
        Ok(BlockFileStorage {
            inner: Mutex::new(inner),
            max_block_size,
            max_protocol_version,
        })
    }
}

#[async_trait]
impl BlockStorage for BlockFileStorage {
    async fn commit_block(&self, pair: BlockPair) -> ProtocolResult<()> {
        if pair.transactions_block.header.protocol_version > self.max_protocol_version {
            return Err(StorageError::ProtocolVersionTooHigh(pair.transactions_block.header.protocol_version).into());
        }

        let mut inner = self.inner.lock();
        let height = pair.height();
        let top = inner.top_height;

        if height <= top {
            let existing = inner.read_block(height)?;
            if existing.transactions_block.header == pair.transactions_block.header
                && existing.results_block.header == pair.results_block.header
            {
                return Ok(());
            }
            log::error!(
                target: "storage",
                "FORK!! block already in storage, timestamp mismatch at height {}",
                height
            );
            return Err(StorageError::ForkDetected {
                height,
                reason: "timestamp mismatch".to_owned(),
            }
            .into());
        }

        if height > top + 1 {
            return Err(StorageError::FutureBlockHeight { height, top }.into());
        }

        inner.append(&pair, self.max_block_size)?;
        Ok(())
    }

    async fn get_block_by_height(&self, height: BlockHeight) -> ProtocolResult<Option<BlockPair>> {
        let mut inner = self.inner.lock();
        if height == 0 || height > inner.top_height {
            return Ok(None);
        }
        Ok(Some(inner.read_block(height)?))
    }

    async fn top_height(&self) -> ProtocolResult<BlockHeight> {
        Ok(self.inner.lock().top_height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common_crypto::Hash;
    use protocol::types::{
        ResultsBlockContainer, ResultsBlockHeader, TransactionsBlockContainer, TransactionsBlockHeader,
    };

    fn pair(height: u64, timestamp: u64, prev_hash: Hash) -> BlockPair {
        let tx_header = TransactionsBlockHeader {
            protocol_version: 1,
            height,
            prev_block_hash: prev_hash,
            tx_count: 0,
            metadata_hash: Hash::ZERO,
            merkle_root: Hash::ZERO,
            timestamp,
            reference_time: timestamp / 1_000_000_000,
            proposer: common_crypto::NodeAddress([0u8; 20]),
        };
        let tx_block = TransactionsBlockContainer {
            header: tx_header.clone(),
            metadata: bytes::Bytes::new(),
            signed_transactions: Vec::new(),
            block_proof: Default::default(),
        };
        let results_header = ResultsBlockHeader {
            protocol_version: 1,
            height,
            prev_block_hash: Hash::ZERO,
            tx_block_hash_ptr: tx_block.hash(),
            state_diff_hash: Hash::ZERO,
            receipts_merkle_root: Hash::ZERO,
        };
        let results_block = ResultsBlockContainer {
            header: results_header,
            receipts: Vec::new(),
            state_diffs: Vec::new(),
            block_proof: Default::default(),
        };
        BlockPair { transactions_block: tx_block, results_block }
    }

    #[tokio::test]
    async fn commits_and_reads_back_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let storage = BlockFileStorage::open(&dir.path().join("blocks"), 1 << 20, 1).unwrap();

        storage.commit_block(pair(1, 1, Hash::ZERO)).await.unwrap();
        assert_eq!(storage.top_height().await.unwrap(), 1);

        let got = storage.get_block_by_height(1).await.unwrap().unwrap();
        assert_eq!(got.height(), 1);
    }

    #[tokio::test]
    async fn rebuilds_index_on_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocks");
        {
            let storage = BlockFileStorage::open(&path, 1 << 20, 1).unwrap();
            storage.commit_block(pair(1, 1, Hash::ZERO)).await.unwrap();
            storage.commit_block(pair(2, 2, Hash::ZERO)).await.unwrap();
        }
        let storage = BlockFileStorage::open(&path, 1 << 20, 1).unwrap();
        assert_eq!(storage.top_height().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn identical_recommit_is_silent_success() {
        let dir = tempfile::tempdir().unwrap();
        let storage = BlockFileStorage::open(&dir.path().join("blocks"), 1 << 20, 1).unwrap();
        let b1 = pair(1, 1, Hash::ZERO);
        storage.commit_block(b1.clone()).await.unwrap();
        storage.commit_block(b1).await.unwrap();
        assert_eq!(storage.top_height().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn differing_recommit_is_fork_detected() {
        let dir = tempfile::tempdir().unwrap();
        let storage = BlockFileStorage::open(&dir.path().join("blocks"), 1 << 20, 1).unwrap();
        storage.commit_block(pair(1, 1, Hash::ZERO)).await.unwrap();
        let err = storage.commit_block(pair(1, 2, Hash::ZERO)).await.unwrap_err();
        assert_eq!(err.kind(), protocol::ProtocolErrorKind::Storage);
        assert_eq!(storage.top_height().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn future_height_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let storage = BlockFileStorage::open(&dir.path().join("blocks"), 1 << 20, 1).unwrap();
        let err = storage.commit_block(pair(2, 1, Hash::ZERO)).await.unwrap_err();
        assert_eq!(err.kind(), protocol::ProtocolErrorKind::Storage);
    }
}
