//! Segment configuration and mapping.
//!
//! All shared state lives in one named segment, identified by a file link in
//! a configurable directory. The first process to create the link also sizes
//! and initializes the segment; later processes attach to whatever is there.

use serde_derive::{Deserialize, Serialize};
use shared_memory::{Shmem, ShmemConf, ShmemError};

use crate::errors::TachyonError;

/// Default file-link name identifying the segment.
pub static SEGMENT_FILE_NAME: &str = "tachyon_shm";

/// Allocation granularity of the pool, in bytes. The page size should be an
/// integer multiple of this.
pub const BLOCK_SIZE: usize = 128;

/// Default size of the pool's data region, in bytes.
pub const DEFAULT_POOL_SIZE: usize = 64_000;

/// Largest capacity a queue may be created with.
pub const MAX_QUEUE_CAPACITY: u32 = 1 << 20;

/// Where and how big the shared segment is. Every process that maps one
/// segment must use the same configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentConfig {
    pub data_dir: String,
    pub segment_file_name: String,
    /// Requested size of the pool data region in bytes. Rounded up to a
    /// multiple of [`BLOCK_SIZE`]; the mapping itself is slightly larger to
    /// hold the allocator metadata.
    pub pool_size: usize,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        SegmentConfig {
            data_dir: String::from("."),
            segment_file_name: String::from(SEGMENT_FILE_NAME),
            pool_size: DEFAULT_POOL_SIZE,
        }
    }
}

impl SegmentConfig {
    pub fn builder() -> SegmentConfigBuilder {
        SegmentConfigBuilder {
            config: SegmentConfig::default(),
        }
    }

    pub(crate) fn segment_file(&self) -> String {
        format!("{}/{}", self.data_dir, self.segment_file_name)
    }
}

pub struct SegmentConfigBuilder {
    config: SegmentConfig,
}

impl SegmentConfigBuilder {
    pub fn data_dir(mut self, data_dir: String) -> Self {
        self.config.data_dir = data_dir;
        self
    }

    pub fn segment_file_name(mut self, segment_file_name: String) -> Self {
        self.config.segment_file_name = segment_file_name;
        self
    }

    pub fn pool_size(mut self, pool_size: usize) -> Self {
        self.config.pool_size = pool_size;
        self
    }

    pub fn build(self) -> Result<SegmentConfig, TachyonError> {
        if self.config.pool_size == 0 {
            return Err(TachyonError::Config(String::from(
                "pool_size must be greater than zero",
            )));
        }
        if self.config.segment_file_name.is_empty() {
            return Err(TachyonError::Config(String::from(
                "segment_file_name must not be empty",
            )));
        }
        Ok(self.config)
    }
}

/// Maps the segment, creating it with `total_size` bytes if it does not exist
/// yet. Returns the mapping and whether this call created it; only the
/// creator may initialize shared state.
pub(crate) fn create_segment(
    cfg: &SegmentConfig,
    total_size: usize,
) -> Result<(Shmem, bool), TachyonError> {
    match ShmemConf::new()
        .size(total_size)
        .flink(cfg.segment_file())
        .create()
    {
        Ok(shmem) => Ok((shmem, true)),
        Err(ShmemError::LinkExists) => Ok((open_segment(cfg)?, false)),
        Err(shmem_err) => Err(TachyonError::SharedMemory(shmem_err)),
    }
}

/// Maps an existing segment. Never writes shared state.
pub(crate) fn open_segment(cfg: &SegmentConfig) -> Result<Shmem, TachyonError> {
    Ok(ShmemConf::new().flink(cfg.segment_file()).open()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = SegmentConfig::default();
        assert_eq!(cfg.segment_file_name, SEGMENT_FILE_NAME);
        assert_eq!(cfg.pool_size, DEFAULT_POOL_SIZE);
    }

    #[test]
    fn builder_overrides_fields() -> Result<(), TachyonError> {
        let cfg = SegmentConfig::builder()
            .data_dir(String::from("/dev/shm"))
            .segment_file_name(String::from("tachyon-test"))
            .pool_size(4096)
            .build()?;
        assert_eq!(cfg.data_dir, "/dev/shm");
        assert_eq!(cfg.segment_file(), "/dev/shm/tachyon-test");
        assert_eq!(cfg.pool_size, 4096);
        Ok(())
    }

    #[test]
    fn builder_rejects_zero_pool_size() {
        let result = SegmentConfig::builder().pool_size(0).build();
        assert!(matches!(result, Err(TachyonError::Config(_))));
    }
}
