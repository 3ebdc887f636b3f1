//! Sample types: the content identity of a submitted file.

use serde::{Deserialize, Serialize};

/// A stored sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub id: SampleId,
    pub file_size: i64,
    pub file_type: Option<String>,
    #[serde(flatten)]
    pub hashes: FileHashes,
    /// Fuzzy hash, when the fingerprinter produced one.
    pub ssdeep: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SampleId(pub i64);

impl std::fmt::Display for SampleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The dedup key. Two samples never share all five values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileHashes {
    pub md5: String,
    pub crc32: String,
    pub sha1: String,
    pub sha256: String,
    pub sha512: String,
}

/// What a fingerprinter reports about a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub hashes: FileHashes,
    pub size: u64,
    pub file_type: Option<String>,
    pub ssdeep: Option<String>,
}

/// Parameters for inserting a sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSample {
    pub hashes: FileHashes,
    pub file_size: i64,
    pub file_type: Option<String>,
    pub ssdeep: Option<String>,
}

impl NewSample {
    pub fn new(hashes: FileHashes, file_size: i64) -> Self {
        Self {
            hashes,
            file_size,
            file_type: None,
            ssdeep: None,
        }
    }

    pub fn file_type(mut self, file_type: impl Into<String>) -> Self {
        self.file_type = Some(file_type.into());
        self
    }

    pub fn ssdeep(mut self, ssdeep: impl Into<String>) -> Self {
        self.ssdeep = Some(ssdeep.into());
        self
    }
}

impl From<FileInfo> for NewSample {
    fn from(info: FileInfo) -> Self {
        Self {
            hashes: info.hashes,
            file_size: i64::try_from(info.size).unwrap_or(i64::MAX),
            file_type: info.file_type,
            ssdeep: info.ssdeep,
        }
    }
}
