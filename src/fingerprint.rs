//! File fingerprinting: the hash set that identifies a sample's content.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};

use crate::error::Result;
use crate::model::{FileHashes, FileInfo};

/// Computes the content identity of a file.
///
/// Called before any transaction is opened; implementations may block.
pub trait Fingerprinter: Send + Sync {
    fn fingerprint(&self, path: &Path) -> Result<FileInfo>;
}

/// Default fingerprinter. Streams the file once through every digest.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileHasher;

impl Fingerprinter for FileHasher {
    fn fingerprint(&self, path: &Path) -> Result<FileInfo> {
        let mut reader = BufReader::new(File::open(path)?);
        hash_reader(&mut reader)
    }
}

const CHUNK: usize = 64 * 1024;

/// Hash everything `reader` yields.
pub fn hash_reader(reader: &mut impl Read) -> Result<FileInfo> {
    let mut md5 = Md5::new();
    let mut sha1 = Sha1::new();
    let mut sha256 = Sha256::new();
    let mut sha512 = Sha512::new();
    let mut crc = crc32fast::Hasher::new();

    let mut head = Vec::with_capacity(MAGIC_LEN);
    let mut size: u64 = 0;
    let mut buf = vec![0u8; CHUNK];

    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        let chunk = &buf[..n];
        if head.len() < MAGIC_LEN {
            let take = (MAGIC_LEN - head.len()).min(n);
            head.extend_from_slice(&chunk[..take]);
        }
        md5.update(chunk);
        sha1.update(chunk);
        sha256.update(chunk);
        sha512.update(chunk);
        crc.update(chunk);
        size += n as u64;
    }

    Ok(FileInfo {
        hashes: FileHashes {
            md5: hex::encode(md5.finalize()),
            crc32: format!("{:08X}", crc.finalize()),
            sha1: hex::encode(sha1.finalize()),
            sha256: hex::encode(sha256.finalize()),
            sha512: hex::encode(sha512.finalize()),
        },
        size,
        file_type: Some(sniff_type(&head).to_string()),
        ssdeep: None,
    })
}

const MAGIC_LEN: usize = 8;

/// Coarse file type from leading magic bytes.
fn sniff_type(head: &[u8]) -> &'static str {
    match head {
        [] => "empty",
        [b'M', b'Z', ..] => "PE32 executable",
        [0x7f, b'E', b'L', b'F', ..] => "ELF",
        [0xfe, 0xed, 0xfa, 0xce | 0xcf, ..] | [0xce | 0xcf, 0xfa, 0xed, 0xfe, ..] => "Mach-O",
        [b'%', b'P', b'D', b'F', ..] => "PDF document",
        [b'P', b'K', 0x03, 0x04, ..] => "Zip archive",
        [0x1f, 0x8b, ..] => "gzip compressed data",
        [0xd0, 0xcf, 0x11, 0xe0, ..] => "Composite Document File",
        [b'#', b'!', ..] => "script",
        _ => "data",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_digests_of_abc() {
        let info = hash_reader(&mut &b"abc"[..]).unwrap();
        assert_eq!(info.size, 3);
        assert_eq!(info.hashes.md5, "900150983cd24fb0d6963f7d28e17f72");
        assert_eq!(info.hashes.sha1, "a9993e364706816aba3e25717850c26c9cd0d89d");
        assert_eq!(
            info.hashes.sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(info.hashes.crc32, "352441C2");
        assert_eq!(info.hashes.sha512.len(), 128);
        assert_eq!(info.file_type.as_deref(), Some("data"));
        assert!(info.ssdeep.is_none());
    }

    #[test]
    fn sniffs_common_formats() {
        assert_eq!(sniff_type(b"MZ\x90\x00"), "PE32 executable");
        assert_eq!(sniff_type(b"\x7fELF\x02\x01"), "ELF");
        assert_eq!(sniff_type(b"%PDF-1.7"), "PDF document");
        assert_eq!(sniff_type(b"#!/bin/sh"), "script");
        assert_eq!(sniff_type(b""), "empty");
    }

    #[test]
    fn fingerprint_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.bin");
        std::fs::write(&path, b"MZ fake executable").unwrap();

        let info = FileHasher.fingerprint(&path).unwrap();
        assert_eq!(info.size, 18);
        assert_eq!(info.file_type.as_deref(), Some("PE32 executable"));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = FileHasher
            .fingerprint(Path::new("/definitely/not/here.bin"))
            .unwrap_err();
        assert!(matches!(err, crate::error::Error::Io(_)));
    }
}
