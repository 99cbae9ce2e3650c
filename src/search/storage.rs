//! Binary persistence for the product vector index.
//!
//! File format: vectors.bin
//!
//! Header (47 bytes):
//! - version: u8 (1)
//! - model_id: [u8; 32] (SHA256 hash of the embedding model name)
//! - dimensions: u16 (little-endian)
//! - entry_count: u64 (little-endian)
//! - checksum: u32 (CRC32 of the header fields before checksum)
//!
//! Entries (repeated entry_count times):
//! - id: u64 (little-endian)
//! - code_len: u16 (little-endian) + UTF-8 bytes
//! - desc_len: u32 (little-endian) + UTF-8 bytes
//! - vector: [f32; dimensions] (little-endian, byte-exact)
//!
//! The vector bytes are written exactly as produced by the embedding job, so
//! an index generated out of process loads without any float conversion.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::search::store::{CatalogEntry, EmbeddingRecord, LoadError, ProductStore};

/// Current file format version
const FORMAT_VERSION: u8 = 1;

/// Header size in bytes: version(1) + model_id(32) + dimensions(2) + entry_count(8) + checksum(4)
const HEADER_SIZE: usize = 47;

/// Reader/writer for the vector index file.
pub struct VectorStorage {
    path: PathBuf,
}

impl VectorStorage {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the full store from disk.
    ///
    /// Fails if the file is missing, corrupted, empty, written by a newer
    /// format version, or fingerprinted with a different embedding model.
    /// A failed load never yields a partially-usable store.
    pub fn load(&self, expected_model_id: &[u8; 32]) -> Result<ProductStore, LoadError> {
        let file = File::open(&self.path)?;
        let mut reader = BufReader::new(file);

        let header = Self::read_header(&mut reader)?;
        if header.model_id != *expected_model_id {
            return Err(LoadError::ModelMismatch);
        }
        if header.entry_count == 0 {
            return Err(LoadError::EmptyStore);
        }

        let dimensions = header.dimensions as usize;
        let mut records = Vec::with_capacity(header.entry_count as usize);
        for _ in 0..header.entry_count {
            records.push(Self::read_entry(&mut reader, dimensions)?);
        }

        // The entry count promised by the header must account for the whole file.
        let mut probe = [0u8; 1];
        if reader.read(&mut probe)? != 0 {
            return Err(LoadError::InvalidFormat(
                "trailing data after final entry".to_string(),
            ));
        }

        ProductStore::from_records(records)
    }

    /// Write records to disk atomically: temp file, then rename.
    pub fn save(
        &self,
        records: &[EmbeddingRecord],
        model_id: &[u8; 32],
    ) -> Result<(), LoadError> {
        let first = records.first().ok_or(LoadError::EmptyStore)?;
        let dimensions = first.vector.len();
        for record in records {
            if record.vector.len() != dimensions {
                return Err(LoadError::InconsistentDimensions {
                    id: record.entry.id,
                    expected: dimensions,
                    got: record.vector.len(),
                });
            }
        }
        if dimensions > u16::MAX as usize {
            return Err(LoadError::InvalidFormat(format!(
                "dimensionality {dimensions} exceeds format limit"
            )));
        }

        let temp_path = self.path.with_extension("tmp");
        let result = Self::write_to_file(&temp_path, records, dimensions, model_id);

        if result.is_err() {
            let _ = std::fs::remove_file(&temp_path);
            return result;
        }

        std::fs::rename(&temp_path, &self.path)?;
        Ok(())
    }

    fn write_to_file(
        path: &Path,
        records: &[EmbeddingRecord],
        dimensions: usize,
        model_id: &[u8; 32],
    ) -> Result<(), LoadError> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        Self::write_header(
            &mut writer,
            &Header {
                version: FORMAT_VERSION,
                model_id: *model_id,
                dimensions: dimensions as u16,
                entry_count: records.len() as u64,
            },
        )?;

        for record in records {
            Self::write_entry(&mut writer, record)?;
        }

        writer.flush()?;
        let file = writer
            .into_inner()
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        file.sync_all()?;

        Ok(())
    }

    fn read_header(reader: &mut impl Read) -> Result<Header, LoadError> {
        let mut header_bytes = [0u8; HEADER_SIZE];
        reader.read_exact(&mut header_bytes)?;

        let version = header_bytes[0];
        if version > FORMAT_VERSION {
            return Err(LoadError::VersionMismatch(version, FORMAT_VERSION));
        }

        let stored_checksum = u32::from_le_bytes([
            header_bytes[43],
            header_bytes[44],
            header_bytes[45],
            header_bytes[46],
        ]);
        if stored_checksum != crc32fast::hash(&header_bytes[0..43]) {
            return Err(LoadError::ChecksumMismatch);
        }

        let mut model_id = [0u8; 32];
        model_id.copy_from_slice(&header_bytes[1..33]);

        let dimensions = u16::from_le_bytes([header_bytes[33], header_bytes[34]]);
        let mut count_bytes = [0u8; 8];
        count_bytes.copy_from_slice(&header_bytes[35..43]);
        let entry_count = u64::from_le_bytes(count_bytes);

        Ok(Header {
            version,
            model_id,
            dimensions,
            entry_count,
        })
    }

    fn write_header(writer: &mut impl Write, header: &Header) -> Result<(), LoadError> {
        let mut header_bytes = [0u8; HEADER_SIZE];

        header_bytes[0] = header.version;
        header_bytes[1..33].copy_from_slice(&header.model_id);
        header_bytes[33..35].copy_from_slice(&header.dimensions.to_le_bytes());
        header_bytes[35..43].copy_from_slice(&header.entry_count.to_le_bytes());

        let checksum = crc32fast::hash(&header_bytes[0..43]);
        header_bytes[43..47].copy_from_slice(&checksum.to_le_bytes());

        writer.write_all(&header_bytes)?;
        Ok(())
    }

    fn read_entry(
        reader: &mut impl Read,
        dimensions: usize,
    ) -> Result<EmbeddingRecord, LoadError> {
        let mut id_bytes = [0u8; 8];
        reader.read_exact(&mut id_bytes)?;
        let id = u64::from_le_bytes(id_bytes);

        let mut len_bytes = [0u8; 2];
        reader.read_exact(&mut len_bytes)?;
        let code = Self::read_string(reader, u16::from_le_bytes(len_bytes) as usize)?;

        let mut len_bytes = [0u8; 4];
        reader.read_exact(&mut len_bytes)?;
        let description = Self::read_string(reader, u32::from_le_bytes(len_bytes) as usize)?;

        let mut vector_bytes = vec![0u8; dimensions * 4];
        reader.read_exact(&mut vector_bytes)?;
        let vector = vector_bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();

        Ok(EmbeddingRecord {
            entry: CatalogEntry {
                id,
                code,
                description,
            },
            vector,
        })
    }

    fn read_string(reader: &mut impl Read, len: usize) -> Result<String, LoadError> {
        let mut bytes = vec![0u8; len];
        reader.read_exact(&mut bytes)?;
        String::from_utf8(bytes)
            .map_err(|e| LoadError::InvalidFormat(format!("non-UTF-8 string field: {e}")))
    }

    fn write_entry(writer: &mut impl Write, record: &EmbeddingRecord) -> Result<(), LoadError> {
        let entry = &record.entry;
        if entry.code.len() > u16::MAX as usize {
            return Err(LoadError::InvalidFormat(format!(
                "code too long for entry {}",
                entry.id
            )));
        }
        if entry.description.len() > u32::MAX as usize {
            return Err(LoadError::InvalidFormat(format!(
                "description too long for entry {}",
                entry.id
            )));
        }

        writer.write_all(&entry.id.to_le_bytes())?;
        writer.write_all(&(entry.code.len() as u16).to_le_bytes())?;
        writer.write_all(entry.code.as_bytes())?;
        writer.write_all(&(entry.description.len() as u32).to_le_bytes())?;
        writer.write_all(entry.description.as_bytes())?;

        for &value in &record.vector {
            writer.write_all(&value.to_le_bytes())?;
        }

        Ok(())
    }
}

#[derive(Debug)]
struct Header {
    version: u8,
    model_id: [u8; 32],
    dimensions: u16,
    entry_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_model_id() -> [u8; 32] {
        let mut id = [0u8; 32];
        id[0] = 0xAB;
        id[31] = 0xCD;
        id
    }

    fn record(id: u64, code: &str, description: &str, vector: Vec<f32>) -> EmbeddingRecord {
        EmbeddingRecord {
            entry: CatalogEntry {
                id,
                code: code.to_string(),
                description: description.to_string(),
            },
            vector,
        }
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = VectorStorage::new(dir.path().join("vectors.bin"));
        let model_id = test_model_id();

        let records = vec![
            record(1, "EAN1", "Harry Potter book", vec![0.25, -1.5, 3.75]),
            record(2, "EAN2", "Kitchen blender", vec![1.0, 0.0, -0.125]),
            record(3, "EAN3", "Água mineral 500ml", vec![0.1, 0.2, 0.3]),
        ];

        storage.save(&records, &model_id).unwrap();
        assert!(storage.exists());

        let store = storage.load(&model_id).unwrap();
        assert_eq!(store.size(), 3);
        assert_eq!(store.dimensionality(), 3);

        // Vectors round trip to exact f32 bit patterns.
        assert_eq!(store.row(0), &[0.25, -1.5, 3.75]);
        assert_eq!(store.row(1), &[1.0, 0.0, -0.125]);

        let entry = store.entry(2);
        assert_eq!(entry.id, 3);
        assert_eq!(entry.code, "EAN3");
        assert_eq!(entry.description, "Água mineral 500ml");
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = VectorStorage::new(dir.path().join("nope.bin"));

        let result = storage.load(&test_model_id());
        assert!(matches!(result, Err(LoadError::Io(_))));
    }

    #[test]
    fn test_save_empty_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let storage = VectorStorage::new(dir.path().join("vectors.bin"));

        let result = storage.save(&[], &test_model_id());
        assert!(matches!(result, Err(LoadError::EmptyStore)));
        assert!(!storage.exists());
    }

    #[test]
    fn test_save_inconsistent_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let storage = VectorStorage::new(dir.path().join("vectors.bin"));

        let records = vec![
            record(1, "A", "a", vec![1.0, 2.0]),
            record(2, "B", "b", vec![1.0]),
        ];
        let result = storage.save(&records, &test_model_id());
        assert!(matches!(
            result,
            Err(LoadError::InconsistentDimensions { id: 2, .. })
        ));
    }

    #[test]
    fn test_model_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let storage = VectorStorage::new(dir.path().join("vectors.bin"));

        let records = vec![record(1, "A", "a", vec![1.0])];
        storage.save(&records, &test_model_id()).unwrap();

        let mut wrong_model_id = [0u8; 32];
        wrong_model_id[0] = 0xFF;
        let result = storage.load(&wrong_model_id);
        assert!(matches!(result, Err(LoadError::ModelMismatch)));
    }

    #[test]
    fn test_checksum_detects_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.bin");
        let storage = VectorStorage::new(path.clone());

        let records = vec![record(1, "A", "a", vec![1.0, 2.0])];
        storage.save(&records, &test_model_id()).unwrap();

        // Flip a byte inside the header's model id.
        let mut file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        use std::io::Seek;
        file.seek(std::io::SeekFrom::Start(10)).unwrap();
        file.write_all(&[0xFF]).unwrap();

        let result = storage.load(&test_model_id());
        assert!(matches!(result, Err(LoadError::ChecksumMismatch)));
    }

    #[test]
    fn test_version_from_the_future() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.bin");
        let storage = VectorStorage::new(path.clone());

        let records = vec![record(1, "A", "a", vec![1.0])];
        storage.save(&records, &test_model_id()).unwrap();

        let mut file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.write_all(&[99]).unwrap();

        let result = storage.load(&test_model_id());
        assert!(matches!(result, Err(LoadError::VersionMismatch(99, 1))));
    }

    #[test]
    fn test_truncated_file_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.bin");
        let storage = VectorStorage::new(path.clone());

        let records = vec![record(1, "A", "a", vec![1.0, 2.0, 3.0])];
        storage.save(&records, &test_model_id()).unwrap();

        let data = std::fs::read(&path).unwrap();
        std::fs::write(&path, &data[..data.len() - 4]).unwrap();

        let result = storage.load(&test_model_id());
        assert!(matches!(result, Err(LoadError::Io(_))));
    }

    #[test]
    fn test_trailing_data_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.bin");
        let storage = VectorStorage::new(path.clone());

        let records = vec![record(1, "A", "a", vec![1.0])];
        storage.save(&records, &test_model_id()).unwrap();

        let mut data = std::fs::read(&path).unwrap();
        data.extend_from_slice(&[0, 0, 0, 0]);
        std::fs::write(&path, &data).unwrap();

        let result = storage.load(&test_model_id());
        assert!(matches!(result, Err(LoadError::InvalidFormat(_))));
    }

    #[test]
    fn test_atomic_save_cleans_up_temp_file_on_error() {
        let path = PathBuf::from("/nonexistent/directory/vectors.bin");
        let storage = VectorStorage::new(path.clone());

        let records = vec![record(1, "A", "a", vec![1.0])];
        let result = storage.save(&records, &test_model_id());

        assert!(result.is_err());
        assert!(!path.with_extension("tmp").exists());
    }
}
