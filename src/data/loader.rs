use crate::data::{DataError, Sample, SequenceDataset};
use csv::ReaderBuilder;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Supported file formats
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FileFormat {
    Csv,
    Tsv,
    GzippedCsv,
    GzippedTsv,
}

/// Extensions probed when looking up a split by name, in order
const SPLIT_EXTENSIONS: &[&str] = &["csv", "tsv", "txt", "csv.gz", "tsv.gz", "txt.gz"];

impl FileFormat {
    /// Detect file format from path
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, DataError> {
        let path = path.as_ref();
        let ext = path.extension().and_then(|e| e.to_str());
        let stem = path.file_stem().and_then(|s| s.to_str());

        match (ext, stem) {
            (Some("gz"), Some(stem)) if stem.ends_with(".csv") => Ok(FileFormat::GzippedCsv),
            (Some("gz"), Some(stem)) if stem.ends_with(".tsv") || stem.ends_with(".txt") => {
                Ok(FileFormat::GzippedTsv)
            }
            (Some("csv"), _) => Ok(FileFormat::Csv),
            (Some("tsv"), _) | (Some("txt"), _) => Ok(FileFormat::Tsv),
            _ => Err(DataError::UnsupportedFormat {
                path: path.to_path_buf(),
            }),
        }
    }

    /// Get delimiter character
    pub fn delimiter(&self) -> u8 {
        match self {
            FileFormat::Csv | FileFormat::GzippedCsv => b',',
            FileFormat::Tsv | FileFormat::GzippedTsv => b'\t',
        }
    }

    /// Check if format is gzipped
    pub fn is_gzipped(&self) -> bool {
        matches!(self, FileFormat::GzippedCsv | FileFormat::GzippedTsv)
    }
}

/// Column layout of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordLayout {
    /// Values per time step
    pub channels: usize,
    /// `label,v0,...` when true, `label,length,v0,...` otherwise
    pub fix_length: bool,
    /// Values are token ids in `[0, vocab_size)` when set
    pub vocab_size: Option<usize>,
}

impl RecordLayout {
    pub fn new(channels: usize, fix_length: bool) -> Self {
        Self {
            channels: channels.max(1),
            fix_length,
            vocab_size: None,
        }
    }

    /// Require every value to be a token id below `vocab_size`
    pub fn with_vocab_size(mut self, vocab_size: usize) -> Self {
        self.vocab_size = Some(vocab_size);
        self
    }
}

/// Reads dataset splits from delimited, optionally gzipped, files
pub struct SplitLoader {
    layout: RecordLayout,
}

impl SplitLoader {
    pub fn new(layout: RecordLayout) -> Self {
        Self { layout }
    }

    /// Find `<dir>/<split>.<ext>` for the first supported extension
    pub fn find_split(dir: &Path, split: &str) -> Result<PathBuf, DataError> {
        SPLIT_EXTENSIONS
            .iter()
            .map(|ext| dir.join(format!("{split}.{ext}")))
            .find(|p| p.is_file())
            .ok_or_else(|| DataError::Missing {
                split: split.to_string(),
                dir: dir.to_path_buf(),
            })
    }

    /// Load a split by name from a dataset directory
    pub fn load_split(&self, dir: &Path, split: &str) -> Result<SequenceDataset, DataError> {
        let path = Self::find_split(dir, split)?;
        let samples = self.load(&path)?;
        Ok(SequenceDataset::new(split, samples))
    }

    /// Load samples from a file
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<Vec<Sample>, DataError> {
        let path = path.as_ref();
        info!("Loading data from {:?}", path);

        let format = FileFormat::from_path(path)?;
        debug!("Detected file format: {:?}", format);

        let file = File::open(path).map_err(|source| DataError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let samples = if format.is_gzipped() {
            self.parse_records(BufReader::new(GzDecoder::new(file)), format, path)?
        } else {
            self.parse_records(BufReader::new(file), format, path)?
        };

        info!("Loaded {} samples", samples.len());
        Ok(samples)
    }

    /// Parse records from reader
    fn parse_records<R: Read>(
        &self,
        reader: R,
        format: FileFormat,
        path: &Path,
    ) -> Result<Vec<Sample>, DataError> {
        let mut csv_reader = ReaderBuilder::new()
            .delimiter(format.delimiter())
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut samples = Vec::new();
        for (index, result) in csv_reader.records().enumerate() {
            let line = index + 1;
            let record = result.map_err(|e| DataError::Corrupt {
                path: path.to_path_buf(),
                line,
                reason: e.to_string(),
            })?;
            if record.iter().all(|f| f.is_empty()) {
                continue;
            }
            let sample = self.parse_sample(&record).map_err(|reason| DataError::Corrupt {
                path: path.to_path_buf(),
                line,
                reason,
            })?;
            samples.push(sample);
        }

        Ok(samples)
    }

    /// Parse a single sample from a delimited record
    fn parse_sample(&self, record: &csv::StringRecord) -> Result<Sample, String> {
        let mut fields = record.iter();

        let label = fields
            .next()
            .ok_or("missing label")?
            .parse::<usize>()
            .map_err(|e| format!("invalid label: {e}"))?;

        let declared = if self.layout.fix_length {
            None
        } else {
            let length = fields
                .next()
                .ok_or("missing length")?
                .parse::<usize>()
                .map_err(|e| format!("invalid length: {e}"))?;
            Some(length)
        };

        let values = fields
            .map(|f| f.parse::<f32>().map_err(|e| format!("invalid value {f:?}: {e}")))
            .collect::<Result<Vec<_>, _>>()?;

        let channels = self.layout.channels;
        if values.len() % channels != 0 {
            return Err(format!(
                "{} values do not divide into {} channels",
                values.len(),
                channels
            ));
        }

        if let Some(vocab_size) = self.layout.vocab_size {
            if let Some(token) = values
                .iter()
                .find(|&&v| v.fract() != 0.0 || v < 0.0 || v >= vocab_size as f32)
            {
                return Err(format!("token {token} is not an id below {vocab_size}"));
            }
        }

        let steps = values.len() / channels;
        let length = match declared {
            Some(length) if length > steps => {
                return Err(format!("length {length} exceeds {steps} stored steps"));
            }
            Some(length) => length,
            None => steps,
        };
        if length == 0 {
            return Err("empty sequence".to_string());
        }

        Ok(Sample::new(values, length, label))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::{Cursor, Write};

    #[test]
    fn test_file_format_detection() {
        assert_eq!(FileFormat::from_path("train.csv").unwrap(), FileFormat::Csv);
        assert_eq!(FileFormat::from_path("train.tsv").unwrap(), FileFormat::Tsv);
        assert_eq!(
            FileFormat::from_path("train.csv.gz").unwrap(),
            FileFormat::GzippedCsv
        );
        assert_eq!(
            FileFormat::from_path("train.txt.gz").unwrap(),
            FileFormat::GzippedTsv
        );
        assert!(FileFormat::from_path("train.pickle").is_err());
    }

    #[test]
    fn test_parse_fixed_length() {
        let data = "0,0.5,1.0,1.5\n2,3.0,2.0,1.0\n";
        let loader = SplitLoader::new(RecordLayout::new(1, true));
        let samples = loader
            .parse_records(Cursor::new(data), FileFormat::Csv, Path::new("train.csv"))
            .unwrap();

        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].label, 0);
        assert_eq!(samples[0].values, vec![0.5, 1.0, 1.5]);
        assert_eq!(samples[1].length, 3);
    }

    #[test]
    fn test_parse_variable_length() {
        let data = "1\t2\t0.1\t0.2\t0.0\t0.0\n";
        let loader = SplitLoader::new(RecordLayout::new(1, false));
        let samples = loader
            .parse_records(Cursor::new(data), FileFormat::Tsv, Path::new("dev.tsv"))
            .unwrap();

        assert_eq!(samples[0].length, 2);
        assert_eq!(samples[0].steps(1), 4);
    }

    #[test]
    fn test_corrupt_record_reports_line() {
        let data = "0,1.0,2.0\n1,abc,2.0\n";
        let loader = SplitLoader::new(RecordLayout::new(1, true));
        let err = loader
            .parse_records(Cursor::new(data), FileFormat::Csv, Path::new("train.csv"))
            .unwrap_err();

        assert!(matches!(err, DataError::Corrupt { line: 2, .. }));
    }

    #[test]
    fn test_tokens_outside_vocabulary_are_corrupt() {
        let loader = SplitLoader::new(RecordLayout::new(1, true).with_vocab_size(10));
        let valid = loader
            .parse_records(Cursor::new("1,9,0,3\n"), FileFormat::Csv, Path::new("train.csv"))
            .unwrap();
        assert_eq!(valid[0].values, vec![9.0, 0.0, 3.0]);

        for row in ["0,1,2\n1,9,9,9,12\n", "0,1,2\n1,-1,2\n", "0,1,2\n1,2.5,2\n"] {
            let err = loader
                .parse_records(Cursor::new(row), FileFormat::Csv, Path::new("train.csv"))
                .unwrap_err();
            assert!(matches!(err, DataError::Corrupt { line: 2, .. }), "{row:?}");
        }

        // Without a vocabulary any number is a plain value
        let plain = SplitLoader::new(RecordLayout::new(1, true));
        assert!(plain
            .parse_records(Cursor::new("1,9,9,9,12\n"), FileFormat::Csv, Path::new("train.csv"))
            .is_ok());
    }

    #[test]
    fn test_channels_must_divide_values() {
        let data = "0,1.0,2.0,3.0\n";
        let loader = SplitLoader::new(RecordLayout::new(2, true));
        assert!(loader
            .parse_records(Cursor::new(data), FileFormat::Csv, Path::new("train.csv"))
            .is_err());
    }

    #[test]
    fn test_load_gzipped_split() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("test.csv.gz");
        let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        encoder.write_all(b"3,1.0,2.0\n").unwrap();
        encoder.finish().unwrap();

        let loader = SplitLoader::new(RecordLayout::new(1, true));
        let dataset = loader.load_split(dir.path(), "test").unwrap();
        assert_eq!(dataset.len(), 1);
        assert_eq!(dataset.get(0).unwrap().label, 3);

        assert!(matches!(
            loader.load_split(dir.path(), "dev"),
            Err(DataError::Missing { .. })
        ));
    }
}
