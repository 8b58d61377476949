// ============================================================
// Layer 4: TFRecord Dataset
// ============================================================
// Indexes every record of every shard up front, then decodes
// examples on demand. Random access is what lets the pipeline
// shuffle and decode on several threads at once.

use anyhow::{ensure, Context, Result};
use std::{fs::File, path::PathBuf};

use crate::data::decoder::ImageDecoder;
use crate::data::example::Example;
use crate::data::tfrecord::{index_shard, read_span, RecordSpan};
use crate::domain::sample::ImageSample;
use crate::domain::traits::SampleSource;

#[derive(Debug, Clone, Copy)]
struct RecordLocation {
    shard: usize,
    span:  RecordSpan,
}

pub struct TfRecordDataset {
    shards:  Vec<PathBuf>,
    records: Vec<RecordLocation>,
    decoder: ImageDecoder,
}

impl TfRecordDataset {
    /// Index all shards. Fails on an empty shard list or an unreadable shard.
    pub fn open(shards: Vec<PathBuf>, decoder: ImageDecoder) -> Result<Self> {
        ensure!(!shards.is_empty(), "At least one TFRecord shard is required");

        let mut records = Vec::new();
        for (shard, path) in shards.iter().enumerate() {
            let spans = index_shard(path)?;
            records.extend(spans.into_iter().map(|span| RecordLocation { shard, span }));
        }

        tracing::info!("Indexed {} records across {} shards", records.len(), shards.len());
        Ok(Self { shards, records, decoder })
    }
}

impl SampleSource for TfRecordDataset {
    fn len(&self) -> usize {
        self.records.len()
    }

    fn read(&self, index: usize) -> Result<ImageSample> {
        let loc  = self.records[index];
        let path = &self.shards[loc.shard];

        let mut file = File::open(path)
            .with_context(|| format!("Cannot open TFRecord shard '{}'", path.display()))?;
        let payload = read_span(&mut file, loc.span)
            .with_context(|| format!("Cannot read record {index} from '{}'", path.display()))?;

        let example = Example::parse(&payload)?;
        self.decoder
            .decode(&example)
            .with_context(|| format!("Bad example at offset {} of '{}'", loc.span.offset, path.display()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::data::decoder::{KEY_CHANNELS, KEY_ENCODED, KEY_FORMAT, KEY_HEIGHT, KEY_LABEL, KEY_WIDTH};
    use crate::data::tfrecord::write_record;
    use crate::domain::sample::ImageShape;
    use prost::Message;
    use std::path::Path;

    /// Write a shard of single-channel raw examples, one per label,
    /// each filled with the given constant pixel value.
    pub(crate) fn write_shard(path: &Path, side: i64, examples: &[(u8, i64)]) {
        let mut buf = Vec::new();
        for (value, label) in examples {
            let ex = Example::default()
                .with_bytes(KEY_ENCODED, vec![*value; (side * side) as usize])
                .with_bytes(KEY_FORMAT, b"raw".to_vec())
                .with_int64(KEY_HEIGHT, side)
                .with_int64(KEY_WIDTH, side)
                .with_int64(KEY_CHANNELS, 1)
                .with_int64(KEY_LABEL, *label);
            write_record(&mut buf, &ex.encode_to_vec()).unwrap();
        }
        std::fs::write(path, buf).unwrap();
    }

    pub(crate) fn gray_decoder(side: usize, num_classes: usize) -> ImageDecoder {
        ImageDecoder::new(ImageShape::new(1, side, side), vec![0.0], vec![1.0], num_classes).unwrap()
    }

    #[test]
    fn test_records_span_shards_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.tfrecord");
        let b = dir.path().join("b.tfrecord");
        write_shard(&a, 2, &[(0, 0), (255, 1)]);
        write_shard(&b, 2, &[(51, 2)]);

        let ds = TfRecordDataset::open(vec![a, b], gray_decoder(2, 3)).unwrap();
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.read(1).unwrap().label, 1);

        let last = ds.read(2).unwrap();
        assert_eq!(last.label, 2);
        assert!((last.pixels[0] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_missing_shard_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.tfrecord");
        assert!(TfRecordDataset::open(vec![missing], gray_decoder(2, 2)).is_err());
        assert!(TfRecordDataset::open(Vec::new(), gray_decoder(2, 2)).is_err());
    }
}
