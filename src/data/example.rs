// ============================================================
// Layer 4: tf.train.Example Messages
// ============================================================
// Every TFRecord payload is a serialized `tf.train.Example`
// protobuf. The message set is tiny, so it is declared by hand
// with prost derives instead of generating it from .proto files:
//
//   Example  { Features features = 1; }
//   Features { map<string, Feature> feature = 1; }
//   Feature  { oneof kind { BytesList = 1; FloatList = 2; Int64List = 3; } }

use anyhow::{Context, Result};
use prost::Message;
use std::collections::HashMap;

#[derive(Clone, PartialEq, prost::Message)]
pub struct BytesList {
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub value: Vec<Vec<u8>>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct FloatList {
    #[prost(float, repeated, tag = "1")]
    pub value: Vec<f32>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Int64List {
    #[prost(int64, repeated, tag = "1")]
    pub value: Vec<i64>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Feature {
    #[prost(oneof = "feature::Kind", tags = "1, 2, 3")]
    pub kind: Option<feature::Kind>,
}

pub mod feature {
    use super::{BytesList, FloatList, Int64List};

    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Kind {
        #[prost(message, tag = "1")]
        BytesList(BytesList),
        #[prost(message, tag = "2")]
        FloatList(FloatList),
        #[prost(message, tag = "3")]
        Int64List(Int64List),
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Features {
    #[prost(map = "string, message", tag = "1")]
    pub feature: HashMap<String, Feature>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Example {
    #[prost(message, optional, tag = "1")]
    pub features: Option<Features>,
}

impl Example {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        Example::decode(bytes).context("Record is not a valid tf.train.Example")
    }

    fn feature(&self, key: &str) -> Option<&feature::Kind> {
        self.features.as_ref()?.feature.get(key)?.kind.as_ref()
    }

    /// First value of a bytes feature.
    pub fn bytes(&self, key: &str) -> Option<&[u8]> {
        match self.feature(key)? {
            feature::Kind::BytesList(l) => l.value.first().map(Vec::as_slice),
            _ => None,
        }
    }

    /// First value of an int64 feature.
    pub fn int64(&self, key: &str) -> Option<i64> {
        match self.feature(key)? {
            feature::Kind::Int64List(l) => l.value.first().copied(),
            _ => None,
        }
    }

    // ── Builders (used to write fixture shards) ──────────────────────────────

    #[cfg(test)]
    pub fn with_bytes(mut self, key: &str, value: Vec<u8>) -> Self {
        self.insert(key, feature::Kind::BytesList(BytesList { value: vec![value] }));
        self
    }

    #[cfg(test)]
    pub fn with_int64(mut self, key: &str, value: i64) -> Self {
        self.insert(key, feature::Kind::Int64List(Int64List { value: vec![value] }));
        self
    }

    #[cfg(test)]
    fn insert(&mut self, key: &str, kind: feature::Kind) {
        self.features
            .get_or_insert_with(Features::default)
            .feature
            .insert(key.to_string(), Feature { kind: Some(kind) });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_accessors() {
        let bytes = Example::default()
            .with_int64("image/class/label", 7)
            .with_bytes("image/format", b"raw".to_vec())
            .encode_to_vec();

        let ex = Example::parse(&bytes).unwrap();
        assert_eq!(ex.int64("image/class/label"), Some(7));
        assert_eq!(ex.bytes("image/format"), Some(&b"raw"[..]));
        // Wrong kind or missing key both read as absent
        assert_eq!(ex.int64("image/format"), None);
        assert_eq!(ex.bytes("image/encoded"), None);
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(Example::parse(&[0xff, 0xff, 0xff]).is_err());
    }
}
