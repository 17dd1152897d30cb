//! Conversion between [`Envelope`] values and wire bytes.

use crate::error::Result;
use crate::protocol::Envelope;
use bytes::Bytes;
use std::sync::Arc;

pub trait Codec: 'static + Send + Sync {
    fn encode(&self, envelope: &Envelope) -> Result<Bytes>;

    fn decode(&self, data: &[u8]) -> Result<Envelope>;
}

/// Trait-object [Codec].
pub type DynCodec = Arc<dyn Codec>;

/// Self-describing JSON encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, envelope: &Envelope) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(envelope)?))
    }

    fn decode(&self, data: &[u8]) -> Result<Envelope> {
        Ok(serde_json::from_slice(data)?)
    }
}

/// Compact binary encoding.
#[cfg(feature = "bincode")]
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

#[cfg(feature = "bincode")]
impl Codec for BincodeCodec {
    fn encode(&self, envelope: &Envelope) -> Result<Bytes> {
        Ok(Bytes::from(bincode::serialize(envelope)?))
    }

    fn decode(&self, data: &[u8]) -> Result<Envelope> {
        Ok(bincode::deserialize(data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GeoshardError;
    use crate::protocol::{Request, TimeRange};
    use geoshard_types::{BoundingBox, GeoPolygon};
    use uuid::Uuid;

    fn sample() -> Envelope {
        Envelope::request(
            Uuid::new_v4(),
            Request::Join {
                filesystem: "roads".into(),
                polygon: GeoPolygon::from_bbox(&BoundingBox::new(1.0, 2.0, 3.0, 4.0)),
                time_range: TimeRange::new(0, 3600),
                special_text: Some("header".into()),
            },
        )
    }

    #[test]
    fn test_json_codec() {
        let envelope = sample();
        let data = JsonCodec.encode(&envelope).unwrap();
        assert_eq!(JsonCodec.decode(&data).unwrap(), envelope);
    }

    #[test]
    fn test_json_codec_rejects_garbage() {
        assert!(matches!(
            JsonCodec.decode(b"{\"request_id\": 5}"),
            Err(GeoshardError::Serialization(_))
        ));
        // polygons with fewer than three vertices never decode
        let text = format!(
            "{{\"request_id\":\"{}\",\"body\":{{\"Request\":{{\"Query\":{{\"filesystem\":\"f\",\
             \"polygon\":[{{\"lat\":0.0,\"lon\":0.0}},{{\"lat\":1.0,\"lon\":1.0}}],\
             \"time_range\":{{\"start\":0,\"end\":1}}}}}}}}}}",
            Uuid::nil()
        );
        assert!(JsonCodec.decode(text.as_bytes()).is_err());
    }

    #[cfg(feature = "bincode")]
    #[test]
    fn test_bincode_codec() {
        let envelope = sample();
        let data = BincodeCodec.encode(&envelope).unwrap();
        assert_eq!(BincodeCodec.decode(&data).unwrap(), envelope);
    }
}
