//! Payload encoding of sample lists

use bytes::{BufMut, Bytes, BytesMut};

use crate::datapoint::DataPoint;
use crate::error::Error;

/// Magic and format version prefixed to every encoded payload
pub const PAYLOAD_HEADER: [u8; 4] = *b"SVD\x01";

pub fn encode_samples(samples: &[DataPoint]) -> Result<Bytes, Error> {
    let body = bincode::serialize(samples)
        .map_err(|e| Error::Validation(format!("cannot encode samples: {}", e)))?;

    let mut payload = BytesMut::with_capacity(PAYLOAD_HEADER.len() + body.len());
    payload.put_slice(&PAYLOAD_HEADER);
    payload.put_slice(&body);
    Ok(payload.freeze())
}

pub fn decode_samples(payload: &[u8]) -> Result<Vec<DataPoint>, Error> {
    let body = payload
        .strip_prefix(&PAYLOAD_HEADER[..])
        .ok_or_else(|| Error::Decode("payload does not start with a sample header".to_string()))?;
    bincode::deserialize(body).map_err(|e| Error::Decode(e.to_string()))
}
