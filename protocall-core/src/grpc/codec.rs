//! # Generic Message Codec
//!
//! Implements `tonic::codec::Codec` for [`GenericMessage`], so that `tonic` can carry
//! messages whose types are only known at runtime.
//!
//! * **Encoder**: writes the request message's protobuf bytes into the gRPC frame.
//! * **Decoder**: merges the frame's bytes into a clone of an empty response
//!   message, which fixes the type the bytes are decoded as.
use crate::message::GenericMessage;
use prost::Message;
use tonic::{
    Status,
    codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder},
};

pub struct GenericCodec {
    /// Empty instance of the response type.
    response: GenericMessage,
}

impl GenericCodec {
    pub fn new(response: GenericMessage) -> Self {
        Self { response }
    }
}

impl Codec for GenericCodec {
    type Encode = GenericMessage;
    type Decode = GenericMessage;

    type Encoder = GenericEncoder;
    type Decoder = GenericDecoder;

    fn encoder(&mut self) -> Self::Encoder {
        GenericEncoder
    }

    fn decoder(&mut self) -> Self::Decoder {
        GenericDecoder(self.response.clone())
    }
}

pub struct GenericEncoder;

impl Encoder for GenericEncoder {
    type Item = GenericMessage;
    type Error = Status;

    fn encode(&mut self, item: Self::Item, dst: &mut EncodeBuf<'_>) -> Result<(), Self::Error> {
        item.as_dynamic().encode_raw(dst);
        Ok(())
    }
}

pub struct GenericDecoder(GenericMessage);

impl Decoder for GenericDecoder {
    type Item = GenericMessage;
    type Error = Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> Result<Option<Self::Item>, Self::Error> {
        let mut message = self.0.clone();
        message.merge_from(src).map_err(|e| {
            Status::internal(format!(
                "Failed to decode '{}' from response bytes: {}",
                message.descriptor().full_name(),
                e
            ))
        })?;

        Ok(Some(message))
    }
}
