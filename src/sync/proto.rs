//! Canvas message schemas and CBOR encoding.
//!
//! Envelope is a definite-length map `{v, type, origin, seq, body}`. Bodies are
//! maps too; unknown body keys are skipped, unknown message types are not.

use std::convert::Infallible;

use minicbor::data::Type;
use minicbor::{Decoder, Encoder};
use thiserror::Error;

use crate::core::{MessageId, ParticipantId, Point, Rgba, WriteStamp};

use super::presence::BrushProperties;

pub const PROTOCOL_VERSION_V1: u32 = 1;

const MAX_MAP_ENTRIES: u64 = 32;
const MAX_TEXT_LEN: usize = 64;

#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    pub version: u32,
    pub origin: ParticipantId,
    pub seq: u64,
    pub message: Message,
}

impl Envelope {
    pub fn new(origin: ParticipantId, seq: u64, message: Message) -> Self {
        Self {
            version: PROTOCOL_VERSION_V1,
            origin,
            seq,
            message,
        }
    }

    pub fn id(&self) -> MessageId {
        MessageId::new(self.origin, self.seq)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    Place(PlaceOp),
    Erase(EraseOp),
    Clear(ClearOp),
    Props(BrushProperties),
    Leave,
}

/// A cell write. `position` is already snapped to the sender's grid.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlaceOp {
    pub position: Point,
    pub size: f32,
    pub color: Rgba,
    pub origin: ParticipantId,
    pub stamp: WriteStamp,
}

/// A radius erase. Receivers derive the radius from `size`. Only cells
/// written before `stamp` are removed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EraseOp {
    pub position: Point,
    pub size: f32,
    pub stamp: WriteStamp,
}

/// Removes every cell written before `stamp`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClearOp {
    pub stamp: WriteStamp,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageType {
    Place,
    Erase,
    Clear,
    Props,
    Leave,
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::Place => "PLACE",
            MessageType::Erase => "ERASE",
            MessageType::Clear => "CLEAR",
            MessageType::Props => "PROPS",
            MessageType::Leave => "LEAVE",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "PLACE" => Some(MessageType::Place),
            "ERASE" => Some(MessageType::Erase),
            "CLEAR" => Some(MessageType::Clear),
            "PROPS" => Some(MessageType::Props),
            "LEAVE" => Some(MessageType::Leave),
            _ => None,
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Place(_) => MessageType::Place,
            Message::Erase(_) => MessageType::Erase,
            Message::Clear(_) => MessageType::Clear,
            Message::Props(_) => MessageType::Props,
            Message::Leave => MessageType::Leave,
        }
    }
}

#[derive(Debug, Error)]
pub enum ProtoEncodeError {
    #[error("cbor encode: {0}")]
    Cbor(#[from] minicbor::encode::Error<Infallible>),
}

#[derive(Debug, Error)]
pub enum ProtoDecodeError {
    #[error("decode limit exceeded: {0}")]
    DecodeLimit(&'static str),
    #[error("indefinite-length CBOR not allowed")]
    IndefiniteLength,
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),
    #[error("unsupported protocol version {got} (expected {expected})")]
    UnsupportedVersion { got: u32, expected: u32 },
    #[error("trailing bytes after message body")]
    TrailingBytes,
    #[error("cbor decode: {0}")]
    Cbor(#[from] minicbor::decode::Error),
}

type Enc<'a> = Encoder<&'a mut Vec<u8>>;

pub fn encode_envelope(envelope: &Envelope) -> Result<Vec<u8>, ProtoEncodeError> {
    let mut buf = Vec::new();
    let mut enc = Encoder::new(&mut buf);
    enc.map(5)?;
    enc.str("v")?;
    enc.u32(envelope.version)?;
    enc.str("type")?;
    enc.str(envelope.message.message_type().as_str())?;
    enc.str("origin")?;
    encode_participant(&mut enc, &envelope.origin)?;
    enc.str("seq")?;
    enc.u64(envelope.seq)?;
    enc.str("body")?;
    encode_message_body(&mut enc, &envelope.message)?;
    Ok(buf)
}

pub fn decode_envelope(bytes: &[u8]) -> Result<Envelope, ProtoDecodeError> {
    let mut dec = Decoder::new(bytes);
    let map_len = decode_map_len(&mut dec)?;

    let mut version = None;
    let mut message_type = None;
    let mut origin = None;
    let mut seq = None;
    let mut body_span = None;

    for _ in 0..map_len {
        let key = decode_text(&mut dec)?;
        match key {
            "v" => version = Some(decode_u32(&mut dec, "v")?),
            "type" => {
                let raw = decode_text(&mut dec)?;
                message_type = Some(
                    MessageType::parse(raw)
                        .ok_or_else(|| ProtoDecodeError::UnknownMessageType(raw.to_string()))?,
                );
            }
            "origin" => origin = Some(decode_participant(&mut dec, "origin")?),
            "seq" => seq = Some(dec.u64()?),
            "body" => {
                if is_indefinite(&dec)? {
                    return Err(ProtoDecodeError::IndefiniteLength);
                }
                let start = dec.position();
                dec.skip()?;
                let end = dec.position();
                body_span = Some((start, end));
            }
            _ => {
                if is_indefinite(&dec)? {
                    return Err(ProtoDecodeError::IndefiniteLength);
                }
                dec.skip()?;
            }
        }
    }

    if dec.datatype().is_ok() {
        return Err(ProtoDecodeError::TrailingBytes);
    }

    let version = version.ok_or(ProtoDecodeError::MissingField("v"))?;
    if version != PROTOCOL_VERSION_V1 {
        return Err(ProtoDecodeError::UnsupportedVersion {
            got: version,
            expected: PROTOCOL_VERSION_V1,
        });
    }
    let message_type = message_type.ok_or(ProtoDecodeError::MissingField("type"))?;
    let origin = origin.ok_or(ProtoDecodeError::MissingField("origin"))?;
    let seq = seq.ok_or(ProtoDecodeError::MissingField("seq"))?;
    let (start, end) = body_span.ok_or(ProtoDecodeError::MissingField("body"))?;

    let message = decode_message_body(message_type, &bytes[start..end])?;
    Ok(Envelope {
        version,
        origin,
        seq,
        message,
    })
}

fn encode_message_body(enc: &mut Enc<'_>, message: &Message) -> Result<(), ProtoEncodeError> {
    match message {
        Message::Place(op) => encode_place(enc, op),
        Message::Erase(op) => encode_erase(enc, op),
        Message::Clear(op) => encode_clear(enc, op),
        Message::Props(props) => encode_props(enc, props),
        Message::Leave => {
            enc.map(0)?;
            Ok(())
        }
    }
}

fn decode_message_body(
    message_type: MessageType,
    bytes: &[u8],
) -> Result<Message, ProtoDecodeError> {
    let mut dec = Decoder::new(bytes);
    let message = match message_type {
        MessageType::Place => Message::Place(decode_place(&mut dec)?),
        MessageType::Erase => Message::Erase(decode_erase(&mut dec)?),
        MessageType::Props => Message::Props(decode_props(&mut dec)?),
        MessageType::Clear => Message::Clear(decode_clear(&mut dec)?),
        MessageType::Leave => {
            skip_map(&mut dec)?;
            Message::Leave
        }
    };

    if dec.datatype().is_ok() {
        return Err(ProtoDecodeError::TrailingBytes);
    }
    Ok(message)
}

fn encode_place(enc: &mut Enc<'_>, op: &PlaceOp) -> Result<(), ProtoEncodeError> {
    enc.map(5)?;
    enc.str("position")?;
    encode_point(enc, &op.position)?;
    enc.str("size")?;
    enc.f32(op.size)?;
    enc.str("color")?;
    encode_color(enc, &op.color)?;
    enc.str("origin")?;
    encode_participant(enc, &op.origin)?;
    enc.str("stamp")?;
    encode_write_stamp(enc, &op.stamp)?;
    Ok(())
}

fn decode_place(dec: &mut Decoder) -> Result<PlaceOp, ProtoDecodeError> {
    let map_len = decode_map_len(dec)?;
    let mut position = None;
    let mut size = None;
    let mut color = None;
    let mut origin = None;
    let mut stamp = None;
    for _ in 0..map_len {
        let key = decode_text(dec)?;
        match key {
            "position" => position = Some(decode_point(dec)?),
            "size" => size = Some(dec.f32()?),
            "color" => color = Some(decode_color(dec)?),
            "origin" => origin = Some(decode_participant(dec, "origin")?),
            "stamp" => stamp = Some(decode_write_stamp(dec)?),
            _ => skip_value(dec)?,
        }
    }
    Ok(PlaceOp {
        position: position.ok_or(ProtoDecodeError::MissingField("position"))?,
        size: size.ok_or(ProtoDecodeError::MissingField("size"))?,
        color: color.ok_or(ProtoDecodeError::MissingField("color"))?,
        origin: origin.ok_or(ProtoDecodeError::MissingField("origin"))?,
        stamp: stamp.ok_or(ProtoDecodeError::MissingField("stamp"))?,
    })
}

fn encode_erase(enc: &mut Enc<'_>, op: &EraseOp) -> Result<(), ProtoEncodeError> {
    enc.map(3)?;
    enc.str("position")?;
    encode_point(enc, &op.position)?;
    enc.str("size")?;
    enc.f32(op.size)?;
    enc.str("stamp")?;
    encode_write_stamp(enc, &op.stamp)?;
    Ok(())
}

fn decode_erase(dec: &mut Decoder) -> Result<EraseOp, ProtoDecodeError> {
    let map_len = decode_map_len(dec)?;
    let mut position = None;
    let mut size = None;
    let mut stamp = None;
    for _ in 0..map_len {
        let key = decode_text(dec)?;
        match key {
            "position" => position = Some(decode_point(dec)?),
            "size" => size = Some(dec.f32()?),
            "stamp" => stamp = Some(decode_write_stamp(dec)?),
            _ => skip_value(dec)?,
        }
    }
    Ok(EraseOp {
        position: position.ok_or(ProtoDecodeError::MissingField("position"))?,
        size: size.ok_or(ProtoDecodeError::MissingField("size"))?,
        stamp: stamp.ok_or(ProtoDecodeError::MissingField("stamp"))?,
    })
}

fn encode_clear(enc: &mut Enc<'_>, op: &ClearOp) -> Result<(), ProtoEncodeError> {
    enc.map(1)?;
    enc.str("stamp")?;
    encode_write_stamp(enc, &op.stamp)?;
    Ok(())
}

fn decode_clear(dec: &mut Decoder) -> Result<ClearOp, ProtoDecodeError> {
    let map_len = decode_map_len(dec)?;
    let mut stamp = None;
    for _ in 0..map_len {
        let key = decode_text(dec)?;
        match key {
            "stamp" => stamp = Some(decode_write_stamp(dec)?),
            _ => skip_value(dec)?,
        }
    }
    Ok(ClearOp {
        stamp: stamp.ok_or(ProtoDecodeError::MissingField("stamp"))?,
    })
}

fn encode_props(enc: &mut Enc<'_>, props: &BrushProperties) -> Result<(), ProtoEncodeError> {
    enc.map(5)?;
    enc.str("revision")?;
    enc.u64(props.revision)?;
    enc.str("color")?;
    encode_color(enc, &props.color)?;
    enc.str("size")?;
    enc.f32(props.size)?;
    enc.str("erase_mode")?;
    enc.bool(props.erase_mode)?;
    enc.str("active")?;
    enc.bool(props.active)?;
    Ok(())
}

fn decode_props(dec: &mut Decoder) -> Result<BrushProperties, ProtoDecodeError> {
    let map_len = decode_map_len(dec)?;
    let mut revision = None;
    let mut color = None;
    let mut size = None;
    let mut erase_mode = None;
    let mut active = None;
    for _ in 0..map_len {
        let key = decode_text(dec)?;
        match key {
            "revision" => revision = Some(dec.u64()?),
            "color" => color = Some(decode_color(dec)?),
            "size" => size = Some(dec.f32()?),
            "erase_mode" => erase_mode = Some(dec.bool()?),
            "active" => active = Some(dec.bool()?),
            _ => skip_value(dec)?,
        }
    }
    Ok(BrushProperties {
        revision: revision.ok_or(ProtoDecodeError::MissingField("revision"))?,
        color: color.ok_or(ProtoDecodeError::MissingField("color"))?,
        size: size.ok_or(ProtoDecodeError::MissingField("size"))?,
        erase_mode: erase_mode.ok_or(ProtoDecodeError::MissingField("erase_mode"))?,
        active: active.ok_or(ProtoDecodeError::MissingField("active"))?,
    })
}

fn encode_point(enc: &mut Enc<'_>, point: &Point) -> Result<(), ProtoEncodeError> {
    enc.array(2)?;
    enc.f64(point.x)?;
    enc.f64(point.y)?;
    Ok(())
}

fn decode_point(dec: &mut Decoder) -> Result<Point, ProtoDecodeError> {
    decode_array_exact(dec, 2, "position")?;
    Ok(Point::new(dec.f64()?, dec.f64()?))
}

fn encode_color(enc: &mut Enc<'_>, color: &Rgba) -> Result<(), ProtoEncodeError> {
    enc.array(4)?;
    for component in color.to_array() {
        enc.f32(component)?;
    }
    Ok(())
}

fn decode_color(dec: &mut Decoder) -> Result<Rgba, ProtoDecodeError> {
    decode_array_exact(dec, 4, "color")?;
    Ok(Rgba {
        r: dec.f32()?,
        g: dec.f32()?,
        b: dec.f32()?,
        a: dec.f32()?,
    })
}

fn encode_write_stamp(enc: &mut Enc<'_>, stamp: &WriteStamp) -> Result<(), ProtoEncodeError> {
    enc.array(2)?;
    enc.u64(stamp.wall_ms)?;
    enc.u32(stamp.counter)?;
    Ok(())
}

fn decode_write_stamp(dec: &mut Decoder) -> Result<WriteStamp, ProtoDecodeError> {
    decode_array_exact(dec, 2, "stamp")?;
    let wall_ms = dec.u64()?;
    let counter = decode_u32(dec, "stamp.counter")?;
    Ok(WriteStamp::new(wall_ms, counter))
}

fn encode_participant(enc: &mut Enc<'_>, id: &ParticipantId) -> Result<(), ProtoEncodeError> {
    let raw = id.as_uuid().to_string();
    enc.str(&raw)?;
    Ok(())
}

fn decode_participant(
    dec: &mut Decoder,
    field: &'static str,
) -> Result<ParticipantId, ProtoDecodeError> {
    let raw = decode_text(dec)?;
    ParticipantId::parse_str(raw).map_err(|e| ProtoDecodeError::InvalidField {
        field,
        reason: e.to_string(),
    })
}

fn decode_map_len(dec: &mut Decoder) -> Result<u64, ProtoDecodeError> {
    let Some(len) = dec.map()? else {
        return Err(ProtoDecodeError::IndefiniteLength);
    };
    if len > MAX_MAP_ENTRIES {
        return Err(ProtoDecodeError::DecodeLimit("max_map_entries"));
    }
    Ok(len)
}

fn decode_array_exact(
    dec: &mut Decoder,
    expected: u64,
    field: &'static str,
) -> Result<(), ProtoDecodeError> {
    let Some(len) = dec.array()? else {
        return Err(ProtoDecodeError::IndefiniteLength);
    };
    if len != expected {
        return Err(ProtoDecodeError::InvalidField {
            field,
            reason: format!("expected {expected} elements, got {len}"),
        });
    }
    Ok(())
}

fn decode_text<'a>(dec: &mut Decoder<'a>) -> Result<&'a str, ProtoDecodeError> {
    let ty = dec.datatype()?;
    if matches!(ty, Type::StringIndef) {
        return Err(ProtoDecodeError::IndefiniteLength);
    }
    let s = dec.str()?;
    if s.len() > MAX_TEXT_LEN {
        return Err(ProtoDecodeError::DecodeLimit("max_text_len"));
    }
    Ok(s)
}

fn decode_u32(dec: &mut Decoder, field: &'static str) -> Result<u32, ProtoDecodeError> {
    let value = dec.u64()?;
    u32::try_from(value).map_err(|_| ProtoDecodeError::InvalidField {
        field,
        reason: format!("value {value} out of range for u32"),
    })
}

fn skip_map(dec: &mut Decoder) -> Result<(), ProtoDecodeError> {
    let map_len = decode_map_len(dec)?;
    for _ in 0..map_len {
        decode_text(dec)?;
        skip_value(dec)?;
    }
    Ok(())
}

fn skip_value(dec: &mut Decoder) -> Result<(), ProtoDecodeError> {
    if is_indefinite(dec)? {
        return Err(ProtoDecodeError::IndefiniteLength);
    }
    dec.skip()?;
    Ok(())
}

fn is_indefinite(dec: &Decoder) -> Result<bool, ProtoDecodeError> {
    let ty = dec.datatype()?;
    Ok(matches!(
        ty,
        Type::BytesIndef | Type::StringIndef | Type::ArrayIndef | Type::MapIndef
    ))
}
