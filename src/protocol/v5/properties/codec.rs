use super::{Properties, PropertyId, PropertyValue, PropertyValueType};
use crate::encoding::{
    binary_len, decode_binary, decode_string, decode_variable_int, encode_binary, encode_string,
    encode_variable_int, string_len, variable_int_len,
};
use crate::error::{MqttError, Result};

use bytes::{Buf, BufMut};

impl Properties {
    /// Encodes the block: total property length as a variable byte
    /// integer, then every property as identifier + typed value.
    pub fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        let body_len = self.body_len();
        encode_variable_int(
            buf,
            u32::try_from(body_len).map_err(|_| MqttError::PacketTooLarge {
                size: body_len,
                max: crate::encoding::VARIABLE_INT_MAX as usize,
            })?,
        )?;

        for (id, value) in self.iter() {
            buf.put_u8(id as u8);
            match value {
                PropertyValue::Byte(v) => buf.put_u8(*v),
                PropertyValue::TwoByteInteger(v) => buf.put_u16(*v),
                PropertyValue::FourByteInteger(v) => buf.put_u32(*v),
                PropertyValue::VariableByteInteger(v) => encode_variable_int(buf, *v)?,
                PropertyValue::BinaryData(v) => encode_binary(buf, v)?,
                PropertyValue::Utf8String(v) => encode_string(buf, v)?,
                PropertyValue::Utf8StringPair(k, v) => {
                    encode_string(buf, k)?;
                    encode_string(buf, v)?;
                }
            }
        }
        Ok(())
    }

    /// Decodes a property block, consuming exactly the advertised length.
    /// Unknown identifiers, duplicate non-repeatable identifiers, and
    /// short blocks are malformed.
    pub fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        let block_len = decode_variable_int(buf)? as usize;

        if buf.remaining() < block_len {
            return Err(MqttError::MalformedPacket(format!(
                "Properties length {block_len} exceeds remaining {} bytes",
                buf.remaining()
            )));
        }

        let mut block = buf.copy_to_bytes(block_len);
        let mut properties = Self::new();

        while block.has_remaining() {
            let id_byte = block.get_u8();
            let id =
                PropertyId::from_u8(id_byte).ok_or(MqttError::InvalidPropertyId(id_byte))?;

            let value = match id.value_type() {
                PropertyValueType::Byte => {
                    if !block.has_remaining() {
                        return Err(short_property(id));
                    }
                    PropertyValue::Byte(block.get_u8())
                }
                PropertyValueType::TwoByteInteger => {
                    if block.remaining() < 2 {
                        return Err(short_property(id));
                    }
                    PropertyValue::TwoByteInteger(block.get_u16())
                }
                PropertyValueType::FourByteInteger => {
                    if block.remaining() < 4 {
                        return Err(short_property(id));
                    }
                    PropertyValue::FourByteInteger(block.get_u32())
                }
                PropertyValueType::VariableByteInteger => {
                    PropertyValue::VariableByteInteger(decode_variable_int(&mut block)?)
                }
                PropertyValueType::BinaryData => {
                    PropertyValue::BinaryData(decode_binary(&mut block)?)
                }
                PropertyValueType::Utf8String => {
                    PropertyValue::Utf8String(decode_string(&mut block)?)
                }
                PropertyValueType::Utf8StringPair => {
                    let key = decode_string(&mut block)?;
                    let value = decode_string(&mut block)?;
                    PropertyValue::Utf8StringPair(key, value)
                }
            };

            properties.add(id, value)?;
        }

        Ok(properties)
    }

    /// Total encoded size, length prefix included.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        let body = self.body_len();
        variable_int_len(u32::try_from(body).unwrap_or(u32::MAX)) + body
    }

    fn body_len(&self) -> usize {
        self.iter()
            .map(|(_, value)| {
                1 + match value {
                    PropertyValue::Byte(_) => 1,
                    PropertyValue::TwoByteInteger(_) => 2,
                    PropertyValue::FourByteInteger(_) => 4,
                    PropertyValue::VariableByteInteger(v) => variable_int_len(*v),
                    PropertyValue::BinaryData(v) => binary_len(v),
                    PropertyValue::Utf8String(v) => string_len(v),
                    PropertyValue::Utf8StringPair(k, v) => string_len(k) + string_len(v),
                }
            })
            .sum()
    }
}

fn short_property(id: PropertyId) -> MqttError {
    MqttError::MalformedPacket(format!("Insufficient data for property {id:?}"))
}
