//! Voxel edit messages.
//!
//! # Wire Format
//!
//! ```text
//! [opcode: u8][count: varint][count x descriptor]
//! descriptor = [size: f32][x: f32][y: f32][z: f32][r: u8][g: u8][b: u8]
//! ```
//!
//! Floats are little-endian. A built message never exceeds
//! [`MAX_PACKET_SIZE`].

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::{
    math::Vec3,
    net::{
        get_varint, put_varint, varint_len, DecodeError, MAX_PACKET_SIZE,
        PACKET_TYPE_ERASE_VOXEL, PACKET_TYPE_SET_VOXEL_DESTRUCTIVE,
    },
};

/// Encoded size of one descriptor.
pub const DESCRIPTOR_WIRE_SIZE: usize = 4 * 4 + 3;

/// One voxel to set or erase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoxelDescriptor {
    pub position: Vec3,
    pub size: f32,
    pub color: [u8; 3],
}

/// Edit operation carried by a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOpcode {
    Erase,
    SetDestructive,
}

impl EditOpcode {
    pub fn packet_type(self) -> u8 {
        match self {
            EditOpcode::Erase => PACKET_TYPE_ERASE_VOXEL,
            EditOpcode::SetDestructive => PACKET_TYPE_SET_VOXEL_DESTRUCTIVE,
        }
    }

    pub fn from_packet_type(b: u8) -> Option<Self> {
        match b {
            PACKET_TYPE_ERASE_VOXEL => Some(EditOpcode::Erase),
            PACKET_TYPE_SET_VOXEL_DESTRUCTIVE => Some(EditOpcode::SetDestructive),
            _ => None,
        }
    }
}

/// Why a message could not be built.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EditError {
    #[error("edit message has no voxels")]
    Empty,
    #[error("edit message of {size} bytes exceeds max packet size {max}")]
    TooLarge { size: usize, max: usize },
}

/// Decoded edit message.
#[derive(Debug, Clone, PartialEq)]
pub struct EditMessage {
    pub opcode: EditOpcode,
    pub descriptors: Vec<VoxelDescriptor>,
}

/// Serialized size of a message carrying `count` descriptors.
pub fn encoded_len(count: usize) -> usize {
    let count_len = u32::try_from(count).map(varint_len).unwrap_or(usize::MAX / 2);
    1 + count_len + count.saturating_mul(DESCRIPTOR_WIRE_SIZE)
}

/// Builds an edit message into a freshly owned buffer.
pub fn build_edit_message(
    opcode: EditOpcode,
    descriptors: &[VoxelDescriptor],
) -> Result<Bytes, EditError> {
    build_edit_message_with_limit(opcode, descriptors, MAX_PACKET_SIZE)
}

/// Like [`build_edit_message`], with an explicit size limit.
pub fn build_edit_message_with_limit(
    opcode: EditOpcode,
    descriptors: &[VoxelDescriptor],
    max: usize,
) -> Result<Bytes, EditError> {
    if descriptors.is_empty() {
        return Err(EditError::Empty);
    }
    let size = encoded_len(descriptors.len());
    if size > max {
        return Err(EditError::TooLarge { size, max });
    }

    let mut buf = BytesMut::with_capacity(size);
    buf.put_u8(opcode.packet_type());
    // Bounded by `max` above, so the count fits.
    put_varint(&mut buf, descriptors.len() as u32);
    for d in descriptors {
        buf.put_f32_le(d.size);
        buf.put_f32_le(d.position.x);
        buf.put_f32_le(d.position.y);
        buf.put_f32_le(d.position.z);
        buf.put_slice(&d.color);
    }
    debug_assert_eq!(buf.len(), size);
    Ok(buf.freeze())
}

/// Parses an edit message produced by [`build_edit_message`].
pub fn decode_edit_message(data: &[u8]) -> Result<EditMessage, DecodeError> {
    let (&kind, rest) = data.split_first().ok_or(DecodeError::Truncated(0))?;
    let opcode = EditOpcode::from_packet_type(kind).ok_or(DecodeError::UnexpectedType(kind))?;
    let (count, used) = get_varint(rest).map_err(|e| match e {
        DecodeError::Truncated(n) => DecodeError::Truncated(1 + n),
        other => other,
    })?;

    let mut offset = 1 + used;
    let count = count as usize;
    if data.len() < offset + count.saturating_mul(DESCRIPTOR_WIRE_SIZE) {
        return Err(DecodeError::Truncated(data.len()));
    }

    let mut descriptors = Vec::with_capacity(count);
    for _ in 0..count {
        let f = |at: usize| f32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]]);
        descriptors.push(VoxelDescriptor {
            size: f(offset),
            position: Vec3::new(f(offset + 4), f(offset + 8), f(offset + 12)),
            color: [data[offset + 16], data[offset + 17], data[offset + 18]],
        });
        offset += DESCRIPTOR_WIRE_SIZE;
    }
    Ok(EditMessage {
        opcode,
        descriptors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voxels(n: usize) -> Vec<VoxelDescriptor> {
        (0..n)
            .map(|i| VoxelDescriptor {
                position: Vec3::new(i as f32, 0.5, -1.25),
                size: 0.25,
                color: [i as u8, 2, 3],
            })
            .collect()
    }

    #[test]
    fn layout_is_bit_exact() {
        let msg = build_edit_message(EditOpcode::SetDestructive, &voxels(1)).unwrap();
        let mut expected = vec![PACKET_TYPE_SET_VOXEL_DESTRUCTIVE, 1];
        expected.extend_from_slice(&0.25f32.to_le_bytes());
        expected.extend_from_slice(&0.0f32.to_le_bytes());
        expected.extend_from_slice(&0.5f32.to_le_bytes());
        expected.extend_from_slice(&(-1.25f32).to_le_bytes());
        expected.extend_from_slice(&[0, 2, 3]);
        assert_eq!(&msg[..], &expected[..]);
    }

    #[test]
    fn empty_always_fails() {
        assert_eq!(
            build_edit_message(EditOpcode::Erase, &[]),
            Err(EditError::Empty)
        );
        assert_eq!(
            build_edit_message_with_limit(EditOpcode::Erase, &[], usize::MAX),
            Err(EditError::Empty)
        );
    }

    #[test]
    fn succeeds_iff_within_limit() {
        // 1 opcode + 1 count + 18 * 19
        let size = encoded_len(18);
        assert_eq!(size, 344);
        let v = voxels(18);
        assert!(build_edit_message_with_limit(EditOpcode::Erase, &v, size).is_ok());
        assert_eq!(
            build_edit_message_with_limit(EditOpcode::Erase, &v, size - 1),
            Err(EditError::TooLarge {
                size,
                max: size - 1
            })
        );
    }

    #[test]
    fn default_limit_caps_descriptor_count() {
        // 78 descriptors fit in 1500 bytes, 79 do not.
        assert!(build_edit_message(EditOpcode::Erase, &voxels(78)).is_ok());
        assert!(matches!(
            build_edit_message(EditOpcode::Erase, &voxels(79)),
            Err(EditError::TooLarge { .. })
        ));
    }

    #[test]
    fn decode_reads_back_built_message() {
        let v = voxels(18);
        let msg = build_edit_message(EditOpcode::Erase, &v).unwrap();
        let decoded = decode_edit_message(&msg).unwrap();
        assert_eq!(decoded.opcode, EditOpcode::Erase);
        assert_eq!(decoded.descriptors, v);
    }

    #[test]
    fn decode_rejects_bad_input() {
        assert_eq!(decode_edit_message(&[]), Err(DecodeError::Truncated(0)));
        assert_eq!(
            decode_edit_message(&[b'x', 0]),
            Err(DecodeError::UnexpectedType(b'x'))
        );
        let msg = build_edit_message(EditOpcode::Erase, &voxels(2)).unwrap();
        assert!(matches!(
            decode_edit_message(&msg[..msg.len() - 1]),
            Err(DecodeError::Truncated(_))
        ));
    }
}
