use crate::{Error, Result};

/// Header preceding the payload of every N5 block.
///
/// All fields are big-endian. Only the default mode is written or read;
/// var-length and object blocks are refused.
#[derive(Debug, Clone, PartialEq)]
pub struct N5ChunkHeader {
    /// Extent of the block, first axis first. Edge blocks are truncated.
    pub(crate) shape: Vec<u32>,
}

const MODE_DEFAULT: u16 = 0;
const MODE_VARLEN: u16 = 1;
const MODE_OBJECT: u16 = 2;

impl N5ChunkHeader {
    /// Header for a regular block of the given extent.
    pub(crate) fn new(shape: &[u64]) -> Result<Self> {
        let shape = shape
            .iter()
            .map(|&n| u32::try_from(n).map_err(Error::wrap))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { shape })
    }

    pub(crate) fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut offset: usize = 0;

        match read_u16(bytes, &mut offset)? {
            MODE_DEFAULT => {}
            n @ (MODE_VARLEN | MODE_OBJECT) => {
                return Err(Error::general(format!("unsupported N5 chunk mode {n}")));
            }
            n => return Err(Error::general(format!("invalid N5 chunk mode {n}"))),
        }
        let ndim = read_u16(bytes, &mut offset)?;
        let mut shape = Vec::with_capacity(ndim as usize);
        for _ in 0..ndim {
            shape.push(read_u32(bytes, &mut offset)?);
        }
        Ok(N5ChunkHeader { shape })
    }

    /// Serialize the header; the payload follows immediately.
    pub(crate) fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.data_offset());
        out.extend_from_slice(&MODE_DEFAULT.to_be_bytes());
        out.extend_from_slice(&(self.shape.len() as u16).to_be_bytes());
        for n in &self.shape {
            out.extend_from_slice(&n.to_be_bytes());
        }
        out
    }

    pub(crate) fn data_offset(&self) -> usize {
        size_of::<u16>()  // mode discriminator
            + size_of::<u16>() // ndim
            + self.shape.len() * size_of::<u32>() // shape
    }
}

fn read_u16(bytes: &[u8], offset: &mut usize) -> Result<u16> {
    let end = *offset + 2;
    let raw = bytes
        .get(*offset..end)
        .ok_or_else(|| Error::general("truncated N5 chunk header"))?;
    *offset = end;
    Ok(u16::from_be_bytes(raw.try_into().map_err(Error::wrap)?))
}

fn read_u32(bytes: &[u8], offset: &mut usize) -> Result<u32> {
    let end = *offset + 4;
    let raw = bytes
        .get(*offset..end)
        .ok_or_else(|| Error::general("truncated N5 chunk header"))?;
    *offset = end;
    Ok(u32::from_be_bytes(raw.try_into().map_err(Error::wrap)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout() {
        let header = N5ChunkHeader::new(&[3, 2]).unwrap();
        let bytes = header.to_bytes();
        assert_eq!(bytes, vec![0, 0, 0, 2, 0, 0, 0, 3, 0, 0, 0, 2]);
        assert_eq!(header.data_offset(), bytes.len());

        let parsed = N5ChunkHeader::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn varlen_and_object_blocks_are_refused() {
        let varlen = [0, 1, 0, 1, 0, 0, 0, 4, 0, 0, 0, 7];
        let err = N5ChunkHeader::from_bytes(&varlen).unwrap_err();
        assert!(err.to_string().contains("unsupported"), "{err}");
        assert!(N5ChunkHeader::from_bytes(&[0, 2, 0, 0]).is_err());
        assert!(N5ChunkHeader::from_bytes(&[0, 9, 0, 0]).is_err());
    }

    #[test]
    fn truncated_header_is_an_error() {
        assert!(N5ChunkHeader::from_bytes(&[0, 0, 0, 2, 0, 0]).is_err());
    }
}
