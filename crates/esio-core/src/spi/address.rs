//! Address width types

/// Address width for SPI commands
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AddressWidth {
    /// No address phase
    #[default]
    None,
    /// 3-byte (24-bit) address - supports up to 16 MiB
    ThreeByte,
    /// 4-byte (32-bit) address - supports up to 4 GiB
    FourByte,
}

impl AddressWidth {
    /// Width used for array accesses in the given addressing mode
    pub const fn for_mode(use_4byte: bool) -> Self {
        if use_4byte {
            Self::FourByte
        } else {
            Self::ThreeByte
        }
    }

    /// Returns the number of address bytes
    pub const fn bytes(&self) -> u8 {
        match self {
            Self::None => 0,
            Self::ThreeByte => 3,
            Self::FourByte => 4,
        }
    }

    /// Encode an address into bytes, most significant byte first
    ///
    /// Returns the encoded prefix of `buf`.
    pub fn encode<'b>(&self, address: u32, buf: &'b mut [u8; 4]) -> &'b [u8] {
        let be = address.to_be_bytes();
        match self {
            Self::None => &buf[..0],
            Self::ThreeByte => {
                buf[..3].copy_from_slice(&be[1..]);
                &buf[..3]
            }
            Self::FourByte => {
                *buf = be;
                &buf[..]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_orders_msb_first() {
        let mut buf = [0u8; 4];
        assert_eq!(
            AddressWidth::ThreeByte.encode(0x0012_3456, &mut buf),
            &[0x12, 0x34, 0x56]
        );
        assert_eq!(
            AddressWidth::FourByte.encode(0x0112_3456, &mut buf),
            &[0x01, 0x12, 0x34, 0x56]
        );
        assert!(AddressWidth::None.encode(0xFFFF, &mut buf).is_empty());
    }
}
