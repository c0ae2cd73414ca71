//! SPI command structure

use super::AddressWidth;

/// A single SPI transaction
///
/// Designed to avoid allocation - uses slices for data.
/// The lifetime parameter `'a` ties the command to the buffers it references.
/// A command carries either a write payload or a read buffer, never both.
pub struct SpiCommand<'a> {
    /// The opcode byte
    pub opcode: u8,

    /// Address (if any)
    pub address: Option<u32>,

    /// Address width
    pub address_width: AddressWidth,

    /// Data to write after opcode/address
    pub write_data: &'a [u8],

    /// Buffer to read into (mutable)
    pub read_buf: &'a mut [u8],
}

impl<'a> SpiCommand<'a> {
    /// Create a simple command with no address or data (e.g., WREN, EN4B)
    pub fn simple(opcode: u8) -> Self {
        Self {
            opcode,
            address: None,
            address_width: AddressWidth::None,
            write_data: &[],
            read_buf: &mut [],
        }
    }

    /// Create a read register command with no address (e.g., RDSR, RDID)
    pub fn read_reg(opcode: u8, buf: &'a mut [u8]) -> Self {
        Self {
            opcode,
            address: None,
            address_width: AddressWidth::None,
            write_data: &[],
            read_buf: buf,
        }
    }

    /// Create a write register command with no address (e.g., WRSR)
    pub fn write_reg(opcode: u8, data: &'a [u8]) -> Self {
        Self {
            opcode,
            address: None,
            address_width: AddressWidth::None,
            write_data: data,
            read_buf: &mut [],
        }
    }

    /// Create an addressed read command (e.g., READ, SFDP)
    pub fn read(opcode: u8, addr: u32, width: AddressWidth, buf: &'a mut [u8]) -> Self {
        Self {
            opcode,
            address: Some(addr),
            address_width: width,
            write_data: &[],
            read_buf: buf,
        }
    }

    /// Create an addressed write command (e.g., PP)
    pub fn write(opcode: u8, addr: u32, width: AddressWidth, data: &'a [u8]) -> Self {
        Self {
            opcode,
            address: Some(addr),
            address_width: width,
            write_data: data,
            read_buf: &mut [],
        }
    }

    /// Create an addressed command with no data phase (e.g., SE)
    pub fn erase(opcode: u8, addr: u32, width: AddressWidth) -> Self {
        Self {
            opcode,
            address: Some(addr),
            address_width: width,
            write_data: &[],
            read_buf: &mut [],
        }
    }

    /// Returns true if this command has a read phase
    pub fn has_read(&self) -> bool {
        !self.read_buf.is_empty()
    }

    /// Returns true if this command has a write phase
    pub fn has_write(&self) -> bool {
        !self.write_data.is_empty()
    }

    /// Number of address bytes sent on the wire
    pub fn address_bytes(&self) -> usize {
        if self.address.is_some() {
            self.address_width.bytes() as usize
        } else {
            0
        }
    }

    /// Number of bytes in the data phase, whichever direction it runs
    pub fn data_len(&self) -> usize {
        self.write_data.len().max(self.read_buf.len())
    }

    /// Whether the command fits a single automatic chip-select transaction
    ///
    /// The UMA registers carry at most four data bytes per transaction;
    /// anything longer keeps chip select asserted across several.
    pub fn fits_single_transfer(&self) -> bool {
        self.data_len() <= 4
    }

    /// Encode the address phase, most significant byte first
    pub fn encode_address<'b>(&self, buf: &'b mut [u8; 4]) -> &'b [u8] {
        match self.address {
            Some(addr) => self.address_width.encode(addr, buf),
            None => &buf[..0],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spi::opcodes;

    #[test]
    fn test_transfer_shape() {
        let mut id = [0u8; 3];
        let cmd = SpiCommand::read_reg(opcodes::RDID, &mut id);
        assert!(cmd.has_read());
        assert_eq!(cmd.address_bytes(), 0);
        assert!(cmd.fits_single_transfer());

        let page = [0u8; 256];
        let cmd = SpiCommand::write(opcodes::PP_4B, 0x0100_0000, AddressWidth::FourByte, &page);
        assert_eq!(cmd.address_bytes(), 4);
        assert!(!cmd.fits_single_transfer());

        let mut buf = [0u8; 4];
        assert_eq!(cmd.encode_address(&mut buf), &[0x01, 0, 0, 0]);
    }
}
