//! # Serial input
//!
//! [AtReader] wraps the byte stream coming from the AT host and offers the primitives the
//! command parser is built of. Every byte read is consumed for good, there is no pushback.
//! So on a mismatch the stream continues right after the last byte examined.
//!
//! ## Example
//!
//! ````
//! # use at_host::transport::{AtReader, Charset, Delimiter};
//! let mut reader = AtReader::new(&b"0,tcp_client\r"[..]);
//!
//! let link_id = reader.read_field::<16>(Charset::Digits).unwrap();
//! assert_eq!(b"0", link_id.value.as_slice());
//! assert_eq!(Delimiter::Separator, link_id.delimiter);
//!
//! let conn_type = reader.read_field::<16>(Charset::ConnType).unwrap();
//! assert_eq!("tcp_client", conn_type.as_str().unwrap());
//! assert_eq!(Delimiter::Terminator, conn_type.delimiter);
//! ````
use core::str::FromStr;
use embedded_io::{Error as IoError, ErrorKind, Read, ReadExactError};
use heapless::Vec;

/// Field separator of argument lists
pub const SEPARATOR: u8 = b',';

/// Command terminator
pub const TERMINATOR: u8 = b'\r';

/// Max. length of a literal command name fragment
pub const MAX_LITERAL_LEN: usize = 32;

/// Errors while reading from the serial input
#[derive(Clone, Debug, PartialEq)]
pub enum ReadError {
    /// Serial input is closed
    Eof,

    /// Upstream read error
    Transport(ErrorKind),

    /// Field exceeds the capacity of the receiving buffer before a delimiter was seen
    Overflow,

    /// Byte rejected by the character set of the field
    InvalidCharacter(u8),

    /// Field is not followed by the expected delimiter
    UnexpectedDelimiter(Delimiter),

    /// Field content is no valid number/text
    InvalidValue,
}

/// Byte which ended a field
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Delimiter {
    /// `,` => more fields follow
    Separator,

    /// `\r` => end of command
    Terminator,
}

/// Character set validation applied to each byte of a field
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Charset {
    /// `0-9`
    Digits,

    /// `0-9` and `.`
    IpAddress,

    /// `a-z` and `_`
    ConnType,

    /// No validation
    Any,
}

impl Charset {
    pub fn accepts(self, byte: u8) -> bool {
        match self {
            Charset::Digits => byte.is_ascii_digit(),
            Charset::IpAddress => byte.is_ascii_digit() || byte == b'.',
            Charset::ConnType => byte.is_ascii_lowercase() || byte == b'_',
            Charset::Any => true,
        }
    }
}

/// A single field of an argument list
#[derive(Clone, Debug)]
pub struct Field<const N: usize> {
    /// Field content without delimiter
    pub value: Vec<u8, N>,

    /// Delimiter which ended the field
    pub delimiter: Delimiter,
}

impl<const N: usize> Field<N> {
    pub fn as_str(&self) -> Result<&str, ReadError> {
        core::str::from_utf8(&self.value).map_err(|_| ReadError::InvalidValue)
    }

    /// Parses the field content, e.g. as number
    pub fn parse<T: FromStr>(&self) -> Result<T, ReadError> {
        self.as_str()?.parse::<T>().map_err(|_| ReadError::InvalidValue)
    }

    /// True if more fields follow
    pub fn has_more(&self) -> bool {
        self.delimiter == Delimiter::Separator
    }

    /// Returns an error if the field was not ended by the given delimiter
    pub fn expect(self, delimiter: Delimiter) -> Result<Self, ReadError> {
        if self.delimiter != delimiter {
            return Err(ReadError::UnexpectedDelimiter(self.delimiter));
        }

        Ok(self)
    }
}

/// Consuming reader on top of the serial input
pub struct AtReader<R: Read> {
    inner: R,

    /// Total number of bytes consumed
    consumed: usize,
}

impl<R: Read> AtReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, consumed: 0 }
    }

    /// Reads a single byte, blocks until available
    pub fn read_byte(&mut self) -> Result<u8, ReadError> {
        let mut byte = [0x0; 1];
        self.read_exact(&mut byte)?;
        Ok(byte[0])
    }

    /// Fills the whole buffer, blocks until all bytes are available
    pub fn read_exact(&mut self, buffer: &mut [u8]) -> Result<(), ReadError> {
        self.inner.read_exact(buffer).map_err(|error| match error {
            ReadExactError::UnexpectedEof => ReadError::Eof,
            ReadExactError::Other(error) => ReadError::Transport(error.kind()),
        })?;

        self.consumed += buffer.len();
        Ok(())
    }

    /// Consumes `literal.len()` bytes and returns true if they are equal to `literal`.
    /// The bytes are consumed in any case.
    pub fn expect_literal(&mut self, literal: &[u8]) -> Result<bool, ReadError> {
        let mut buffer = [0x0; MAX_LITERAL_LEN];
        let length = literal.len().min(MAX_LITERAL_LEN);

        self.read_exact(&mut buffer[..length])?;
        Ok(&buffer[..length] == literal)
    }

    /// Reads a field byte by byte until `,` or `\r`
    ///
    /// Fails if a byte is rejected by the given charset or more than N bytes are read
    /// before a delimiter. The delimiter is consumed but not stored.
    pub fn read_field<const N: usize>(&mut self, charset: Charset) -> Result<Field<N>, ReadError> {
        let mut value = Vec::new();

        loop {
            let byte = self.read_byte()?;

            match byte {
                SEPARATOR => {
                    return Ok(Field {
                        value,
                        delimiter: Delimiter::Separator,
                    })
                }
                TERMINATOR => {
                    return Ok(Field {
                        value,
                        delimiter: Delimiter::Terminator,
                    })
                }
                _ => {}
            }

            if value.len() >= N {
                log::error!("Field too long, read so far {:?}", value);
                return Err(ReadError::Overflow);
            }

            if !charset.accepts(byte) {
                log::error!("Invalid byte {:#04x} in field {:?}", byte, value);
                return Err(ReadError::InvalidCharacter(byte));
            }

            // Capacity checked above
            let _ = value.push(byte);
        }
    }

    /// Returns the total number of bytes consumed so far
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}
