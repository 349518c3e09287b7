use thiserror::Error;

/// Reasons the decoder refuses a byte window.
///
/// A `DecodeError` is a normal outcome of decoding arbitrary bytes. Callers
/// sweeping memory treat it as the end of a block, not as a failure of the
/// whole analysis.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum DecodeError {
    #[error("Invalid opcode 0x{opcode:02x} at offset {offset}")]
    InvalidOpcode { opcode: u8, offset: usize },
    #[error("Truncated input: needed {needed} bytes, {available} available")]
    TruncatedInput { needed: usize, available: usize },
    #[error("Unsupported encoding: {0}")]
    UnsupportedEncoding(String),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("Json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Sort error, invalid bitness between expressions")]
    Sort,
    #[error("Invalid extract of bits {offset}..{end} from a {bits}-bit expression")]
    InvalidExtract {
        offset: usize,
        end: usize,
        bits: usize,
    },
    #[error("Expressions must have a width greater than 0")]
    ZeroWidth,
    #[error("Unknown register: {0}")]
    UnknownRegister(String),
    #[error("Operand {0} can not be written")]
    NotWritable(String),
    #[error("Instruction {mnemonic} expects operand {index}")]
    MissingOperand {
        mnemonic: String,
        index: usize,
    },
    #[error("{0}")]
    Custom(String),
}

impl From<&str> for Error {
    fn from(s: &str) -> Error {
        Error::Custom(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Error {
        Error::Custom(s)
    }
}
