//! Textual call data: `function@hexarg@hexarg...`.

use crate::error::VmError;
use crate::output::ReturnCode;

const SEPARATOR: u8 = b'@';

/// Decoded call data.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CallArgs {
    pub function: String,
    pub arguments: Vec<Vec<u8>>,
}

impl CallArgs {
    /// Parse call data. Empty data is a plain transfer with no function.
    pub fn parse(data: &[u8]) -> Result<Self, VmError> {
        if data.is_empty() {
            return Ok(Self::default());
        }

        let mut tokens = data.split(|b| *b == SEPARATOR);
        let function = tokens.next().unwrap_or_default();
        let function = std::str::from_utf8(function)
            .map_err(|_| VmError::ExecutionFailed("call data function is not UTF-8".to_string()))?
            .to_string();

        let arguments = tokens
            .map(|token| {
                hex::decode(token)
                    .map_err(|e| VmError::ExecutionFailed(format!("invalid call argument: {}", e)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { function, arguments })
    }

    pub fn is_transfer(&self) -> bool {
        self.function.is_empty() && self.arguments.is_empty()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut data = self.function.as_bytes().to_vec();
        for argument in &self.arguments {
            data.push(SEPARATOR);
            data.extend_from_slice(hex::encode(argument).as_bytes());
        }
        data
    }
}

/// Data carried back to the caller of an async call: `@<code>@<result>...`.
/// The code is minimal big-endian, so success is an empty argument.
pub fn encode_callback_data(code: ReturnCode, return_data: &[Vec<u8>]) -> Vec<u8> {
    let mut arguments = vec![return_code_bytes(code)];
    arguments.extend(return_data.iter().cloned());
    CallArgs {
        function: String::new(),
        arguments,
    }
    .encode()
}

/// Minimal big-endian bytes of `code`; `Ok` has none.
pub fn return_code_bytes(code: ReturnCode) -> Vec<u8> {
    let code = code.as_u64().to_be_bytes();
    let first = code.iter().position(|b| *b != 0).unwrap_or(code.len());
    code[first..].to_vec()
}

/// Return code carried in the first callback argument.
pub fn callback_return_code(arguments: &[Vec<u8>]) -> ReturnCode {
    let code = arguments
        .first()
        .map(|bytes| bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
        .unwrap_or(0);
    ReturnCode::from_u64(code).unwrap_or(ReturnCode::ExecutionFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_function_and_arguments() {
        let args = CallArgs::parse(b"transfer@0102@@ff").unwrap();
        assert_eq!(args.function, "transfer");
        assert_eq!(args.arguments, vec![vec![1, 2], vec![], vec![0xff]]);
        assert_eq!(args.encode(), b"transfer@0102@@ff".to_vec());
    }

    #[test]
    fn test_empty_is_transfer() {
        let args = CallArgs::parse(b"").unwrap();
        assert!(args.is_transfer());
    }

    #[test]
    fn test_invalid_hex() {
        assert!(matches!(
            CallArgs::parse(b"f@zz"),
            Err(VmError::ExecutionFailed(_))
        ));
    }

    #[test]
    fn test_callback_data() {
        let data = encode_callback_data(ReturnCode::Ok, &[vec![0x2a]]);
        assert_eq!(data, b"@@2a".to_vec());

        let parsed = CallArgs::parse(&data).unwrap();
        assert_eq!(parsed.function, "");
        assert_eq!(callback_return_code(&parsed.arguments), ReturnCode::Ok);

        let failed = CallArgs::parse(&encode_callback_data(ReturnCode::UserError, &[])).unwrap();
        assert_eq!(failed.arguments, vec![vec![4]]);
        assert_eq!(callback_return_code(&failed.arguments), ReturnCode::UserError);
    }
}
