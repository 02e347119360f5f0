//! ABI method signatures, argument encoding and return-value decoding.
//!
//! Implements the subset of the ARC-4 conventions the deployment engine
//! needs: typed method signatures, 4-byte selectors, argument validation and
//! encoding, and decoding of the logged return value.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha512_256};

use crate::app::Address;
use crate::error::DeployError;

/// Log prefix marking an ABI return value in a confirmed transaction.
pub const RETURN_PREFIX: [u8; 4] = [0x15, 0x1f, 0x7c, 0x75];

/// An ABI argument or return type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbiType {
    /// Unsigned integer with the given bit width (8..=64, multiple of 8).
    Uint(u16),
    Bool,
    Byte,
    String,
    Address,
    /// Variable-length array, length-prefixed on the wire.
    DynamicArray(Box<AbiType>),
    /// Fixed-length array.
    StaticArray(Box<AbiType>, u16),
}

impl AbiType {
    /// Whether values of this type have a fixed encoded size.
    fn is_static(&self) -> bool {
        match self {
            AbiType::Uint(_) | AbiType::Bool | AbiType::Byte | AbiType::Address => true,
            AbiType::String | AbiType::DynamicArray(_) => false,
            AbiType::StaticArray(inner, _) => inner.is_static(),
        }
    }
}

impl fmt::Display for AbiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbiType::Uint(bits) => write!(f, "uint{bits}"),
            AbiType::Bool => write!(f, "bool"),
            AbiType::Byte => write!(f, "byte"),
            AbiType::String => write!(f, "string"),
            AbiType::Address => write!(f, "address"),
            AbiType::DynamicArray(inner) => write!(f, "{inner}[]"),
            AbiType::StaticArray(inner, len) => write!(f, "{inner}[{len}]"),
        }
    }
}

impl FromStr for AbiType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Array suffixes bind tightest, so peel them off the end first.
        if let Some(base) = s.strip_suffix("[]") {
            return Ok(AbiType::DynamicArray(Box::new(base.parse()?)));
        }
        if let Some(open) = s.rfind('[') {
            let close = s
                .strip_suffix(']')
                .ok_or_else(|| format!("malformed array type `{s}`"))?;
            let len: u16 = close[open + 1..]
                .parse()
                .map_err(|_| format!("malformed array length in `{s}`"))?;
            return Ok(AbiType::StaticArray(Box::new(s[..open].parse()?), len));
        }
        match s {
            "bool" => Ok(AbiType::Bool),
            "byte" => Ok(AbiType::Byte),
            "string" => Ok(AbiType::String),
            "address" => Ok(AbiType::Address),
            _ => {
                let bits: u16 = s
                    .strip_prefix("uint")
                    .and_then(|b| b.parse().ok())
                    .ok_or_else(|| format!("unknown ABI type `{s}`"))?;
                if bits == 0 || bits > 64 || bits % 8 != 0 {
                    return Err(format!("unsupported uint width `{s}`"));
                }
                Ok(AbiType::Uint(bits))
            }
        }
    }
}

/// A decoded or to-be-encoded ABI value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbiValue {
    Uint(u64),
    Bool(bool),
    Byte(u8),
    String(String),
    Address(Address),
    Array(Vec<AbiValue>),
}

/// A typed ABI method signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbiMethod {
    pub name: String,
    pub args: Vec<AbiType>,
    pub returns: Option<AbiType>,
}

impl AbiMethod {
    /// Parse a signature of the form `name(type,...)return` (`void` or an
    /// empty suffix for no return value).
    pub fn parse(signature: &str) -> Result<Self, DeployError> {
        let malformed = |reason: String| DeployError::AbiEncoding {
            method: signature.to_string(),
            reason,
        };

        let open = signature
            .find('(')
            .ok_or_else(|| malformed("missing `(`".to_string()))?;
        let close = signature
            .rfind(')')
            .ok_or_else(|| malformed("missing `)`".to_string()))?;
        let name = signature[..open].to_string();
        if name.is_empty() {
            return Err(malformed("missing method name".to_string()));
        }

        let args_src = &signature[open + 1..close];
        let mut args = Vec::new();
        if !args_src.is_empty() {
            for arg in args_src.split(',') {
                args.push(arg.trim().parse().map_err(malformed)?);
            }
        }

        let ret_src = &signature[close + 1..];
        let returns = match ret_src {
            "" | "void" => None,
            ty => Some(ty.parse().map_err(malformed)?),
        };

        Ok(Self {
            name,
            args,
            returns,
        })
    }

    /// Canonical signature string, e.g. `add(uint64,uint64)uint64`.
    pub fn signature(&self) -> String {
        let args: Vec<String> = self.args.iter().map(|a| a.to_string()).collect();
        let ret = self
            .returns
            .as_ref()
            .map(|r| r.to_string())
            .unwrap_or_else(|| "void".to_string());
        format!("{}({}){}", self.name, args.join(","), ret)
    }

    /// First four bytes of the hash of the canonical signature.
    pub fn selector(&self) -> [u8; 4] {
        let digest: [u8; 32] = Sha512_256::digest(self.signature().as_bytes()).into();
        [digest[0], digest[1], digest[2], digest[3]]
    }

    /// Validate and encode a call: selector followed by one encoded argument
    /// per declared parameter.
    ///
    /// Argument count and types are checked against the signature before
    /// anything is encoded.
    pub fn encode_call(&self, args: &[AbiValue]) -> Result<Vec<Vec<u8>>, DeployError> {
        if args.len() != self.args.len() {
            return Err(self.encoding_error(format!(
                "expected {} argument(s), got {}",
                self.args.len(),
                args.len()
            )));
        }

        let mut app_args = Vec::with_capacity(args.len() + 1);
        app_args.push(self.selector().to_vec());
        for (ty, value) in self.args.iter().zip(args) {
            let encoded = encode_value(ty, value).map_err(|reason| self.encoding_error(reason))?;
            app_args.push(encoded);
        }
        Ok(app_args)
    }

    /// Decode the return value from the logs of a confirmed call.
    ///
    /// The value is the suffix of the last log entry carrying the ABI return
    /// prefix. Returns `None` for void methods or when no such log exists.
    pub fn decode_return(&self, logs: &[Vec<u8>]) -> Result<Option<AbiValue>, DeployError> {
        let Some(ty) = &self.returns else {
            return Ok(None);
        };
        let Some(payload) = logs
            .iter()
            .rev()
            .find(|log| log.starts_with(&RETURN_PREFIX))
            .map(|log| &log[RETURN_PREFIX.len()..])
        else {
            return Ok(None);
        };

        let (value, consumed) =
            decode_value(ty, payload).map_err(|reason| self.encoding_error(reason))?;
        if consumed != payload.len() {
            return Err(self.encoding_error("trailing bytes after return value".to_string()));
        }
        Ok(Some(value))
    }

    fn encoding_error(&self, reason: String) -> DeployError {
        DeployError::AbiEncoding {
            method: self.signature(),
            reason,
        }
    }
}

// Methods are written as signature strings in specs and config files.
impl Serialize for AbiMethod {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.signature())
    }
}

impl<'de> Deserialize<'de> for AbiMethod {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let signature = String::deserialize(deserializer)?;
        AbiMethod::parse(&signature).map_err(serde::de::Error::custom)
    }
}

fn encode_value(ty: &AbiType, value: &AbiValue) -> Result<Vec<u8>, String> {
    match (ty, value) {
        (AbiType::Uint(bits), AbiValue::Uint(v)) => {
            let width = (*bits / 8) as usize;
            if width < 8 && *v >= 1u64 << *bits {
                return Err(format!("{v} does not fit in uint{bits}"));
            }
            Ok(v.to_be_bytes()[8 - width..].to_vec())
        }
        (AbiType::Bool, AbiValue::Bool(v)) => Ok(vec![if *v { 0x80 } else { 0x00 }]),
        (AbiType::Byte, AbiValue::Byte(v)) => Ok(vec![*v]),
        (AbiType::String, AbiValue::String(s)) => {
            let bytes = s.as_bytes();
            let len = u16::try_from(bytes.len()).map_err(|_| "string too long".to_string())?;
            let mut out = len.to_be_bytes().to_vec();
            out.extend_from_slice(bytes);
            Ok(out)
        }
        (AbiType::Address, AbiValue::Address(addr)) => {
            let raw = hex::decode(addr.as_str())
                .map_err(|_| format!("address `{addr}` is not hex-encoded"))?;
            if raw.len() != 32 {
                return Err(format!("address `{addr}` is not 32 bytes"));
            }
            Ok(raw)
        }
        (AbiType::DynamicArray(inner), AbiValue::Array(items)) => {
            if !inner.is_static() {
                return Err(format!("unsupported array element type `{inner}`"));
            }
            let len = u16::try_from(items.len()).map_err(|_| "array too long".to_string())?;
            let mut out = len.to_be_bytes().to_vec();
            for item in items {
                out.extend(encode_value(inner, item)?);
            }
            Ok(out)
        }
        (AbiType::StaticArray(inner, len), AbiValue::Array(items)) => {
            if !inner.is_static() {
                return Err(format!("unsupported array element type `{inner}`"));
            }
            if items.len() != *len as usize {
                return Err(format!("expected {len} element(s), got {}", items.len()));
            }
            let mut out = Vec::new();
            for item in items {
                out.extend(encode_value(inner, item)?);
            }
            Ok(out)
        }
        (ty, value) => Err(format!("value {value:?} does not match type `{ty}`")),
    }
}

/// Decode one value of `ty` from the front of `bytes`, returning the value
/// and the number of bytes consumed.
fn decode_value(ty: &AbiType, bytes: &[u8]) -> Result<(AbiValue, usize), String> {
    let need = |n: usize| {
        if bytes.len() < n {
            Err(format!("truncated `{ty}` value"))
        } else {
            Ok(())
        }
    };

    match ty {
        AbiType::Uint(bits) => {
            let width = (*bits / 8) as usize;
            need(width)?;
            let mut buf = [0u8; 8];
            buf[8 - width..].copy_from_slice(&bytes[..width]);
            Ok((AbiValue::Uint(u64::from_be_bytes(buf)), width))
        }
        AbiType::Bool => {
            need(1)?;
            Ok((AbiValue::Bool(bytes[0] & 0x80 != 0), 1))
        }
        AbiType::Byte => {
            need(1)?;
            Ok((AbiValue::Byte(bytes[0]), 1))
        }
        AbiType::String => {
            need(2)?;
            let len = u16::from_be_bytes([bytes[0], bytes[1]]) as usize;
            need(2 + len)?;
            let s = String::from_utf8(bytes[2..2 + len].to_vec())
                .map_err(|_| "string is not valid UTF-8".to_string())?;
            Ok((AbiValue::String(s), 2 + len))
        }
        AbiType::Address => {
            need(32)?;
            Ok((
                AbiValue::Address(Address::new(hex::encode(&bytes[..32]))),
                32,
            ))
        }
        AbiType::DynamicArray(inner) => {
            need(2)?;
            let len = u16::from_be_bytes([bytes[0], bytes[1]]) as usize;
            let mut offset = 2;
            let mut items = Vec::with_capacity(len);
            for _ in 0..len {
                let (item, consumed) = decode_value(inner, &bytes[offset..])?;
                items.push(item);
                offset += consumed;
            }
            Ok((AbiValue::Array(items), offset))
        }
        AbiType::StaticArray(inner, len) => {
            let mut offset = 0;
            let mut items = Vec::with_capacity(*len as usize);
            for _ in 0..*len {
                let (item, consumed) = decode_value(inner, &bytes[offset..])?;
                items.push(item);
                offset += consumed;
            }
            Ok((AbiValue::Array(items), offset))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_roundtrip_signature() {
        let method = AbiMethod::parse("add(uint64,uint64)uint64").unwrap();
        assert_eq!(method.name, "add");
        assert_eq!(method.args, vec![AbiType::Uint(64), AbiType::Uint(64)]);
        assert_eq!(method.returns, Some(AbiType::Uint(64)));
        assert_eq!(method.signature(), "add(uint64,uint64)uint64");
    }

    #[test]
    fn test_parse_void_and_empty_return() {
        let void = AbiMethod::parse("reset()void").unwrap();
        assert_eq!(void.returns, None);
        assert_eq!(void.signature(), "reset()void");

        let bare = AbiMethod::parse("reset()").unwrap();
        assert_eq!(bare.returns, None);
    }

    #[test]
    fn test_parse_array_types() {
        let method = AbiMethod::parse("tally(uint8[4],byte[])void").unwrap();
        assert_eq!(
            method.args[0],
            AbiType::StaticArray(Box::new(AbiType::Uint(8)), 4)
        );
        assert_eq!(method.args[1], AbiType::DynamicArray(Box::new(AbiType::Byte)));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(AbiMethod::parse("add").is_err());
        assert!(AbiMethod::parse("(uint64)void").is_err());
        assert!(AbiMethod::parse("add(uint65)void").is_err());
        assert!(AbiMethod::parse("add(what)void").is_err());
    }

    #[test]
    fn test_selector_deterministic_and_signature_sensitive() {
        let a = AbiMethod::parse("add(uint64,uint64)uint64").unwrap();
        let b = AbiMethod::parse("add(uint64,uint64)uint64").unwrap();
        let c = AbiMethod::parse("add(uint64)uint64").unwrap();
        assert_eq!(a.selector(), b.selector());
        assert_ne!(a.selector(), c.selector());
    }

    #[test]
    fn test_encode_call_selector_first() {
        let method = AbiMethod::parse("incr(uint64)uint64").unwrap();
        let args = method.encode_call(&[AbiValue::Uint(5)]).unwrap();
        assert_eq!(args.len(), 2);
        assert_eq!(args[0], method.selector().to_vec());
        assert_eq!(args[1], vec![0, 0, 0, 0, 0, 0, 0, 5]);
    }

    #[test]
    fn test_encode_call_count_mismatch_fails_fast() {
        let method = AbiMethod::parse("incr(uint64)uint64").unwrap();
        let err = method.encode_call(&[]).unwrap_err();
        match err {
            DeployError::AbiEncoding { reason, .. } => {
                assert!(reason.contains("expected 1 argument(s), got 0"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_encode_call_type_mismatch() {
        let method = AbiMethod::parse("incr(uint64)uint64").unwrap();
        assert!(
            method
                .encode_call(&[AbiValue::String("five".to_string())])
                .is_err()
        );
    }

    #[test]
    fn test_encode_uint_width_check() {
        let method = AbiMethod::parse("set(uint8)void").unwrap();
        assert!(method.encode_call(&[AbiValue::Uint(255)]).is_ok());
        assert!(method.encode_call(&[AbiValue::Uint(256)]).is_err());
    }

    #[test]
    fn test_encode_string_length_prefixed() {
        let method = AbiMethod::parse("name(string)void").unwrap();
        let args = method
            .encode_call(&[AbiValue::String("hi".to_string())])
            .unwrap();
        assert_eq!(args[1], vec![0, 2, b'h', b'i']);
    }

    #[test]
    fn test_decode_return_uses_last_prefixed_log() {
        let method = AbiMethod::parse("incr(uint64)uint64").unwrap();
        let mut log = RETURN_PREFIX.to_vec();
        log.extend_from_slice(&7u64.to_be_bytes());
        let logs = vec![b"debug line".to_vec(), log];
        let value = method.decode_return(&logs).unwrap();
        assert_eq!(value, Some(AbiValue::Uint(7)));
    }

    #[test]
    fn test_decode_return_void_is_none() {
        let method = AbiMethod::parse("reset()void").unwrap();
        assert_eq!(method.decode_return(&[]).unwrap(), None);
    }

    #[test]
    fn test_decode_return_trailing_bytes_rejected() {
        let method = AbiMethod::parse("incr(uint64)uint64").unwrap();
        let mut log = RETURN_PREFIX.to_vec();
        log.extend_from_slice(&7u64.to_be_bytes());
        log.push(0xff);
        assert!(method.decode_return(&[log]).is_err());
    }

    #[test]
    fn test_method_serde_as_signature() {
        let method = AbiMethod::parse("add(uint64,uint64)uint64").unwrap();
        let json = serde_json::to_string(&method).unwrap();
        assert_eq!(json, "\"add(uint64,uint64)uint64\"");
        let back: AbiMethod = serde_json::from_str(&json).unwrap();
        assert_eq!(back, method);
    }
}
