//! Contract ABI codec
//!
//! Encodes calls to the IOU contract and decodes transaction input back into
//! [`DecodedCall`]s. Only the static layout the contract actually uses is
//! supported: `address`, `uint32` and a single dynamic `address[]`.

use super::models::{Address, Amount, CallArg, CyclePath, DecodedCall};
use crate::{Error, Result, bail, ensure};

/// `add_IOU(address,uint32)`
pub const ADD_IOU: &str = "add_IOU";
/// `checkAndRemoveCycle(address[],uint32)`
pub const CHECK_AND_REMOVE_CYCLE: &str = "checkAndRemoveCycle";
/// `lookup(address,address)`
pub const LOOKUP: &str = "lookup";
/// `lookupAllDebt(address)`
pub const LOOKUP_ALL_DEBT: &str = "lookupAllDebt";

const WORD: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParamKind {
    Address,
    Uint,
    AddressList,
}

struct FunctionAbi {
    name: &'static str,
    /// First four bytes of the keccak-256 hash of the signature
    selector: [u8; 4],
    params: &'static [ParamKind],
}

const FUNCTIONS: &[FunctionAbi] = &[
    FunctionAbi {
        name: ADD_IOU,
        selector: [0xd1, 0x20, 0x99, 0xe4],
        params: &[ParamKind::Address, ParamKind::Uint],
    },
    FunctionAbi {
        name: CHECK_AND_REMOVE_CYCLE,
        selector: [0x7a, 0x58, 0xbf, 0x4f],
        params: &[ParamKind::AddressList, ParamKind::Uint],
    },
    FunctionAbi {
        name: LOOKUP,
        selector: [0x71, 0x35, 0x84, 0xa6],
        params: &[ParamKind::Address, ParamKind::Address],
    },
    FunctionAbi {
        name: LOOKUP_ALL_DEBT,
        selector: [0x36, 0x83, 0x46, 0xe2],
        params: &[ParamKind::Address],
    },
];

/// Decoder trait for contract call payloads
pub trait CallDecoder: Send + Sync {
    /// Decode raw transaction input. `None` when the payload is not a call
    /// this decoder knows about.
    fn decode(&self, input: &[u8]) -> Option<DecodedCall>;
}

/// Decoder for the IOU contract's functions
#[derive(Debug, Clone, Copy, Default)]
pub struct IouContractAbi;

impl CallDecoder for IouContractAbi {
    fn decode(&self, input: &[u8]) -> Option<DecodedCall> {
        match decode_call(input) {
            Ok(call) => Some(call),
            Err(e) => {
                tracing::debug!("Skipping undecodable call data: {}", e);
                None
            }
        }
    }
}

fn function_by_name(name: &str) -> Result<&'static FunctionAbi> {
    FUNCTIONS
        .iter()
        .find(|f| f.name == name)
        .ok_or_else(|| Error::abi(format!("unknown function {}", name)))
}

/// Decode raw call data into a function name and its arguments
pub fn decode_call(input: &[u8]) -> Result<DecodedCall> {
    ensure!(input.len() >= 4, "call data too short: {} bytes", input.len());
    let (selector, body) = input.split_at(4);

    let Some(function) = FUNCTIONS.iter().find(|f| f.selector == selector) else {
        bail!("unknown selector 0x{}", hex::encode(selector));
    };

    let mut args = Vec::with_capacity(function.params.len());
    for (idx, kind) in function.params.iter().enumerate() {
        let head = word_at(body, idx)?;
        let arg = match kind {
            ParamKind::Address => CallArg::Address(decode_address(head)?),
            ParamKind::Uint => CallArg::Uint(decode_uint(head)?),
            ParamKind::AddressList => {
                let offset = usize::try_from(decode_uint(head)?)
                    .map_err(|_| Error::abi("array offset overflow"))?;
                ensure!(offset % WORD == 0, "misaligned array offset {}", offset);
                let start = offset / WORD;
                let len = usize::try_from(decode_uint(word_at(body, start)?)?)
                    .map_err(|_| Error::abi("array length overflow"))?;
                let items = (0..len)
                    .map(|i| decode_address(word_at(body, start + 1 + i)?))
                    .collect::<Result<Vec<_>>>()?;
                CallArg::AddressList(items)
            }
        };
        args.push(arg);
    }

    Ok(DecodedCall {
        name: function.name.to_string(),
        args,
    })
}

/// `add_IOU(creditor, amount)`
pub fn encode_add_iou(creditor: &Address, amount: Amount) -> Result<Vec<u8>> {
    let mut out = selector_of(ADD_IOU)?;
    out.extend(address_word(creditor)?);
    out.extend(uint_word(amount));
    Ok(out)
}

/// `checkAndRemoveCycle(path, minAmount)`; the contract expects the closed
/// path with the first participant repeated at the end
pub fn encode_check_and_remove_cycle(cycle: &CyclePath) -> Result<Vec<u8>> {
    let path = cycle.closed();
    let mut out = selector_of(CHECK_AND_REMOVE_CYCLE)?;
    // head: offset of the dynamic array (two head words), then the amount
    out.extend(uint_word((2 * WORD) as u64));
    out.extend(uint_word(cycle.amount));
    out.extend(uint_word(path.len() as u64));
    for participant in &path {
        out.extend(address_word(participant)?);
    }
    Ok(out)
}

/// `lookup(debtor, creditor)`
pub fn encode_lookup(debtor: &Address, creditor: &Address) -> Result<Vec<u8>> {
    let mut out = selector_of(LOOKUP)?;
    out.extend(address_word(debtor)?);
    out.extend(address_word(creditor)?);
    Ok(out)
}

/// `lookupAllDebt(debtor)`
pub fn encode_lookup_all_debt(debtor: &Address) -> Result<Vec<u8>> {
    let mut out = selector_of(LOOKUP_ALL_DEBT)?;
    out.extend(address_word(debtor)?);
    Ok(out)
}

/// Decode the single `uint` word returned by a view call
pub fn decode_uint_return(output: &[u8]) -> Result<Amount> {
    decode_uint(word_at(output, 0)?)
}

/// Parse a `0x`-prefixed 20-byte hex address
pub fn address_bytes(address: &Address) -> Result<[u8; 20]> {
    let raw = address.as_str().trim_start_matches("0x");
    let bytes = hex::decode(raw).map_err(|_| Error::InvalidAddress(address.to_string()))?;
    bytes
        .try_into()
        .map_err(|_| Error::InvalidAddress(address.to_string()))
}

fn selector_of(name: &str) -> Result<Vec<u8>> {
    Ok(function_by_name(name)?.selector.to_vec())
}

fn word_at(data: &[u8], idx: usize) -> Result<&[u8]> {
    let start = idx * WORD;
    data.get(start..start + WORD)
        .ok_or_else(|| Error::abi(format!("missing word {} ({} bytes)", idx, data.len())))
}

fn address_word(address: &Address) -> Result<[u8; WORD]> {
    let mut word = [0u8; WORD];
    word[12..].copy_from_slice(&address_bytes(address)?);
    Ok(word)
}

fn uint_word(value: u64) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[24..].copy_from_slice(&value.to_be_bytes());
    word
}

fn decode_address(word: &[u8]) -> Result<Address> {
    ensure!(
        word[..12].iter().all(|b| *b == 0),
        "dirty address padding"
    );
    Ok(Address::new(format!("0x{}", hex::encode(&word[12..]))))
}

fn decode_uint(word: &[u8]) -> Result<u64> {
    ensure!(word[..24].iter().all(|b| *b == 0), "uint does not fit in 64 bits");
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&word[24..]);
    Ok(u64::from_be_bytes(buf))
}
