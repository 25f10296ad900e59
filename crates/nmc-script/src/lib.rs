//! Name operation scripts.
//!
//! A name script is an ordinary output script prefixed with a name
//! operation: the operation opcode, its data pushes and the `DROP`s that
//! remove them from the stack again.  Whatever follows the drops is the
//! "address" part that actually locks the coin.  Parsing is total: any
//! script can be picked apart, non-name scripts simply yield no operation
//! and the full script as address.

use bitcoin::blockdata::opcodes::all::{
    OP_2DROP, OP_DROP, OP_NOP, OP_PUSHNUM_1, OP_PUSHNUM_2, OP_PUSHNUM_3,
};
use bitcoin::blockdata::opcodes::Opcode;
use bitcoin::blockdata::script::Instruction;
use bitcoin::blockdata::transaction::Version;
use bitcoin::hashes::{hash160, Hash};
use bitcoin::script::PushBytesBuf;
use bitcoin::{Script, ScriptBuf, Transaction};

/// Commit phase: publishes the hash of `rand ∥ name`.
pub const OP_NAME_NEW: Opcode = OP_PUSHNUM_1;
/// Reveal phase: creates the name, carrying `(name, rand, value)`.
pub const OP_NAME_FIRSTUPDATE: Opcode = OP_PUSHNUM_2;
/// Updates an existing name, carrying `(name, value)`.
pub const OP_NAME_UPDATE: Opcode = OP_PUSHNUM_3;

/// Transaction version marking a transaction as carrying name operations.
pub const NAME_TX_VERSION: Version = Version(0x7100);

/// Whether the transaction is flagged as a name transaction by its version.
pub fn is_name_transaction(tx: &Transaction) -> bool {
    tx.version == NAME_TX_VERSION
}

/// A parsed name operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameOp {
    /// `OP_NAME_NEW <hash>`: the pre-image announcement.
    New { hash: Vec<u8> },
    /// `OP_NAME_FIRSTUPDATE <name> <rand> <value>`: the first registration.
    FirstUpdate {
        name: Vec<u8>,
        rand: Vec<u8>,
        value: Vec<u8>,
    },
    /// `OP_NAME_UPDATE <name> <value>`: a subsequent update.
    Update { name: Vec<u8>, value: Vec<u8> },
}

/// A script parsed for name operations.
///
/// Initialised from any script; determines whether it is a name operation
/// and which parts it consists of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameScript {
    /// The operation, if the script is a well-formed name script.
    op: Option<NameOp>,
    /// The non-name part, i.e. the address locking the coin.
    address: ScriptBuf,
}

impl NameScript {
    /// Parse a script and pick apart its name operation, if any.
    pub fn parse(script: &Script) -> Self {
        let non_name = || Self {
            op: None,
            address: script.to_owned(),
        };

        let mut instructions = script.instruction_indices();

        let name_op = match instructions.next() {
            Some(Ok((_, Instruction::Op(op))))
                if op == OP_NAME_NEW || op == OP_NAME_FIRSTUPDATE || op == OP_NAME_UPDATE =>
            {
                op
            }
            _ => return non_name(),
        };

        // Data pushes up to the first DROP/NOP.  Anything else (including
        // a malformed script) disqualifies the name prefix.
        let mut args: Vec<Vec<u8>> = Vec::new();
        let mut saw_drop = false;
        for instruction in instructions.by_ref() {
            match instruction {
                Ok((_, Instruction::PushBytes(data))) => args.push(data.as_bytes().to_vec()),
                Ok((_, Instruction::Op(op))) if op == OP_DROP || op == OP_2DROP || op == OP_NOP => {
                    saw_drop = true;
                    break;
                }
                _ => return non_name(),
            }
        }
        if !saw_drop {
            return non_name();
        }

        // Skip the remaining drops; the first other instruction starts the
        // address part.
        let mut address_start = script.len();
        for instruction in instructions {
            match instruction {
                Ok((_, Instruction::Op(op))) if op == OP_DROP || op == OP_2DROP || op == OP_NOP => {}
                Ok((pos, _)) => {
                    address_start = pos;
                    break;
                }
                Err(_) => return non_name(),
            }
        }
        let address = ScriptBuf::from_bytes(script.as_bytes()[address_start..].to_vec());

        let op = match name_op {
            op if op == OP_NAME_NEW && args.len() == 1 => NameOp::New {
                hash: args.swap_remove(0),
            },
            op if op == OP_NAME_FIRSTUPDATE && args.len() == 3 => {
                let value = args.pop().expect("three args checked; qed");
                let rand = args.pop().expect("three args checked; qed");
                let name = args.pop().expect("three args checked; qed");
                NameOp::FirstUpdate { name, rand, value }
            }
            op if op == OP_NAME_UPDATE && args.len() == 2 => {
                let value = args.pop().expect("two args checked; qed");
                let name = args.pop().expect("two args checked; qed");
                NameOp::Update { name, value }
            }
            _ => return non_name(),
        };

        Self {
            op: Some(op),
            address,
        }
    }

    /// Whether this is a (valid) name operation script.
    pub fn is_name_op(&self) -> bool {
        self.op.is_some()
    }

    /// Whether this is a FIRSTUPDATE or UPDATE, i.e. an operation that
    /// writes name data.
    pub fn is_any_update(&self) -> bool {
        matches!(
            self.op,
            Some(NameOp::FirstUpdate { .. }) | Some(NameOp::Update { .. })
        )
    }

    /// The parsed operation, if any.
    pub fn op(&self) -> Option<&NameOp> {
        self.op.as_ref()
    }

    /// The non-name part of the script, i.e. the owner address.
    pub fn address(&self) -> &Script {
        &self.address
    }

    /// The operated-on name (FIRSTUPDATE and UPDATE only).
    pub fn name(&self) -> Option<&[u8]> {
        match &self.op {
            Some(NameOp::FirstUpdate { name, .. }) | Some(NameOp::Update { name, .. }) => {
                Some(name)
            }
            _ => None,
        }
    }

    /// The new value (FIRSTUPDATE and UPDATE only).
    pub fn value(&self) -> Option<&[u8]> {
        match &self.op {
            Some(NameOp::FirstUpdate { value, .. }) | Some(NameOp::Update { value, .. }) => {
                Some(value)
            }
            _ => None,
        }
    }

    /// The reveal nonce (FIRSTUPDATE only).
    pub fn rand(&self) -> Option<&[u8]> {
        match &self.op {
            Some(NameOp::FirstUpdate { rand, .. }) => Some(rand),
            _ => None,
        }
    }

    /// The committed hash (NEW only).
    pub fn new_hash(&self) -> Option<&[u8]> {
        match &self.op {
            Some(NameOp::New { hash }) => Some(hash),
            _ => None,
        }
    }
}

/// The commitment published by NAME_NEW: `RIPEMD160(SHA256(rand ∥ name))`.
pub fn commitment(rand: &[u8], name: &[u8]) -> hash160::Hash {
    let mut data = Vec::with_capacity(rand.len() + name.len());
    data.extend_from_slice(rand);
    data.extend_from_slice(name);
    hash160::Hash::hash(&data)
}

/// Build a NAME_NEW script: `OP_NAME_NEW <hash> OP_2DROP ∥ address`.
pub fn build_name_new(address: &Script, hash: &hash160::Hash) -> ScriptBuf {
    let prefix = bitcoin::script::Builder::new()
        .push_opcode(OP_NAME_NEW)
        .push_slice(hash.to_byte_array())
        .push_opcode(OP_2DROP)
        .into_script();
    concat(prefix, address)
}

/// Build a NAME_FIRSTUPDATE script:
/// `OP_NAME_FIRSTUPDATE <name> <rand> <value> OP_2DROP OP_2DROP ∥ address`.
pub fn build_name_firstupdate(
    address: &Script,
    name: &[u8],
    value: &[u8],
    rand: &[u8],
) -> ScriptBuf {
    let prefix = bitcoin::script::Builder::new()
        .push_opcode(OP_NAME_FIRSTUPDATE)
        .push_slice(push_bytes(name))
        .push_slice(push_bytes(rand))
        .push_slice(push_bytes(value))
        .push_opcode(OP_2DROP)
        .push_opcode(OP_2DROP)
        .into_script();
    concat(prefix, address)
}

/// Build a NAME_UPDATE script:
/// `OP_NAME_UPDATE <name> <value> OP_2DROP OP_DROP ∥ address`.
pub fn build_name_update(address: &Script, name: &[u8], value: &[u8]) -> ScriptBuf {
    let prefix = bitcoin::script::Builder::new()
        .push_opcode(OP_NAME_UPDATE)
        .push_slice(push_bytes(name))
        .push_slice(push_bytes(value))
        .push_opcode(OP_2DROP)
        .push_opcode(OP_DROP)
        .into_script();
    concat(prefix, address)
}

fn push_bytes(data: &[u8]) -> PushBytesBuf {
    PushBytesBuf::try_from(data.to_vec()).expect("name script pushes are far below 4 GiB; qed")
}

fn concat(prefix: ScriptBuf, address: &Script) -> ScriptBuf {
    let mut bytes = prefix.into_bytes();
    bytes.extend_from_slice(address.as_bytes());
    ScriptBuf::from_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::PubkeyHash;

    fn test_address() -> ScriptBuf {
        ScriptBuf::new_p2pkh(&PubkeyHash::all_zeros())
    }

    #[test]
    fn non_name_script() {
        let addr = test_address();
        let parsed = NameScript::parse(&addr);
        assert!(!parsed.is_name_op());
        assert!(!parsed.is_any_update());
        assert_eq!(parsed.address(), addr.as_script());
    }

    #[test]
    fn name_new_roundtrip() {
        let addr = test_address();
        let name = b"my-cool-name";
        let rand = vec![b'x'; 20];
        let hash = commitment(&rand, name);

        let script = build_name_new(&addr, &hash);
        let parsed = NameScript::parse(&script);
        assert!(parsed.is_name_op());
        assert!(!parsed.is_any_update());
        assert_eq!(parsed.new_hash(), Some(&hash.to_byte_array()[..]));
        assert_eq!(parsed.address(), addr.as_script());
        assert_eq!(parsed.name(), None);
    }

    #[test]
    fn name_firstupdate_roundtrip() {
        let addr = test_address();
        let name = b"my-cool-name".to_vec();
        let value = b"42!".to_vec();
        let rand = vec![b'x'; 20];

        let script = build_name_firstupdate(&addr, &name, &value, &rand);
        let parsed = NameScript::parse(&script);
        assert!(parsed.is_name_op());
        assert!(parsed.is_any_update());
        assert_eq!(parsed.name(), Some(&name[..]));
        assert_eq!(parsed.value(), Some(&value[..]));
        assert_eq!(parsed.rand(), Some(&rand[..]));
        assert_eq!(parsed.address(), addr.as_script());
    }

    #[test]
    fn name_update_roundtrip() {
        let addr = test_address();
        let name = b"my-cool-name".to_vec();
        let value = b"42!".to_vec();

        let script = build_name_update(&addr, &name, &value);
        let parsed = NameScript::parse(&script);
        assert!(parsed.is_name_op());
        assert!(parsed.is_any_update());
        assert_eq!(
            parsed.op(),
            Some(&NameOp::Update {
                name: name.clone(),
                value: value.clone()
            })
        );
        assert_eq!(parsed.rand(), None);
        assert_eq!(parsed.address(), addr.as_script());
    }

    #[test]
    fn empty_value_parses() {
        let addr = test_address();
        let script = build_name_update(&addr, b"d/empty", b"");
        let parsed = NameScript::parse(&script);
        assert_eq!(parsed.value(), Some(&b""[..]));
    }

    #[test]
    fn wrong_arg_count_is_not_a_name_op() {
        // OP_NAME_NEW with two pushes does not parse as a name operation.
        let addr = test_address();
        let script = bitcoin::script::Builder::new()
            .push_opcode(OP_NAME_NEW)
            .push_slice([0u8; 20])
            .push_slice([1u8; 4])
            .push_opcode(OP_2DROP)
            .into_script();
        let script = concat(script, &addr);
        assert!(!NameScript::parse(&script).is_name_op());
    }

    #[test]
    fn commitment_is_hash160() {
        // H160 of "ab" (rand = "a", name = "b").
        let expected = hash160::Hash::hash(b"ab");
        assert_eq!(commitment(b"a", b"b"), expected);
    }

    #[test]
    fn name_tx_version_flag() {
        use bitcoin::absolute::LockTime;
        let mut tx = Transaction {
            version: Version::ONE,
            lock_time: LockTime::ZERO,
            input: vec![],
            output: vec![],
        };
        assert!(!is_name_transaction(&tx));
        tx.version = NAME_TX_VERSION;
        assert!(is_name_transaction(&tx));
    }
}
