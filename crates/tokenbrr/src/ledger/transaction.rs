//! Transaction entity, canonical encoding and signing.
//!
//! The payload is RLP-encoded as
//! `[script, arguments, reference_block_id, gas_limit, proposer, key_index,
//! sequence_number, payer, authorizers]`, the envelope as
//! `[payload, payload_signatures]`. Signed messages are prefixed with the
//! zero-padded transaction domain tag.

use alloy_primitives::{Bytes, B256};
use alloy_rlp::{BufMut, Encodable, Header};
use sha3::{Digest, Sha3_256};

use super::{Address, Identifier};
use crate::{error::SignError, keys::KeyPair};

/// Domain separation tag prepended to every signed transaction message.
pub const TRANSACTION_DOMAIN_TAG: [u8; 32] = pad_tag(b"FLOW-V0.0-transaction");

const fn pad_tag(label: &[u8]) -> [u8; 32] {
    let mut tag = [0u8; 32];
    let mut i = 0;
    while i < label.len() {
        tag[i] = label[i];
        i += 1;
    }
    tag
}

/// Key whose sequence number the transaction consumes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProposalKey {
    pub address: Address,
    pub key_index: u32,
    pub sequence_number: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionSignature {
    pub address: Address,
    pub key_index: u32,
    pub signature: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub script: Bytes,
    pub arguments: Vec<Bytes>,
    pub reference_block_id: Identifier,
    pub gas_limit: u64,
    pub proposal_key: ProposalKey,
    pub payer: Address,
    pub authorizers: Vec<Address>,
    pub payload_signatures: Vec<TransactionSignature>,
    pub envelope_signatures: Vec<TransactionSignature>,
}

impl Transaction {
    pub fn new(script: Bytes) -> Self {
        Self {
            script,
            arguments: Vec::new(),
            reference_block_id: B256::ZERO,
            gas_limit: 0,
            proposal_key: ProposalKey::default(),
            payer: Address::default(),
            authorizers: Vec::new(),
            payload_signatures: Vec::new(),
            envelope_signatures: Vec::new(),
        }
    }

    #[must_use]
    pub const fn with_reference_block(mut self, id: Identifier) -> Self {
        self.reference_block_id = id;
        self
    }

    #[must_use]
    pub const fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = gas_limit;
        self
    }

    #[must_use]
    pub const fn with_proposal_key(mut self, proposal_key: ProposalKey) -> Self {
        self.proposal_key = proposal_key;
        self
    }

    #[must_use]
    pub const fn with_payer(mut self, payer: Address) -> Self {
        self.payer = payer;
        self
    }

    pub fn add_authorizer(&mut self, address: Address) {
        self.authorizers.push(address);
    }

    /// Distinct signer addresses in canonical order: proposer, payer, authorizers.
    pub fn signers(&self) -> Vec<Address> {
        let mut signers = Vec::with_capacity(2 + self.authorizers.len());
        let candidates = [self.proposal_key.address, self.payer]
            .into_iter()
            .chain(self.authorizers.iter().copied());
        for address in candidates {
            if !signers.contains(&address) {
                signers.push(address);
            }
        }
        signers
    }

    fn signer_index(&self, address: Address) -> Option<usize> {
        self.signers().iter().position(|signer| *signer == address)
    }

    /// Message covered by payload signatures.
    pub fn payload_message(&self) -> Vec<u8> {
        tagged(&self.encode_payload())
    }

    /// Message covered by envelope signatures.
    pub fn envelope_message(&self) -> Vec<u8> {
        tagged(&self.encode_envelope())
    }

    /// Adds a payload signature for `address`, which must be a signer of the
    /// transaction.
    pub fn sign_payload(
        &mut self,
        address: Address,
        key_index: u32,
        key: &KeyPair,
    ) -> Result<(), SignError> {
        let signature = self.sign_message(&self.payload_message(), "payload", address, key)?;
        self.payload_signatures.push(TransactionSignature {
            address,
            key_index,
            signature,
        });
        self.sort_signatures();
        Ok(())
    }

    /// Adds an envelope signature. Must come after every payload signature.
    pub fn sign_envelope(
        &mut self,
        address: Address,
        key_index: u32,
        key: &KeyPair,
    ) -> Result<(), SignError> {
        let signature = self.sign_message(&self.envelope_message(), "envelope", address, key)?;
        self.envelope_signatures.push(TransactionSignature {
            address,
            key_index,
            signature,
        });
        self.sort_signatures();
        Ok(())
    }

    /// Identifier the network assigns: SHA3-256 of the canonical form.
    pub fn id(&self) -> Identifier {
        let payload = self.encode_payload();
        let payload_signatures = self.encode_signatures(&self.payload_signatures);
        let envelope_signatures = self.encode_signatures(&self.envelope_signatures);
        let canonical = rlp_list(&[
            &Raw(&payload),
            &Raw(&payload_signatures),
            &Raw(&envelope_signatures),
        ]);
        B256::from_slice(&Sha3_256::digest(&canonical))
    }

    fn sign_message(
        &self,
        message: &[u8],
        role: &'static str,
        address: Address,
        key: &KeyPair,
    ) -> Result<Bytes, SignError> {
        if self.signer_index(address).is_none() {
            return Err(SignError::Signature {
                role,
                address,
                reason: "address is not a signer of this transaction".to_string(),
            });
        }
        key.sign(message).map_err(|e| SignError::Signature {
            role,
            address,
            reason: e.to_string(),
        })
    }

    fn sort_signatures(&mut self) {
        let signers = self.signers();
        let order = |signature: &TransactionSignature| {
            let index = signers
                .iter()
                .position(|signer| *signer == signature.address);
            (index.unwrap_or(usize::MAX), signature.key_index)
        };
        self.payload_signatures.sort_by_key(order);
        self.envelope_signatures.sort_by_key(order);
    }

    fn encode_payload(&self) -> Vec<u8> {
        let arguments: Vec<Field<'_>> = self
            .arguments
            .iter()
            .map(|arg| Field(&arg[..]))
            .collect();
        let authorizers: Vec<Field<'_>> = self
            .authorizers
            .iter()
            .map(|address| Field(address.as_bytes()))
            .collect();
        let arguments = rlp_sequence(&arguments);
        let authorizers = rlp_sequence(&authorizers);
        let key_index = u64::from(self.proposal_key.key_index);

        let fields: [&dyn Encodable; 9] = [
            &Field(&self.script[..]),
            &Raw(&arguments),
            &Field(self.reference_block_id.as_slice()),
            &self.gas_limit,
            &Field(self.proposal_key.address.as_bytes()),
            &key_index,
            &self.proposal_key.sequence_number,
            &Field(self.payer.as_bytes()),
            &Raw(&authorizers),
        ];
        rlp_list(&fields)
    }

    fn encode_envelope(&self) -> Vec<u8> {
        let payload = self.encode_payload();
        let signatures = self.encode_signatures(&self.payload_signatures);
        rlp_list(&[&Raw(&payload), &Raw(&signatures)])
    }

    fn encode_signatures(&self, signatures: &[TransactionSignature]) -> Vec<u8> {
        let signers = self.signers();
        let encoded: Vec<Vec<u8>> = signatures
            .iter()
            .map(|sig| {
                let signer_index = signers
                    .iter()
                    .position(|signer| *signer == sig.address)
                    .unwrap_or_default() as u64;
                let key_index = u64::from(sig.key_index);
                let fields: [&dyn Encodable; 3] = [
                    &signer_index,
                    &key_index,
                    &Field(&sig.signature[..]),
                ];
                rlp_list(&fields)
            })
            .collect();
        let raw: Vec<Raw<'_>> = encoded.iter().map(|item| Raw(item)).collect();
        rlp_sequence(&raw)
    }
}

fn tagged(encoded: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(TRANSACTION_DOMAIN_TAG.len() + encoded.len());
    message.extend_from_slice(&TRANSACTION_DOMAIN_TAG);
    message.extend_from_slice(encoded);
    message
}

/// Byte string field.
pub(crate) struct Field<'a>(pub(crate) &'a [u8]);

impl Encodable for Field<'_> {
    fn encode(&self, out: &mut dyn BufMut) {
        self.0.encode(out);
    }

    fn length(&self) -> usize {
        self.0.length()
    }
}

/// Already RLP-encoded item, written as is.
struct Raw<'a>(&'a [u8]);

impl Encodable for Raw<'_> {
    fn encode(&self, out: &mut dyn BufMut) {
        out.put_slice(self.0);
    }

    fn length(&self) -> usize {
        self.0.len()
    }
}

pub(crate) fn rlp_list(fields: &[&dyn Encodable]) -> Vec<u8> {
    let payload_length: usize = fields.iter().map(|field| field.length()).sum();
    let mut out = Vec::with_capacity(payload_length + 9);
    Header {
        list: true,
        payload_length,
    }
    .encode(&mut out);
    for field in fields {
        field.encode(&mut out);
    }
    out
}

fn rlp_sequence<T: Encodable>(items: &[T]) -> Vec<u8> {
    let fields: Vec<&dyn Encodable> = items.iter().map(|item| item as &dyn Encodable).collect();
    rlp_list(&fields)
}
