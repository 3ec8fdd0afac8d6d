// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Verifiable credential containers and the verifier contract.
//!
//! Credentials travel as UTF-8 JSON inside VC frames in protocol
//! version 1. The parser accepts any field ordering and ignores
//! unknown fields, leaving room for a compact binary encoding in a
//! later version without changing the state machine.

use serde::{Deserialize, Serialize};

#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// A signed record attesting a subject's identity and public key under
/// an issuer's signature.
///
/// The two shapes are distinguished by the `kind` discriminant on the
/// wire.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Credential {
    #[serde(rename = "device-identity")]
    DeviceIdentity(DeviceIdentity),
    #[serde(rename = "contact-identity")]
    ContactIdentity(ContactIdentity),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// Credential id, unique per issued credential
    pub id: String,
    /// The identity that signed this credential
    pub issuer: String,
    pub subject: DeviceSubject,
    #[serde(with = "hex")]
    pub signature: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSubject {
    pub device_id: String,
    #[serde(with = "hex")]
    pub public_key: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactIdentity {
    pub id: String,
    pub issuer: String,
    pub subject: ContactSubject,
    #[serde(with = "hex")]
    pub signature: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactSubject {
    pub contact_id: String,
    #[serde(with = "hex")]
    pub public_key: Vec<u8>,
}

impl Credential {
    /// The credential id, mixed into the Initial key schedule
    #[inline]
    pub fn id(&self) -> &str {
        match self {
            Self::DeviceIdentity(credential) => &credential.id,
            Self::ContactIdentity(credential) => &credential.id,
        }
    }

    #[inline]
    pub fn issuer(&self) -> &str {
        match self {
            Self::DeviceIdentity(credential) => &credential.issuer,
            Self::ContactIdentity(credential) => &credential.issuer,
        }
    }

    /// The subject identifier embedded in the credential
    #[inline]
    pub fn subject_id(&self) -> &str {
        match self {
            Self::DeviceIdentity(credential) => &credential.subject.device_id,
            Self::ContactIdentity(credential) => &credential.subject.contact_id,
        }
    }

    /// The subject public key, mixed into the Application key schedule
    #[inline]
    pub fn public_key(&self) -> &[u8] {
        match self {
            Self::DeviceIdentity(credential) => &credential.subject.public_key,
            Self::ContactIdentity(credential) => &credential.subject.public_key,
        }
    }

    /// The issuer signature, mixed into the Handshake key schedule
    #[inline]
    pub fn signature(&self) -> &[u8] {
        match self {
            Self::DeviceIdentity(credential) => &credential.signature,
            Self::ContactIdentity(credential) => &credential.signature,
        }
    }
}

/// The record produced by a successful credential verification
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedPeer {
    /// The identity that issued the peer's credential
    pub issuer: String,
    /// The verified subject identifier
    pub device_id: String,
    /// The verified subject public key
    pub public_key: Vec<u8>,
    /// The credential the record was verified from
    pub credential: Credential,
}

/// Inspects a received credential and returns a verified subject
/// record, or `None` when the credential is rejected.
///
/// Implementations are shared across connections and must be
/// reentrant. Issuance and revocation live behind this trait and are
/// out of scope for the transport.
pub trait Verifier: Send + Sync + 'static {
    fn verify(
        &self,
        credential: &[u8],
        expected_subject_id: Option<&str>,
    ) -> Option<VerifiedPeer>;
}

/// Hex <-> bytes helpers for the byte-string fields carried inside
/// credential and frame JSON.
pub(crate) mod hex {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn encode(bytes: &[u8]) -> String {
        let mut out = String::with_capacity(bytes.len() * 2);
        for byte in bytes {
            out.push_str(&format!("{byte:02x}"));
        }
        out
    }

    pub fn decode(value: &str) -> Option<Vec<u8>> {
        if value.len() % 2 != 0 {
            return None;
        }
        (0..value.len())
            .step_by(2)
            .map(|index| u8::from_str_radix(value.get(index..index + 2)?, 16).ok())
            .collect()
    }

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let value = String::deserialize(deserializer)?;
        decode(&value).ok_or_else(|| serde::de::Error::custom("invalid hex string"))
    }
}
