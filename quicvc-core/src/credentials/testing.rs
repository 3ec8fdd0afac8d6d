// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Deterministic in-memory credential authority for tests and
//! examples. Issued credentials are "signed" with an HMAC over the
//! credential body under the authority's secret, which stands in for
//! the asymmetric signature a production issuer would use.

use super::{Credential, DeviceIdentity, DeviceSubject, VerifiedPeer, Verifier};
use aws_lc_rs::hmac;
use rand::RngCore;

#[derive(Debug)]
pub struct Authority {
    identity: String,
    secret: [u8; 32],
}

impl Authority {
    pub fn new(identity: &str) -> Self {
        let mut secret = [0u8; 32];
        rand::rng().fill_bytes(&mut secret);
        Self {
            identity: identity.to_string(),
            secret,
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Issues a device-identity credential for `device_id` with a
    /// fresh random subject key pair stand-in.
    pub fn issue_device(&self, device_id: &str) -> Credential {
        let mut public_key = vec![0u8; 32];
        rand::rng().fill_bytes(&mut public_key);

        let mut credential_id = [0u8; 8];
        rand::rng().fill_bytes(&mut credential_id);

        let id = format!("vc-{}", super::hex::encode(&credential_id));
        let signature = self.sign(&id, device_id, &public_key);

        Credential::DeviceIdentity(DeviceIdentity {
            id,
            issuer: self.identity.clone(),
            subject: DeviceSubject {
                device_id: device_id.to_string(),
                public_key,
            },
            signature,
        })
    }

    fn sign(&self, credential_id: &str, subject_id: &str, public_key: &[u8]) -> Vec<u8> {
        let key = hmac::Key::new(hmac::HMAC_SHA256, &self.secret);
        let mut body = Vec::new();
        body.extend_from_slice(credential_id.as_bytes());
        body.push(0);
        body.extend_from_slice(subject_id.as_bytes());
        body.push(0);
        body.extend_from_slice(public_key);
        hmac::sign(&key, &body).as_ref().to_vec()
    }
}

impl Verifier for Authority {
    fn verify(
        &self,
        credential: &[u8],
        expected_subject_id: Option<&str>,
    ) -> Option<VerifiedPeer> {
        let credential: Credential = serde_json::from_slice(credential).ok()?;

        let expected = self.sign(
            credential.id(),
            credential.subject_id(),
            credential.public_key(),
        );
        aws_lc_rs::constant_time::verify_slices_are_equal(&expected, credential.signature())
            .ok()?;

        if credential.issuer() != self.identity {
            return None;
        }

        if let Some(subject_id) = expected_subject_id {
            if subject_id != credential.subject_id() {
                return None;
            }
        }

        Some(VerifiedPeer {
            issuer: credential.issuer().to_string(),
            device_id: credential.subject_id().to_string(),
            public_key: credential.public_key().to_vec(),
            credential,
        })
    }
}
