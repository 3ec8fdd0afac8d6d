// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use super::TAG_LEN;
use aws_lc_rs::aead::{Aad, LessSafeKey, Nonce, UnboundKey, CHACHA20_POLY1305, NONCE_LEN};

#[derive(Debug)]
pub(crate) struct Iv([u8; NONCE_LEN]);

impl Iv {
    #[inline]
    fn nonce(&self, packet_number: u64) -> Nonce {
        let mut nonce = [0u8; NONCE_LEN];
        nonce[NONCE_LEN - 8..].copy_from_slice(&packet_number.to_be_bytes());
        for (dst, src) in nonce.iter_mut().zip(&self.0) {
            *dst ^= src;
        }
        Nonce::assume_unique_for_key(nonce)
    }
}

pub mod seal {
    use super::*;
    use crate::crypto::seal;

    #[derive(Debug)]
    pub struct Application {
        key: LessSafeKey,
        iv: Iv,
    }

    impl Application {
        #[inline]
        pub fn new(key: &[u8], iv: [u8; NONCE_LEN]) -> Self {
            let key = UnboundKey::new(&CHACHA20_POLY1305, key).unwrap();
            let key = LessSafeKey::new(key);
            Self { key, iv: Iv(iv) }
        }
    }

    impl seal::Application for Application {
        #[inline]
        fn tag_len(&self) -> usize {
            debug_assert_eq!(TAG_LEN, self.key.algorithm().tag_len());
            TAG_LEN
        }

        #[inline]
        fn seal(&self, packet_number: u64, header: &[u8], payload_and_tag: &mut [u8]) {
            debug_assert!(payload_and_tag.len() >= TAG_LEN);

            let nonce = self.iv.nonce(packet_number);
            let aad = Aad::from(header);

            let inline_len = payload_and_tag.len() - TAG_LEN;
            let (in_out, tag_out) = payload_and_tag.split_at_mut(inline_len);

            let tag = self
                .key
                .seal_in_place_separate_tag(nonce, aad, in_out)
                .unwrap();
            tag_out.copy_from_slice(tag.as_ref());
        }
    }
}

pub mod open {
    use super::*;
    use crate::crypto::open::{self, Error, Result};

    #[derive(Debug)]
    pub struct Application {
        key: LessSafeKey,
        iv: Iv,
    }

    impl Application {
        #[inline]
        pub fn new(key: &[u8], iv: [u8; NONCE_LEN]) -> Self {
            let key = UnboundKey::new(&CHACHA20_POLY1305, key).unwrap();
            let key = LessSafeKey::new(key);
            Self { key, iv: Iv(iv) }
        }
    }

    impl open::Application for Application {
        #[inline]
        fn tag_len(&self) -> usize {
            debug_assert_eq!(TAG_LEN, self.key.algorithm().tag_len());
            TAG_LEN
        }

        #[inline]
        fn open<'a>(
            &self,
            packet_number: u64,
            header: &[u8],
            payload_and_tag: &'a mut [u8],
        ) -> Result<&'a mut [u8]> {
            let nonce = self.iv.nonce(packet_number);
            let aad = Aad::from(header);

            let plaintext_len = self
                .key
                .open_in_place(nonce, aad, payload_and_tag)
                .map_err(|_| Error::InvalidTag)?
                .len();

            Ok(&mut payload_and_tag[..plaintext_len])
        }
    }
}
