// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Hash and signature algorithm registries.

Hash algorithms are identified on the GuardTime wire by a single id byte;
the ids and digest sizes are stable. PKI signature algorithms are the
usual X.509 OIDs, mapped onto ring verification algorithms the same way
for the embedded `pkSignature` and for certificates.
*/

use {
    crate::{
        asn1::rfc5280::{AlgorithmIdentifier, AlgorithmParameter},
        SyntaxError,
    },
    bcder::{ConstOid, Oid},
    bytes::Bytes,
    digest::Digest,
    ring::signature::VerificationAlgorithm,
    std::convert::TryFrom,
};

/// SHA-1.
///
/// 1.3.14.3.2.26
const OID_SHA1: ConstOid = Oid(&[43, 14, 3, 2, 26]);

/// SHA-256.
///
/// 2.16.840.1.101.3.4.2.1
const OID_SHA256: ConstOid = Oid(&[96, 134, 72, 1, 101, 3, 4, 2, 1]);

/// RIPEMD-160.
///
/// 1.3.36.3.2.1
const OID_RIPEMD160: ConstOid = Oid(&[43, 36, 3, 2, 1]);

/// SHA-224.
///
/// 2.16.840.1.101.3.4.2.4
const OID_SHA224: ConstOid = Oid(&[96, 134, 72, 1, 101, 3, 4, 2, 4]);

/// SHA-384.
///
/// 2.16.840.1.101.3.4.2.2
const OID_SHA384: ConstOid = Oid(&[96, 134, 72, 1, 101, 3, 4, 2, 2]);

/// SHA-512.
///
/// 2.16.840.1.101.3.4.2.3
const OID_SHA512: ConstOid = Oid(&[96, 134, 72, 1, 101, 3, 4, 2, 3]);

/// RSA+SHA-1.
///
/// 1.2.840.113549.1.1.5
const OID_SHA1_RSA: ConstOid = Oid(&[42, 134, 72, 134, 247, 13, 1, 1, 5]);

/// RSA+SHA-256.
///
/// 1.2.840.113549.1.1.11
const OID_SHA256_RSA: ConstOid = Oid(&[42, 134, 72, 134, 247, 13, 1, 1, 11]);

/// RSA+SHA-384.
///
/// 1.2.840.113549.1.1.12
const OID_SHA384_RSA: ConstOid = Oid(&[42, 134, 72, 134, 247, 13, 1, 1, 12]);

/// RSA+SHA-512.
///
/// 1.2.840.113549.1.1.13
const OID_SHA512_RSA: ConstOid = Oid(&[42, 134, 72, 134, 247, 13, 1, 1, 13]);

/// ECDSA with SHA-256.
///
/// 1.2.840.10045.4.3.2
const OID_ECDSA_SHA256: ConstOid = Oid(&[42, 134, 72, 206, 61, 4, 3, 2]);

/// ECDSA with SHA-384.
///
/// 1.2.840.10045.4.3.3
const OID_ECDSA_SHA384: ConstOid = Oid(&[42, 134, 72, 206, 61, 4, 3, 3]);

/// A hash algorithm with a stable GuardTime wire id.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum HashAlgorithm {
    /// Wire id 0.
    Sha1,
    /// Wire id 1, the GuardTime default.
    Sha256,
    /// Wire id 2.
    Ripemd160,
    /// Wire id 3.
    Sha224,
    /// Wire id 4.
    Sha384,
    /// Wire id 5.
    Sha512,
}

impl HashAlgorithm {
    /// Look up an algorithm by its wire id.
    pub fn from_wire_id(id: u8) -> Result<Self, SyntaxError> {
        match id {
            0 => Ok(Self::Sha1),
            1 => Ok(Self::Sha256),
            2 => Ok(Self::Ripemd160),
            3 => Ok(Self::Sha224),
            4 => Ok(Self::Sha384),
            5 => Ok(Self::Sha512),
            _ => Err(SyntaxError::UntrustedHashAlgorithm(id.to_string())),
        }
    }

    pub fn wire_id(self) -> u8 {
        match self {
            Self::Sha1 => 0,
            Self::Sha256 => 1,
            Self::Ripemd160 => 2,
            Self::Sha224 => 3,
            Self::Sha384 => 4,
            Self::Sha512 => 5,
        }
    }

    /// The fixed digest size in bytes.
    pub fn digest_len(self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha256 => 32,
            Self::Ripemd160 => 20,
            Self::Sha224 => 28,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }

    /// One-shot digest of `data`.
    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha1 => sha1::Sha1::digest(data).to_vec(),
            Self::Sha256 => sha2::Sha256::digest(data).to_vec(),
            Self::Ripemd160 => ripemd::Ripemd160::digest(data).to_vec(),
            Self::Sha224 => sha2::Sha224::digest(data).to_vec(),
            Self::Sha384 => sha2::Sha384::digest(data).to_vec(),
            Self::Sha512 => sha2::Sha512::digest(data).to_vec(),
        }
    }

    fn oid_bytes(self) -> &'static [u8] {
        match self {
            Self::Sha1 => OID_SHA1.0,
            Self::Sha256 => OID_SHA256.0,
            Self::Ripemd160 => OID_RIPEMD160.0,
            Self::Sha224 => OID_SHA224.0,
            Self::Sha384 => OID_SHA384.0,
            Self::Sha512 => OID_SHA512.0,
        }
    }

    /// The X.509 algorithm identifier, parameters as explicit NULL the way
    /// OpenSSL-produced tokens carry them.
    pub fn algorithm_identifier(self) -> AlgorithmIdentifier {
        AlgorithmIdentifier {
            algorithm: Oid(Bytes::copy_from_slice(self.oid_bytes())),
            parameters: Some(AlgorithmParameter::null()),
        }
    }
}

impl TryFrom<&Oid> for HashAlgorithm {
    type Error = SyntaxError;

    fn try_from(v: &Oid) -> Result<Self, Self::Error> {
        if v == &OID_SHA1 {
            Ok(Self::Sha1)
        } else if v == &OID_SHA256 {
            Ok(Self::Sha256)
        } else if v == &OID_RIPEMD160 {
            Ok(Self::Ripemd160)
        } else if v == &OID_SHA224 {
            Ok(Self::Sha224)
        } else if v == &OID_SHA384 {
            Ok(Self::Sha384)
        } else if v == &OID_SHA512 {
            Ok(Self::Sha512)
        } else {
            Err(SyntaxError::UntrustedHashAlgorithm(v.to_string()))
        }
    }
}

impl TryFrom<&AlgorithmIdentifier> for HashAlgorithm {
    type Error = SyntaxError;

    fn try_from(v: &AlgorithmIdentifier) -> Result<Self, Self::Error> {
        Self::try_from(&v.algorithm)
    }
}

/// An algorithm used for the PKI signature over published data and for
/// certificate signatures.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SignatureAlgorithm {
    Sha1Rsa,
    Sha256Rsa,
    Sha384Rsa,
    Sha512Rsa,
    EcdsaSha256,
    EcdsaSha384,
}

impl SignatureAlgorithm {
    /// The ring verification algorithm for this signature algorithm.
    pub fn as_verification_algorithm(&self) -> &'static dyn VerificationAlgorithm {
        match self {
            Self::Sha1Rsa => &ring::signature::RSA_PKCS1_2048_8192_SHA1_FOR_LEGACY_USE_ONLY,
            Self::Sha256Rsa => &ring::signature::RSA_PKCS1_2048_8192_SHA256,
            Self::Sha384Rsa => &ring::signature::RSA_PKCS1_2048_8192_SHA384,
            Self::Sha512Rsa => &ring::signature::RSA_PKCS1_2048_8192_SHA512,
            Self::EcdsaSha256 => &ring::signature::ECDSA_P256_SHA256_ASN1,
            Self::EcdsaSha384 => &ring::signature::ECDSA_P384_SHA384_ASN1,
        }
    }

    fn oid_bytes(self) -> &'static [u8] {
        match self {
            Self::Sha1Rsa => OID_SHA1_RSA.0,
            Self::Sha256Rsa => OID_SHA256_RSA.0,
            Self::Sha384Rsa => OID_SHA384_RSA.0,
            Self::Sha512Rsa => OID_SHA512_RSA.0,
            Self::EcdsaSha256 => OID_ECDSA_SHA256.0,
            Self::EcdsaSha384 => OID_ECDSA_SHA384.0,
        }
    }

    /// The X.509 algorithm identifier with absent parameters.
    pub fn algorithm_identifier(self) -> AlgorithmIdentifier {
        AlgorithmIdentifier {
            algorithm: Oid(Bytes::copy_from_slice(self.oid_bytes())),
            parameters: None,
        }
    }
}

impl TryFrom<&Oid> for SignatureAlgorithm {
    type Error = SyntaxError;

    fn try_from(v: &Oid) -> Result<Self, Self::Error> {
        if v == &OID_SHA1_RSA {
            Ok(Self::Sha1Rsa)
        } else if v == &OID_SHA256_RSA {
            Ok(Self::Sha256Rsa)
        } else if v == &OID_SHA384_RSA {
            Ok(Self::Sha384Rsa)
        } else if v == &OID_SHA512_RSA {
            Ok(Self::Sha512Rsa)
        } else if v == &OID_ECDSA_SHA256 {
            Ok(Self::EcdsaSha256)
        } else if v == &OID_ECDSA_SHA384 {
            Ok(Self::EcdsaSha384)
        } else {
            Err(SyntaxError::UntrustedSignatureAlgorithm)
        }
    }
}

impl TryFrom<&AlgorithmIdentifier> for SignatureAlgorithm {
    type Error = SyntaxError;

    fn try_from(v: &AlgorithmIdentifier) -> Result<Self, Self::Error> {
        if !v.parameters_absent_or_null() {
            return Err(SyntaxError::UntrustedSignatureAlgorithm);
        }

        Self::try_from(&v.algorithm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_ids_round_trip() {
        for id in 0u8..6 {
            let alg = HashAlgorithm::from_wire_id(id).unwrap();
            assert_eq!(alg.wire_id(), id);
            assert_eq!(alg.digest(b"x").len(), alg.digest_len());
        }

        assert!(matches!(
            HashAlgorithm::from_wire_id(6),
            Err(SyntaxError::UntrustedHashAlgorithm(_))
        ));
        assert!(matches!(
            HashAlgorithm::from_wire_id(0xff),
            Err(SyntaxError::UntrustedHashAlgorithm(_))
        ));
    }

    #[test]
    fn digest_sizes() {
        assert_eq!(HashAlgorithm::Sha1.digest_len(), 20);
        assert_eq!(HashAlgorithm::Sha256.digest_len(), 32);
        assert_eq!(HashAlgorithm::Ripemd160.digest_len(), 20);
        assert_eq!(HashAlgorithm::Sha224.digest_len(), 28);
        assert_eq!(HashAlgorithm::Sha384.digest_len(), 48);
        assert_eq!(HashAlgorithm::Sha512.digest_len(), 64);
    }

    #[test]
    fn sha256_known_answer() {
        assert_eq!(
            hex::encode(HashAlgorithm::Sha256.digest(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn oid_round_trip() {
        for alg in [
            HashAlgorithm::Sha1,
            HashAlgorithm::Sha256,
            HashAlgorithm::Ripemd160,
            HashAlgorithm::Sha224,
            HashAlgorithm::Sha384,
            HashAlgorithm::Sha512,
        ] {
            let ident = alg.algorithm_identifier();
            assert_eq!(HashAlgorithm::try_from(&ident.algorithm).unwrap(), alg);
        }
    }
}
