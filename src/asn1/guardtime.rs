// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! GuardTime-defined ASN.1 structures.

The `TimeSignature` rides in the `signature` field of the token's single
CMS signer-info; the cert-token pair forms the extension protocol.
*/

use {
    crate::asn1::{
        common::RawInteger,
        rfc3161::PkiStatusInfo,
        rfc5280::{AlgorithmIdentifier, Extensions},
    },
    bcder::{
        decode::{Constructed, Source},
        encode::{self, PrimitiveContent, Values},
        ConstOid, Mode, OctetString, Oid, Tag,
    },
};

/// GuardTime TimeSignature pseudo signature algorithm.
///
/// 1.3.6.1.4.1.27868.4.1
pub const OID_GT_TIME_SIGNATURE_ALG: ConstOid = Oid(&[43, 6, 1, 4, 1, 129, 217, 92, 4, 1]);

/// The GuardTime time-signature payload.
///
/// ```ASN.1
/// TimeSignature ::= SEQUENCE {
///     location        OCTET STRING,
///     history         OCTET STRING,
///     publishedData   PublishedData,
///     pkSignature     [0] IMPLICIT SignatureInfo OPTIONAL,
///     pubReference    [1] IMPLICIT SET OF OCTET STRING OPTIONAL }
/// ```
///
/// The two octet strings are hash-chain byte streams; see the `chain`
/// module for their step layout.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TimeSignature {
    pub location: OctetString,
    pub history: OctetString,
    pub published_data: PublishedData,
    pub pk_signature: Option<SignatureInfo>,
    pub pub_reference: Option<Vec<OctetString>>,
}

impl TimeSignature {
    /// Decode from the DER payload of a signer-info signature field.
    pub fn decode_der(data: &[u8]) -> Result<Self, bcder::decode::Error> {
        Constructed::decode(data, Mode::Der, |cons| Self::take_from(cons))
    }

    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, S::Err> {
        cons.take_sequence(|cons| {
            let location = OctetString::take_from(cons)?;
            let history = OctetString::take_from(cons)?;
            let published_data = PublishedData::take_from(cons)?;
            let pk_signature =
                cons.take_opt_constructed_if(Tag::CTX_0, |cons| SignatureInfo::from_sequence(cons))?;
            let pub_reference =
                cons.take_opt_constructed_if(Tag::CTX_1, |cons| take_octet_string_set(cons))?;

            Ok(Self {
                location,
                history,
                published_data,
                pk_signature,
                pub_reference,
            })
        })
    }

    pub fn encode_ref(&self) -> impl Values + '_ {
        encode::sequence((
            self.location.encode_ref(),
            self.history.encode_ref(),
            self.published_data.encode_ref(),
            if let Some(pk_signature) = &self.pk_signature {
                Some(pk_signature.encode_ref_as(Tag::CTX_0))
            } else {
                None
            },
            if let Some(pub_reference) = &self.pub_reference {
                Some(encode_octet_string_set(pub_reference, Tag::CTX_1))
            } else {
                None
            },
        ))
    }

    /// Encode to DER bytes.
    pub fn to_der(&self) -> Result<Vec<u8>, std::io::Error> {
        let mut res = Vec::new();
        self.encode_ref().write_encoded(Mode::Der, &mut res)?;

        Ok(res)
    }
}

/// Data a round's root contributes to a trust-anchor publication.
///
/// ```ASN.1
/// PublishedData ::= SEQUENCE {
///     publicationIdentifier  INTEGER,
///     publicationImprint     OCTET STRING }
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PublishedData {
    pub publication_identifier: RawInteger,
    pub publication_imprint: OctetString,
}

impl PublishedData {
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, S::Err> {
        cons.take_sequence(|cons| {
            let publication_identifier = RawInteger::take_from(cons)?;
            let publication_imprint = OctetString::take_from(cons)?;

            Ok(Self {
                publication_identifier,
                publication_imprint,
            })
        })
    }

    pub fn encode_ref(&self) -> impl Values + '_ {
        encode::sequence((
            (&self.publication_identifier).encode(),
            self.publication_imprint.encode_ref(),
        ))
    }

    pub fn to_der(&self) -> Result<Vec<u8>, std::io::Error> {
        let mut res = Vec::new();
        self.encode_ref().write_encoded(Mode::Der, &mut res)?;

        Ok(res)
    }
}

/// PKI signature over the published data.
///
/// ```ASN.1
/// SignatureInfo ::= SEQUENCE {
///     signatureAlgorithm  AlgorithmIdentifier,
///     signatureValue      OCTET STRING,
///     keyCommitmentRef    [0] IMPLICIT SET OF OCTET STRING OPTIONAL }
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SignatureInfo {
    pub signature_algorithm: AlgorithmIdentifier,
    pub signature_value: OctetString,
    pub key_commitment_ref: Option<Vec<OctetString>>,
}

impl SignatureInfo {
    pub fn from_sequence<S: Source>(cons: &mut Constructed<S>) -> Result<Self, S::Err> {
        let signature_algorithm = AlgorithmIdentifier::take_from(cons)?;
        let signature_value = OctetString::take_from(cons)?;
        let key_commitment_ref =
            cons.take_opt_constructed_if(Tag::CTX_0, |cons| take_octet_string_set(cons))?;

        Ok(Self {
            signature_algorithm,
            signature_value,
            key_commitment_ref,
        })
    }

    pub fn encode_ref_as(&self, tag: Tag) -> impl Values + '_ {
        encode::sequence_as(
            tag,
            (
                self.signature_algorithm.encode_ref(),
                self.signature_value.encode_ref(),
                if let Some(refs) = &self.key_commitment_ref {
                    Some(encode_octet_string_set(refs, Tag::CTX_0))
                } else {
                    None
                },
            ),
        )
    }
}

/// Extension request.
///
/// ```ASN.1
/// CertTokenRequest ::= SEQUENCE {
///     version            INTEGER { v1(1) },
///     historyIdentifier  INTEGER }
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CertTokenRequest {
    pub version: RawInteger,
    pub history_identifier: RawInteger,
}

impl CertTokenRequest {
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, S::Err> {
        cons.take_sequence(|cons| {
            let version = RawInteger::take_from(cons)?;
            let history_identifier = RawInteger::take_from(cons)?;

            Ok(Self {
                version,
                history_identifier,
            })
        })
    }

    pub fn encode_ref(&self) -> impl Values + '_ {
        encode::sequence((
            (&self.version).encode(),
            (&self.history_identifier).encode(),
        ))
    }
}

/// Extension response.
///
/// ```ASN.1
/// CertTokenResponse ::= SEQUENCE {
///     status     PKIStatusInfo,
///     certToken  [0] EXPLICIT CertToken OPTIONAL }
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CertTokenResponse {
    pub status: PkiStatusInfo,
    pub cert_token: Option<CertToken>,
}

impl CertTokenResponse {
    pub fn decode_der(data: &[u8]) -> Result<Self, bcder::decode::Error> {
        Constructed::decode(data, Mode::Der, |cons| Self::take_from(cons))
    }

    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, S::Err> {
        cons.take_sequence(|cons| {
            let status = PkiStatusInfo::take_from(cons)?;
            let cert_token =
                cons.take_opt_constructed_if(Tag::CTX_0, |cons| CertToken::take_from(cons))?;

            Ok(Self { status, cert_token })
        })
    }

    pub fn encode_ref(&self) -> impl Values + '_ {
        encode::sequence((
            self.status.encode_ref(),
            if let Some(cert_token) = &self.cert_token {
                Some(encode::Constructed::new(
                    Tag::CTX_0,
                    cert_token.encode_ref(),
                ))
            } else {
                None
            },
        ))
    }
}

/// The long-term replacement material for a short-term token.
///
/// ```ASN.1
/// CertToken ::= SEQUENCE {
///     version        INTEGER { v1(1) },
///     history        OCTET STRING,
///     publishedData  PublishedData,
///     pubReference   [0] IMPLICIT SET OF OCTET STRING OPTIONAL,
///     extensions     [1] IMPLICIT Extensions OPTIONAL }
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CertToken {
    pub version: RawInteger,
    pub history: OctetString,
    pub published_data: PublishedData,
    pub pub_reference: Option<Vec<OctetString>>,
    pub extensions: Option<Extensions>,
}

impl CertToken {
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, S::Err> {
        cons.take_sequence(|cons| {
            let version = RawInteger::take_from(cons)?;
            let history = OctetString::take_from(cons)?;
            let published_data = PublishedData::take_from(cons)?;
            let pub_reference =
                cons.take_opt_constructed_if(Tag::CTX_0, |cons| take_octet_string_set(cons))?;
            let extensions =
                cons.take_opt_constructed_if(Tag::CTX_1, |cons| Extensions::from_sequence(cons))?;

            Ok(Self {
                version,
                history,
                published_data,
                pub_reference,
                extensions,
            })
        })
    }

    pub fn encode_ref(&self) -> impl Values + '_ {
        encode::sequence((
            (&self.version).encode(),
            self.history.encode_ref(),
            self.published_data.encode_ref(),
            if let Some(pub_reference) = &self.pub_reference {
                Some(encode_octet_string_set(pub_reference, Tag::CTX_0))
            } else {
                None
            },
            if let Some(extensions) = &self.extensions {
                Some(extensions.encode_ref_as(Tag::CTX_1))
            } else {
                None
            },
        ))
    }
}

fn take_octet_string_set<S: Source>(
    cons: &mut Constructed<S>,
) -> Result<Vec<OctetString>, S::Err> {
    let mut items = Vec::new();

    while let Some(item) = OctetString::take_opt_from(cons)? {
        items.push(item);
    }

    Ok(items)
}

fn encode_octet_string_set(items: &[OctetString], tag: Tag) -> impl Values + '_ {
    encode::set_as(tag, encode::slice(items, |x| x.clone().encode()))
}
