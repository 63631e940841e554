// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Hermetic fixtures for tests.

Mints syntactically and cryptographically valid tokens from scratch:
chains are built for chosen registration/publication moments, the
published imprint is the real aggregation result, and the PKI signature
comes from a freshly generated self-signed ECDSA certificate.
*/

use {
    crate::{
        algorithm::{HashAlgorithm, SignatureAlgorithm},
        asn1::{
            common::{GeneralizedTime, RawInteger, Time, Zone},
            guardtime::{
                CertToken, CertTokenResponse, PublishedData as Asn1PublishedData, SignatureInfo,
                TimeSignature, OID_GT_TIME_SIGNATURE_ALG,
            },
            rfc3161::{
                Accuracy, MessageImprint, PkiStatus, PkiStatusInfo, TimeStampResp, TstInfo,
                OID_CONTENT_TYPE_TST_INFO,
            },
            rfc3280::{AttributeTypeAndValue, Name, RdnSequence, RelativeDistinguishedName},
            rfc5280::{
                AlgorithmIdentifier, AlgorithmParameter, Certificate as Asn1Certificate,
                SubjectPublicKeyInfo, TbsCertificate, Validity, Version,
            },
            rfc5652::{
                Attribute, AttributeValue, CertificateSet, CmsVersion,
                DigestAlgorithmIdentifiers, EncapsulatedContentInfo, IssuerAndSerialNumber,
                SignedAttributes, SignedData, SignerIdentifier, SignerInfo, SignerInfos,
                OID_CONTENT_TYPE, OID_MESSAGE_DIGEST,
            },
        },
        chain::{ChainDirection, HashChain, HashChainStep},
        imprint::DataImprint,
        location,
        publications::{PublicationsSource, PublishedData},
        timestamp::Timestamp,
        verify,
    },
    bcder::{
        encode::{PrimitiveContent, Values},
        Captured, Mode, OctetString, Oid,
    },
    bytes::Bytes,
    ring::signature::{EcdsaKeyPair, KeyPair, ECDSA_P256_SHA256_ASN1_SIGNING},
    std::io::Write,
};

pub(crate) const DOCUMENT: &[u8] = b"the quick brown fox jumps over the lazy dog";
pub(crate) const REGISTERED_AT: u64 = 1_343_000_000;
pub(crate) const PUBLICATION_ID: u64 = 1_343_100_000;
pub(crate) const EXTENDED_PUBLICATION_ID: u64 = 1_343_200_000;

/// Pre-encoded DER carried as a bcder value.
struct RawDer(Vec<u8>);

impl Values for RawDer {
    fn encoded_len(&self, _: Mode) -> usize {
        self.0.len()
    }

    fn write_encoded<W: Write>(&self, _: Mode, target: &mut W) -> Result<(), std::io::Error> {
        target.write_all(&self.0)
    }
}

fn der(values: impl Values) -> Vec<u8> {
    let mut out = Vec::new();
    values.write_encoded(Mode::Der, &mut out).unwrap();
    out
}

fn oid(bytes: &[u8]) -> Oid {
    Oid(Bytes::copy_from_slice(bytes))
}

/// A one-attribute name, CN as UTF8String.
fn test_name(common_name: &str) -> Name {
    assert!(common_name.len() < 0x80);

    let mut value = vec![0x0c, common_name.len() as u8];
    value.extend_from_slice(common_name.as_bytes());

    Name::RdnSequence(RdnSequence(vec![RelativeDistinguishedName(vec![
        AttributeTypeAndValue {
            // id-at-commonName, 2.5.4.3.
            typ: oid(&[85, 4, 3]),
            value: Captured::from_values(Mode::Der, RawDer(value)),
        },
    ])]))
}

fn generalized_time(epoch: u64) -> GeneralizedTime {
    GeneralizedTime::new(
        chrono::NaiveDateTime::from_timestamp(epoch as i64, 0),
        Zone::Utc,
    )
}

fn numeric_step(bit: u8, level: u8, fill: u8) -> HashChainStep {
    HashChainStep {
        direction: if bit == 0 {
            ChainDirection::Right
        } else {
            ChainDirection::Left
        },
        algorithm: HashAlgorithm::Sha256,
        sibling: vec![fill; 32],
        level,
        offset: 0,
    }
}

/// A location chain crossing all four thresholds, optionally with a
/// local-aggregator name tag.
pub(crate) fn location_chain(local_name: Option<&str>) -> HashChain {
    let mut steps = Vec::new();

    // Client region: id bits, then slot and machine.
    steps.push(numeric_step(1, 1, 0x11));
    steps.push(numeric_step(0, 1, 0x12));
    if let Some(name) = local_name {
        let mut sibling = vec![0u8; 28];
        sibling[1] = name.len() as u8;
        sibling[2..2 + name.len()].copy_from_slice(name.as_bytes());
        steps.push(HashChainStep {
            direction: ChainDirection::Right,
            algorithm: HashAlgorithm::Sha224,
            sibling,
            level: 1,
            offset: 0,
        });
    }
    steps.push(numeric_step(1, 1, 0x13));
    steps.push(numeric_step(0, 1, 0x14));
    steps.push(numeric_step(1, 2, 0x15));
    steps.push(numeric_step(1, 2, 0x16));

    // State region.
    steps.push(numeric_step(0, location::STATE_LEVEL, 0x21));
    steps.push(numeric_step(1, location::STATE_LEVEL, 0x22));
    steps.push(numeric_step(1, 30, 0x23));
    steps.push(numeric_step(0, 30, 0x24));
    steps.push(numeric_step(1, 31, 0x25));

    // National region.
    steps.push(numeric_step(1, location::NATIONAL_LEVEL, 0x31));
    steps.push(numeric_step(0, 50, 0x32));
    steps.push(numeric_step(1, 50, 0x33));
    steps.push(numeric_step(1, 51, 0x34));
    steps.push(numeric_step(0, 52, 0x35));
    steps.push(numeric_step(1, 53, 0x36));

    // Top region and the hasher.
    steps.push(numeric_step(1, location::TOP_LEVEL, 0x41));
    steps.push(numeric_step(0, 70, 0x42));
    steps.push(numeric_step(1, location::HASHER_LEVEL + 2, 0x51));

    HashChain::from_steps(steps)
}

/// A history chain whose shape encodes `time` in the calendar tree of
/// `publication_identifier`.
pub(crate) fn history_chain(time: u64, publication_identifier: u64) -> HashChain {
    let steps = location::history_path(time, publication_identifier)
        .into_iter()
        .enumerate()
        .map(|(i, direction)| HashChainStep {
            direction,
            algorithm: HashAlgorithm::Sha256,
            sibling: vec![0x60 ^ (i as u8); 32],
            level: 0,
            offset: 0,
        })
        .collect();

    HashChain::from_steps(steps)
}

fn ec_spki(key_pair: &EcdsaKeyPair) -> SubjectPublicKeyInfo {
    SubjectPublicKeyInfo {
        algorithm: AlgorithmIdentifier {
            // id-ecPublicKey with the prime256v1 parameter.
            algorithm: oid(&[42, 134, 72, 206, 61, 2, 1]),
            parameters: Some(AlgorithmParameter::from(Captured::from_values(
                Mode::Der,
                oid(&[42, 134, 72, 206, 61, 3, 1, 7]).encode(),
            ))),
        },
        subject_public_key: bcder::BitString::new(
            0,
            Bytes::copy_from_slice(key_pair.public_key().as_ref()),
        ),
    }
}

fn self_signed_certificate(key_pair: &EcdsaKeyPair) -> Asn1Certificate {
    let name = test_name("gt-test-gateway");

    let tbs_certificate = TbsCertificate {
        version: Version::V3,
        serial_number: RawInteger::from_u64(7),
        signature: SignatureAlgorithm::EcdsaSha256.algorithm_identifier(),
        issuer: name.clone(),
        validity: Validity {
            not_before: Time::GeneralTime(generalized_time(REGISTERED_AT - 86_400)),
            not_after: Time::GeneralTime(generalized_time(REGISTERED_AT + 86_400 * 3650)),
        },
        subject: name,
        subject_public_key_info: ec_spki(key_pair),
        extensions: None,
        raw_data: None,
    };

    let tbs_der = der(tbs_certificate.encode_ref());
    let signature = key_pair
        .sign(&ring::rand::SystemRandom::new(), &tbs_der)
        .unwrap();

    Asn1Certificate {
        tbs_certificate,
        signature_algorithm: SignatureAlgorithm::EcdsaSha256.algorithm_identifier(),
        signature: bcder::BitString::new(0, Bytes::copy_from_slice(signature.as_ref())),
    }
}

fn signed_attributes(tst_info_der: &[u8]) -> SignedAttributes {
    let content_type = Attribute {
        typ: oid(OID_CONTENT_TYPE.0),
        values: vec![AttributeValue::new(Captured::from_values(
            Mode::Der,
            oid(OID_CONTENT_TYPE_TST_INFO.0).encode(),
        ))],
    };

    let message_digest = Attribute {
        typ: oid(OID_MESSAGE_DIGEST.0),
        values: vec![AttributeValue::new(Captured::from_values(
            Mode::Der,
            OctetString::new(Bytes::from(HashAlgorithm::Sha256.digest(tst_info_der))).encode(),
        ))],
    };

    SignedAttributes(vec![content_type, message_digest])
}

fn tst_info(document: &[u8], registered_at: u64) -> TstInfo {
    let imprint = DataImprint::compute(HashAlgorithm::Sha256, document);

    TstInfo {
        version: RawInteger::from_u64(1),
        // An arbitrary gateway policy id under the GuardTime arc.
        policy: oid(&[43, 6, 1, 4, 1, 129, 217, 92, 2, 1]),
        message_imprint: MessageImprint {
            hash_algorithm: HashAlgorithm::Sha256.algorithm_identifier(),
            hashed_message: OctetString::new(Bytes::copy_from_slice(imprint.digest())),
        },
        serial_number: RawInteger::from_u64(42),
        gen_time: generalized_time(registered_at),
        accuracy: Some(Accuracy {
            seconds: Some(RawInteger::from_u64(1)),
            millis: None,
            micros: None,
        }),
        ordering: None,
        nonce: None,
        tsa: None,
        extensions: None,
    }
}

/// Everything a test needs about a freshly minted short-term token.
pub(crate) struct Fixture {
    pub token: Timestamp,
    pub spki_der: Vec<u8>,
    pub document_imprint: DataImprint,
}

/// Mint a short-term token over [DOCUMENT].
pub(crate) fn short_term_fixture() -> Fixture {
    mint(location_chain(None), REGISTERED_AT, PUBLICATION_ID)
}

/// Mint a short-term token with a caller-chosen location chain.
pub(crate) fn short_term_fixture_with(chain: HashChain) -> Fixture {
    mint(chain, REGISTERED_AT, PUBLICATION_ID)
}

/// Mint a short-term token for a caller-chosen aggregation round.
pub(crate) fn short_term_fixture_at(registered_at: u64, publication_id: u64) -> Fixture {
    mint(location_chain(None), registered_at, publication_id)
}

fn mint(location_chain: HashChain, registered_at: u64, publication_id: u64) -> Fixture {
    let key_document =
        EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &ring::rand::SystemRandom::new())
            .unwrap();
    let key_pair =
        EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, key_document.as_ref()).unwrap();

    let certificate = self_signed_certificate(&key_pair);
    let spki_der = der(certificate.tbs_certificate.subject_public_key_info.encode_ref());

    let tst_info = tst_info(DOCUMENT, registered_at);
    let tst_info_der = der(tst_info.encode_ref());

    let attributes = signed_attributes(&tst_info_der);
    let attributes_der = der(attributes.encode_ref());

    let history = history_chain(registered_at, publication_id);

    let input = DataImprint::compute(HashAlgorithm::Sha256, &attributes_der);
    let after_location = location_chain.fold(&input);
    let after_history = history.fold(&after_location);
    let published_imprint =
        DataImprint::compute(HashAlgorithm::Sha256, &after_history.to_bytes());

    let published_data = Asn1PublishedData {
        publication_identifier: RawInteger::from_u64(publication_id),
        publication_imprint: OctetString::new(Bytes::from(published_imprint.to_bytes())),
    };

    let pk_signature = key_pair
        .sign(
            &ring::rand::SystemRandom::new(),
            &der(published_data.encode_ref()),
        )
        .unwrap();

    let time_signature = TimeSignature {
        location: OctetString::new(Bytes::from(location_chain.to_bytes())),
        history: OctetString::new(Bytes::from(history.to_bytes())),
        published_data,
        pk_signature: Some(SignatureInfo {
            signature_algorithm: SignatureAlgorithm::EcdsaSha256.algorithm_identifier(),
            signature_value: OctetString::new(Bytes::copy_from_slice(pk_signature.as_ref())),
            key_commitment_ref: None,
        }),
        pub_reference: None,
    };

    let signer = SignerInfo {
        version: CmsVersion::V1,
        sid: SignerIdentifier::IssuerAndSerialNumber(IssuerAndSerialNumber {
            issuer: test_name("gt-test-gateway"),
            serial_number: RawInteger::from_u64(7),
        }),
        digest_algorithm: HashAlgorithm::Sha256.algorithm_identifier(),
        signed_attributes: Some(attributes),
        signature_algorithm: AlgorithmIdentifier {
            algorithm: oid(OID_GT_TIME_SIGNATURE_ALG.0),
            parameters: Some(AlgorithmParameter::null()),
        },
        signature: OctetString::new(Bytes::from(time_signature.to_der().unwrap())),
        unsigned_attributes: None,
        signed_attributes_data: None,
    };

    let signed_data = SignedData {
        version: CmsVersion::V3,
        digest_algorithms: DigestAlgorithmIdentifiers(vec![
            HashAlgorithm::Sha256.algorithm_identifier()
        ]),
        content_info: EncapsulatedContentInfo {
            content_type: oid(OID_CONTENT_TYPE_TST_INFO.0),
            content: Some(OctetString::new(Bytes::from(tst_info_der))),
        },
        certificates: Some(CertificateSet(vec![certificate])),
        signer_infos: SignerInfos(vec![signer]),
    };

    Fixture {
        token: Timestamp::from_signed_data(signed_data).unwrap(),
        spki_der,
        document_imprint: DataImprint::compute(HashAlgorithm::Sha256, DOCUMENT),
    }
}

/// A granted extension response consistent with `token`.
pub(crate) fn extension_response_for(token: &Timestamp) -> Vec<u8> {
    let history = history_chain(token.registered_time().unwrap(), EXTENDED_PUBLICATION_ID);

    let after_location = verify::location_output(token).unwrap();
    let folded = history.fold(&after_location);
    let published_imprint = DataImprint::compute(HashAlgorithm::Sha256, &folded.to_bytes());

    let response = CertTokenResponse {
        status: granted_status(),
        cert_token: Some(CertToken {
            version: RawInteger::from_u64(1),
            history: OctetString::new(Bytes::from(history.to_bytes())),
            published_data: Asn1PublishedData {
                publication_identifier: RawInteger::from_u64(EXTENDED_PUBLICATION_ID),
                publication_imprint: OctetString::new(Bytes::from(published_imprint.to_bytes())),
            },
            pub_reference: Some(vec![OctetString::new(Bytes::from_static(
                b"https://verify.example.test/publications",
            ))]),
            extensions: None,
        }),
    };

    der(response.encode_ref())
}

/// A short-term token plus its extension, run through the extend engine.
pub(crate) fn extended_token() -> Timestamp {
    let fixture = short_term_fixture();
    let response = extension_response_for(&fixture.token);

    crate::extend::extend(&fixture.token, &response).unwrap()
}

fn granted_status() -> PkiStatusInfo {
    PkiStatusInfo {
        status: PkiStatus::Granted,
        status_string: None,
        fail_info: None,
    }
}

/// Wrap a full token DER in a granted `TimeStampResp`.
pub(crate) fn wrap_in_timestamp_response(token_der: &[u8]) -> Vec<u8> {
    let token = bcder::decode::Constructed::decode(token_der, Mode::Der, |cons| {
        cons.take_sequence(|cons| crate::asn1::rfc5652::ContentInfo::from_sequence(cons))
    })
    .unwrap();

    let response = TimeStampResp {
        status: granted_status(),
        time_stamp_token: Some(token),
    };

    der(response.encode_ref())
}

/// A granted `TimeStampResp` with no token.
pub(crate) fn empty_granted_response() -> Vec<u8> {
    let response = TimeStampResp {
        status: granted_status(),
        time_stamp_token: None,
    };

    der(response.encode_ref())
}

/// The full token DER plus its signer SPKI, for response-path tests.
pub(crate) fn short_term_token_der() -> (Vec<u8>, Vec<u8>) {
    let fixture = short_term_fixture();

    (fixture.token.encode().unwrap(), fixture.spki_der)
}

/// An in-memory publications source.
#[derive(Default)]
pub(crate) struct TestPublications {
    pub published: Vec<PublishedData>,
    pub keys: Vec<(DataImprint, i64)>,
}

impl PublicationsSource for TestPublications {
    fn published_data(&self, publication_identifier: u64) -> Option<PublishedData> {
        self.published
            .iter()
            .find(|data| data.publication_identifier == publication_identifier)
            .cloned()
    }

    fn key_hashes(&self) -> Vec<(DataImprint, i64)> {
        self.keys.clone()
    }
}
