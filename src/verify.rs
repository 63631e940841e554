// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! The timestamp verification engine.

[verify] composes the syntactic checker, the implicit-information
decoder, the hash-chain verifier, and the PKI signature verifier. It
never short-circuits: every sub-check contributes a flag to the error
bitmap, so callers always see the full picture in the returned
[VerificationInfo]. Only system-level failures abort with an error.
*/

use {
    crate::{
        algorithm::{HashAlgorithm, SignatureAlgorithm},
        asn1::{
            rfc3161::OID_CONTENT_TYPE_TST_INFO,
            rfc5652::{CmsVersion, OID_CONTENT_TYPE, OID_MESSAGE_DIGEST},
        },
        base32::{encode_with_crc, DEFAULT_GROUP},
        imprint::DataImprint,
        location::LocationInfo,
        publications::{publication_string, PublicationsSource, PublishedData},
        timestamp::Timestamp,
        GtError, SemanticError, SyntaxError, SystemError,
    },
    bcder::{decode::Malformed, OctetString, Oid},
    log::debug,
    std::{convert::TryFrom, ops::Deref},
};

/// The digest used for short-term key fingerprints.
///
/// Fixed to SHA-256 regardless of what the publications file advertises;
/// the fingerprint exists for display and manual comparison only.
pub const KEY_FINGERPRINT_ALGORITHM: HashAlgorithm = HashAlgorithm::Sha256;

bitflags::bitflags! {
    /// Which optional checks ran or which optional material is present.
    pub struct VerificationStatus: u32 {
        const PUBLIC_KEY_SIGNATURE_PRESENT = 0x01;
        const PUBLICATION_REFERENCE_PRESENT = 0x02;
        const DOCUMENT_HASH_CHECKED = 0x04;
        const PUBLICATION_CHECKED = 0x08;
    }
}

bitflags::bitflags! {
    /// Which sub-checks failed.
    pub struct VerificationError: u32 {
        const SYNTACTIC_CHECK_FAILURE = 0x01;
        const HASHCHAIN_VERIFICATION_FAILURE = 0x02;
        const PUBLIC_KEY_SIGNATURE_FAILURE = 0x04;
        const WRONG_DOCUMENT_FAILURE = 0x08;
        const PUBLICATION_FAILURE = 0x10;
        const KEY_PUBLICATION_FAILURE = 0x20;
    }
}

/// Information always recovered from a token, even a failing one.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ImplicitInfo {
    /// Packed `national | state | local | client` aggregator address.
    pub location_id: u64,

    /// Human-readable aggregator name, when the chain embeds name tags.
    pub location_name: Option<String>,

    /// Registration time in epoch seconds; 0 when unrecoverable.
    pub registered_time: i64,

    /// Base32 fingerprint of the signer key, short-term tokens only.
    pub public_key_fingerprint: Option<String>,

    /// Base32 publication string, extended tokens only.
    pub publication_string: Option<String>,
}

/// Every field decodable from the token, produced on request.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ExplicitInfo {
    pub content_type: String,
    pub cms_version: u8,
    pub digest_algorithms: Vec<String>,
    pub tst_info_version: Option<u64>,
    pub policy: String,
    pub hash_algorithm: String,
    pub hashed_message: String,
    pub serial_number: String,
    pub gen_time: i64,
    pub accuracy_millis: Option<u64>,
    pub ordering: bool,
    pub nonce: Option<String>,
    pub tsa_name: Option<String>,
    pub certificate_pem: Option<String>,
    pub signer_issuer: String,
    pub signer_serial: String,
    pub signer_digest_algorithm: String,
    pub signed_attributes: Vec<(String, String)>,
    pub signature_algorithm: String,
    pub location_chain: Vec<String>,
    pub history_chain: Vec<String>,
    pub publication_identifier: u64,
    pub publication_imprint: String,
    pub pk_signature_algorithm: Option<String>,
    pub pk_signature_value: Option<String>,
    pub key_commitment_refs: Vec<String>,
    pub publication_references: Vec<String>,
}

/// The aggregated verification outcome.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VerificationInfo {
    /// Which optional checks ran.
    pub verification_status: VerificationStatus,

    /// Which checks failed; empty means the token verified.
    pub verification_errors: VerificationError,

    pub implicit: ImplicitInfo,

    /// Populated only when explicit parsing was requested.
    pub explicit: Option<ExplicitInfo>,
}

impl VerificationInfo {
    pub fn is_ok(&self) -> bool {
        self.verification_errors.is_empty()
    }
}

/// Optional inputs for [verify_with].
#[derive(Clone, Copy, Default)]
pub struct VerifyOptions<'a> {
    /// Also populate [VerificationInfo::explicit].
    pub parse_explicit: bool,

    /// Check the token against this document hash.
    pub document_hash: Option<&'a DataImprint>,

    /// Check the token against this publications source: the trust point
    /// for extended tokens, the signer key for short-term ones.
    pub publications: Option<&'a dyn PublicationsSource>,
}

/// Verify a timestamp syntactically and cryptographically.
pub fn verify(timestamp: &Timestamp, parse_explicit: bool) -> Result<VerificationInfo, GtError> {
    verify_with(
        timestamp,
        VerifyOptions {
            parse_explicit,
            ..VerifyOptions::default()
        },
    )
}

/// Verify a timestamp, optionally against a document hash and a
/// publications source.
pub fn verify_with(
    timestamp: &Timestamp,
    options: VerifyOptions<'_>,
) -> Result<VerificationInfo, GtError> {
    let mut status = VerificationStatus::empty();
    let mut errors = VerificationError::empty();

    if let Err(e) = syntactic_check(timestamp) {
        debug!("syntactic check failed: {}", e);
        system_aborts(e)?;
        errors |= VerificationError::SYNTACTIC_CHECK_FAILURE;
    }

    let implicit = match implicit_info(timestamp) {
        Ok(implicit) => implicit,
        Err(e) => {
            debug!("implicit info recovery failed: {}", e);
            if !matches!(e, GtError::System(SystemError::TimeOverflow)) {
                system_aborts(e)?;
            }
            errors |= VerificationError::SYNTACTIC_CHECK_FAILURE;
            ImplicitInfo::default()
        }
    };

    if let Err(e) = hashchain_verify(timestamp) {
        debug!("hash chain verification failed: {}", e);
        system_aborts(e)?;
        errors |= VerificationError::HASHCHAIN_VERIFICATION_FAILURE;
    }

    if timestamp.time_signature().pk_signature.is_some() {
        status |= VerificationStatus::PUBLIC_KEY_SIGNATURE_PRESENT;

        if let Err(e) = pk_verify(timestamp) {
            debug!("PKI signature verification failed: {}", e);
            system_aborts(e)?;
            errors |= VerificationError::PUBLIC_KEY_SIGNATURE_FAILURE;
        }
    }

    if timestamp.time_signature().pub_reference.is_some() {
        status |= VerificationStatus::PUBLICATION_REFERENCE_PRESENT;
    }

    if let Some(document_hash) = options.document_hash {
        status |= VerificationStatus::DOCUMENT_HASH_CHECKED;

        if let Err(e) = check_document_hash(timestamp, document_hash) {
            debug!("document hash check failed: {}", e);
            system_aborts(e)?;
            errors |= VerificationError::WRONG_DOCUMENT_FAILURE;
        }
    }

    if let Some(publications) = options.publications {
        status |= VerificationStatus::PUBLICATION_CHECKED;

        if timestamp.is_extended() {
            if let Err(e) = check_publication(timestamp, publications) {
                debug!("publication check failed: {}", e);
                system_aborts(e)?;
                errors |= VerificationError::PUBLICATION_FAILURE;
            }
        } else if let Err(e) =
            check_public_key(timestamp, implicit.registered_time, publications)
        {
            debug!("signer key check failed: {}", e);
            system_aborts(e)?;
            errors |= VerificationError::KEY_PUBLICATION_FAILURE;
        }
    }

    let explicit = if options.parse_explicit {
        Some(explicit_info(timestamp)?)
    } else {
        None
    };

    Ok(VerificationInfo {
        verification_status: status,
        verification_errors: errors,
        implicit,
        explicit,
    })
}

/// Re-raise system-level errors; anything else becomes a bitmap flag at
/// the call site.
fn system_aborts(e: GtError) -> Result<(), GtError> {
    match e {
        GtError::System(_) => Err(e),
        _ => Ok(()),
    }
}

/// The syntactic checker. Enforced in order, failing on the first
/// violation.
pub fn syntactic_check(timestamp: &Timestamp) -> Result<(), GtError> {
    let signed_data = timestamp.signed_data();
    let tst_info = timestamp.tst_info();
    let signer = timestamp.signer_info();

    // 1. Versions.
    if signed_data.version != CmsVersion::V3
        || tst_info.version.to_u64() != Some(1)
        || signer.version != CmsVersion::V1
    {
        return Err(SyntaxError::UnsupportedFormat.into());
    }

    // 2. No unrecognized critical extensions; this library recognizes
    // none.
    if let Some(extensions) = &tst_info.extensions {
        if extensions.critical_ids().next().is_some() {
            return Err(SyntaxError::UnsupportedFormat.into());
        }
    }

    // 3. The publication imprint is a well-formed data imprint.
    DataImprint::from_bytes(
        timestamp
            .time_signature()
            .published_data
            .publication_imprint
            .to_bytes()
            .as_ref(),
    )?;

    // 4. Both chains parse cleanly.
    let location_chain = timestamp.location_chain()?;
    timestamp.history_chain()?;

    // 5. Location chain levels never decrease.
    let mut last_level = None;
    for step in location_chain.steps() {
        if let Some(last) = last_level {
            if step.level < last {
                return Err(SyntaxError::InvalidLinkingInfo.into());
            }
        }
        last_level = Some(step.level);
    }

    // 6. Mandatory signed attributes.
    let attributes = signer
        .signed_attributes
        .as_ref()
        .ok_or(SyntaxError::InvalidFormat(Malformed))?;

    let content_type = attributes
        .single_value(&OID_CONTENT_TYPE)
        .ok_or(SyntaxError::InvalidFormat(Malformed))?;
    let content_type = content_type
        .deref()
        .clone()
        .decode(|cons| Oid::take_from(cons))
        .map_err(|_| SyntaxError::InvalidFormat(Malformed))?;
    if content_type != OID_CONTENT_TYPE_TST_INFO {
        return Err(SyntaxError::InvalidFormat(Malformed).into());
    }

    message_digest_attribute(timestamp)?;

    Ok(())
}

/// The message-digest signed attribute's octet-string value.
fn message_digest_attribute(timestamp: &Timestamp) -> Result<Vec<u8>, GtError> {
    let attributes = timestamp
        .signer_info()
        .signed_attributes
        .as_ref()
        .ok_or(SyntaxError::InvalidFormat(Malformed))?;

    let value = attributes
        .single_value(&OID_MESSAGE_DIGEST)
        .ok_or(SyntaxError::InvalidFormat(Malformed))?;

    Ok(value
        .deref()
        .clone()
        .decode(|cons| OctetString::take_from(cons))
        .map_err(|_| SyntaxError::InvalidFormat(Malformed))?
        .to_bytes()
        .to_vec())
}

/// The imprint entering the history chain: signed attributes hashed and
/// folded through the location chain.
pub(crate) fn location_output(timestamp: &Timestamp) -> Result<DataImprint, GtError> {
    let signer = timestamp.signer_info();
    let alg_client = HashAlgorithm::try_from(&signer.digest_algorithm)?;

    let attrs_der = signer
        .signed_attributes_digested_content()?
        .ok_or(SyntaxError::InvalidFormat(Malformed))?;
    let input = DataImprint::compute(alg_client, &attrs_der);

    Ok(timestamp.location_chain()?.fold(&input))
}

/// The hash-chain verifier: recompute the published imprint from
/// scratch and compare.
pub fn hashchain_verify(timestamp: &Timestamp) -> Result<(), GtError> {
    let published = DataImprint::from_bytes(
        timestamp
            .time_signature()
            .published_data
            .publication_imprint
            .to_bytes()
            .as_ref(),
    )?;

    let signer = timestamp.signer_info();
    let alg_client = HashAlgorithm::try_from(&signer.digest_algorithm)?;

    // Sanity between the signed-attribute digest and the TSTInfo bytes.
    let tst_digest = alg_client.digest(timestamp.tst_info_der());
    if tst_digest != message_digest_attribute(timestamp)? {
        return Err(SemanticError::WrongSignedData.into());
    }

    let after_location = location_output(timestamp)?;
    let after_history = timestamp.history_chain()?.fold(&after_location);

    let final_imprint =
        DataImprint::compute(published.algorithm(), &after_history.to_bytes());

    if final_imprint != published {
        return Err(SemanticError::InvalidAggregation.into());
    }

    Ok(())
}

/// The PKI signature verifier. Only meaningful when `pkSignature` is
/// present.
pub fn pk_verify(timestamp: &Timestamp) -> Result<(), GtError> {
    let signature = timestamp
        .time_signature()
        .pk_signature
        .as_ref()
        .ok_or(SyntaxError::InvalidFormat(Malformed))?;

    let certificate = timestamp
        .signer_certificate()
        .ok_or(SyntaxError::InvalidFormat(Malformed))?;

    let algorithm = SignatureAlgorithm::try_from(&signature.signature_algorithm)?;

    let payload = timestamp.time_signature().published_data.to_der()?;

    let key = ring::signature::UnparsedPublicKey::new(
        algorithm.as_verification_algorithm(),
        certificate.public_key_data(),
    );

    key.verify(&payload, signature.signature_value.to_bytes().as_ref())
        .map_err(|_| SemanticError::InvalidSignature)?;

    Ok(())
}

/// Compare the token's message imprint against a supplied document hash.
pub fn check_document_hash(
    timestamp: &Timestamp,
    document_hash: &DataImprint,
) -> Result<(), GtError> {
    let imprint = &timestamp.tst_info().message_imprint;
    let algorithm = HashAlgorithm::try_from(&imprint.hash_algorithm)?;

    if algorithm != document_hash.algorithm() {
        return Err(SyntaxError::DifferentHashAlgorithms.into());
    }

    if imprint.hashed_message.to_bytes().as_ref() != document_hash.digest() {
        return Err(SemanticError::WrongDocument.into());
    }

    Ok(())
}

/// Compare the token's published data against the publications source.
pub fn check_publication(
    timestamp: &Timestamp,
    publications: &dyn PublicationsSource,
) -> Result<(), GtError> {
    let own = PublishedData::from_asn1(&timestamp.time_signature().published_data)?;

    let published = publications
        .published_data(own.publication_identifier)
        .ok_or(SemanticError::TrustPointNotFound)?;

    if published != own {
        return Err(SemanticError::InvalidTrustPoint.into());
    }

    Ok(())
}

/// Check the signer key against the publications key-hash table.
///
/// The signer certificate's SubjectPublicKeyInfo is hashed with every
/// algorithm appearing in the table; a matching key must have been
/// published no later than the token's registration.
pub fn check_public_key(
    timestamp: &Timestamp,
    registered_time: i64,
    publications: &dyn PublicationsSource,
) -> Result<(), GtError> {
    let certificate = timestamp
        .signer_certificate()
        .ok_or(SyntaxError::InvalidFormat(Malformed))?;
    let spki = certificate.spki_der()?;

    for (imprint, key_publication_time) in publications.key_hashes() {
        if DataImprint::compute(imprint.algorithm(), &spki) == imprint {
            return if key_publication_time <= registered_time {
                Ok(())
            } else {
                Err(SemanticError::CertTicketTooOld.into())
            };
        }
    }

    Err(SemanticError::KeyNotPublished.into())
}

/// Decode the implicit information block.
fn implicit_info(timestamp: &Timestamp) -> Result<ImplicitInfo, GtError> {
    let location = LocationInfo::decode(&timestamp.location_chain()?)?;
    let registered_time = timestamp.registered_time()?;

    let (fingerprint, publication) = if timestamp.is_extended() {
        let data = PublishedData::from_asn1(&timestamp.time_signature().published_data)?;
        (None, Some(publication_string(&data, DEFAULT_GROUP)))
    } else {
        let fingerprint = match timestamp.signer_certificate() {
            Some(certificate) => {
                let imprint =
                    DataImprint::compute(KEY_FINGERPRINT_ALGORITHM, &certificate.spki_der()?);
                Some(encode_with_crc(&imprint.to_bytes(), DEFAULT_GROUP))
            }
            None => None,
        };

        (fingerprint, None)
    };

    Ok(ImplicitInfo {
        location_id: location.id(),
        location_name: location.name(),
        registered_time: registered_time as i64,
        public_key_fingerprint: fingerprint,
        publication_string: publication,
    })
}

fn chain_display(chain: &crate::chain::HashChain) -> Vec<String> {
    chain
        .steps()
        .iter()
        .map(|step| {
            format!(
                "{} {:?} level {} sibling {}",
                match step.direction {
                    crate::chain::ChainDirection::Left => "L",
                    crate::chain::ChainDirection::Right => "R",
                },
                step.algorithm,
                step.level,
                hex::encode(&step.sibling)
            )
        })
        .collect()
}

fn octet_display(value: &OctetString) -> String {
    let bytes = value.to_bytes();

    match std::str::from_utf8(bytes.as_ref()) {
        Ok(s) if s.chars().all(|c| !c.is_control()) => s.to_string(),
        _ => hex::encode(bytes),
    }
}

/// Decode the explicit information block: everything the token states
/// outright.
fn explicit_info(timestamp: &Timestamp) -> Result<ExplicitInfo, GtError> {
    let signed_data = timestamp.signed_data();
    let tst_info = timestamp.tst_info();
    let signer = timestamp.signer_info();
    let time_signature = timestamp.time_signature();

    let crate::asn1::rfc5652::SignerIdentifier::IssuerAndSerialNumber(sid) = &signer.sid;

    // Chain rendering is best-effort: a malformed chain is already
    // reported through the error bitmap.
    let location_chain = timestamp
        .location_chain()
        .map(|chain| chain_display(&chain))
        .unwrap_or_default();
    let history_chain = timestamp
        .history_chain()
        .map(|chain| chain_display(&chain))
        .unwrap_or_default();

    let signed_attributes = signer
        .signed_attributes
        .iter()
        .flat_map(|attrs| attrs.iter())
        .flat_map(|attr| {
            attr.values
                .iter()
                .map(move |value| (attr.typ.to_string(), hex::encode(value.as_slice())))
        })
        .collect();

    Ok(ExplicitInfo {
        content_type: signed_data.content_info.content_type.to_string(),
        cms_version: u8::from(signed_data.version),
        digest_algorithms: signed_data
            .digest_algorithms
            .iter()
            .map(|alg| alg.algorithm.to_string())
            .collect(),
        tst_info_version: tst_info.version.to_u64(),
        policy: tst_info.policy.to_string(),
        hash_algorithm: tst_info.message_imprint.hash_algorithm.algorithm.to_string(),
        hashed_message: hex::encode(tst_info.message_imprint.hashed_message.to_bytes()),
        serial_number: hex::encode(tst_info.serial_number.as_slice()),
        gen_time: tst_info.gen_time.as_epoch_seconds(),
        accuracy_millis: tst_info
            .accuracy
            .as_ref()
            .and_then(|accuracy| accuracy.as_micros())
            .map(|micros| micros / 1000),
        ordering: tst_info.ordering.unwrap_or(false),
        nonce: tst_info
            .nonce
            .as_ref()
            .map(|nonce| hex::encode(nonce.as_slice())),
        tsa_name: tst_info.tsa.as_ref().map(|tsa| tsa.to_display_string()),
        certificate_pem: match timestamp.signer_certificate() {
            Some(certificate) => Some(certificate.as_pem()?),
            None => None,
        },
        signer_issuer: sid.issuer.to_display_string(),
        signer_serial: hex::encode(sid.serial_number.as_slice()),
        signer_digest_algorithm: signer.digest_algorithm.algorithm.to_string(),
        signed_attributes,
        signature_algorithm: signer.signature_algorithm.algorithm.to_string(),
        location_chain,
        history_chain,
        publication_identifier: timestamp.publication_identifier().unwrap_or(0),
        publication_imprint: hex::encode(
            time_signature.published_data.publication_imprint.to_bytes(),
        ),
        pk_signature_algorithm: time_signature
            .pk_signature
            .as_ref()
            .map(|sig| sig.signature_algorithm.algorithm.to_string()),
        pk_signature_value: time_signature
            .pk_signature
            .as_ref()
            .map(|sig| hex::encode(sig.signature_value.to_bytes())),
        key_commitment_refs: time_signature
            .pk_signature
            .as_ref()
            .and_then(|sig| sig.key_commitment_ref.as_ref())
            .map(|refs| refs.iter().map(octet_display).collect())
            .unwrap_or_default(),
        publication_references: time_signature
            .pub_reference
            .as_ref()
            .map(|refs| refs.iter().map(octet_display).collect())
            .unwrap_or_default(),
    })
}
