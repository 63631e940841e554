// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! The timestamp token codec.

A [Timestamp] is a decoded CMS `SignedData` plus two projections kept in
lockstep with it: the RFC 3161 `TSTInfo` body and the GuardTime
`TimeSignature` payload. Construction always decodes and validates all
three; operations that change the token (extension) build a new value,
so the projections can never drift from the token bytes.
*/

use {
    crate::{
        asn1::{
            guardtime::{TimeSignature, OID_GT_TIME_SIGNATURE_ALG},
            rfc3161::{TstInfo, OID_CONTENT_TYPE_TST_INFO},
            rfc5652::{SignedData, SignerInfo},
        },
        certificate::Certificate,
        chain::HashChain,
        location,
        GtError, SyntaxError,
    },
    bcder::{decode::Malformed, encode::Values, Mode},
};

/// Result of comparing two timestamps by registration time.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TimeComparison {
    Earlier,
    NotEarlier,
}

/// A decoded timestamp token.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Timestamp {
    signed_data: SignedData,
    tst_info: TstInfo,
    tst_info_der: Vec<u8>,
    time_signature: TimeSignature,
}

impl Timestamp {
    /// Decode a DER timestamp token.
    ///
    /// Fails with an invalid-format error on any ASN.1 error, a non-signed
    /// CMS type, detached content, a wrong encapsulated content type, or a
    /// missing/duplicated signer-info.
    pub fn decode(data: &[u8]) -> Result<Self, GtError> {
        let signed_data = SignedData::decode_ber(data)?;

        Self::from_signed_data(signed_data)
    }

    /// Validate the token invariants and derive the cached projections.
    pub(crate) fn from_signed_data(signed_data: SignedData) -> Result<Self, GtError> {
        if signed_data.content_info.content_type != OID_CONTENT_TYPE_TST_INFO {
            return Err(SyntaxError::InvalidFormat(Malformed).into());
        }

        let content = signed_data
            .content_info
            .content
            .as_ref()
            .ok_or(SyntaxError::InvalidFormat(Malformed))?;
        let tst_info_der = content.to_bytes().to_vec();

        let tst_info = bcder::decode::Constructed::decode(
            tst_info_der.as_slice(),
            Mode::Der,
            |cons| TstInfo::take_from(cons),
        )?;

        if signed_data.signer_infos.len() != 1 {
            return Err(SyntaxError::InvalidFormat(Malformed).into());
        }
        let signer = &signed_data.signer_infos[0];

        // The signature algorithm slot carries the TimeSignature OID, with
        // parameters absent or explicit NULL.
        if signer.signature_algorithm.algorithm != OID_GT_TIME_SIGNATURE_ALG
            || !signer.signature_algorithm.parameters_absent_or_null()
        {
            return Err(SyntaxError::InvalidFormat(Malformed).into());
        }

        let time_signature =
            TimeSignature::decode_der(signer.signature.to_bytes().as_ref())?;

        Ok(Self {
            signed_data,
            tst_info,
            tst_info_der,
            time_signature,
        })
    }

    /// Re-emit the canonical DER of the token.
    pub fn encode(&self) -> Result<Vec<u8>, GtError> {
        let mut res = Vec::new();

        self.signed_data
            .encode_ref()
            .write_encoded(Mode::Der, &mut res)?;

        Ok(res)
    }

    pub fn signed_data(&self) -> &SignedData {
        &self.signed_data
    }

    /// The cached TSTInfo projection.
    pub fn tst_info(&self) -> &TstInfo {
        &self.tst_info
    }

    /// The DER bytes of the encapsulated TSTInfo.
    pub fn tst_info_der(&self) -> &[u8] {
        &self.tst_info_der
    }

    /// The cached TimeSignature projection.
    pub fn time_signature(&self) -> &TimeSignature {
        &self.time_signature
    }

    /// The token's single signer-info.
    pub fn signer_info(&self) -> &SignerInfo {
        &self.signed_data.signer_infos[0]
    }

    /// High-level views of the embedded certificates.
    pub fn certificates(&self) -> Vec<Certificate> {
        match &self.signed_data.certificates {
            Some(certs) => certs
                .iter()
                .map(|cert| Certificate::from_parsed_asn1(cert.clone()))
                .collect(),
            None => Vec::new(),
        }
    }

    /// The certificate the signer-info points at, if embedded.
    pub fn signer_certificate(&self) -> Option<Certificate> {
        let crate::asn1::rfc5652::SignerIdentifier::IssuerAndSerialNumber(sid) =
            &self.signer_info().sid;

        self.certificates()
            .into_iter()
            .find(|cert| cert.matches_signer(sid))
    }

    /// Whether the token is extended (hash-linked, no PKI signature).
    pub fn is_extended(&self) -> bool {
        self.time_signature.pk_signature.is_none()
    }

    /// The parsed location chain.
    pub fn location_chain(&self) -> Result<HashChain, GtError> {
        HashChain::parse(self.time_signature.location.to_bytes().as_ref())
    }

    /// The parsed history chain.
    pub fn history_chain(&self) -> Result<HashChain, GtError> {
        HashChain::parse(self.time_signature.history.to_bytes().as_ref())
    }

    /// The publication identifier as epoch seconds.
    pub fn publication_identifier(&self) -> Result<u64, GtError> {
        self.time_signature
            .published_data
            .publication_identifier
            .to_u64()
            .ok_or_else(|| SyntaxError::InvalidFormat(Malformed).into())
    }

    /// The registration time recovered from the history chain's shape.
    pub fn registered_time(&self) -> Result<u64, GtError> {
        location::registration_time(&self.history_chain()?, self.publication_identifier()?)
    }

    /// Order two timestamps by registration time.
    ///
    /// Antisymmetric: at most one of `a.is_earlier_than(b)` and
    /// `b.is_earlier_than(a)` reports [TimeComparison::Earlier].
    pub fn is_earlier_than(&self, other: &Self) -> Result<TimeComparison, GtError> {
        if self.registered_time()? < other.registered_time()? {
            Ok(TimeComparison::Earlier)
        } else {
            Ok(TimeComparison::NotEarlier)
        }
    }
}
