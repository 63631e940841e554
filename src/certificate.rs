// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! High-level X.509 certificate interface.

Only what verification needs: locating the signer certificate by issuer
and serial, exposing its public key, and rendering it for informational
output. Chain validation against a trust store is out of scope.
*/

use {
    crate::{
        asn1::{
            common::RawInteger,
            rfc3280::Name,
            rfc5280,
            rfc5652::IssuerAndSerialNumber,
        },
        GtError,
    },
    bcder::{decode::Constructed, encode::Values, Mode},
};

/// An X.509 certificate embedded in a timestamp token.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Certificate {
    serial_number: RawInteger,
    subject: Name,
    issuer: Name,
    raw_cert: rfc5280::Certificate,
}

impl Certificate {
    pub fn from_parsed_asn1(cert: rfc5280::Certificate) -> Self {
        Self {
            serial_number: cert.tbs_certificate.serial_number.clone(),
            subject: cert.tbs_certificate.subject.clone(),
            issuer: cert.tbs_certificate.issuer.clone(),
            raw_cert: cert,
        }
    }

    pub fn from_der(data: &[u8]) -> Result<Self, GtError> {
        let cert = Constructed::decode(data, Mode::Der, |cons| {
            rfc5280::Certificate::take_from(cons)
        })?;

        Ok(Self::from_parsed_asn1(cert))
    }

    pub fn serial_number(&self) -> &RawInteger {
        &self.serial_number
    }

    pub fn subject(&self) -> &Name {
        &self.subject
    }

    pub fn issuer(&self) -> &Name {
        &self.issuer
    }

    /// The parsed certificate structure backing this instance.
    pub fn raw_certificate(&self) -> &rfc5280::Certificate {
        &self.raw_cert
    }

    /// The raw public key bit-string content.
    pub fn public_key_data(&self) -> Vec<u8> {
        self.raw_cert
            .tbs_certificate
            .subject_public_key_info
            .subject_public_key
            .octet_bytes()
            .to_vec()
    }

    /// DER of the SubjectPublicKeyInfo, the payload key fingerprints are
    /// computed over.
    pub fn spki_der(&self) -> Result<Vec<u8>, GtError> {
        let mut res = Vec::new();

        self.raw_cert
            .tbs_certificate
            .subject_public_key_info
            .encode_ref()
            .write_encoded(Mode::Der, &mut res)?;

        Ok(res)
    }

    /// The certificate's `notBefore` as epoch seconds.
    pub fn not_before(&self) -> i64 {
        self.raw_cert
            .tbs_certificate
            .validity
            .not_before
            .as_epoch_seconds()
    }

    /// Serialize to DER.
    pub fn as_der(&self) -> Result<Vec<u8>, GtError> {
        let mut res = Vec::new();

        self.raw_cert.encode_ref().write_encoded(Mode::Der, &mut res)?;

        Ok(res)
    }

    /// Serialize to PEM.
    pub fn as_pem(&self) -> Result<String, GtError> {
        Ok(pem::encode(&pem::Pem {
            tag: "CERTIFICATE".to_string(),
            contents: self.as_der()?,
        }))
    }

    /// Whether this certificate is the one a signer-info points at.
    pub fn matches_signer(&self, sid: &IssuerAndSerialNumber) -> bool {
        certificate_is_subset_of(
            &sid.serial_number,
            &sid.issuer,
            &self.serial_number,
            &self.issuer,
        )
    }
}

/// Whether one certificate reference is a subset of another.
///
/// True iff the serial numbers match and every `Name` attribute of the
/// first is present in the second. Non-exact matching tolerates
/// candidate certificates carrying extra name fields.
pub(crate) fn certificate_is_subset_of(
    a_serial: &RawInteger,
    a_name: &Name,
    b_serial: &RawInteger,
    b_name: &Name,
) -> bool {
    if a_serial != b_serial {
        return false;
    }

    let Name::RdnSequence(a_sequence) = &a_name;
    let Name::RdnSequence(b_sequence) = &b_name;

    a_sequence.iter().all(|rdn| b_sequence.contains(rdn))
}
