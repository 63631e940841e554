// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Gateway request builders.

Both builders return DER bytes ready to POST; transport is the caller's
concern.
*/

use {
    crate::{
        asn1::{
            common::RawInteger,
            guardtime::CertTokenRequest,
            rfc3161::{MessageImprint, TimeStampReq},
        },
        imprint::DataImprint,
        timestamp::Timestamp,
        GtError, SemanticError,
    },
    bcder::{encode::Values, Mode, OctetString},
    bytes::Bytes,
};

fn to_der(values: impl Values) -> Result<Vec<u8>, GtError> {
    let mut res = Vec::new();
    values.write_encoded(Mode::Der, &mut res)?;

    Ok(res)
}

/// Build a timestamping request over a document hash.
///
/// The request carries only the protocol version and the message imprint:
/// no policy, no nonce, no extensions. The imprint's digest length is
/// validated against its algorithm when the [DataImprint] is constructed.
pub fn timestamp_request(document_hash: &DataImprint) -> Result<Vec<u8>, GtError> {
    let request = TimeStampReq {
        version: RawInteger::from_u64(1),
        message_imprint: MessageImprint {
            hash_algorithm: document_hash.algorithm().algorithm_identifier(),
            hashed_message: OctetString::new(Bytes::copy_from_slice(document_hash.digest())),
        },
        req_policy: None,
        nonce: None,
        cert_req: None,
        extensions: None,
    };

    to_der(request.encode_ref())
}

/// Build an extension request for a short-term timestamp.
///
/// The history identifier is the registration time recovered from the
/// history chain's shape; a malformed chain surfaces as an
/// invalid-linking-info or wrong-size error. An already-extended input
/// has nothing to extend and is rejected.
pub fn extension_request(timestamp: &Timestamp) -> Result<Vec<u8>, GtError> {
    if timestamp.is_extended() {
        return Err(SemanticError::AlreadyExtended.into());
    }

    let history_identifier = timestamp.registered_time()?;

    let request = CertTokenRequest {
        version: RawInteger::from_u64(1),
        history_identifier: RawInteger::from_u64(history_identifier),
    };

    to_der(request.encode_ref())
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{algorithm::HashAlgorithm, asn1::rfc3161::TimeStampReq},
        bcder::decode::Constructed,
        std::convert::TryFrom,
    };

    #[test]
    fn request_layout() {
        let imprint = DataImprint::compute(HashAlgorithm::Sha256, b"some document");
        let der = timestamp_request(&imprint).unwrap();

        let decoded =
            Constructed::decode(der.as_slice(), Mode::Der, |cons| TimeStampReq::take_from(cons))
                .unwrap();

        assert_eq!(decoded.version.to_u64(), Some(1));
        assert_eq!(
            HashAlgorithm::try_from(&decoded.message_imprint.hash_algorithm).unwrap(),
            HashAlgorithm::Sha256
        );
        assert_eq!(
            decoded.message_imprint.hashed_message.to_bytes().as_ref(),
            imprint.digest()
        );
        assert!(decoded.req_policy.is_none());
        assert!(decoded.nonce.is_none());
        assert!(decoded.cert_req.is_none());
        assert!(decoded.extensions.is_none());
    }
}
