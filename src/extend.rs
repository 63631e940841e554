// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! The extension engine.

Splices a cert token into a short-term timestamp, producing a long-term
one: the history chain and published data are replaced, the PKI
signature and the certificate bag are dropped. The operation is
transactional — either a fresh extended [Timestamp] comes back, or an
error and the input is untouched.
*/

use {
    crate::{
        asn1::guardtime::{CertToken, TimeSignature},
        chain::HashChain,
        imprint::DataImprint,
        location,
        response::ExtensionResponse,
        timestamp::Timestamp,
        verify,
        GtError, SemanticError, SyntaxError,
    },
    bcder::OctetString,
    bytes::Bytes,
    log::warn,
};

/// Fold a short-term timestamp and an extension response into a new,
/// extended timestamp.
pub fn extend(timestamp: &Timestamp, response: &[u8]) -> Result<Timestamp, GtError> {
    if timestamp.is_extended() {
        return Err(SemanticError::AlreadyExtended.into());
    }

    let cert_token = ExtensionResponse::parse(response)?.into_cert_token()?;

    if cert_token.version.to_u64() != Some(1) {
        return Err(SyntaxError::UnsupportedFormat.into());
    }

    // Unknown critical extensions make the token unusable; this library
    // recognizes none.
    if let Some(extensions) = &cert_token.extensions {
        if extensions.critical_ids().next().is_some() {
            return Err(SyntaxError::UnsupportedFormat.into());
        }
    }

    check_consistency(timestamp, &cert_token)?;

    let time_signature = TimeSignature {
        location: timestamp.time_signature().location.clone(),
        history: cert_token.history.clone(),
        published_data: cert_token.published_data.clone(),
        pk_signature: None,
        pub_reference: cert_token.pub_reference.clone(),
    };

    let mut signed_data = timestamp.signed_data().clone();
    signed_data.signer_infos.0[0].signature =
        OctetString::new(Bytes::from(time_signature.to_der()?));

    // The signing certificate only backed the PKI signature that was just
    // dropped.
    signed_data.certificates = None;

    Timestamp::from_signed_data(signed_data)
}

/// The extend-consistency check.
///
/// The cert token must describe the same aggregation round: its history
/// chain has to recover the short-term token's registration time, and
/// refolding the token's location output through the new history has to
/// reproduce the new published imprint.
fn check_consistency(timestamp: &Timestamp, cert_token: &CertToken) -> Result<(), GtError> {
    let new_history = HashChain::parse(cert_token.history.to_bytes().as_ref())
        .map_err(|_| SemanticError::CannotExtend)?;

    let new_publication_identifier = cert_token
        .published_data
        .publication_identifier
        .to_u64()
        .ok_or(SemanticError::CannotExtend)?;

    let old_time = timestamp.registered_time()?;
    let new_time = location::registration_time(&new_history, new_publication_identifier)
        .map_err(|_| SemanticError::CannotExtend)?;

    if new_time != old_time {
        warn!(
            "extension data is for round {}, timestamp is from round {}",
            new_time, old_time
        );
        return Err(SemanticError::CannotExtend.into());
    }

    let new_imprint =
        DataImprint::from_bytes(cert_token.published_data.publication_imprint.to_bytes().as_ref())
            .map_err(|_| SemanticError::CannotExtend)?;

    let location_output = verify::location_output(timestamp)?;
    let folded = new_history.fold(&location_output);
    let final_imprint = DataImprint::compute(new_imprint.algorithm(), &folded.to_bytes());

    if final_imprint != new_imprint {
        warn!("extension data does not reproduce the published imprint");
        return Err(SemanticError::CannotExtend.into());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            asn1::{common::RawInteger, guardtime::CertTokenResponse},
            testutil,
            verify::{verify, VerificationStatus},
        },
        bcder::{encode::Values, Mode},
    };

    #[test]
    fn extend_produces_a_verifiable_long_term_token() {
        let fixture = testutil::short_term_fixture();
        let before = fixture.token.encode().unwrap();

        let response = testutil::extension_response_for(&fixture.token);
        let extended = extend(&fixture.token, &response).unwrap();

        // The input is untouched.
        assert_eq!(fixture.token.encode().unwrap(), before);

        assert!(extended.is_extended());
        assert!(extended.signed_data().certificates.is_none());
        assert_eq!(
            extended.publication_identifier().unwrap(),
            testutil::EXTENDED_PUBLICATION_ID
        );
        assert_eq!(
            extended.registered_time().unwrap(),
            fixture.token.registered_time().unwrap()
        );

        let info = verify(&extended, false).unwrap();
        assert!(info.is_ok(), "errors: {:?}", info.verification_errors);
        assert!(!info
            .verification_status
            .contains(VerificationStatus::PUBLIC_KEY_SIGNATURE_PRESENT));
        assert!(info.implicit.publication_string.is_some());
    }

    #[test]
    fn extending_twice_is_rejected() {
        let extended = testutil::extended_token();
        let response = testutil::extension_response_for(&extended);

        assert!(matches!(
            extend(&extended, &response),
            Err(GtError::Semantic(SemanticError::AlreadyExtended))
        ));
    }

    #[test]
    fn mismatched_round_cannot_extend() {
        let fixture = testutil::short_term_fixture();
        let other = testutil::short_term_fixture_at(
            testutil::REGISTERED_AT + 9_999,
            testutil::PUBLICATION_ID,
        );

        // A response minted for a different token's round.
        let response = testutil::extension_response_for(&other.token);

        assert!(matches!(
            extend(&fixture.token, &response),
            Err(GtError::Semantic(SemanticError::CannotExtend))
        ));
    }

    #[test]
    fn unsupported_cert_token_version_is_rejected() {
        let fixture = testutil::short_term_fixture();
        let response = testutil::extension_response_for(&fixture.token);

        let mut decoded = CertTokenResponse::decode_der(&response).unwrap();
        decoded.cert_token.as_mut().unwrap().version = RawInteger::from_u64(2);

        let mut tampered = Vec::new();
        decoded
            .encode_ref()
            .write_encoded(Mode::Der, &mut tampered)
            .unwrap();

        assert!(matches!(
            extend(&fixture.token, &tampered),
            Err(GtError::Syntax(SyntaxError::UnsupportedFormat))
        ));
    }
}
