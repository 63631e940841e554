// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Gateway response handling.

Parses `TimeStampResp` / `CertTokenResponse` bytes, maps the
`PKIStatusInfo` onto error kinds, and surrenders the enclosed token
material.
*/

use {
    crate::{
        asn1::{
            guardtime::{CertToken, CertTokenResponse},
            rfc3161::{PkiFailureInfo, PkiStatus, PkiStatusInfo, TimeStampResp},
            rfc5652::{SignedData, OID_ID_SIGNED_DATA},
        },
        timestamp::Timestamp,
        GtError, SyntaxError, SystemError,
    },
    bcder::decode::{Constructed, Malformed},
};

/// A parsed timestamping response.
pub struct TimestampResponse(TimeStampResp);

impl TimestampResponse {
    pub fn parse(data: &[u8]) -> Result<Self, GtError> {
        let resp = Constructed::decode(data, bcder::Mode::Der, |cons| {
            TimeStampResp::take_from(cons)
        })?;

        Ok(Self(resp))
    }

    pub fn status(&self) -> &PkiStatusInfo {
        &self.0.status
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self.0.status.status,
            PkiStatus::Granted | PkiStatus::GrantedWithMods
        )
    }

    /// Adopt the enclosed token as a fresh short-term timestamp.
    ///
    /// The gateway status is checked first; a success status without a
    /// token field is malformed. No signature verification happens here,
    /// the verify path owns that.
    pub fn into_timestamp(self) -> Result<Timestamp, GtError> {
        check_status(&self.0.status)?;

        let token = self
            .0
            .time_stamp_token
            .ok_or(SyntaxError::InvalidFormat(Malformed))?;

        if token.content_type != OID_ID_SIGNED_DATA {
            return Err(SyntaxError::InvalidFormat(Malformed).into());
        }

        let signed_data = token.content.decode(|cons| SignedData::take_from(cons))?;

        Timestamp::from_signed_data(signed_data)
    }
}

/// A parsed extension response.
pub struct ExtensionResponse(CertTokenResponse);

impl ExtensionResponse {
    pub fn parse(data: &[u8]) -> Result<Self, GtError> {
        Ok(Self(CertTokenResponse::decode_der(data)?))
    }

    pub fn status(&self) -> &PkiStatusInfo {
        &self.0.status
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self.0.status.status,
            PkiStatus::Granted | PkiStatus::GrantedWithMods
        )
    }

    /// Surrender the enclosed cert token after checking the status.
    pub fn into_cert_token(self) -> Result<CertToken, GtError> {
        check_status(&self.0.status)?;

        self.0
            .cert_token
            .ok_or_else(|| SyntaxError::InvalidFormat(Malformed).into())
    }
}

/// Map a gateway status onto the error taxonomy.
///
/// `granted` and `grantedWithMods` are success. Failure-info bits map
/// 1:1; a rejection without failure info is treated as a gateway-side
/// failure, and the waiting/revocation statuses never occur in this
/// protocol profile.
pub(crate) fn check_status(status: &PkiStatusInfo) -> Result<(), GtError> {
    match status.status {
        PkiStatus::Granted | PkiStatus::GrantedWithMods => Ok(()),
        _ => Err(match status.fail_info {
            Some(PkiFailureInfo::BadAlg) => SyntaxError::PkiBadAlg.into(),
            Some(PkiFailureInfo::BadRequest) => SyntaxError::PkiBadRequest.into(),
            Some(PkiFailureInfo::BadDataFormat) => SyntaxError::PkiBadDataFormat.into(),
            Some(PkiFailureInfo::UnacceptedPolicy) => SyntaxError::UnacceptedPolicy.into(),
            Some(PkiFailureInfo::ExtendLater) => SyntaxError::NonstdExtendLater.into(),
            Some(PkiFailureInfo::ExtensionOverdue) => SyntaxError::NonstdExtensionOverdue.into(),
            Some(PkiFailureInfo::TimeNotAvailable) | Some(PkiFailureInfo::SystemFailure) => {
                SystemError::PkiSystemFailure.into()
            }
            Some(PkiFailureInfo::UnacceptedExtension)
            | Some(PkiFailureInfo::AddInfoNotAvailable) => SyntaxError::ProtocolMismatch.into(),
            None => match status.status {
                PkiStatus::Rejection => SystemError::PkiSystemFailure.into(),
                _ => SyntaxError::ProtocolMismatch.into(),
            },
        }),
    }
}

#[cfg(test)]
mod tests {
    use {super::*, crate::SemanticError};

    fn status(status: PkiStatus, fail_info: Option<PkiFailureInfo>) -> PkiStatusInfo {
        PkiStatusInfo {
            status,
            status_string: None,
            fail_info,
        }
    }

    #[test]
    fn granted_statuses_pass() {
        assert!(check_status(&status(PkiStatus::Granted, None)).is_ok());
        assert!(check_status(&status(PkiStatus::GrantedWithMods, None)).is_ok());
    }

    #[test]
    fn failure_bits_map_one_to_one() {
        let cases = [
            (PkiFailureInfo::BadAlg, SyntaxError::PkiBadAlg),
            (PkiFailureInfo::BadRequest, SyntaxError::PkiBadRequest),
            (PkiFailureInfo::BadDataFormat, SyntaxError::PkiBadDataFormat),
            (PkiFailureInfo::UnacceptedPolicy, SyntaxError::UnacceptedPolicy),
            (PkiFailureInfo::ExtendLater, SyntaxError::NonstdExtendLater),
            (
                PkiFailureInfo::ExtensionOverdue,
                SyntaxError::NonstdExtensionOverdue,
            ),
        ];

        for (bit, expected) in cases {
            match check_status(&status(PkiStatus::Rejection, Some(bit))) {
                Err(GtError::Syntax(e)) => assert_eq!(e, expected),
                other => panic!("unexpected mapping: {:?}", other),
            }
        }

        assert!(matches!(
            check_status(&status(PkiStatus::Rejection, Some(PkiFailureInfo::SystemFailure))),
            Err(GtError::System(SystemError::PkiSystemFailure))
        ));
    }

    #[test]
    fn rejection_without_detail_is_gateway_failure() {
        assert!(matches!(
            check_status(&status(PkiStatus::Rejection, None)),
            Err(GtError::System(SystemError::PkiSystemFailure))
        ));
        assert!(matches!(
            check_status(&status(PkiStatus::Waiting, None)),
            Err(GtError::Syntax(SyntaxError::ProtocolMismatch))
        ));
    }

    #[test]
    fn responses_from_fixtures() {
        let (token_der, _key) = crate::testutil::short_term_token_der();
        let response = crate::testutil::wrap_in_timestamp_response(&token_der);

        let parsed = TimestampResponse::parse(&response).unwrap();
        assert!(parsed.is_success());

        let timestamp = parsed.into_timestamp().unwrap();
        assert!(!timestamp.is_extended());
    }

    #[test]
    fn success_without_token_is_malformed() {
        let response = crate::testutil::empty_granted_response();
        let parsed = TimestampResponse::parse(&response).unwrap();
        assert!(parsed.is_success());
        assert!(matches!(
            parsed.into_timestamp(),
            Err(GtError::Syntax(SyntaxError::InvalidFormat(_)))
        ));
    }

    #[test]
    fn already_extended_input_rejected_by_request_builder() {
        let extended = crate::testutil::extended_token();
        assert!(matches!(
            crate::request::extension_request(&extended),
            Err(GtError::Semantic(SemanticError::AlreadyExtended))
        ));
    }
}
