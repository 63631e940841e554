// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! GuardTime keyless timestamps in pure Rust.

This crate is a client-side library for GuardTime keyless timestamps:
compact cryptographic proofs binding a document hash to a moment in global
time. It covers three operations:

* Preparing a timestamping request over a document hash and decoding the
  gateway's response into a short-term, PKI-signed [Timestamp].
* Preparing an extension request for a short-term timestamp and folding the
  gateway's response into a long-term, hash-linked timestamp.
* Verifying a timestamp: syntactically, cryptographically (recomputing the
  location and history hash-chain aggregation against the published
  imprint, checking the embedded PKI signature when present), and against
  an out-of-band publications source or document hash.

The timestamp token is a DER CMS `SignedData` wrapping an RFC 3161
`TSTInfo`, whose single signer-info carries a GuardTime `TimeSignature`
(two hash chains, published data, optional PKI signature) in place of an
ordinary signature. Beyond the explicit fields, two pieces of information
hide in the chain *geometry*: the registration time (from the history
chain's shape) and the issuing aggregator's location id and name (from the
location chain's shape and embedded name tags). [verify::verify] surfaces
both.

Transport is out of scope: requests are returned as DER byte vectors and
responses are accepted as byte slices, so any HTTP stack can carry them.
Publications files are consumed through the [PublicationsSource] lookup
trait rather than parsed here.

# IMPORTANT SECURITY LIMITATIONS

Verification here answers *is this token internally consistent and does it
chain to this published imprint / this signing key*. It does not validate
the signing certificate against a CA trust store, check revocation, or
judge algorithm strength. Chain-of-trust decisions belong to the caller,
typically via publications-file verification of the key fingerprint.
*/

mod algorithm;
pub mod asn1;
mod base32;
mod certificate;
mod chain;
mod extend;
mod imprint;
mod location;
mod publications;
mod request;
mod response;
#[cfg(test)]
pub(crate) mod testutil;
mod timestamp;
pub mod verify;

pub use {
    algorithm::{HashAlgorithm, SignatureAlgorithm},
    base32::{base32_decode, base32_encode},
    certificate::Certificate,
    chain::{ChainDirection, HashChain, HashChainStep},
    extend::extend,
    imprint::DataImprint,
    location::LocationInfo,
    publications::{parse_publication_string, publication_string, PublicationsSource, PublishedData},
    request::{extension_request, timestamp_request},
    response::{ExtensionResponse, TimestampResponse},
    timestamp::{TimeComparison, Timestamp},
    verify::{VerificationError, VerificationInfo, VerificationStatus},
};

use thiserror::Error;

/// Errors in the syntax range: the input bytes or arguments are not a
/// well-formed instance of what the operation expects.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum SyntaxError {
    /// A caller-supplied argument failed validation.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// ASN.1 or structural decoding failed.
    #[error("invalid format: {0}")]
    InvalidFormat(bcder::decode::Error),

    /// A version field or content type is outside what this library supports.
    #[error("unsupported format")]
    UnsupportedFormat,

    /// A hash chain could not be parsed into steps.
    #[error("invalid linking info")]
    InvalidLinkingInfo,

    /// A hash algorithm id or OID that is not in the wire registry.
    #[error("untrusted hash algorithm: {0}")]
    UntrustedHashAlgorithm(String),

    /// A PKI signature algorithm this library will not verify with.
    #[error("untrusted signature algorithm")]
    UntrustedSignatureAlgorithm,

    /// A document hash uses a different algorithm than the token imprint.
    #[error("hash algorithms differ")]
    DifferentHashAlgorithms,

    /// Gateway refused the hash algorithm.
    #[error("gateway: unsupported hash algorithm")]
    PkiBadAlg,

    /// Gateway refused the transaction.
    #[error("gateway: transaction not permitted")]
    PkiBadRequest,

    /// Gateway refused the request encoding.
    #[error("gateway: wrong data format")]
    PkiBadDataFormat,

    /// The response does not belong to this request/response protocol.
    #[error("gateway response mismatches the protocol")]
    ProtocolMismatch,

    /// Gateway does not serve the requested policy.
    #[error("gateway: unaccepted policy")]
    UnacceptedPolicy,

    /// The aggregation round is not yet extendable.
    #[error("gateway: extend later")]
    NonstdExtendLater,

    /// The timestamp is too old for the gateway to extend.
    #[error("gateway: extension overdue")]
    NonstdExtensionOverdue,
}

/// Errors in the semantic range: the bytes parse, but their meaning is
/// inconsistent with the operation or with other inputs.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum SemanticError {
    /// The supplied document hash is not the one that was timestamped.
    #[error("wrong document")]
    WrongDocument,

    /// The history chain's shape does not fit the publication identifier.
    #[error("wrong size of history chain")]
    WrongSizeOfHistory,

    /// Response values disagree with the request that prompted them.
    #[error("request time mismatch")]
    RequestTimeMismatch,

    /// A length byte inside a chain or imprint is out of range.
    #[error("invalid length bytes")]
    InvalidLengthBytes,

    /// Recomputed aggregation does not reach the published imprint.
    #[error("invalid aggregation")]
    InvalidAggregation,

    /// The PKI signature does not verify.
    #[error("invalid signature")]
    InvalidSignature,

    /// The signed attributes disagree with the encapsulated TSTInfo.
    #[error("wrong signed data")]
    WrongSignedData,

    /// No published data for the token's publication identifier.
    #[error("trust point not found")]
    TrustPointNotFound,

    /// Published data found, but it differs from the token's.
    #[error("invalid trust point")]
    InvalidTrustPoint,

    /// The extension data does not align with the timestamp.
    #[error("cannot extend this timestamp")]
    CannotExtend,

    /// The timestamp is already hash-linked; there is nothing to extend.
    #[error("timestamp is already extended")]
    AlreadyExtended,

    /// The signer key is not in the publications key-hash table.
    #[error("key not published")]
    KeyNotPublished,

    /// The signer key was published only after this registration.
    #[error("certificate ticket too old")]
    CertTicketTooOld,

    /// The signing certificate is not trusted.
    #[error("certificate not trusted")]
    CertNotTrusted,
}

/// Errors in the system range: the environment failed, not the inputs.
#[derive(Debug, Error)]
pub enum SystemError {
    #[error("out of memory")]
    OutOfMemory,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("time value overflows the platform time type")]
    TimeOverflow,

    #[error("cryptographic backend failure")]
    CryptoFailure,

    #[error("gateway reported an internal failure")]
    PkiSystemFailure,

    #[error("unknown error")]
    Unknown,
}

/// The crate error type: one sum type per logical axis.
#[derive(Debug, Error)]
pub enum GtError {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    #[error(transparent)]
    Semantic(#[from] SemanticError),

    #[error(transparent)]
    System(SystemError),
}

impl From<SystemError> for GtError {
    fn from(e: SystemError) -> Self {
        Self::System(e)
    }
}

impl From<bcder::decode::Error> for GtError {
    fn from(e: bcder::decode::Error) -> Self {
        Self::Syntax(SyntaxError::InvalidFormat(e))
    }
}

impl From<std::io::Error> for GtError {
    fn from(e: std::io::Error) -> Self {
        Self::System(SystemError::Io(e))
    }
}
