// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! The publications oracle and the publication-string presentation.

Publications-file parsing and its signature check live outside this
crate; verification consumes the file through [PublicationsSource] as a
pure lookup.
*/

use crate::{
    asn1::guardtime,
    base32::{decode_with_crc, encode_with_crc},
    imprint::DataImprint,
    GtError, SyntaxError,
};

/// A `(identifier, imprint)` pair a round's root contributed to a
/// trust-anchor publication.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PublishedData {
    /// POSIX seconds of the publication moment.
    pub publication_identifier: u64,

    /// The published imprint.
    pub publication_imprint: DataImprint,
}

impl PublishedData {
    /// Lift the ASN.1 form, validating the imprint.
    pub fn from_asn1(raw: &guardtime::PublishedData) -> Result<Self, GtError> {
        let publication_identifier = raw
            .publication_identifier
            .to_u64()
            .ok_or(SyntaxError::InvalidArgument("publication identifier out of range"))?;

        let publication_imprint =
            DataImprint::from_bytes(raw.publication_imprint.to_bytes().as_ref())?;

        Ok(Self {
            publication_identifier,
            publication_imprint,
        })
    }

    /// The byte image presented to humans: 8-byte big-endian identifier
    /// followed by the imprint.
    fn presentation_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + 1 + self.publication_imprint.digest().len());
        out.extend_from_slice(&self.publication_identifier.to_be_bytes());
        out.extend_from_slice(&self.publication_imprint.to_bytes());

        out
    }
}

/// The lookups verification needs from a publications file.
///
/// Implementations typically parse the GuardTime publications file and
/// verify its signature before answering; none of that happens here.
pub trait PublicationsSource {
    /// The published data for an identifier, or `None` when the file has
    /// no such trust point.
    fn published_data(&self, publication_identifier: u64) -> Option<PublishedData>;

    /// The key-hash table: each entry is the imprint of a gateway signing
    /// key's SubjectPublicKeyInfo and the moment the key was published.
    ///
    /// Publications files commonly derive the moment from the
    /// certificate's `notBefore`; that policy belongs to the
    /// implementation, the core only compares the supplied value.
    fn key_hashes(&self) -> Vec<(DataImprint, i64)>;
}

/// The human-typed publication string: presentation bytes plus a CRC32
/// trailer, base32 with dash grouping.
pub fn publication_string(data: &PublishedData, group: usize) -> String {
    encode_with_crc(&data.presentation_bytes(), group)
}

/// Decode and integrity-check a publication string.
pub fn parse_publication_string(input: &str) -> Result<PublishedData, GtError> {
    let bytes = decode_with_crc(input)?;

    if bytes.len() < 9 {
        return Err(SyntaxError::InvalidArgument("publication string too short").into());
    }

    let (id_bytes, imprint_bytes) = bytes.split_at(8);
    let mut id = [0u8; 8];
    id.copy_from_slice(id_bytes);

    Ok(PublishedData {
        publication_identifier: u64::from_be_bytes(id),
        publication_imprint: DataImprint::from_bytes(imprint_bytes)?,
    })
}

#[cfg(test)]
mod tests {
    use {super::*, crate::algorithm::HashAlgorithm};

    fn sample() -> PublishedData {
        PublishedData {
            publication_identifier: 1_343_000_000,
            publication_imprint: DataImprint::compute(HashAlgorithm::Sha256, b"round root"),
        }
    }

    #[test]
    fn publication_string_round_trips() {
        let data = sample();

        for group in [0usize, 6, 8] {
            let s = publication_string(&data, group);
            assert_eq!(parse_publication_string(&s).unwrap(), data);
        }
    }

    #[test]
    fn corrupted_string_is_rejected() {
        let s = publication_string(&sample(), 8);

        let mut chars: Vec<char> = s.chars().collect();
        let i = chars.iter().position(|c| c.is_ascii_alphanumeric()).unwrap();
        chars[i] = if chars[i] == 'A' { 'B' } else { 'A' };
        let corrupted: String = chars.into_iter().collect();

        assert!(parse_publication_string(&corrupted).is_err());
    }
}
