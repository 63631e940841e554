// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Data imprints: one algorithm id byte followed by the algorithm's
fixed-length digest. */

use crate::{algorithm::HashAlgorithm, GtError, SemanticError, SyntaxError};

/// A digest tagged with the algorithm that produced it.
///
/// This is both the document-hash input to requests and the running value
/// of hash-chain computations. The wire form is `algorithm id || digest`.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct DataImprint {
    algorithm: HashAlgorithm,
    digest: Vec<u8>,
}

impl DataImprint {
    /// Construct from an algorithm and its digest output.
    ///
    /// The digest length must be the algorithm's fixed output size.
    pub fn new(algorithm: HashAlgorithm, digest: Vec<u8>) -> Result<Self, GtError> {
        if digest.is_empty() {
            return Err(SyntaxError::InvalidArgument("empty digest").into());
        }

        if digest.len() != algorithm.digest_len() {
            return Err(SyntaxError::InvalidArgument("digest length mismatches algorithm").into());
        }

        Ok(Self { algorithm, digest })
    }

    /// Hash a complete document.
    pub fn compute(algorithm: HashAlgorithm, data: &[u8]) -> Self {
        Self {
            algorithm,
            digest: algorithm.digest(data),
        }
    }

    /// Parse the wire form `algorithm id || digest`.
    pub fn from_bytes(data: &[u8]) -> Result<Self, GtError> {
        let (id, digest) = data
            .split_first()
            .ok_or(SyntaxError::InvalidArgument("empty imprint"))?;

        let algorithm = HashAlgorithm::from_wire_id(*id)?;

        if digest.len() != algorithm.digest_len() {
            return Err(SemanticError::InvalidLengthBytes.into());
        }

        Ok(Self {
            algorithm,
            digest: digest.to_vec(),
        })
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    pub fn digest(&self) -> &[u8] {
        &self.digest
    }

    /// The wire form.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut res = Vec::with_capacity(1 + self.digest.len());
        res.push(self.algorithm.wire_id());
        res.extend_from_slice(&self.digest);

        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compute_and_round_trip() {
        let imprint = DataImprint::compute(HashAlgorithm::Sha256, b"hello, world");
        assert_eq!(imprint.algorithm(), HashAlgorithm::Sha256);
        assert_eq!(imprint.digest().len(), 32);

        let bytes = imprint.to_bytes();
        assert_eq!(bytes[0], 1);
        assert_eq!(DataImprint::from_bytes(&bytes).unwrap(), imprint);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(DataImprint::new(HashAlgorithm::Sha256, vec![]).is_err());
        assert!(DataImprint::new(HashAlgorithm::Sha256, vec![0; 20]).is_err());
        assert!(DataImprint::from_bytes(&[]).is_err());

        // Unknown algorithm id.
        assert!(matches!(
            DataImprint::from_bytes(&[9, 0, 0]),
            Err(GtError::Syntax(SyntaxError::UntrustedHashAlgorithm(_)))
        ));

        // Truncated digest.
        assert!(matches!(
            DataImprint::from_bytes(&[1, 0, 0, 0]),
            Err(GtError::Semantic(SemanticError::InvalidLengthBytes))
        ));
    }
}
