// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! The hash-chain primitive.

A chain is a byte stream of steps, each `direction (1) || algorithm (1)
|| sibling (digest size) || level (1)`. Folding starts from a data
imprint and hashes the running imprint against each step's sibling, the
running value on the left when `direction == 0`.
*/

use crate::{algorithm::HashAlgorithm, imprint::DataImprint, GtError, SyntaxError};

/// Which side of the concatenation the running value occupies.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChainDirection {
    /// The running value is the left operand.
    Left = 0,
    /// The running value is the right operand.
    Right = 1,
}

impl ChainDirection {
    pub fn bit(self) -> u8 {
        self as u8
    }
}

/// One parsed chain step.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HashChainStep {
    pub direction: ChainDirection,
    pub algorithm: HashAlgorithm,
    pub sibling: Vec<u8>,
    pub level: u8,

    /// Byte offset of this step within the chain stream.
    pub offset: usize,
}

impl HashChainStep {
    /// The sibling in imprint wire form, `algorithm id || digest`.
    pub fn sibling_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.sibling.len());
        out.push(self.algorithm.wire_id());
        out.extend_from_slice(&self.sibling);

        out
    }
}

/// An ordered sequence of hash-chain steps.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct HashChain {
    steps: Vec<HashChainStep>,
}

impl HashChain {
    /// Parse a chain byte stream.
    ///
    /// Any malformed field fails the whole chain with
    /// [SyntaxError::InvalidLinkingInfo]: a direction byte outside {0, 1},
    /// an unknown algorithm id, or a truncated step.
    pub fn parse(data: &[u8]) -> Result<Self, GtError> {
        let mut steps = Vec::new();
        let mut pos = 0usize;

        while pos < data.len() {
            let offset = pos;

            if data.len() - pos < 2 {
                return Err(SyntaxError::InvalidLinkingInfo.into());
            }

            let direction = match data[pos] {
                0 => ChainDirection::Left,
                1 => ChainDirection::Right,
                _ => return Err(SyntaxError::InvalidLinkingInfo.into()),
            };

            let algorithm = HashAlgorithm::from_wire_id(data[pos + 1])
                .map_err(|_| SyntaxError::InvalidLinkingInfo)?;
            pos += 2;

            let digest_len = algorithm.digest_len();
            if data.len() - pos < digest_len + 1 {
                return Err(SyntaxError::InvalidLinkingInfo.into());
            }

            let sibling = data[pos..pos + digest_len].to_vec();
            pos += digest_len;

            let level = data[pos];
            pos += 1;

            steps.push(HashChainStep {
                direction,
                algorithm,
                sibling,
                level,
                offset,
            });
        }

        Ok(Self { steps })
    }

    pub fn from_steps(steps: Vec<HashChainStep>) -> Self {
        Self { steps }
    }

    /// Re-emit the chain byte stream.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();

        for step in &self.steps {
            out.push(step.direction.bit());
            out.push(step.algorithm.wire_id());
            out.extend_from_slice(&step.sibling);
            out.push(step.level);
        }

        out
    }

    pub fn steps(&self) -> &[HashChainStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Per-step direction bits, in walk order.
    pub fn directions(&self) -> impl Iterator<Item = ChainDirection> + '_ {
        self.steps.iter().map(|step| step.direction)
    }

    /// Sum of the step levels.
    pub fn level_sum(&self) -> u32 {
        self.steps.iter().map(|step| u32::from(step.level)).sum()
    }

    /// Fold the chain over `input`, producing the final imprint.
    ///
    /// Each step concatenates the running imprint with its sibling imprint
    /// (running value on the left for [ChainDirection::Left]) and hashes
    /// the concatenation with the step's algorithm. The computation is
    /// pure: the same input always folds to the same output.
    pub fn fold(&self, input: &DataImprint) -> DataImprint {
        let mut running = input.clone();

        for step in &self.steps {
            let sibling = step.sibling_bytes();

            let mut buf = Vec::with_capacity(running.digest().len() + sibling.len() + 1);
            match step.direction {
                ChainDirection::Left => {
                    buf.extend_from_slice(&running.to_bytes());
                    buf.extend_from_slice(&sibling);
                }
                ChainDirection::Right => {
                    buf.extend_from_slice(&sibling);
                    buf.extend_from_slice(&running.to_bytes());
                }
            }

            running = DataImprint::compute(step.algorithm, &buf);
        }

        running
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step_bytes(direction: u8, algorithm: HashAlgorithm, fill: u8, level: u8) -> Vec<u8> {
        let mut out = vec![direction, algorithm.wire_id()];
        out.extend(std::iter::repeat(fill).take(algorithm.digest_len()));
        out.push(level);
        out
    }

    #[test]
    fn parse_round_trip() {
        let mut data = step_bytes(0, HashAlgorithm::Sha256, 0xaa, 3);
        data.extend(step_bytes(1, HashAlgorithm::Sha1, 0xbb, 7));

        let chain = HashChain::parse(&data).unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.steps()[0].direction, ChainDirection::Left);
        assert_eq!(chain.steps()[0].offset, 0);
        assert_eq!(chain.steps()[1].algorithm, HashAlgorithm::Sha1);
        assert_eq!(chain.steps()[1].offset, 35);
        assert_eq!(chain.level_sum(), 10);
        assert_eq!(chain.to_bytes(), data);
    }

    #[test]
    fn parse_rejects_malformed_steps() {
        // Bad direction byte.
        let data = step_bytes(2, HashAlgorithm::Sha256, 0, 0);
        assert!(matches!(
            HashChain::parse(&data),
            Err(GtError::Syntax(SyntaxError::InvalidLinkingInfo))
        ));

        // Unknown algorithm id.
        let mut data = step_bytes(0, HashAlgorithm::Sha256, 0, 0);
        data[1] = 9;
        assert!(HashChain::parse(&data).is_err());

        // Truncated final step.
        let mut data = step_bytes(0, HashAlgorithm::Sha256, 0, 0);
        data.truncate(data.len() - 1);
        assert!(HashChain::parse(&data).is_err());
    }

    #[test]
    fn empty_chain_is_identity() {
        let imprint = DataImprint::compute(HashAlgorithm::Sha256, b"doc");
        let chain = HashChain::parse(&[]).unwrap();
        assert_eq!(chain.fold(&imprint), imprint);
    }

    #[test]
    fn fold_is_pure_and_direction_sensitive() {
        let input = DataImprint::compute(HashAlgorithm::Sha256, b"doc");

        let left = HashChain::parse(&step_bytes(0, HashAlgorithm::Sha256, 0xcc, 1)).unwrap();
        let right = HashChain::parse(&step_bytes(1, HashAlgorithm::Sha256, 0xcc, 1)).unwrap();

        let a = left.fold(&input);
        let b = left.fold(&input);
        assert_eq!(a, b, "folding twice is byte-identical");

        assert_ne!(left.fold(&input), right.fold(&input));
    }

    #[test]
    fn fold_matches_manual_computation() {
        let input = DataImprint::compute(HashAlgorithm::Sha256, b"doc");
        let chain = HashChain::parse(&step_bytes(0, HashAlgorithm::Sha256, 0xcc, 1)).unwrap();

        let mut buf = input.to_bytes();
        buf.push(1);
        buf.extend(std::iter::repeat(0xcc).take(32));

        assert_eq!(
            chain.fold(&input),
            DataImprint::compute(HashAlgorithm::Sha256, &buf)
        );
    }
}
