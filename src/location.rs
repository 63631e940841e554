// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Recovery of the implicit information hidden in chain geometry.

The history chain's shape encodes the registration time: the chain is a
path through the canonical calendar tree whose leaves are the seconds up
to the publication moment. The location chain's shape encodes the issuing
aggregator's position in the four-tier national / state / local / client
topology, with optional aggregator names embedded as SHA-224 sibling
tags.
*/

use crate::{
    algorithm::HashAlgorithm,
    chain::{ChainDirection, HashChain, HashChainStep},
    GtError, SemanticError,
};

/// Level ceiling of the local aggregation layer.
pub(crate) const STATE_LEVEL: u8 = 22;

/// Level ceiling of the state aggregation layer.
pub(crate) const NATIONAL_LEVEL: u8 = 42;

/// Level ceiling of the national aggregation layer.
pub(crate) const TOP_LEVEL: u8 = 64;

/// Level at which the top hasher takes over.
pub(crate) const HASHER_LEVEL: u8 = 80;

struct RegionSpec {
    threshold: u8,
    ab_bits: usize,
    slot_bits: usize,
}

/// Address and slot widths at the three aggregation boundaries, leaf
/// side first.
const REGIONS: [RegionSpec; 3] = [
    RegionSpec {
        threshold: STATE_LEVEL,
        ab_bits: 2,
        slot_bits: 2,
    },
    RegionSpec {
        threshold: NATIONAL_LEVEL,
        ab_bits: 3,
        slot_bits: 2,
    },
    RegionSpec {
        threshold: TOP_LEVEL,
        ab_bits: 3,
        slot_bits: 3,
    },
];

/// The aggregator topology recovered from a location chain.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LocationInfo {
    pub national_cluster: u16,
    pub state_cluster: u16,
    pub local_cluster: u16,
    pub client_id: u16,

    pub national_machine: u16,
    pub national_slot: u16,
    pub state_machine: u16,
    pub state_slot: u16,
    pub local_machine: u16,
    pub local_slot: u16,

    /// Top hasher id. Level byte `0xFF` encodes `1 + direction`; levels
    /// above the hasher threshold encode `level - 80`.
    pub hasher: u8,

    pub national_name: Option<String>,
    pub state_name: Option<String>,
    pub local_name: Option<String>,
    pub client_name: Option<String>,
}

impl LocationInfo {
    /// Walk the location chain once and decode the topology.
    pub fn decode(chain: &HashChain) -> Result<Self, GtError> {
        let steps = chain.steps();
        let mut info = Self::default();

        // One entry per numeric step: the bit `1 - direction` and the
        // index of the step that produced it.
        let mut bits: Vec<(u8, usize)> = Vec::new();
        let mut next_region = 0usize;
        let mut hasher_seen = false;

        // The client's own name tag can only ride at the leaf, before any
        // numeric bit.
        let mut start = 0usize;
        if let Some(first) = steps.first() {
            if first.level < STATE_LEVEL {
                if let Some(name) = name_tag(first) {
                    info.client_name = Some(name);
                    start = 1;
                }
            }
        }

        for (index, step) in steps.iter().enumerate().skip(start) {
            // A single step may cross several thresholds.
            while next_region < REGIONS.len() && step.level >= REGIONS[next_region].threshold {
                fire_region(&mut info, next_region, steps, &mut bits);
                next_region += 1;
            }

            if step.level >= HASHER_LEVEL {
                info.national_cluster = collect_all(&mut bits) as u16;
                info.hasher = if step.level == 0xff {
                    1 + step.direction.bit()
                } else {
                    step.level - HASHER_LEVEL
                };
                hasher_seen = true;
                break;
            }

            bits.push((1 - step.direction.bit(), index));
        }

        if !hasher_seen {
            while next_region < REGIONS.len() {
                fire_region(&mut info, next_region, steps, &mut bits);
                next_region += 1;
            }

            info.national_cluster = collect_all(&mut bits) as u16;
        }

        Ok(info)
    }

    /// The packed 64-bit location id:
    /// `national | state | local | client`, 16 bits each.
    pub fn id(&self) -> u64 {
        (u64::from(self.national_cluster) << 48)
            | (u64::from(self.state_cluster) << 32)
            | (u64::from(self.local_cluster) << 16)
            | u64::from(self.client_id)
    }

    /// The human-readable aggregator name, `None` when the chain embeds
    /// no name tags at all.
    ///
    /// Components without a name show their cluster number in brackets;
    /// the client component is appended only when named.
    pub fn name(&self) -> Option<String> {
        if self.national_name.is_none()
            && self.state_name.is_none()
            && self.local_name.is_none()
            && self.client_name.is_none()
        {
            return None;
        }

        let national = self
            .national_name
            .clone()
            .unwrap_or_else(|| format!("[{}]", self.national_cluster));
        let state = self
            .state_name
            .clone()
            .unwrap_or_else(|| format!("[{}]", self.state_cluster));
        let local = self
            .local_name
            .clone()
            .unwrap_or_else(|| format!("[{}]", self.local_cluster));

        let mut name = format!("{} : {} : {}", national, state, local);
        if let Some(client) = &self.client_name {
            name.push_str(" : ");
            name.push_str(client);
        }

        Some(name)
    }
}

fn fire_region(
    info: &mut LocationInfo,
    region: usize,
    steps: &[HashChainStep],
    bits: &mut Vec<(u8, usize)>,
) {
    let spec = &REGIONS[region];

    let machine = collect_bits(bits, spec.ab_bits) as u16;
    let slot = collect_bits(bits, spec.slot_bits) as u16;
    let name = check_name(steps, bits);
    let value = collect_all(bits) as u16;

    match region {
        0 => {
            info.local_machine = machine;
            info.local_slot = slot;
            info.local_name = name;
            info.client_id = value;
        }
        1 => {
            info.state_machine = machine;
            info.state_slot = slot;
            info.state_name = name;
            info.local_cluster = value;
        }
        _ => {
            info.national_machine = machine;
            info.national_slot = slot;
            info.national_name = name;
            info.state_cluster = value;
        }
    }
}

/// Pop up to `count` bits, most recent first; the first popped bit is the
/// most significant of the result.
fn collect_bits(bits: &mut Vec<(u8, usize)>, count: usize) -> u64 {
    let mut value = 0u64;

    for _ in 0..count {
        match bits.pop() {
            Some((bit, _)) => value = (value << 1) | u64::from(bit),
            None => break,
        }
    }

    value
}

fn collect_all(bits: &mut Vec<(u8, usize)>) -> u64 {
    let count = bits.len();
    collect_bits(bits, count)
}

/// Probe the most recent unconsumed step for an embedded name tag and
/// consume it when found, so it never acts as a numeric slot source.
fn check_name(steps: &[HashChainStep], bits: &mut Vec<(u8, usize)>) -> Option<String> {
    let (_, index) = *bits.last()?;
    let name = name_tag(&steps[index])?;
    bits.pop();

    Some(name)
}

/// A name tag is a right-hand SHA-224 sibling of the form
/// `0x00 || len || utf8 name || zero padding`.
fn name_tag(step: &HashChainStep) -> Option<String> {
    if step.direction != ChainDirection::Right || step.algorithm != HashAlgorithm::Sha224 {
        return None;
    }

    let sibling = &step.sibling;
    if sibling.len() != 28 || sibling[0] != 0 {
        return None;
    }

    let len = sibling[1] as usize;
    if len == 0 || 2 + len > 28 {
        return None;
    }

    if sibling[2 + len..].iter().any(|b| *b != 0) {
        return None;
    }

    std::str::from_utf8(&sibling[2..2 + len])
        .ok()
        .map(String::from)
}

/// Recover the registration time from a history chain's shape.
///
/// The calendar tree over the seconds `0 ..= publication_identifier`
/// splits every span after the largest power of two strictly below it.
/// The chain's direction bits, read from the publication end downwards,
/// walk the tree to a single leaf; that leaf is the registration time.
pub fn registration_time(
    history: &HashChain,
    publication_identifier: u64,
) -> Result<u64, GtError> {
    let mut lo = 0u64;
    let mut hi = publication_identifier;

    for step in history.steps().iter().rev() {
        if lo == hi {
            return Err(SemanticError::WrongSizeOfHistory.into());
        }

        let split = largest_pow2_at_most(hi - lo);
        match step.direction {
            ChainDirection::Left => hi = lo + split - 1,
            ChainDirection::Right => lo += split,
        }
    }

    if lo != hi {
        return Err(SemanticError::WrongSizeOfHistory.into());
    }

    #[cfg(target_pointer_width = "32")]
    if lo > i32::MAX as u64 {
        return Err(crate::SystemError::TimeOverflow.into());
    }

    Ok(lo)
}

/// Largest power of two `<= x`, for `x >= 1`.
fn largest_pow2_at_most(x: u64) -> u64 {
    1u64 << (63 - x.leading_zeros())
}

/// The chain direction bits (leaf upwards) that place `time` in the
/// calendar tree published at `publication_identifier`.
#[cfg(test)]
pub(crate) fn history_path(time: u64, publication_identifier: u64) -> Vec<ChainDirection> {
    assert!(time <= publication_identifier);

    let mut lo = 0u64;
    let mut hi = publication_identifier;
    let mut path = Vec::new();

    while lo < hi {
        let split = largest_pow2_at_most(hi - lo);
        if time < lo + split {
            path.push(ChainDirection::Left);
            hi = lo + split - 1;
        } else {
            path.push(ChainDirection::Right);
            lo += split;
        }
    }

    path.reverse();
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numeric_step(bit: u8, level: u8) -> HashChainStep {
        HashChainStep {
            // bit = 1 - direction.
            direction: if bit == 0 {
                ChainDirection::Right
            } else {
                ChainDirection::Left
            },
            algorithm: HashAlgorithm::Sha256,
            sibling: vec![0xee; 32],
            level,
            offset: 0,
        }
    }

    fn name_step(name: &str, level: u8) -> HashChainStep {
        let mut sibling = vec![0u8; 28];
        sibling[1] = name.len() as u8;
        sibling[2..2 + name.len()].copy_from_slice(name.as_bytes());

        HashChainStep {
            direction: ChainDirection::Right,
            algorithm: HashAlgorithm::Sha224,
            sibling,
            level,
            offset: 0,
        }
    }

    /// Walk-order bits for a field value: LSB first.
    fn field_bits(value: u16, width: usize) -> Vec<u8> {
        (0..width).map(|i| ((value >> i) & 1) as u8).collect()
    }

    /// Build one region's steps: id bits, optional name tag, slot bits,
    /// machine bits. The caller appends the crossing step.
    fn region_steps(
        id: u16,
        id_width: usize,
        name: Option<&str>,
        slot: u16,
        slot_width: usize,
        machine: u16,
        machine_width: usize,
        level: u8,
    ) -> Vec<HashChainStep> {
        let mut steps = Vec::new();

        for bit in field_bits(id, id_width) {
            steps.push(numeric_step(bit, level));
        }
        if let Some(name) = name {
            steps.push(name_step(name, level));
        }
        for bit in field_bits(slot, slot_width) {
            steps.push(numeric_step(bit, level));
        }
        for bit in field_bits(machine, machine_width) {
            steps.push(numeric_step(bit, level));
        }

        steps
    }

    #[test]
    fn collect_bits_pops_most_recent_first() {
        let mut bits = vec![(1u8, 0), (0u8, 1), (1u8, 2)];
        // Pops 1 (MSB), then 0.
        assert_eq!(collect_bits(&mut bits, 2), 0b10);
        assert_eq!(bits.len(), 1);

        // Asking for more than remains returns what is there.
        assert_eq!(collect_bits(&mut bits, 4), 1);
        assert_eq!(collect_bits(&mut bits, 4), 0);
    }

    #[test]
    fn decode_full_topology() {
        let mut steps = Vec::new();

        // Client region: client id 5, local machine 2, local slot 1.
        steps.extend(region_steps(5, 4, None, 1, 2, 2, 2, 1));
        // Crossing into the state region; its bit is the LSB of the
        // local cluster value.
        let mut crossing = numeric_step(1, STATE_LEVEL);
        crossing.level = STATE_LEVEL;
        steps.push(crossing);

        // State region: local cluster 3 (two more bits on top of the
        // crossing step's 1), state machine 4, state slot 2.
        steps.extend(region_steps(1, 1, None, 2, 2, 4, 3, STATE_LEVEL));
        steps.push(numeric_step(0, NATIONAL_LEVEL));

        // National region: state cluster 0b?0, national machine 7,
        // national slot 5.
        steps.extend(region_steps(1, 1, None, 5, 3, 7, 3, NATIONAL_LEVEL));
        steps.push(numeric_step(1, TOP_LEVEL));

        // Top region: national cluster 0b?1 plus one more bit, hasher 3.
        steps.extend(region_steps(1, 1, None, 0, 0, 0, 0, TOP_LEVEL));
        steps.push(numeric_step(0, HASHER_LEVEL + 3));

        let chain = HashChain::from_steps(steps);
        let info = LocationInfo::decode(&chain).unwrap();

        assert_eq!(info.client_id, 5);
        assert_eq!(info.local_machine, 2);
        assert_eq!(info.local_slot, 1);

        // Crossing bit 1 is the LSB, region adds bit 1 at position 1.
        assert_eq!(info.local_cluster, 0b11);
        assert_eq!(info.state_machine, 4);
        assert_eq!(info.state_slot, 2);

        assert_eq!(info.state_cluster, 0b10);
        assert_eq!(info.national_machine, 7);
        assert_eq!(info.national_slot, 5);

        assert_eq!(info.national_cluster, 0b11);
        assert_eq!(info.hasher, 3);

        assert_eq!(
            info.id(),
            (0b11u64 << 48) | (0b10u64 << 32) | (0b11u64 << 16) | 5
        );
        assert_eq!(info.name(), None);
    }

    #[test]
    fn hasher_id_conventions() {
        // Old convention: level byte 0xFF encodes 1 + direction.
        let steps = vec![numeric_step(0, 0xff)];
        let info = LocationInfo::decode(&HashChain::from_steps(steps)).unwrap();
        // bit 0 means direction 1.
        assert_eq!(info.hasher, 2);

        let steps = vec![numeric_step(1, 0xff)];
        let info = LocationInfo::decode(&HashChain::from_steps(steps)).unwrap();
        assert_eq!(info.hasher, 1);

        // New convention: level - 80.
        let steps = vec![numeric_step(0, HASHER_LEVEL + 7)];
        let info = LocationInfo::decode(&HashChain::from_steps(steps)).unwrap();
        assert_eq!(info.hasher, 7);
    }

    #[test]
    fn name_tags_are_not_numeric_sources() {
        let mut steps = Vec::new();
        steps.extend(region_steps(9, 4, Some("local-agg"), 1, 2, 2, 2, 1));
        steps.push(numeric_step(0, STATE_LEVEL));
        steps.extend(region_steps(0, 1, Some("state-agg"), 0, 2, 1, 3, STATE_LEVEL));
        steps.push(numeric_step(0, NATIONAL_LEVEL));
        steps.extend(region_steps(0, 1, None, 0, 3, 0, 3, NATIONAL_LEVEL));
        steps.push(numeric_step(0, TOP_LEVEL));
        steps.push(numeric_step(0, HASHER_LEVEL));

        let chain = HashChain::from_steps(steps);
        let info = LocationInfo::decode(&chain).unwrap();

        assert_eq!(info.client_id, 9);
        assert_eq!(info.local_name.as_deref(), Some("local-agg"));
        assert_eq!(info.state_name.as_deref(), Some("state-agg"));
        assert_eq!(info.national_name, None);
        assert_eq!(
            info.name().unwrap(),
            format!("[{}] : state-agg : local-agg", info.national_cluster)
        );
    }

    #[test]
    fn client_name_rides_at_the_leaf() {
        let mut steps = vec![name_step("desk-7", 1)];
        steps.extend(region_steps(1, 2, None, 0, 2, 0, 2, 1));
        steps.push(numeric_step(0, STATE_LEVEL));
        steps.push(numeric_step(0, NATIONAL_LEVEL));
        steps.push(numeric_step(0, TOP_LEVEL));
        steps.push(numeric_step(0, HASHER_LEVEL));

        let chain = HashChain::from_steps(steps);
        let info = LocationInfo::decode(&chain).unwrap();

        assert_eq!(info.client_name.as_deref(), Some("desk-7"));
        assert_eq!(info.client_id, 1);
        assert!(info.name().unwrap().ends_with(" : desk-7"));
    }

    #[test]
    fn empty_chain_decodes_to_zeroes() {
        let info = LocationInfo::decode(&HashChain::from_steps(Vec::new())).unwrap();
        assert_eq!(info, LocationInfo::default());
        assert_eq!(info.id(), 0);
        assert_eq!(info.name(), None);
    }

    #[test]
    fn registration_time_round_trips() {
        for (time, publication) in [
            (0u64, 0u64),
            (0, 1),
            (1, 1),
            (5, 7),
            (1_000_000, 1_500_000),
            (1_343_000_000, 1_343_100_000),
        ] {
            let path = history_path(time, publication);
            let steps: Vec<HashChainStep> = path
                .into_iter()
                .map(|direction| HashChainStep {
                    direction,
                    algorithm: HashAlgorithm::Sha256,
                    sibling: vec![0; 32],
                    level: 0,
                    offset: 0,
                })
                .collect();

            let chain = HashChain::from_steps(steps);
            assert_eq!(registration_time(&chain, publication).unwrap(), time);
        }
    }

    #[test]
    fn registration_time_rejects_wrong_size() {
        // Too short: the span has not narrowed to one second.
        let chain = HashChain::from_steps(vec![numeric_step(0, 0)]);
        assert!(matches!(
            registration_time(&chain, 7),
            Err(GtError::Semantic(SemanticError::WrongSizeOfHistory))
        ));

        // Too long: more steps than the tree is deep.
        let steps: Vec<HashChainStep> = history_path(0, 1)
            .into_iter()
            .cycle()
            .take(4)
            .map(|direction| HashChainStep {
                direction,
                algorithm: HashAlgorithm::Sha256,
                sibling: vec![0; 32],
                level: 0,
                offset: 0,
            })
            .collect();
        assert!(registration_time(&HashChain::from_steps(steps), 1).is_err());
    }
}
