// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! ASN.1 primitives shared by the other modules: time types and raw
integers. */

use {
    bcder::{
        decode::{Constructed, Malformed, Primitive, Source},
        encode::{PrimitiveContent, Values},
        Mode, Tag,
    },
    bytes::Bytes,
    chrono::{Datelike, TimeZone, Timelike},
    std::{
        fmt::{Display, Formatter},
        io::Write,
        ops::Sub,
        str::FromStr,
    },
};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Time {
    UtcTime(UtcTime),
    GeneralTime(GeneralizedTime),
}

impl Time {
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, S::Err> {
        cons.take_primitive(|tag, prim| match tag {
            Tag::UTC_TIME => Ok(Self::UtcTime(UtcTime::from_primitive(prim)?)),
            Tag::GENERALIZED_TIME => Ok(Self::GeneralTime(GeneralizedTime::from_primitive(prim)?)),
            _ => Err(Malformed.into()),
        })
    }

    pub fn encode_ref(&self) -> impl Values + '_ {
        match self {
            Self::UtcTime(utc) => (Some(utc.encode()), None),
            Self::GeneralTime(gt) => (None, Some(gt.encode())),
        }
    }

    /// Seconds since the POSIX epoch, offset applied.
    pub fn as_epoch_seconds(&self) -> i64 {
        match self {
            Self::UtcTime(utc) => utc.as_epoch_seconds(),
            Self::GeneralTime(gt) => gt.as_epoch_seconds(),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Zone {
    Utc,
    Offset(chrono::FixedOffset),
}

impl Zone {
    /// Parse the trailing zone designator: `Z` or `[+-]HHMM`.
    ///
    /// Returns the zone and the number of bytes it occupied.
    fn parse_suffix(data: &[u8]) -> Result<(Self, usize), bcder::decode::Error> {
        match data.last() {
            Some(b'Z') => Ok((Self::Utc, 1)),
            _ => {
                if data.len() < 5 {
                    return Err(Malformed);
                }

                let suffix = &data[data.len() - 5..];
                let east = match suffix[0] {
                    b'+' => true,
                    b'-' => false,
                    _ => return Err(Malformed),
                };

                let hours = parse_digits(&suffix[1..3])?;
                let minutes = parse_digits(&suffix[3..5])?;

                if hours > 23 || minutes > 59 {
                    return Err(Malformed);
                }

                let seconds = (hours * 3600 + minutes * 60) as i32;
                let offset = if east {
                    chrono::FixedOffset::east(seconds)
                } else {
                    chrono::FixedOffset::west(seconds)
                };

                Ok((Self::Offset(offset), 5))
            }
        }
    }
}

impl Display for Zone {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Utc => f.write_str("Z"),
            Self::Offset(offset) => f.write_str(format!("{}", offset).replace(':', "").as_str()),
        }
    }
}

fn parse_digits(data: &[u8]) -> Result<u32, bcder::decode::Error> {
    u32::from_str(std::str::from_utf8(data).map_err(|_| Malformed)?).map_err(|_| Malformed)
}

fn datetime_from_fields(
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: u32,
) -> Result<chrono::NaiveDateTime, bcder::decode::Error> {
    if let chrono::LocalResult::Single(dt) = chrono::Utc.ymd_opt(year, month, day) {
        if let Some(dt) = dt.and_hms_opt(hour, minute, second) {
            return Ok(dt.naive_utc());
        }
    }

    Err(Malformed)
}

/// `GeneralizedTime` limited to whole seconds, with `Z` or `[+-]HHMM`
/// designators.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GeneralizedTime {
    time: chrono::NaiveDateTime,
    timezone: Zone,
}

impl GeneralizedTime {
    pub fn new(time: chrono::NaiveDateTime, timezone: Zone) -> Self {
        Self { time, timezone }
    }

    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, S::Err> {
        cons.take_primitive_if(Tag::GENERALIZED_TIME, |prim| Self::from_primitive(prim))
    }

    pub fn from_primitive<S: Source>(prim: &mut Primitive<S>) -> Result<Self, S::Err> {
        let data = prim.take_all()?;

        Self::parse(data.as_ref()).map_err(|e| e.into())
    }

    /// Parse `YYYYMMDDHHMMSS` plus a zone designator.
    pub fn parse(data: &[u8]) -> Result<Self, bcder::decode::Error> {
        let (timezone, zone_len) = Zone::parse_suffix(data)?;

        let body = &data[..data.len() - zone_len];
        if body.len() != "YYYYMMDDHHMMSS".len() {
            return Err(Malformed);
        }

        let year = i32::from_str(std::str::from_utf8(&body[0..4]).map_err(|_| Malformed)?)
            .map_err(|_| Malformed)?;
        let month = parse_digits(&body[4..6])?;
        let day = parse_digits(&body[6..8])?;
        let hour = parse_digits(&body[8..10])?;
        let minute = parse_digits(&body[10..12])?;
        let second = parse_digits(&body[12..14])?;

        let time = datetime_from_fields(year, month, day, hour, minute, second)?;

        Ok(Self { time, timezone })
    }

    pub fn as_epoch_seconds(&self) -> i64 {
        match &self.timezone {
            Zone::Utc => self.time.timestamp(),
            // The designator gives local = UTC + offset.
            Zone::Offset(offset) => self.time.sub(*offset).timestamp(),
        }
    }
}

impl ToString for GeneralizedTime {
    fn to_string(&self) -> String {
        format!(
            "{:04}{:02}{:02}{:02}{:02}{:02}{}",
            self.time.year(),
            self.time.month(),
            self.time.day(),
            self.time.hour(),
            self.time.minute(),
            self.time.second(),
            self.timezone,
        )
    }
}

impl PrimitiveContent for GeneralizedTime {
    const TAG: Tag = Tag::GENERALIZED_TIME;

    fn encoded_len(&self, _: Mode) -> usize {
        self.to_string().len()
    }

    fn write_encoded<W: Write>(&self, _: Mode, target: &mut W) -> Result<(), std::io::Error> {
        target.write_all(self.to_string().as_bytes())
    }
}

/// `UTCTime` with the RFC 5280 pivot (two-digit years below 50 are
/// 20xx) and the same zone designators as [GeneralizedTime].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UtcTime {
    time: chrono::NaiveDateTime,
    timezone: Zone,
}

impl UtcTime {
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, S::Err> {
        cons.take_primitive_if(Tag::UTC_TIME, |prim| Self::from_primitive(prim))
    }

    pub fn from_primitive<S: Source>(prim: &mut Primitive<S>) -> Result<Self, S::Err> {
        let data = prim.take_all()?;

        Self::parse(data.as_ref()).map_err(|e| e.into())
    }

    pub fn parse(data: &[u8]) -> Result<Self, bcder::decode::Error> {
        let (timezone, zone_len) = Zone::parse_suffix(data)?;

        let body = &data[..data.len() - zone_len];
        if body.len() != "YYMMDDHHMMSS".len() {
            return Err(Malformed);
        }

        let year = parse_digits(&body[0..2])? as i32;
        let year = if year >= 50 { year + 1900 } else { year + 2000 };

        let month = parse_digits(&body[2..4])?;
        let day = parse_digits(&body[4..6])?;
        let hour = parse_digits(&body[6..8])?;
        let minute = parse_digits(&body[8..10])?;
        let second = parse_digits(&body[10..12])?;

        let time = datetime_from_fields(year, month, day, hour, minute, second)?;

        Ok(Self { time, timezone })
    }

    pub fn as_epoch_seconds(&self) -> i64 {
        match &self.timezone {
            Zone::Utc => self.time.timestamp(),
            Zone::Offset(offset) => self.time.sub(*offset).timestamp(),
        }
    }
}

impl ToString for UtcTime {
    fn to_string(&self) -> String {
        format!(
            "{:02}{:02}{:02}{:02}{:02}{:02}{}",
            self.time.year() % 100,
            self.time.month(),
            self.time.day(),
            self.time.hour(),
            self.time.minute(),
            self.time.second(),
            self.timezone,
        )
    }
}

impl PrimitiveContent for UtcTime {
    const TAG: Tag = Tag::UTC_TIME;

    fn encoded_len(&self, _: Mode) -> usize {
        self.to_string().len()
    }

    fn write_encoded<W: Write>(&self, _: Mode, target: &mut W) -> Result<(), std::io::Error> {
        target.write_all(self.to_string().as_bytes())
    }
}

/// An ASN.1 INTEGER kept as its content octets.
///
/// ASN.1 integers are unbounded; the fields we carry (serial numbers,
/// nonces, publication identifiers) either stay opaque or fit `u64`. The
/// original octets are preserved so re-encoding is lossless.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RawInteger(Bytes);

impl RawInteger {
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, S::Err> {
        cons.take_primitive_if(Tag::INTEGER, Self::from_primitive)
    }

    pub fn take_opt_from<S: Source>(cons: &mut Constructed<S>) -> Result<Option<Self>, S::Err> {
        cons.take_opt_primitive_if(Tag::INTEGER, Self::from_primitive)
    }

    pub fn from_primitive<S: Source>(prim: &mut Primitive<S>) -> Result<Self, S::Err> {
        let data = prim.take_all()?;

        if data.is_empty() {
            return Err(Malformed.into());
        }

        // DER: the first nine bits must not be all-equal.
        if data.len() > 1
            && ((data[0] == 0x00 && data[1] & 0x80 == 0)
                || (data[0] == 0xff && data[1] & 0x80 != 0))
        {
            return Err(Malformed.into());
        }

        Ok(Self(data))
    }

    pub fn from_u64(value: u64) -> Self {
        let be = value.to_be_bytes();
        let skip = be.iter().take_while(|b| **b == 0).count().min(7);
        let mut octets = Vec::with_capacity(9);

        // Sign pad when the top content bit is set.
        if be[skip] & 0x80 != 0 {
            octets.push(0);
        }
        octets.extend_from_slice(&be[skip..]);

        Self(Bytes::from(octets))
    }

    pub fn as_slice(&self) -> &[u8] {
        self.0.as_ref()
    }

    pub fn is_negative(&self) -> bool {
        self.0[0] & 0x80 != 0
    }

    /// The value as `u64`, if non-negative and in range.
    pub fn to_u64(&self) -> Option<u64> {
        if self.is_negative() {
            return None;
        }

        let content = if self.0[0] == 0 { &self.0[1..] } else { &self.0[..] };
        if content.len() > 8 {
            return None;
        }

        Some(content.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64))
    }
}

impl From<u64> for RawInteger {
    fn from(value: u64) -> Self {
        Self::from_u64(value)
    }
}

impl PrimitiveContent for RawInteger {
    const TAG: Tag = Tag::INTEGER;

    fn encoded_len(&self, _: Mode) -> usize {
        self.0.len()
    }

    fn write_encoded<W: Write>(&self, _: Mode, target: &mut W) -> Result<(), std::io::Error> {
        target.write_all(self.0.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generalized_time_zones() {
        let gt = GeneralizedTime::parse(b"20220129133742Z").unwrap();
        assert_eq!(gt.as_epoch_seconds(), 1643463462);
        assert_eq!(gt.to_string(), "20220129133742Z");

        let east = GeneralizedTime::parse(b"20220129143742+0100").unwrap();
        assert_eq!(east.as_epoch_seconds(), 1643463462);

        let west = GeneralizedTime::parse(b"20220129113742-0200").unwrap();
        assert_eq!(west.as_epoch_seconds(), 1643463462);
    }

    #[test]
    fn generalized_time_invalid() {
        assert!(GeneralizedTime::parse(b"").is_err());
        assert!(GeneralizedTime::parse(b"abcd").is_err());
        assert!(GeneralizedTime::parse(b"20220129133742").is_err());
        assert!(GeneralizedTime::parse(b"20220129133742.333Z").is_err());
        assert!(GeneralizedTime::parse(b"20220129133742+01").is_err());
        assert!(GeneralizedTime::parse(b"20220132133742Z").is_err());
        assert!(GeneralizedTime::parse(b"20220129133742+2500").is_err());
    }

    #[test]
    fn utc_time_pivot() {
        let a = UtcTime::parse(b"490101000000Z").unwrap();
        let b = UtcTime::parse(b"500101000000Z").unwrap();

        assert!(a.as_epoch_seconds() > b.as_epoch_seconds());
        assert_eq!(a.to_string(), "490101000000Z");
    }

    #[test]
    fn raw_integer_u64() {
        assert_eq!(RawInteger::from_u64(0).as_slice(), &[0]);
        assert_eq!(RawInteger::from_u64(127).as_slice(), &[127]);
        assert_eq!(RawInteger::from_u64(128).as_slice(), &[0, 128]);
        assert_eq!(RawInteger::from_u64(0x1234).as_slice(), &[0x12, 0x34]);

        for v in [0u64, 1, 127, 128, 255, 256, 0xffff_ffff, u64::MAX] {
            assert_eq!(RawInteger::from_u64(v).to_u64(), Some(v));
        }
    }
}
