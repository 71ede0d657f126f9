//! ICC profile parsing, reduced to the one question the tools ask: does the
//! profile carry a device lookup table, and at which depth?
//!
//! Two tag forms are understood. `mLUT` is three consecutive 256-entry
//! big-endian 16-bit tables. `vcgt` either embeds a variable-precision
//! lookup table (type 0) or per-channel gamma/min/max fixed-point values
//! (type 1), which are materialised through the ramp primitives. Everything
//! on disk is big-endian regardless of host; every multi-byte read is
//! bounds-checked against the remaining tag bytes, and a tag that runs dry
//! is abandoned in favour of the next one.

use byteorder::{BigEndian, ByteOrder};
use core_ramps::{Depth, RampSizes, RampTriple, Ramps};
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Magic number of dual-byte precision lookup-table profiles.
const MLUT_TAG: u32 = 0x6D4C_5554;

/// Magic number of gamma/brightness/contrast and variable-precision
/// lookup-table profiles.
const VCGT_TAG: u32 = 0x7663_6774;

/// ICC header size; nothing in it is needed here.
const HEADER_SIZE: usize = 128;

#[derive(Debug, thiserror::Error)]
pub enum IccError {
    /// The profile carries no tag this parser can turn into ramps.
    #[error("no usable data in profile")]
    NoUsableData,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Bounds-checked big-endian reader over a byte slice.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn skip(&mut self, n: usize) -> Option<()> {
        if self.remaining() < n {
            return None;
        }
        self.pos += n;
        Some(())
    }

    fn bytes(&mut self, n: usize) -> Option<&'a [u8]> {
        if self.remaining() < n {
            return None;
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Some(out)
    }

    fn u8(&mut self) -> Option<u8> {
        self.bytes(1).map(|b| b[0])
    }

    fn u16(&mut self) -> Option<u16> {
        self.bytes(2).map(BigEndian::read_u16)
    }

    fn u32(&mut self) -> Option<u32> {
        self.bytes(4).map(BigEndian::read_u32)
    }

    fn u64(&mut self) -> Option<u64> {
        self.bytes(8).map(BigEndian::read_u64)
    }
}

/// Decode `width` big-endian bytes as a value in `[0, 1]`: the bytes as an
/// unsigned integer divided by `256^width - 1`, so an all-ones entry decodes
/// to exactly `1.0`. Computed positionally so any width is stable.
pub fn icc_double(bytes: &[u8]) -> f64 {
    let width = bytes.len();
    if width == 0 {
        return 0.0;
    }
    let mut positional = 0.0;
    for &byte in bytes.iter().rev() {
        positional = positional / 256.0 + byte as f64;
    }
    // positional = sum(byte[i] / 256^i); rescale so the divisor becomes
    // 256^width - 1 without forming either huge power.
    positional / (256.0 - 256.0f64.powi(1 - width as i32))
}

/// Parse a profile, returning the ramps of the first usable tag.
///
/// `proto_sizes` gives the per-channel resolution at which a parametric
/// (gamma/min/max) tag is materialised; table tags carry their own sizes.
pub fn parse(content: &[u8], proto_sizes: RampSizes) -> Result<Ramps, IccError> {
    let mut reader = Reader::new(content);
    reader.skip(HEADER_SIZE).ok_or(IccError::NoUsableData)?;
    let n_tags = reader.u32().ok_or(IccError::NoUsableData)?;
    let table_base = reader.pos;

    for i_tag in 0..n_tags as usize {
        let mut entry = Reader::new(content);
        entry
            .skip(table_base + i_tag * 12)
            .ok_or(IccError::NoUsableData)?;
        let name = entry.u32().ok_or(IccError::NoUsableData)?;
        let offset = entry.u32().ok_or(IccError::NoUsableData)? as usize;
        let size = entry.u32().ok_or(IccError::NoUsableData)? as usize;

        if offset > i32::MAX as usize - size {
            return Err(IccError::NoUsableData);
        }
        if offset + size > content.len() {
            return Err(IccError::NoUsableData);
        }
        let tag = &content[offset..offset + size];

        let parsed = match name {
            MLUT_TAG => parse_mlut(tag),
            VCGT_TAG => parse_vcgt(tag, proto_sizes),
            _ => None,
        };
        if let Some(ramps) = parsed {
            debug!(
                target: "icc",
                tag = if name == MLUT_TAG { "mLUT" } else { "vcgt" },
                depth = ?ramps.depth(),
                "profile_tag_decoded"
            );
            return Ok(ramps);
        }
    }

    Err(IccError::NoUsableData)
}

/// `mLUT`: three consecutive 256-entry big-endian 16-bit tables.
fn parse_mlut(tag: &[u8]) -> Option<Ramps> {
    let mut reader = Reader::new(tag);
    let mut triple = RampTriple::<u16>::zeroed(RampSizes::uniform(256));
    for channel in [&mut triple.red, &mut triple.green, &mut triple.blue] {
        for stop in channel.iter_mut() {
            *stop = reader.u16()?;
        }
    }
    Some(Ramps::U16(triple))
}

/// `vcgt`: the tag body repeats the magic, skips four bytes, then announces
/// its encoding with a 32-bit gamma type.
fn parse_vcgt(tag: &[u8], proto_sizes: RampSizes) -> Option<Ramps> {
    let mut reader = Reader::new(tag);
    if reader.u32()? != VCGT_TAG {
        return None;
    }
    reader.skip(4)?;
    match reader.u32()? {
        0 => parse_vcgt_table(&mut reader, tag.len()),
        1 => parse_vcgt_formula(&mut reader, proto_sizes),
        _ => None,
    }
}

/// Type 0: a variable-precision lookup table.
fn parse_vcgt_table(reader: &mut Reader<'_>, tag_size: usize) -> Option<Ramps> {
    let mut n_channels = reader.u16()?;
    let mut n_entries = reader.u16()?;
    let mut entry_size = reader.u16()?;
    // A fixed quirk of common profile writers: a 1584-byte tag is always
    // three channels of 256 dual-byte entries, whatever the fields claim.
    if tag_size == 1584 {
        n_channels = 3;
        n_entries = 256;
        entry_size = 2;
    }
    if n_channels != 3 {
        // Only an RGB table can be assumed to map onto the CRTC channels.
        return None;
    }

    let total = (n_channels as usize)
        .checked_mul(n_entries as usize)?
        .checked_mul(entry_size as usize)?;
    if reader.remaining() < total {
        return None;
    }

    let sizes = RampSizes::uniform(n_entries as usize);
    match entry_size {
        1 => {
            let mut triple = RampTriple::<u8>::zeroed(sizes);
            for channel in [&mut triple.red, &mut triple.green, &mut triple.blue] {
                for stop in channel.iter_mut() {
                    *stop = reader.u8()?;
                }
            }
            Some(Ramps::U8(triple))
        }
        2 => {
            let mut triple = RampTriple::<u16>::zeroed(sizes);
            for channel in [&mut triple.red, &mut triple.green, &mut triple.blue] {
                for stop in channel.iter_mut() {
                    *stop = reader.u16()?;
                }
            }
            Some(Ramps::U16(triple))
        }
        4 => {
            let mut triple = RampTriple::<u32>::zeroed(sizes);
            for channel in [&mut triple.red, &mut triple.green, &mut triple.blue] {
                for stop in channel.iter_mut() {
                    *stop = reader.u32()?;
                }
            }
            Some(Ramps::U32(triple))
        }
        8 => {
            let mut triple = RampTriple::<u64>::zeroed(sizes);
            for channel in [&mut triple.red, &mut triple.green, &mut triple.blue] {
                for stop in channel.iter_mut() {
                    *stop = reader.u64()?;
                }
            }
            Some(Ramps::U64(triple))
        }
        width => {
            let mut triple = RampTriple::<f64>::zeroed(sizes);
            for channel in [&mut triple.red, &mut triple.green, &mut triple.blue] {
                for stop in channel.iter_mut() {
                    *stop = icc_double(reader.bytes(width as usize)?);
                }
            }
            Some(Ramps::F64(triple))
        }
    }
}

/// Type 1: nine 32-bit big-endian `/65536` fixed-point values, materialised
/// as `start_over; gamma; rgb_limits` over a double-precision ramp.
fn parse_vcgt_formula(reader: &mut Reader<'_>, proto_sizes: RampSizes) -> Option<Ramps> {
    let mut fields = [0.0f64; 9];
    for field in fields.iter_mut() {
        *field = reader.u32()? as f64 / 65536.0;
    }
    let [rg, rmin, rmax, gg, gmin, gmax, bg, bmin, bmax] = fields;

    let mut triple = RampTriple::<f64>::zeroed(proto_sizes);
    triple.start_over(true, true, true);
    triple.gamma(rg, gg, bg);
    triple.rgb_limits(rmin, rmax, gmin, gmax, bmin, bmax);
    Some(Ramps::F64(triple))
}

/// Slurp and parse a profile file.
pub fn load(path: &Path, proto_sizes: RampSizes) -> Result<Ramps, IccError> {
    let mut content = Vec::new();
    std::fs::File::open(path)?.read_to_end(&mut content)?;
    parse(&content, proto_sizes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::approx_eq;
    use pretty_assertions::assert_eq;

    /// Assemble a profile from (name, body) tags: 128-byte header, tag
    /// count, tag table, then the bodies.
    fn profile(tags: &[(u32, Vec<u8>)]) -> Vec<u8> {
        let mut out = vec![0u8; HEADER_SIZE];
        out.extend_from_slice(&(tags.len() as u32).to_be_bytes());
        let mut offset = HEADER_SIZE + 4 + 12 * tags.len();
        for (name, body) in tags {
            out.extend_from_slice(&name.to_be_bytes());
            out.extend_from_slice(&(offset as u32).to_be_bytes());
            out.extend_from_slice(&(body.len() as u32).to_be_bytes());
            offset += body.len();
        }
        for (_, body) in tags {
            out.extend_from_slice(body);
        }
        out
    }

    fn vcgt_table_body(n_channels: u16, n_entries: u16, entry_size: u16, data: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&VCGT_TAG.to_be_bytes());
        body.extend_from_slice(&[0u8; 4]);
        body.extend_from_slice(&0u32.to_be_bytes());
        body.extend_from_slice(&n_channels.to_be_bytes());
        body.extend_from_slice(&n_entries.to_be_bytes());
        body.extend_from_slice(&entry_size.to_be_bytes());
        body.extend_from_slice(data);
        body
    }

    #[test]
    fn mlut_tag_decodes_to_u16_tables() {
        let mut body = Vec::new();
        for channel in 0u16..3 {
            for i in 0u16..256 {
                body.extend_from_slice(&(i * 255 + channel).to_be_bytes());
            }
        }
        let ramps = parse(&profile(&[(MLUT_TAG, body)]), RampSizes::uniform(16)).unwrap();
        assert_eq!(ramps.depth(), Depth::U16);
        assert_eq!(ramps.sizes(), RampSizes::uniform(256));
        match ramps {
            Ramps::U16(t) => {
                assert_eq!(t.red[255], 255 * 255);
                assert_eq!(t.green[0], 1);
                assert_eq!(t.blue[1], 255 + 2);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn vcgt_table_u16_round_trips() {
        let mut data = Vec::new();
        for channel in 0u16..3 {
            for i in 0u16..64 {
                data.extend_from_slice(&(i * 1000 + channel).to_be_bytes());
            }
        }
        let body = vcgt_table_body(3, 64, 2, &data);
        let ramps = parse(&profile(&[(VCGT_TAG, body)]), RampSizes::uniform(16)).unwrap();
        assert_eq!(ramps.depth(), Depth::U16);
        match ramps {
            Ramps::U16(t) => {
                assert_eq!(t.sizes(), RampSizes::uniform(64));
                assert_eq!(t.red[63], 63000);
                assert_eq!(t.blue[10], 10002);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn vcgt_size_1584_overrides_header_fields() {
        // Claims one channel of one 1-byte entry, but the 1584-byte body
        // forces 3 x 256 x 2.
        let data = vec![0x24u8; 1584 - 18];
        let body = vcgt_table_body(1, 1, 1, &data);
        assert_eq!(body.len(), 1584);
        let ramps = parse(&profile(&[(VCGT_TAG, body)]), RampSizes::uniform(16)).unwrap();
        assert_eq!(ramps.depth(), Depth::U16);
        assert_eq!(ramps.sizes(), RampSizes::uniform(256));
        match ramps {
            Ramps::U16(t) => assert_eq!(t.green[100], 0x2424),
            _ => unreachable!(),
        }
    }

    #[test]
    fn vcgt_non_rgb_channel_count_is_skipped() {
        let data = vec![0u8; 4 * 16];
        let body = vcgt_table_body(4, 16, 1, &data);
        let err = parse(&profile(&[(VCGT_TAG, body)]), RampSizes::uniform(16)).unwrap_err();
        assert!(matches!(err, IccError::NoUsableData));
    }

    #[test]
    fn vcgt_formula_identity_materialises_identity() {
        let one = 65536u32;
        let mut body = Vec::new();
        body.extend_from_slice(&VCGT_TAG.to_be_bytes());
        body.extend_from_slice(&[0u8; 4]);
        body.extend_from_slice(&1u32.to_be_bytes());
        for value in [one, 0, one, one, 0, one, one, 0, one] {
            body.extend_from_slice(&value.to_be_bytes());
        }
        let ramps = parse(&profile(&[(VCGT_TAG, body)]), RampSizes::uniform(256)).unwrap();
        assert_eq!(ramps.depth(), Depth::F64);
        let double = match &ramps {
            Ramps::F64(t) => t.clone(),
            _ => unreachable!(),
        };
        for (i, stop) in double.red.iter().enumerate() {
            assert!(approx_eq!(f64, *stop, i as f64 / 255.0, epsilon = 1e-12));
        }

        // materialised at a 16-bit CRTC this is the rounded identity
        let mut dst = Ramps::zeroed(Depth::U16, RampSizes::uniform(256));
        dst.translate_from(&ramps);
        match dst {
            Ramps::U16(t) => {
                for (i, stop) in t.red.iter().enumerate() {
                    let expected = (i as f64 / 255.0 * 65535.0).round() as u16;
                    assert_eq!(*stop, expected, "stop {i}");
                }
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn truncated_vcgt_falls_through_to_later_tag() {
        // First tag underflows its own length check; the second one works.
        let bad = vcgt_table_body(3, 1000, 2, &[0u8; 8]);
        let mut good_data = Vec::new();
        for _ in 0..3 {
            for i in 0u16..4 {
                good_data.extend_from_slice(&(i * 100).to_be_bytes());
            }
        }
        let good = vcgt_table_body(3, 4, 2, &good_data);
        let ramps = parse(
            &profile(&[(VCGT_TAG, bad), (VCGT_TAG, good)]),
            RampSizes::uniform(16),
        )
        .unwrap();
        assert_eq!(ramps.sizes(), RampSizes::uniform(4));
    }

    #[test]
    fn missing_inner_magic_is_skipped() {
        let mut body = vcgt_table_body(3, 4, 2, &[0u8; 24]);
        body[0] = b'x';
        let err = parse(&profile(&[(VCGT_TAG, body)]), RampSizes::uniform(16)).unwrap_err();
        assert!(matches!(err, IccError::NoUsableData));
    }

    #[test]
    fn tag_past_end_of_file_is_fatal() {
        let mut content = profile(&[(MLUT_TAG, vec![0u8; 16])]);
        // Corrupt the tag size so offset + size overruns the buffer.
        let size_at = HEADER_SIZE + 4 + 8;
        content[size_at..size_at + 4].copy_from_slice(&0x00ff_ffffu32.to_be_bytes());
        let err = parse(&content, RampSizes::uniform(16)).unwrap_err();
        assert!(matches!(err, IccError::NoUsableData));
    }

    #[test]
    fn icc_double_fixed_points() {
        assert_eq!(icc_double(&[]), 0.0);
        assert!(approx_eq!(f64, icc_double(&[0xff]), 1.0, epsilon = 1e-12));
        assert!(approx_eq!(
            f64,
            icc_double(&[0xff, 0xff]),
            1.0,
            epsilon = 1e-12
        ));
        assert!(approx_eq!(
            f64,
            icc_double(&[0x80]),
            128.0 / 255.0,
            epsilon = 1e-12
        ));
        assert!(approx_eq!(
            f64,
            icc_double(&[0x12, 0x34]),
            0x1234 as f64 / 65535.0,
            epsilon = 1e-12
        ));
        assert!(approx_eq!(
            f64,
            icc_double(&[0x01, 0x02, 0x03]),
            0x010203 as f64 / 16_777_215.0,
            epsilon = 1e-12
        ));
    }

    #[test]
    fn header_only_profile_is_unusable() {
        assert!(matches!(
            parse(&[0u8; 64], RampSizes::uniform(4)),
            Err(IccError::NoUsableData)
        ));
        assert!(matches!(
            parse(&[0u8; HEADER_SIZE], RampSizes::uniform(4)),
            Err(IccError::NoUsableData)
        ));
    }

    #[test]
    fn load_reports_missing_file_as_io() {
        let err = load(
            Path::new("/nonexistent/profile.icc"),
            RampSizes::uniform(4),
        )
        .unwrap_err();
        assert!(matches!(err, IccError::Io(_)));
    }
}
