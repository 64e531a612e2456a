//! Key-conversion proxy.
//!
//! [`KeyedIndex`] presents one key type externally while the wrapped index
//! stores another, with a bijection between the two supplied by a
//! [`KeyCodec`]. Every operation converts inputs on the way in and outputs
//! on the way out, so observations through the proxy equal observations on
//! the inner index after the coordinate change.
//!
//! The two codecs here give numeric and geographic contexts order-preserving
//! text keys, so range lookups on the inner tree mean what the caller thinks
//! they mean: [`IntKeyCodec`] bias-encodes an `i64` into a fixed-width
//! decimal string, [`PositionKeyCodec`] interleaves fixed-point latitude and
//! longitude digits into a locality-preserving grid key.

use serde::{Deserialize, Serialize};

use crate::doc::DocIdSet;
use crate::error::Result;
use crate::index::term::{IndexKey, IndexValue, SearchMode, TermIndex};

/// A bijection between the externally visible key and the stored key.
///
/// `to_inner` may reject keys outside the codec's domain; callers are
/// expected to validate keys with the owning context type first, so a
/// rejected key simply matches nothing.
pub trait KeyCodec {
    type Outer: IndexKey;
    type Inner: IndexKey;

    fn to_inner(&self, key: &Self::Outer) -> Option<Self::Inner>;
    fn to_outer(&self, key: &Self::Inner) -> Self::Outer;
}

/// A term index presenting `C::Outer` keys over an index storing `C::Inner`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyedIndex<C, I> {
    codec: C,
    inner: I,
}

impl<C, I> KeyedIndex<C, I>
where
    C: KeyCodec,
    I: TermIndex<Key = C::Inner> + Default,
{
    pub fn new(codec: C) -> Self {
        KeyedIndex { codec, inner: I::default() }
    }

    /// The wrapped index.
    pub fn inner(&self) -> &I {
        &self.inner
    }
}

impl<C, I> TermIndex for KeyedIndex<C, I>
where
    C: KeyCodec,
    I: TermIndex<Key = C::Inner>,
{
    type Key = C::Outer;
    type Value = I::Value;

    fn insert_list<F>(&mut self, op: F, items: Vec<(Self::Key, Self::Value)>) -> Result<()>
    where
        F: Fn(Self::Value, Self::Value) -> Result<Self::Value>,
    {
        let converted = items
            .into_iter()
            .filter_map(|(k, v)| self.codec.to_inner(&k).map(|ik| (ik, v)))
            .collect();
        self.inner.insert_list(op, converted)
    }

    fn delete_docs(&mut self, docs: &DocIdSet) -> Result<()> {
        self.inner.delete_docs(docs)
    }

    fn search(&self, mode: SearchMode, key: &Self::Key) -> Result<Vec<(Self::Key, Self::Value)>> {
        let Some(inner_key) = self.codec.to_inner(key) else {
            return Ok(Vec::new());
        };
        let hits = self.inner.search(mode, &inner_key)?;
        Ok(hits
            .into_iter()
            .map(|(k, v)| (self.codec.to_outer(&k), v))
            .collect())
    }

    fn lookup_range(
        &self,
        lo: &Self::Key,
        hi: &Self::Key,
    ) -> Result<Vec<(Self::Key, Self::Value)>> {
        let (Some(inner_lo), Some(inner_hi)) = (self.codec.to_inner(lo), self.codec.to_inner(hi))
        else {
            return Ok(Vec::new());
        };
        let hits = self.inner.lookup_range(&inner_lo, &inner_hi)?;
        Ok(hits
            .into_iter()
            .map(|(k, v)| (self.codec.to_outer(&k), v))
            .collect())
    }

    fn union_with<F>(&mut self, op: F, other: Self) -> Result<()>
    where
        F: Fn(Self::Value, Self::Value) -> Result<Self::Value>,
    {
        self.inner.union_with(op, other.inner)
    }

    fn map_values<F>(&mut self, f: F) -> Result<()>
    where
        F: FnMut(Self::Value) -> Result<Self::Value>,
    {
        self.inner.map_values(f)
    }

    fn filter_map_values<F>(&mut self, f: F) -> Result<()>
    where
        F: FnMut(Self::Value) -> Result<Option<Self::Value>>,
    {
        self.inner.filter_map_values(f)
    }

    fn keys(&self) -> Vec<Self::Key> {
        self.inner.keys().iter().map(|k| self.codec.to_outer(k)).collect()
    }

    fn to_list(&self) -> Vec<(Self::Key, Self::Value)> {
        self.inner
            .to_list()
            .into_iter()
            .map(|(k, v)| (self.codec.to_outer(&k), v))
            .collect()
    }

    fn term_count(&self) -> usize {
        self.inner.term_count()
    }
}

const I64_BIAS: i128 = 1 << 63;

/// Order-preserving bijection between decimal `i64` text and a fixed-width
/// unsigned encoding: the value is biased by 2^63 and printed as a 20-digit
/// zero-padded decimal, so string order equals numeric order.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct IntKeyCodec;

impl KeyCodec for IntKeyCodec {
    type Outer = String;
    type Inner = String;

    fn to_inner(&self, key: &String) -> Option<String> {
        let n: i64 = key.trim().parse().ok()?;
        let biased = (n as i128 + I64_BIAS) as u128;
        Some(format!("{biased:020}"))
    }

    fn to_outer(&self, key: &String) -> String {
        // Inner keys are only ever produced by to_inner, so a parse failure
        // is a corrupt index; surface it as an out-of-band sentinel rather
        // than panicking in a read path.
        match key.parse::<u128>() {
            Ok(biased) => ((biased as i128) - I64_BIAS).to_string(),
            Err(_) => String::new(),
        }
    }
}

const LAT_SCALE: f64 = 10_000.0;
/// Digits of `(coordinate + bias) * 10^4` for the widest coordinate (360.0000).
const POS_DIGITS: usize = 7;

/// Bijection between `"lat,lon"` decimal-degree text and an interleaved
/// fixed-point key.
///
/// Both coordinates are biased to non-negative, scaled to four decimal
/// places, and printed as 7-digit strings whose digits are then interleaved
/// (lat first). Sharing a key prefix means sharing a grid cell, so prefix
/// and range lookups select spatially coherent regions. The bijection holds
/// on canonical coordinate strings (at most four decimal places, no trailing
/// fraction zeros); the context validator enforces the format before keys
/// reach the codec.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PositionKeyCodec;

impl PositionKeyCodec {
    fn parse(key: &str) -> Option<(f64, f64)> {
        let (lat, lon) = key.trim().split_once(',')?;
        let lat: f64 = lat.trim().parse().ok()?;
        let lon: f64 = lon.trim().parse().ok()?;
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return None;
        }
        Some((lat, lon))
    }
}

impl KeyCodec for PositionKeyCodec {
    type Outer = String;
    type Inner = String;

    fn to_inner(&self, key: &String) -> Option<String> {
        let (lat, lon) = Self::parse(key)?;
        let lat_fixed = ((lat + 90.0) * LAT_SCALE).round() as u64;
        let lon_fixed = ((lon + 180.0) * LAT_SCALE).round() as u64;
        let lat_digits = format!("{lat_fixed:0width$}", width = POS_DIGITS);
        let lon_digits = format!("{lon_fixed:0width$}", width = POS_DIGITS);
        let mut out = String::with_capacity(POS_DIGITS * 2);
        for (a, b) in lat_digits.chars().zip(lon_digits.chars()) {
            out.push(a);
            out.push(b);
        }
        Some(out)
    }

    fn to_outer(&self, key: &String) -> String {
        let mut lat_digits = String::with_capacity(POS_DIGITS);
        let mut lon_digits = String::with_capacity(POS_DIGITS);
        for (i, c) in key.chars().enumerate() {
            if i % 2 == 0 {
                lat_digits.push(c);
            } else {
                lon_digits.push(c);
            }
        }
        let lat_fixed = lat_digits.parse::<i64>().unwrap_or(0) - 90 * LAT_SCALE as i64;
        let lon_fixed = lon_digits.parse::<i64>().unwrap_or(0) - 180 * LAT_SCALE as i64;
        format!("{},{}", fixed_to_decimal(lat_fixed), fixed_to_decimal(lon_fixed))
    }
}

/// Render a 10^-4 fixed-point value as its canonical decimal string, with
/// trailing fraction zeros trimmed. Integer arithmetic throughout so the
/// codec round-trips exactly.
fn fixed_to_decimal(fixed: i64) -> String {
    let sign = if fixed < 0 { "-" } else { "" };
    let abs = fixed.unsigned_abs();
    let int = abs / LAT_SCALE as u64;
    let frac = abs % LAT_SCALE as u64;
    if frac == 0 {
        format!("{sign}{int}")
    } else {
        let frac_digits = format!("{frac:04}");
        format!("{sign}{int}.{}", frac_digits.trim_end_matches('0'))
    }
}
