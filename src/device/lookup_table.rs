//! Calibration lookup table sent by the engine in configure messages.
//!
//! The table is a flat sequence of `(input, low, high)` rows. It is always
//! replaced wholesale: [`LookupTable::decode`] builds a complete new table before
//! the owning device publishes it, so readers never see a partially decoded one.

use crate::error::AppResult;
use crate::protocol::WireReader;

const ROW_LEN: usize = 3;
const F64_LEN: usize = 8;

/// One calibration row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LookupRow {
    /// Raw sensor input.
    pub input: f64,
    /// Lower output bound for that input.
    pub low: f64,
    /// Upper output bound for that input.
    pub high: f64,
}

/// Owned calibration table.
///
/// An empty table holds no storage at all.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LookupTable {
    values: Vec<f64>,
}

impl LookupTable {
    /// Build a table from flat row-major values.
    ///
    /// Trailing values that do not form a complete row are dropped.
    pub fn from_values(mut values: Vec<f64>) -> Self {
        values.truncate(values.len() - values.len() % ROW_LEN);
        Self { values }
    }

    /// Decode `[size: i32][size × 3 f64]`.
    ///
    /// A size of zero or less yields an empty table and consumes nothing further.
    pub fn decode(reader: &mut WireReader) -> AppResult<Self> {
        let size = reader.read_i32()?;
        if size <= 0 {
            return Ok(Self::default());
        }

        let count = size as usize * ROW_LEN;
        // The size comes off the wire; never reserve more than the stream can hold.
        let mut values = Vec::with_capacity(count.min(reader.remaining() / F64_LEN));
        for _ in 0..count {
            values.push(reader.read_f64()?);
        }
        Ok(Self { values })
    }

    /// Number of rows.
    pub fn size(&self) -> usize {
        self.values.len() / ROW_LEN
    }

    /// True when no table has been supplied.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Flat row-major values, `3 × size` long.
    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    /// Iterate over rows in input order.
    pub fn rows(&self) -> impl Iterator<Item = LookupRow> + '_ {
        self.values.chunks_exact(ROW_LEN).map(|row| LookupRow {
            input: row[0],
            low: row[1],
            high: row[2],
        })
    }
}
