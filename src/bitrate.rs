//! # Bitrate Tables Module
//!
//! Questo modulo contiene i bitrate minimi consigliati per codec e risoluzione.
//!
//! ## Responsabilità:
//! - Definisce `BitrateTable`, una tabella di breakpoint `(altezza, bitrate)`
//! - Fornisce le tabelle di default per h264, hevc, av1, vp9 e mpeg4
//! - Normalizza gli alias dei codec (`x264`, `h265`, `libaom-av1`, ...)
//! - Permette di sostituire le tabelle da file di configurazione
//!
//! ## Interpolazione:
//! - I breakpoint sono ordinati per altezza crescente
//! - Sotto il primo breakpoint si usa il primo valore
//! - Dall'ultimo breakpoint in su si usa l'ultimo valore
//! - In mezzo il bitrate è interpolato linearmente
//!
//! ## Esempio:
//! ```rust
//! use video_transcoder::bitrate::BitrateTable;
//!
//! let table = BitrateTable::new(vec![(100, 1000), (200, 2000), (300, 3000)]);
//! assert_eq!(table.bitrate_for(250), 2500);
//! ```

use crate::error::{Result, TranscodeError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Canonical ffprobe name for a codec, accepting common aliases
pub fn normalize_codec(codec: &str) -> String {
    let lower = codec.trim().to_lowercase();
    match lower.as_str() {
        "h265" | "x265" | "hevc" => "hevc".to_string(),
        "h264" | "x264" | "avc" => "h264".to_string(),
        "av01" | "av1" => "av1".to_string(),
        _ => lower,
    }
}

/// Height → minimum bitrate breakpoints for one codec
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<(u32, u64)>", into = "Vec<(u32, u64)>")]
pub struct BitrateTable {
    breakpoints: Vec<(u32, u64)>,
}

impl BitrateTable {
    /// Build a table; breakpoints are sorted by height
    pub fn new(mut breakpoints: Vec<(u32, u64)>) -> Self {
        breakpoints.sort_by_key(|(height, _)| *height);
        breakpoints.dedup_by_key(|(height, _)| *height);
        Self { breakpoints }
    }

    /// Minimum bitrate (bits/s) for a stream of the given height
    pub fn bitrate_for(&self, height: u32) -> u64 {
        let points = &self.breakpoints;
        let (Some(&(first_height, first_rate)), Some(&(last_height, last_rate))) =
            (points.first(), points.last())
        else {
            return 0;
        };
        if height <= first_height {
            return first_rate;
        }
        if height >= last_height {
            return last_rate;
        }

        // first breakpoint strictly above `height`; exists because height < last_height
        let i = points.partition_point(|(h, _)| *h <= height);
        let (h0, r0) = points[i - 1];
        let (h1, r1) = points[i];
        if height == h0 {
            return r0;
        }
        let ratio = f64::from(height - h0) / f64::from(h1 - h0);
        (r0 as f64 + ratio * (r1 as f64 - r0 as f64)).round() as u64
    }
}

impl From<Vec<(u32, u64)>> for BitrateTable {
    fn from(breakpoints: Vec<(u32, u64)>) -> Self {
        Self::new(breakpoints)
    }
}

impl From<BitrateTable> for Vec<(u32, u64)> {
    fn from(table: BitrateTable) -> Self {
        table.breakpoints
    }
}

/// Per-codec bitrate tables, keyed by ffprobe codec name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BitrateTables {
    tables: HashMap<String, BitrateTable>,
}

impl BitrateTables {
    pub fn new() -> Self {
        Self {
            tables: HashMap::new(),
        }
    }

    pub fn insert(&mut self, codec: impl Into<String>, table: BitrateTable) {
        self.tables.insert(normalize_codec(&codec.into()), table);
    }

    pub fn contains(&self, codec: &str) -> bool {
        self.tables.contains_key(&normalize_codec(codec))
    }

    /// Minimum bitrate for `codec` at `height`
    pub fn bitrate_for(&self, codec: &str, height: u32) -> Result<u64> {
        self.tables
            .get(&normalize_codec(codec))
            .map(|table| table.bitrate_for(height))
            .ok_or_else(|| TranscodeError::UnknownCodec(codec.to_string()))
    }
}

impl Default for BitrateTables {
    fn default() -> Self {
        let mut tables = Self::new();
        tables.insert(
            "mpeg4",
            BitrateTable::new(vec![(480, 2_000_000), (720, 4_000_000), (1080, 8_000_000)]),
        );
        tables.insert(
            "h264",
            BitrateTable::new(vec![
                (480, 1_500_000),
                (720, 3_000_000),
                (1080, 6_000_000),
                (2160, 20_000_000),
            ]),
        );
        tables.insert(
            "hevc",
            BitrateTable::new(vec![
                (480, 750_000),
                (720, 1_500_000),
                (1080, 3_000_000),
                (2160, 10_000_000),
            ]),
        );
        tables.insert(
            "vp9",
            BitrateTable::new(vec![
                (480, 750_000),
                (720, 1_500_000),
                (1080, 3_000_000),
                (2160, 12_000_000),
            ]),
        );
        tables.insert(
            "av1",
            BitrateTable::new(vec![
                (480, 500_000),
                (720, 1_000_000),
                (1080, 2_000_000),
                (2160, 7_000_000),
            ]),
        );
        tables
    }
}
