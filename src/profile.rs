//! # Profile / Quality Engine Module
//!
//! Questo modulo decide se una sorgente vale la ricodifica e dimensiona il bitrate di destinazione.
//!
//! ## Valutazione:
//! 1. Le regole girano in ordine, la prima che fallisce interrompe:
//!    - già nel codec di destinazione → [`EvaluateError::Skip`]
//!    - più bassa dell'altezza minima → [`EvaluateError::Reject`]
//!    - sotto il bitrate minimo per codec, altezza e livello → [`EvaluateError::Reject`]
//! 2. Il bitrate di destinazione è il valore di tabella del codec di destinazione
//!    all'altezza della sorgente, scalato secondo il [`QualityTier`]
//! 3. Profondità di bit, altezza, larghezza e durata vengono dalla sorgente
//!
//! ## Livelli di qualità:
//! - `low`: tollera sorgenti fino a `low_quality_factor` sotto il minimo
//! - `high`: valori di tabella invariati
//! - `max`: destinazione scalata dal fattore di sovracampionamento della sorgente
//!   (`bitrate sorgente / bitrate minimo del codec sorgente a quell'altezza`)
//! - `max-fixed`: sovracampionamento misurato sul minimo del codec di destinazione
//!   con un margine fisso di 1.2, mai sotto 1.0
//!
//! ## Esempio:
//! ```rust
//! use video_transcoder::profile::Profile;
//!
//! let profile: Profile = "hevc-low".parse()?;
//! # Ok::<(), video_transcoder::error::TranscodeError>(())
//! ```

use crate::bitrate::{normalize_codec, BitrateTables};
use crate::error::{EvaluateError, Result, TranscodeError};
use crate::stats::VideoStats;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Reduction applied to the acceptance threshold of the `low` tier
pub const DEFAULT_LOW_QUALITY_FACTOR: f64 = 0.8;

/// Margin used by the `max-fixed` tier
const FIXED_OVERSAMPLING_MARGIN: f64 = 1.2;

/// Controls the acceptance threshold and target bitrate scaling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QualityTier {
    Low,
    High,
    Max,
    MaxFixed,
}

impl QualityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::High => "high",
            Self::Max => "max",
            Self::MaxFixed => "max-fixed",
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QualityTier {
    type Err = TranscodeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "high" => Ok(Self::High),
            "max" => Ok(Self::Max),
            "max-fixed" | "maxfixed" => Ok(Self::MaxFixed),
            other => Err(TranscodeError::Validation(format!(
                "unknown quality tier: {}",
                other
            ))),
        }
    }
}

type RuleFn = dyn Fn(&VideoStats) -> std::result::Result<(), EvaluateError> + Send + Sync;

/// Named predicate over the source stats
pub struct Rule {
    name: &'static str,
    check: Box<RuleFn>,
}

impl Rule {
    pub fn new<F>(name: &'static str, check: F) -> Self
    where
        F: Fn(&VideoStats) -> std::result::Result<(), EvaluateError> + Send + Sync + 'static,
    {
        Self {
            name,
            check: Box::new(check),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn check(&self, source: &VideoStats) -> std::result::Result<(), EvaluateError> {
        (self.check)(source)
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule").field("name", &self.name).finish()
    }
}

/// Tunables for building a [`Profile`]
#[derive(Debug, Clone)]
pub struct ProfileOptions {
    pub min_height: u32,
    pub low_quality_factor: f64,
    pub tables: BitrateTables,
}

impl Default for ProfileOptions {
    fn default() -> Self {
        Self {
            min_height: 0,
            low_quality_factor: DEFAULT_LOW_QUALITY_FACTOR,
            tables: BitrateTables::default(),
        }
    }
}

/// Codec + quality tier policy
#[derive(Debug)]
pub struct Profile {
    target_codec: String,
    tier: QualityTier,
    rules: Vec<Rule>,
    tables: BitrateTables,
}

impl Profile {
    /// Build a profile with the standard rule set
    pub fn new(target_codec: &str, tier: QualityTier, options: ProfileOptions) -> Result<Self> {
        let target_codec = normalize_codec(target_codec);
        if !options.tables.contains(&target_codec) {
            return Err(TranscodeError::UnknownCodec(target_codec));
        }
        if !(options.low_quality_factor > 0.0 && options.low_quality_factor <= 1.0) {
            return Err(TranscodeError::Validation(format!(
                "low quality factor must be in (0, 1], got {}",
                options.low_quality_factor
            )));
        }

        let rules = vec![
            already_in_codec(target_codec.clone()),
            minimum_height(options.min_height),
            minimum_bitrate(options.tables.clone(), tier, options.low_quality_factor),
        ];

        Ok(Self {
            target_codec,
            tier,
            rules,
            tables: options.tables,
        })
    }

    /// Build a profile from a name such as `hevc-low` or `av1-max-fixed`
    pub fn from_name(name: &str, options: ProfileOptions) -> Result<Self> {
        let (codec, tier) = name.split_once('-').ok_or_else(|| {
            TranscodeError::Validation(format!("profile name must be <codec>-<tier>: {}", name))
        })?;
        Self::new(codec, tier.parse()?, options)
    }

    pub fn target_codec(&self) -> &str {
        &self.target_codec
    }

    pub fn tier(&self) -> QualityTier {
        self.tier
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn name(&self) -> String {
        format!("{}-{}", self.target_codec, self.tier)
    }

    /// Accept or refuse `source`, returning the target parameters when accepted
    pub fn evaluate(&self, source: &VideoStats) -> std::result::Result<VideoStats, EvaluateError> {
        for rule in &self.rules {
            rule.check(source)?;
        }
        Ok(self.target_stats(source)?)
    }

    /// Target parameters for `source` without running the rules.
    ///
    /// Used when an item is forced into conversion.
    pub fn target_stats(&self, source: &VideoStats) -> Result<VideoStats> {
        let target_rate = self.tables.bitrate_for(&self.target_codec, source.height)?;
        let bit_rate = match self.tier {
            QualityTier::Low | QualityTier::High => target_rate,
            QualityTier::Max => {
                let source_min = self.tables.bitrate_for(&source.video_codec, source.height)?;
                if source_min == 0 {
                    target_rate
                } else {
                    let oversampling = source.bit_rate as f64 / source_min as f64;
                    (target_rate as f64 * oversampling).round() as u64
                }
            }
            QualityTier::MaxFixed => {
                let oversampling = (source.bit_rate as f64
                    / (target_rate as f64 * FIXED_OVERSAMPLING_MARGIN))
                    .max(1.0);
                (target_rate as f64 * oversampling).round() as u64
            }
        };

        Ok(VideoStats {
            video_codec: self.target_codec.clone(),
            bit_rate,
            bits_per_sample: source.bits_per_sample,
            height: source.height,
            width: source.width,
            duration: source.duration,
        })
    }
}

impl FromStr for Profile {
    type Err = TranscodeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s, ProfileOptions::default())
    }
}

fn already_in_codec(target_codec: String) -> Rule {
    Rule::new("already-in-target-codec", move |source| {
        if normalize_codec(&source.video_codec) == target_codec {
            Err(EvaluateError::Skip)
        } else {
            Ok(())
        }
    })
}

fn minimum_height(min_height: u32) -> Rule {
    Rule::new("minimum-height", move |source| {
        if source.height < min_height {
            Err(EvaluateError::Reject(format!(
                "height too low: {} < {}",
                source.height, min_height
            )))
        } else {
            Ok(())
        }
    })
}

fn minimum_bitrate(tables: BitrateTables, tier: QualityTier, low_factor: f64) -> Rule {
    Rule::new("minimum-bitrate-for-quality-tier", move |source| {
        let minimum = tables.bitrate_for(&source.video_codec, source.height)?;
        let threshold = match tier {
            QualityTier::Low => (minimum as f64 * low_factor).round() as u64,
            QualityTier::High | QualityTier::Max | QualityTier::MaxFixed => minimum,
        };
        if source.bit_rate < threshold {
            Err(EvaluateError::Reject(format!(
                "bitrate too low: {} < {}",
                source.bit_rate, threshold
            )))
        } else {
            Ok(())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn source(codec: &str, bit_rate: u64, height: u32) -> VideoStats {
        VideoStats {
            video_codec: codec.to_string(),
            bit_rate,
            bits_per_sample: 10,
            height,
            width: height * 16 / 9,
            duration: Duration::from_secs(90),
        }
    }

    fn profile(name: &str) -> Profile {
        Profile::from_name(name, ProfileOptions::default()).unwrap()
    }

    #[test]
    fn test_low_tier_targets_table_value() {
        let target = profile("hevc-low")
            .evaluate(&source("h264", 4_000_000, 720))
            .unwrap();
        assert_eq!(target.video_codec, "hevc");
        assert_eq!(target.bit_rate, 1_500_000);
        assert_eq!(target.height, 720);
        assert_eq!(target.bits_per_sample, 10);
        assert_eq!(target.duration, Duration::from_secs(90));
    }

    #[test]
    fn test_low_tier_tolerates_underprovisioned_source() {
        // h264 at 720p needs 3M; low accepts down to 2.4M
        assert!(profile("hevc-low").evaluate(&source("h264", 2_500_000, 720)).is_ok());
        let err = profile("hevc-high")
            .evaluate(&source("h264", 2_500_000, 720))
            .unwrap_err();
        assert!(err.is_reject());
    }

    #[test]
    fn test_skip_when_already_target_codec() {
        let err = profile("hevc-high")
            .evaluate(&source("hevc", 10_000_000, 1080))
            .unwrap_err();
        assert!(err.is_skip());
    }

    #[test]
    fn test_reject_low_bitrate() {
        let err = profile("hevc-high")
            .evaluate(&source("h264", 1_000_000, 1080))
            .unwrap_err();
        match err {
            EvaluateError::Reject(reason) => assert!(reason.starts_with("bitrate too low")),
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_reject_low_height() {
        let options = ProfileOptions {
            min_height: 720,
            ..Default::default()
        };
        let profile = Profile::from_name("hevc-high", options).unwrap();
        let err = profile.evaluate(&source("h264", 9_000_000, 480)).unwrap_err();
        match err {
            EvaluateError::Reject(reason) => assert!(reason.starts_with("height too low")),
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_rules_run_in_order() {
        // low height and low bitrate: the height rule reports first
        let options = ProfileOptions {
            min_height: 1080,
            ..Default::default()
        };
        let profile = Profile::from_name("hevc-high", options).unwrap();
        let names: Vec<_> = profile.rules().iter().map(Rule::name).collect();
        assert_eq!(
            names,
            ["already-in-target-codec", "minimum-height", "minimum-bitrate-for-quality-tier"]
        );
        let err = profile.evaluate(&source("h264", 1, 720)).unwrap_err();
        assert!(matches!(err, EvaluateError::Reject(ref r) if r.starts_with("height")));
    }

    #[test]
    fn test_max_tier_scales_by_oversampling() {
        // 6M is twice the h264 720p minimum, so the hevc target doubles
        let target = profile("hevc-max")
            .evaluate(&source("h264", 6_000_000, 720))
            .unwrap();
        assert_eq!(target.bit_rate, 3_000_000);
    }

    #[test]
    fn test_max_fixed_tier() {
        // 3.6M / (1.5M * 1.2) = 2.0
        let target = profile("hevc-max-fixed")
            .evaluate(&source("h264", 3_600_000, 720))
            .unwrap();
        assert_eq!(target.bit_rate, 3_000_000);

        // never drops below the table value
        let target = profile("h264-max-fixed")
            .evaluate(&source("av1", 1_000_000, 720))
            .unwrap();
        assert_eq!(target.bit_rate, 3_000_000);
    }

    #[test]
    fn test_target_stats_ignores_rules() {
        let profile = profile("hevc-high");
        assert!(profile.evaluate(&source("hevc", 100, 1080)).is_err());
        let target = profile.target_stats(&source("hevc", 100, 1080)).unwrap();
        assert_eq!(target.bit_rate, 3_000_000);
    }

    #[test]
    fn test_unknown_codecs() {
        let err = Profile::from_name("mpeg2-low", ProfileOptions::default()).unwrap_err();
        assert!(matches!(err, TranscodeError::UnknownCodec(_)));

        let err = profile("hevc-low")
            .evaluate(&source("wmv3", 4_000_000, 720))
            .unwrap_err();
        assert!(matches!(err, EvaluateError::Error(TranscodeError::UnknownCodec(_))));
    }

    #[test]
    fn test_profile_names() {
        assert_eq!(profile("HEVC-low").name(), "hevc-low");
        assert_eq!(profile("av1-max-fixed").tier(), QualityTier::MaxFixed);
        assert!(Profile::from_name("hevc", ProfileOptions::default()).is_err());
        assert!(Profile::from_name("hevc-ultra", ProfileOptions::default()).is_err());
    }
}
