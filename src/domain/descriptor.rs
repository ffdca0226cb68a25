//! Strategy genome: the tunable parameter set defining one candidate strategy.
//!
//! Descriptors are immutable once built. Genetic operators never modify a
//! descriptor in place; they construct a new one and re-validate it.

use crate::domain::errors::DescriptorError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const MIN_INDICATORS: usize = 2;
pub const MAX_INDICATORS: usize = 6;
pub const STOP_LOSS_MIN: f64 = -0.30;
pub const STOP_LOSS_MAX: f64 = -0.01;
pub const MIN_CONDITIONS: u8 = 1;
pub const MAX_CONDITIONS: u8 = 4;

/// Identity of a descriptor: the generation it was created in plus an
/// ordinal index within that generation. Immutable once assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DescriptorId {
    pub generation: u32,
    pub ordinal: u32,
}

impl DescriptorId {
    pub fn new(generation: u32, ordinal: u32) -> Self {
        Self {
            generation,
            ordinal,
        }
    }

    /// Class name of the executable strategy artifact derived from this id.
    /// The artifact itself is produced by the code generator and is opaque here.
    pub fn class_name(&self) -> String {
        format!("Strategy_Gen{:03}_{:03}", self.generation, self.ordinal)
    }
}

impl fmt::Display for DescriptorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen{:03}-{:03}", self.generation, self.ordinal)
    }
}

impl FromStr for DescriptorId {
    type Err = DescriptorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DescriptorError::InvalidId { raw: s.to_string() };
        let rest = s.strip_prefix("gen").ok_or_else(invalid)?;
        let (generation, ordinal) = rest.split_once('-').ok_or_else(invalid)?;
        Ok(Self {
            generation: generation.parse().map_err(|_| invalid())?,
            ordinal: ordinal.parse().map_err(|_| invalid())?,
        })
    }
}

// Ids serialize as plain strings so they can key JSON maps in snapshots.
impl Serialize for DescriptorId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DescriptorId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// The indicator catalog. Parameter ranges come with each kind; see
/// [`Indicator`] for the concrete per-strategy parameter values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndicatorKind {
    Rsi,
    Macd,
    BollingerBands,
    Ema,
    Sma,
    Adx,
    Cci,
    Mfi,
    Stochastic,
    Atr,
}

impl IndicatorKind {
    pub const ALL: [IndicatorKind; 10] = [
        IndicatorKind::Rsi,
        IndicatorKind::Macd,
        IndicatorKind::BollingerBands,
        IndicatorKind::Ema,
        IndicatorKind::Sma,
        IndicatorKind::Adx,
        IndicatorKind::Cci,
        IndicatorKind::Mfi,
        IndicatorKind::Stochastic,
        IndicatorKind::Atr,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            IndicatorKind::Rsi => "rsi",
            IndicatorKind::Macd => "macd",
            IndicatorKind::BollingerBands => "bb",
            IndicatorKind::Ema => "ema",
            IndicatorKind::Sma => "sma",
            IndicatorKind::Adx => "adx",
            IndicatorKind::Cci => "cci",
            IndicatorKind::Mfi => "mfi",
            IndicatorKind::Stochastic => "stoch",
            IndicatorKind::Atr => "atr",
        }
    }
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One configured indicator in a genome. Parameter ranges mirror the
/// indicator library the code generator works from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Indicator {
    Rsi { period: u8 },
    Macd { fast: u8, slow: u8, signal: u8 },
    BollingerBands { period: u8, std_dev: f64 },
    Ema { period: u8 },
    Sma { period: u8 },
    Adx { period: u8 },
    Cci { period: u8 },
    Mfi { period: u8 },
    Stochastic { fastk: u8, slowk: u8, slowd: u8 },
    Atr { period: u8 },
}

impl Indicator {
    pub fn kind(&self) -> IndicatorKind {
        match self {
            Indicator::Rsi { .. } => IndicatorKind::Rsi,
            Indicator::Macd { .. } => IndicatorKind::Macd,
            Indicator::BollingerBands { .. } => IndicatorKind::BollingerBands,
            Indicator::Ema { .. } => IndicatorKind::Ema,
            Indicator::Sma { .. } => IndicatorKind::Sma,
            Indicator::Adx { .. } => IndicatorKind::Adx,
            Indicator::Cci { .. } => IndicatorKind::Cci,
            Indicator::Mfi { .. } => IndicatorKind::Mfi,
            Indicator::Stochastic { .. } => IndicatorKind::Stochastic,
            Indicator::Atr { .. } => IndicatorKind::Atr,
        }
    }

    /// Samples parameters uniformly within the catalog range for `kind`.
    pub fn random<R: rand::Rng + ?Sized>(kind: IndicatorKind, rng: &mut R) -> Self {
        match kind {
            IndicatorKind::Rsi => Indicator::Rsi {
                period: rng.random_range(7..=21),
            },
            IndicatorKind::Macd => Indicator::Macd {
                fast: rng.random_range(8..=16),
                slow: rng.random_range(20..=30),
                signal: rng.random_range(7..=12),
            },
            IndicatorKind::BollingerBands => Indicator::BollingerBands {
                period: rng.random_range(15..=25),
                std_dev: (rng.random_range(1.5..=2.5) * 100.0_f64).round() / 100.0,
            },
            IndicatorKind::Ema => Indicator::Ema {
                period: rng.random_range(5..=50),
            },
            IndicatorKind::Sma => Indicator::Sma {
                period: rng.random_range(10..=100),
            },
            IndicatorKind::Adx => Indicator::Adx {
                period: rng.random_range(10..=20),
            },
            IndicatorKind::Cci => Indicator::Cci {
                period: rng.random_range(10..=30),
            },
            IndicatorKind::Mfi => Indicator::Mfi {
                period: rng.random_range(10..=20),
            },
            IndicatorKind::Stochastic => Indicator::Stochastic {
                fastk: rng.random_range(3..=7),
                slowk: rng.random_range(2..=5),
                slowd: rng.random_range(2..=5),
            },
            IndicatorKind::Atr => Indicator::Atr {
                period: rng.random_range(10..=20),
            },
        }
    }
}

/// Candle timeframe the strategy trades on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    M30,
    H1,
    H4,
}

impl Timeframe {
    pub const ALL: [Timeframe; 6] = [
        Timeframe::M1,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::M30,
        Timeframe::H1,
        Timeframe::H4,
    ];

    /// Timeframes used for fresh random genomes. Mutation may still drift
    /// a strategy onto H4.
    pub const GENERATED: [Timeframe; 5] = [
        Timeframe::M1,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::M30,
        Timeframe::H1,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trailing-stop parameters. Present only when the trailing stop is enabled,
/// so a disabled trailing stop cannot carry stale values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrailingStop {
    pub positive: f64,
    pub positive_offset: f64,
}

/// One candidate strategy's genome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyDescriptor {
    id: DescriptorId,
    indicators: Vec<Indicator>,
    stop_loss: f64,
    timeframe: Timeframe,
    trailing_stop: Option<TrailingStop>,
    buy_conditions: u8,
    sell_conditions: u8,
}

impl StrategyDescriptor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: DescriptorId,
        indicators: Vec<Indicator>,
        stop_loss: f64,
        timeframe: Timeframe,
        trailing_stop: Option<TrailingStop>,
        buy_conditions: u8,
        sell_conditions: u8,
    ) -> Result<Self, DescriptorError> {
        let descriptor = Self {
            id,
            indicators,
            stop_loss,
            timeframe,
            trailing_stop,
            buy_conditions,
            sell_conditions,
        };
        descriptor.validate()?;
        Ok(descriptor)
    }

    pub fn validate(&self) -> Result<(), DescriptorError> {
        let count = self.indicators.len();
        if !(MIN_INDICATORS..=MAX_INDICATORS).contains(&count) {
            return Err(DescriptorError::IndicatorCount { count });
        }
        for (i, indicator) in self.indicators.iter().enumerate() {
            let kind = indicator.kind();
            if self.indicators[..i].iter().any(|other| other.kind() == kind) {
                return Err(DescriptorError::DuplicateIndicator { kind });
            }
        }
        if !self.stop_loss.is_finite()
            || self.stop_loss < STOP_LOSS_MIN
            || self.stop_loss > STOP_LOSS_MAX
        {
            return Err(DescriptorError::StopLossOutOfRange {
                value: self.stop_loss,
            });
        }
        for count in [self.buy_conditions, self.sell_conditions] {
            if !(MIN_CONDITIONS..=MAX_CONDITIONS).contains(&count) {
                return Err(DescriptorError::ConditionCount { count });
            }
        }
        Ok(())
    }

    pub fn id(&self) -> DescriptorId {
        self.id
    }

    pub fn indicators(&self) -> &[Indicator] {
        &self.indicators
    }

    pub fn indicator_kinds(&self) -> impl Iterator<Item = IndicatorKind> + '_ {
        self.indicators.iter().map(Indicator::kind)
    }

    pub fn has_indicator(&self, kind: IndicatorKind) -> bool {
        self.indicators.iter().any(|i| i.kind() == kind)
    }

    pub fn stop_loss(&self) -> f64 {
        self.stop_loss
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn trailing_stop(&self) -> Option<TrailingStop> {
        self.trailing_stop
    }

    pub fn buy_conditions(&self) -> u8 {
        self.buy_conditions
    }

    pub fn sell_conditions(&self) -> u8 {
        self.sell_conditions
    }

    /// Returns a copy carrying a fresh identity, used when an operator's
    /// output joins the next generation.
    pub fn with_id(&self, id: DescriptorId) -> Self {
        Self {
            id,
            ..self.clone()
        }
    }
}

/// Mutable view used exclusively by the genetic operators while assembling
/// a child. `finish` re-validates before the descriptor escapes.
#[derive(Debug, Clone)]
pub(crate) struct DescriptorDraft {
    pub id: DescriptorId,
    pub indicators: Vec<Indicator>,
    pub stop_loss: f64,
    pub timeframe: Timeframe,
    pub trailing_stop: Option<TrailingStop>,
    pub buy_conditions: u8,
    pub sell_conditions: u8,
}

impl DescriptorDraft {
    pub fn finish(self) -> Result<StrategyDescriptor, DescriptorError> {
        StrategyDescriptor::new(
            self.id,
            self.indicators,
            self.stop_loss,
            self.timeframe,
            self.trailing_stop,
            self.buy_conditions,
            self.sell_conditions,
        )
    }
}

impl From<&StrategyDescriptor> for DescriptorDraft {
    fn from(d: &StrategyDescriptor) -> Self {
        Self {
            id: d.id,
            indicators: d.indicators.clone(),
            stop_loss: d.stop_loss,
            timeframe: d.timeframe,
            trailing_stop: d.trailing_stop,
            buy_conditions: d.buy_conditions,
            sell_conditions: d.sell_conditions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_indicators() -> Vec<Indicator> {
        vec![
            Indicator::Rsi { period: 14 },
            Indicator::Macd {
                fast: 12,
                slow: 26,
                signal: 9,
            },
            Indicator::Ema { period: 20 },
        ]
    }

    #[test]
    fn test_valid_descriptor_passes_validation() {
        let descriptor = StrategyDescriptor::new(
            DescriptorId::new(0, 1),
            sample_indicators(),
            -0.10,
            Timeframe::M5,
            Some(TrailingStop {
                positive: 0.01,
                positive_offset: 0.02,
            }),
            2,
            2,
        );
        assert!(descriptor.is_ok());
    }

    #[test]
    fn test_too_few_indicators_rejected() {
        let result = StrategyDescriptor::new(
            DescriptorId::new(0, 1),
            vec![Indicator::Rsi { period: 14 }],
            -0.10,
            Timeframe::M5,
            None,
            2,
            2,
        );
        assert!(matches!(
            result,
            Err(DescriptorError::IndicatorCount { count: 1 })
        ));
    }

    #[test]
    fn test_duplicate_indicator_kind_rejected() {
        let result = StrategyDescriptor::new(
            DescriptorId::new(0, 1),
            vec![
                Indicator::Rsi { period: 14 },
                Indicator::Rsi { period: 7 },
                Indicator::Ema { period: 20 },
            ],
            -0.10,
            Timeframe::M5,
            None,
            2,
            2,
        );
        assert!(matches!(
            result,
            Err(DescriptorError::DuplicateIndicator {
                kind: IndicatorKind::Rsi
            })
        ));
    }

    #[test]
    fn test_stop_loss_bounds() {
        for bad in [-0.35, 0.0, 0.1, f64::NAN] {
            let result = StrategyDescriptor::new(
                DescriptorId::new(0, 1),
                sample_indicators(),
                bad,
                Timeframe::M5,
                None,
                2,
                2,
            );
            assert!(result.is_err(), "stop loss {bad} should be rejected");
        }
    }

    #[test]
    fn test_condition_count_bounds() {
        let result = StrategyDescriptor::new(
            DescriptorId::new(0, 1),
            sample_indicators(),
            -0.10,
            Timeframe::M5,
            None,
            0,
            5,
        );
        assert!(matches!(result, Err(DescriptorError::ConditionCount { .. })));
    }

    #[test]
    fn test_id_display_and_parse_roundtrip() {
        let id = DescriptorId::new(12, 345);
        assert_eq!(id.to_string(), "gen012-345");
        let parsed: DescriptorId = "gen012-345".parse().unwrap();
        assert_eq!(parsed, id);
        assert!("strat-1".parse::<DescriptorId>().is_err());
    }

    #[test]
    fn test_id_ordering_is_generation_then_ordinal() {
        let mut ids = vec![
            DescriptorId::new(1, 0),
            DescriptorId::new(0, 9),
            DescriptorId::new(0, 2),
        ];
        ids.sort();
        assert_eq!(
            ids,
            vec![
                DescriptorId::new(0, 2),
                DescriptorId::new(0, 9),
                DescriptorId::new(1, 0),
            ]
        );
    }

    #[test]
    fn test_random_indicator_respects_catalog_range() {
        let mut rng = rand::rng();
        for _ in 0..50 {
            match Indicator::random(IndicatorKind::Rsi, &mut rng) {
                Indicator::Rsi { period } => assert!((7..=21).contains(&period)),
                other => panic!("expected rsi, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_class_name_derivation() {
        let id = DescriptorId::new(3, 7);
        assert_eq!(id.class_name(), "Strategy_Gen003_007");
    }
}
