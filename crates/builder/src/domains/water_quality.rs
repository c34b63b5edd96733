use std::fmt;
use std::str::FromStr;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum WaterQualityError {
    #[error("Invalid parameter: {0}. Must be one of do_mg_per_L, ph, ammonia_mg_per_L, turbidity_cm")]
    InvalidParameter(String),
    #[error("Invalid period: {0}. Must be one of morning, evening")]
    InvalidPeriod(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaterQualityParameter {
    DissolvedOxygen,
    Ph,
    Ammonia,
    Turbidity,
}

impl WaterQualityParameter {
    pub const ALL: [WaterQualityParameter; 4] = [
        WaterQualityParameter::DissolvedOxygen,
        WaterQualityParameter::Ph,
        WaterQualityParameter::Ammonia,
        WaterQualityParameter::Turbidity,
    ];

    /// Column name of the measurement in sample files
    pub fn column(&self) -> &'static str {
        match self {
            WaterQualityParameter::DissolvedOxygen => "do_mg_per_L",
            WaterQualityParameter::Ph => "ph",
            WaterQualityParameter::Ammonia => "ammonia_mg_per_L",
            WaterQualityParameter::Turbidity => "turbidity_cm",
        }
    }

    pub fn ranges(&self) -> &'static ParameterRanges {
        match self {
            WaterQualityParameter::DissolvedOxygen => &DISSOLVED_OXYGEN,
            WaterQualityParameter::Ph => &PH,
            WaterQualityParameter::Ammonia => &AMMONIA,
            WaterQualityParameter::Turbidity => &TURBIDITY,
        }
    }
}

impl fmt::Display for WaterQualityParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.column())
    }
}

impl FromStr for WaterQualityParameter {
    type Err = WaterQualityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WaterQualityParameter::ALL
            .into_iter()
            .find(|p| p.column() == s)
            .ok_or_else(|| WaterQualityError::InvalidParameter(s.to_owned()))
    }
}

/// Part of the day a measurement was taken in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Period {
    Morning,
    Evening,
}

impl Period {
    pub fn from_morning(morning: bool) -> Self {
        if morning {
            Period::Morning
        } else {
            Period::Evening
        }
    }
}

impl FromStr for Period {
    type Err = WaterQualityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "morning" => Ok(Period::Morning),
            "evening" => Ok(Period::Evening),
            _ => Err(WaterQualityError::InvalidPeriod(s.to_owned())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeKind {
    Required,
    Ideal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeStatus {
    Below,
    Within,
    Above,
}

impl fmt::Display for RangeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RangeStatus::Below => write!(f, "below"),
            RangeStatus::Within => write!(f, "within"),
            RangeStatus::Above => write!(f, "above"),
        }
    }
}

/// Inclusive `(low, high)` bounds
pub type Limits = (f64, f64);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bounds {
    Fixed(Limits),
    ByPeriod { morning: Limits, evening: Limits },
}

impl Bounds {
    pub fn for_period(&self, period: Option<Period>) -> Option<Limits> {
        match (self, period) {
            (Bounds::Fixed(range), _) => Some(*range),
            (Bounds::ByPeriod { morning, .. }, Some(Period::Morning)) => Some(*morning),
            (Bounds::ByPeriod { evening, .. }, Some(Period::Evening)) => Some(*evening),
            (Bounds::ByPeriod { .. }, None) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterRanges {
    pub required: Bounds,
    pub ideal: Bounds,
}

pub const DISSOLVED_OXYGEN: ParameterRanges = ParameterRanges {
    required: Bounds::ByPeriod {
        morning: (3.0, 5.0),
        evening: (8.0, 12.0),
    },
    ideal: Bounds::ByPeriod {
        morning: (4.0, 5.0),
        evening: (8.0, 10.0),
    },
};

pub const PH: ParameterRanges = ParameterRanges {
    required: Bounds::Fixed((6.5, 8.5)),
    ideal: Bounds::Fixed((7.0, 8.0)),
};

pub const AMMONIA: ParameterRanges = ParameterRanges {
    required: Bounds::Fixed((0.0, 0.5)),
    ideal: Bounds::Fixed((0.0, 0.15)),
};

pub const TURBIDITY: ParameterRanges = ParameterRanges {
    required: Bounds::Fixed((20.0, 50.0)),
    ideal: Bounds::Fixed((30.0, 40.0)),
};

/// Where `value` falls relative to the parameter's range. `None` for NaN
/// and for period dependent parameters measured at an unknown period.
pub fn classify(
    parameter: WaterQualityParameter,
    value: f64,
    period: Option<Period>,
    kind: RangeKind,
) -> Option<RangeStatus> {
    if value.is_nan() {
        return None;
    }
    let ranges = parameter.ranges();
    let bounds = match kind {
        RangeKind::Required => ranges.required,
        RangeKind::Ideal => ranges.ideal,
    };
    let (low, high) = bounds.for_period(period)?;
    Some(if value < low {
        RangeStatus::Below
    } else if value > high {
        RangeStatus::Above
    } else {
        RangeStatus::Within
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_against_required_ranges() {
        use RangeKind::Required;
        use WaterQualityParameter::*;

        assert_eq!(classify(Ph, 6.4, None, Required), Some(RangeStatus::Below));
        assert_eq!(classify(Ph, 6.5, None, Required), Some(RangeStatus::Within));
        assert_eq!(classify(Ph, 8.5, None, Required), Some(RangeStatus::Within));
        assert_eq!(classify(Ph, 8.51, None, Required), Some(RangeStatus::Above));
        assert_eq!(classify(Ammonia, 0.6, None, Required), Some(RangeStatus::Above));
        assert_eq!(classify(Turbidity, 35.0, None, Required), Some(RangeStatus::Within));
    }

    #[test]
    fn dissolved_oxygen_depends_on_period() {
        use WaterQualityParameter::DissolvedOxygen;

        let morning = classify(DissolvedOxygen, 6.0, Some(Period::Morning), RangeKind::Required);
        let evening = classify(DissolvedOxygen, 6.0, Some(Period::Evening), RangeKind::Required);
        assert_eq!(morning, Some(RangeStatus::Above));
        assert_eq!(evening, Some(RangeStatus::Below));
        assert_eq!(
            classify(DissolvedOxygen, 4.5, Some(Period::Morning), RangeKind::Ideal),
            Some(RangeStatus::Within)
        );
        assert_eq!(classify(DissolvedOxygen, 6.0, None, RangeKind::Required), None);
    }

    #[test]
    fn nan_is_unclassified() {
        assert_eq!(
            classify(WaterQualityParameter::Ph, f64::NAN, None, RangeKind::Ideal),
            None
        );
    }

    #[test]
    fn rejects_unknown_names() {
        assert_eq!(
            "do".parse::<WaterQualityParameter>(),
            Err(WaterQualityError::InvalidParameter("do".into()))
        );
        assert_eq!(
            "do_mg_per_L".parse::<WaterQualityParameter>(),
            Ok(WaterQualityParameter::DissolvedOxygen)
        );
        assert_eq!("Morning".parse::<Period>(), Ok(Period::Morning));
        assert!(matches!(
            "night".parse::<Period>(),
            Err(WaterQualityError::InvalidPeriod(_))
        ));
    }
}
