//! Unit conversion and rounding.
//!
//! CSS lengths are converted into the units KFX readers expect:
//! - vertical spacing in line-height units (`lh`)
//! - horizontal spacing and indents in percent of the spacing base
//! - font sizes in `rem` (percentages compressed above 100%)
//!
//! Every computed number is rounded to six significant figures with
//! round-half-up, line heights to five decimals.

use crate::kfx::ion::{Decimal, IonValue, StructBuilder};
use crate::kfx::symbols::sym;

/// Ratio between the default line height and the font size.
pub const LINE_HEIGHT_RATIO: f64 = 1.2;

/// `em` to percent factor for horizontal spacing and text indents.
pub const EM_TO_PERCENT: f64 = 3.125;

/// Divisor compressing font-size percentages above 100%.
pub const FONT_SIZE_COMPRESSION: f64 = 160.0;

/// CSS pixels per `em` at the default font size.
pub const PX_PER_EM: f64 = 16.0;

/// `ex` is approximated from the x-height of a typical text face.
pub const EX_TO_EM: f64 = 0.44;

/// Reference width for converting image pixel widths to percent.
pub const IMAGE_REFERENCE_WIDTH: f64 = 512.0;

pub const SIGNIFICANT_DIGITS: u32 = 6;
pub const LINE_HEIGHT_DECIMALS: u32 = 5;

/// `smaller` / `larger` font-size keywords, as `em` factors.
pub const FONT_SIZE_SMALLER: f64 = 0.83333;
pub const FONT_SIZE_LARGER: f64 = 1.2;

/// Line height used once a style's font size reaches 1rem or more.
pub fn adjusted_line_height() -> f64 {
    round_decimals(100.0 / 99.0, LINE_HEIGHT_DECIMALS)
}

/// Round to `digits` significant figures, half away from zero.
///
/// Idempotent: rounding an already rounded value returns it unchanged.
pub fn round_significant(value: f64, digits: u32) -> f64 {
    if value == 0.0 || !value.is_finite() {
        return 0.0;
    }
    let magnitude = value.abs().log10().floor() as i32;
    let shift = digits as i32 - 1 - magnitude;
    let rounded = if shift >= 0 {
        let scale = 10f64.powi(shift);
        (value.abs() * scale + 0.5).floor() / scale
    } else {
        let scale = 10f64.powi(-shift);
        (value.abs() / scale + 0.5).floor() * scale
    };
    rounded.copysign(value)
}

/// Round to a fixed number of decimal places, half away from zero.
pub fn round_decimals(value: f64, decimals: u32) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    let scale = 10f64.powi(decimals as i32);
    ((value.abs() * scale + 0.5).floor() / scale).copysign(value)
}

// ============================================================================
// CSS lengths
// ============================================================================

/// A CSS unit as written in the stylesheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CssUnit {
    Em,
    Ex,
    Rem,
    Percent,
    Px,
    Pt,
    Pc,
    Cm,
    Mm,
    In,
    Lh,
    /// Unitless number.
    None,
}

impl CssUnit {
    /// Parse a unit suffix (`"em"`, `"px"`, ...). Case-insensitive.
    pub fn parse(unit: &str) -> Option<Self> {
        let unit = unit.to_ascii_lowercase();
        Some(match unit.as_str() {
            "em" => CssUnit::Em,
            "ex" => CssUnit::Ex,
            "rem" => CssUnit::Rem,
            "%" => CssUnit::Percent,
            "px" => CssUnit::Px,
            "pt" => CssUnit::Pt,
            "pc" => CssUnit::Pc,
            "cm" => CssUnit::Cm,
            "mm" => CssUnit::Mm,
            "in" => CssUnit::In,
            "lh" => CssUnit::Lh,
            "" => CssUnit::None,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CssUnit::Em => "em",
            CssUnit::Ex => "ex",
            CssUnit::Rem => "rem",
            CssUnit::Percent => "%",
            CssUnit::Px => "px",
            CssUnit::Pt => "pt",
            CssUnit::Pc => "pc",
            CssUnit::Cm => "cm",
            CssUnit::Mm => "mm",
            CssUnit::In => "in",
            CssUnit::Lh => "lh",
            CssUnit::None => "",
        }
    }
}

/// A numeric CSS value with its unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Length {
    pub value: f64,
    pub unit: CssUnit,
}

impl Length {
    pub fn new(value: f64, unit: CssUnit) -> Self {
        Self { value, unit }
    }

    pub fn em(value: f64) -> Self {
        Self::new(value, CssUnit::Em)
    }

    pub fn px(value: f64) -> Self {
        Self::new(value, CssUnit::Px)
    }

    pub fn percent(value: f64) -> Self {
        Self::new(value, CssUnit::Percent)
    }

    /// Value in `em` for absolute and font-relative units.
    ///
    /// Percentages and unitless numbers have no fixed `em` equivalent.
    pub fn to_em(self) -> Option<f64> {
        let px = match self.unit {
            CssUnit::Em | CssUnit::Rem => return Some(self.value),
            CssUnit::Ex => return Some(self.value * EX_TO_EM),
            CssUnit::Px => self.value,
            CssUnit::Pt => self.value * 4.0 / 3.0,
            CssUnit::Pc => self.value * 16.0,
            CssUnit::In => self.value * 96.0,
            CssUnit::Cm => self.value * 96.0 / 2.54,
            CssUnit::Mm => self.value * 96.0 / 25.4,
            CssUnit::Percent | CssUnit::Lh | CssUnit::None => return None,
        };
        Some(px / PX_PER_EM)
    }
}

// ============================================================================
// KFX measures
// ============================================================================

/// A KFX dimension: `{ $307: value, $306: unit }`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measure {
    pub value: f64,
    /// Unit symbol (`$310` lh, `$314` percent, ...).
    pub unit: u32,
}

impl Measure {
    /// Build a measure rounded to six significant figures.
    pub fn new(value: f64, unit: u32) -> Self {
        Self {
            value: round_significant(value, SIGNIFICANT_DIGITS),
            unit,
        }
    }

    pub fn lh(value: f64) -> Self {
        Self::new(value, sym::UNIT_LH)
    }

    pub fn percent(value: f64) -> Self {
        Self::new(value, sym::UNIT_PERCENT)
    }

    pub fn em(value: f64) -> Self {
        Self::new(value, sym::UNIT_EM)
    }

    pub fn rem(value: f64) -> Self {
        Self::new(value, sym::UNIT_REM)
    }

    pub fn is_zero(&self) -> bool {
        self.value == 0.0
    }

    pub fn to_ion(self) -> IonValue {
        StructBuilder::new()
            .field(sym::VALUE, IonValue::Decimal(Decimal::from_f64(self.value)))
            .symbol(sym::UNIT, self.unit)
            .build()
    }

    /// Read a measure back from a property value.
    pub fn from_ion(value: &IonValue) -> Option<Self> {
        let unit = value.get(sym::UNIT)?.as_symbol()?;
        let value = value.get(sym::VALUE)?.as_f64()?;
        Some(Self { value, unit })
    }
}

impl From<Measure> for IonValue {
    fn from(measure: Measure) -> Self {
        measure.to_ion()
    }
}

/// Short unit name used as a merge-rule key (`"lh"`, `"percent"`, ...).
pub fn unit_name(unit: u32) -> &'static str {
    match unit {
        sym::UNIT_EM => "em",
        sym::UNIT_EX => "ex",
        sym::UNIT_LH => "lh",
        sym::UNIT_PERCENT => "percent",
        sym::UNIT_PT => "pt",
        sym::UNIT_PX => "px",
        sym::UNIT_REM => "rem",
        _ => "unknown",
    }
}

// ============================================================================
// Conversions
// ============================================================================

/// Margin/padding top and bottom: converted to line-height units.
pub fn vertical_spacing(len: Length) -> Option<Measure> {
    match len.unit {
        CssUnit::Percent => Some(Measure::percent(len.value)),
        CssUnit::Lh => Some(Measure::lh(len.value)),
        CssUnit::None if len.value == 0.0 => Some(Measure::lh(0.0)),
        _ => len.to_em().map(|em| Measure::lh(em / LINE_HEIGHT_RATIO)),
    }
}

/// Margin/padding left and right: converted to percent.
pub fn horizontal_spacing(len: Length) -> Option<Measure> {
    match len.unit {
        CssUnit::Percent => Some(Measure::percent(len.value)),
        CssUnit::None if len.value == 0.0 => Some(Measure::percent(0.0)),
        _ => len.to_em().map(|em| Measure::percent(em * EM_TO_PERCENT)),
    }
}

/// Text indent uses the same factor as horizontal spacing.
pub fn text_indent(len: Length) -> Option<Measure> {
    horizontal_spacing(len)
}

/// Font size: `rem` for absolute and percent values, `em` kept for relative merging.
pub fn font_size(len: Length) -> Option<Measure> {
    match len.unit {
        CssUnit::Percent => Some(Measure::rem(compress_font_percent(len.value))),
        CssUnit::Em => Some(Measure::em(len.value)),
        CssUnit::Ex => Some(Measure::em(len.value * EX_TO_EM)),
        CssUnit::Rem => Some(Measure::rem(len.value)),
        CssUnit::None | CssUnit::Lh => None,
        _ => len.to_em().map(Measure::rem),
    }
}

/// Percent font sizes map linearly up to 100%, compressed above.
pub fn compress_font_percent(percent: f64) -> f64 {
    if percent <= 100.0 {
        percent / 100.0
    } else {
        1.0 + (percent - 100.0) / FONT_SIZE_COMPRESSION
    }
}

/// CSS font-size keywords.
pub fn font_size_keyword(keyword: &str) -> Option<Measure> {
    let rem = match keyword {
        "xx-small" => 0.6,
        "x-small" => 0.75,
        "small" => 0.89,
        "medium" => 1.0,
        "large" => 1.2,
        "x-large" => 1.5,
        "xx-large" => 2.0,
        "smaller" => return Some(Measure::em(FONT_SIZE_SMALLER)),
        "larger" => return Some(Measure::em(FONT_SIZE_LARGER)),
        _ => return None,
    };
    Some(Measure::rem(rem))
}

/// Line height in `lh` units, rounded to five decimals.
pub fn line_height(len: Length) -> Option<Measure> {
    let value = match len.unit {
        CssUnit::None | CssUnit::Lh => len.value,
        CssUnit::Percent => len.value / 100.0,
        _ => len.to_em()? / LINE_HEIGHT_RATIO,
    };
    Some(Measure {
        value: round_decimals(value, LINE_HEIGHT_DECIMALS),
        unit: sym::UNIT_LH,
    })
}

/// Lengths without a dedicated rule (width, border width, letter spacing).
pub fn generic_length(len: Length) -> Option<Measure> {
    match len.unit {
        CssUnit::Percent => Some(Measure::percent(len.value)),
        CssUnit::Em | CssUnit::Rem => Some(Measure::em(len.value)),
        CssUnit::Ex => Some(Measure::em(len.value * EX_TO_EM)),
        CssUnit::Px => Some(Measure::new(len.value, sym::UNIT_PX)),
        CssUnit::Pt => Some(Measure::new(len.value, sym::UNIT_PT)),
        CssUnit::None if len.value == 0.0 => Some(Measure::em(0.0)),
        CssUnit::None | CssUnit::Lh => None,
        _ => len.to_em().map(Measure::em),
    }
}

/// Block image width as percent of the reference width, clamped to 0..=100.
pub fn image_width_percent(width_px: f64) -> f64 {
    round_decimals(
        (width_px * 100.0 / IMAGE_REFERENCE_WIDTH).clamp(0.0, 100.0),
        3,
    )
}

/// Pack an RGB color (alpha fully opaque) into the KFX integer form.
pub fn pack_color(r: u8, g: u8, b: u8) -> i64 {
    (0xFFi64 << 24) | (i64::from(r) << 16) | (i64::from(g) << 8) | i64::from(b)
}
