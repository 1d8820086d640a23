use std::fmt;

/// Lowest quantized value.
pub const QUANT_MIN: u16 = 0;
/// Highest quantized value.
pub const QUANT_MAX: u16 = 1023;

/// Midpoint added after scaling, so a raw reading of zero lands at 511.
const QUANT_OFFSET: i64 = 511;
/// Raw units per quantization step.
const QUANT_DIVISOR: i64 = 6;

/// Maps a raw reading to `clamp(floor(raw / 6) + 511, 0, 1023)`.
///
/// Division floors toward negative infinity, so `-7` maps to `509`, not
/// `510`. The clamp makes the function total.
#[must_use]
pub fn quantize(raw: i64) -> u16 {
    let scaled = raw.div_euclid(QUANT_DIVISOR).saturating_add(QUANT_OFFSET);
    scaled.clamp(i64::from(QUANT_MIN), i64::from(QUANT_MAX)) as u16
}

/// One `(timestamp, raw value)` pair read from a raw line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorSample {
    pub timestamp: i64,
    pub raw: i64,
}

/// A quantized reading, the unit stored in the merged stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizedRecord {
    pub timestamp: i64,
    pub value: u16,
}

impl NormalizedRecord {
    #[must_use]
    pub fn from_sample(sample: SensorSample) -> Self {
        Self {
            timestamp: sample.timestamp,
            value: quantize(sample.raw),
        }
    }

    /// Serializes to the stored line form, newline included.
    #[must_use]
    pub fn to_line(&self) -> String {
        format!("{}\n", self)
    }

    /// Parses a stored line (`"<ts>,<value>"`, trailing newline optional).
    ///
    /// Values outside `[0, 1023]` are rejected.
    pub fn parse(line: &str) -> anyhow::Result<Self> {
        let (ts, value) = line
            .trim_end_matches(['\n', '\r'])
            .split_once(',')
            .ok_or_else(|| anyhow::anyhow!("record line has no comma: {:?}", line))?;
        let timestamp = ts
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("bad timestamp in {:?}: {}", line, e))?;
        let value: u16 = value
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("bad value in {:?}: {}", line, e))?;
        anyhow::ensure!(value <= QUANT_MAX, "value {} out of range in {:?}", value, line);
        Ok(Self { timestamp, value })
    }
}

impl fmt::Display for NormalizedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.timestamp, self.value)
    }
}

/// Parses the samples of one raw line.
///
/// Tokens are trimmed of surrounding whitespace (including the line
/// terminator). Parsing stops at the first pair where either token is empty
/// or not an `i64`; `"0"` is a valid reading.
#[must_use]
pub fn parse_line(line: &str) -> Vec<SensorSample> {
    let mut tokens = line.split(',').map(str::trim);
    let mut samples = Vec::new();

    while let (Some(ts), Some(raw)) = (tokens.next(), tokens.next()) {
        if ts.is_empty() || raw.is_empty() {
            break;
        }
        match (ts.parse::<i64>(), raw.parse::<i64>()) {
            (Ok(timestamp), Ok(raw)) => samples.push(SensorSample { timestamp, raw }),
            _ => break,
        }
    }

    samples
}
