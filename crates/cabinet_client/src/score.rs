use serde_json::Value;
use shared::protocol::RawSearchResult;

/// Which response field a score was read from. Declaration order is the
/// lookup precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreSource {
    RelevanceScore,
    Score,
    Confidence,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelevanceScore {
    raw: f64,
    source: ScoreSource,
}

impl RelevanceScore {
    /// Picks the first present, numeric field. A present zero is a real score;
    /// only absent, null or non-numeric fields fall through.
    pub fn from_result(result: &RawSearchResult) -> Option<Self> {
        [
            (ScoreSource::RelevanceScore, result.relevance_score.as_ref()),
            (ScoreSource::Score, result.score.as_ref()),
            (ScoreSource::Confidence, result.confidence.as_ref()),
        ]
        .into_iter()
        .find_map(|(source, value)| {
            value
                .and_then(numeric)
                .map(|raw| Self { raw, source })
        })
    }

    pub fn raw(&self) -> f64 {
        self.raw
    }

    pub fn source(&self) -> ScoreSource {
        self.source
    }

    /// Values up to 1 are fractions; anything above is already a percentage.
    pub fn as_percentage(&self) -> f64 {
        let percent = if self.raw <= 1.0 {
            self.raw * 100.0
        } else {
            self.raw
        };
        percent.clamp(0.0, 100.0)
    }
}

fn numeric(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    parsed.is_finite().then_some(parsed)
}
