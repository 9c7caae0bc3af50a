use serde::{Deserialize, Serialize};

use super::record::{CanonicalRecord, Violation};
use super::resolver::ColumnMapping;
use super::transform::{RawRow, RowTransformer};

/// What to do with a wide-format unit whose suffixed cells are all blank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EmptyUnitPolicy {
    #[default]
    Skip,
    Persist,
}

impl EmptyUnitPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Some(Self::Skip),
            "persist" => Some(Self::Persist),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Skip => "skip",
            Self::Persist => "persist",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    Narrow,
    Wide,
}

/// File-level format decision, made once from the header row.
#[derive(Debug, Clone)]
pub struct FormatDetection {
    pub format: SourceFormat,
    /// Suffix tokens found in at least one header, in configured order.
    pub suffixes: Vec<String>,
}

/// The outcome of transforming one (row, suffix) unit.
#[derive(Debug)]
pub struct Unit {
    pub suffix: Option<String>,
    pub result: Result<CanonicalRecord, Vec<Violation>>,
    pub dropped_grades: usize,
}

pub struct SubjectMultiplexer<'a> {
    tokens: &'a [String],
    policy: EmptyUnitPolicy,
}

impl<'a> SubjectMultiplexer<'a> {
    pub fn new(tokens: &'a [String], policy: EmptyUnitPolicy) -> Self {
        Self { tokens, policy }
    }

    pub fn detect(&self, headers: &[String]) -> FormatDetection {
        let lowered: Vec<String> = headers.iter().map(|h| h.to_lowercase()).collect();
        let suffixes: Vec<String> = self
            .tokens
            .iter()
            .filter(|tok| {
                let t = tok.to_lowercase();
                !t.is_empty() && lowered.iter().any(|h| h.contains(&t))
            })
            .cloned()
            .collect();
        let format = if suffixes.is_empty() {
            SourceFormat::Narrow
        } else {
            SourceFormat::Wide
        };
        FormatDetection { format, suffixes }
    }

    /// True when some header carrying `suffix` has a non-blank cell in this row.
    pub fn has_suffixed_content(row: &RawRow<'_>, suffix: &str) -> bool {
        let token = suffix.to_lowercase();
        row.headers().iter().enumerate().any(|(i, h)| {
            h.to_lowercase().contains(&token)
                && row.cell(i).map(|v| !v.trim().is_empty()).unwrap_or(false)
        })
    }

    /// Units for one row, plus how many wide units were skipped as empty.
    pub fn units(
        &self,
        detection: &FormatDetection,
        transformer: &RowTransformer<'_>,
        row: &RawRow<'_>,
        mapping: &ColumnMapping,
    ) -> (Vec<Unit>, usize) {
        if detection.format == SourceFormat::Narrow {
            let unit = Unit {
                suffix: None,
                result: transformer.transform(row, mapping, None),
                dropped_grades: transformer.dropped_grades(row, mapping, None),
            };
            return (vec![unit], 0);
        }

        let mut units = Vec::with_capacity(detection.suffixes.len());
        let mut skipped = 0usize;
        for sfx in &detection.suffixes {
            if self.policy == EmptyUnitPolicy::Skip && !Self::has_suffixed_content(row, sfx) {
                skipped += 1;
                continue;
            }
            units.push(Unit {
                suffix: Some(sfx.clone()),
                result: transformer.transform(row, mapping, Some(sfx)),
                dropped_grades: transformer.dropped_grades(row, mapping, Some(sfx)),
            });
        }
        (units, skipped)
    }
}
