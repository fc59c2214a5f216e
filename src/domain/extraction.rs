//! SKU extraction from image filenames and storage paths
//!
//! Pure, deterministic heuristics: a filename (plus optional full path) is
//! turned into a ranked list of candidate SKU strings with a confidence score
//! and the strategy that produced each candidate. No I/O, no shared state —
//! everything the linking pipeline decides later is derived from this output.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Image file extensions recognized by the extractor and the storage scanner.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp", "svg"];

/// Which heuristic produced an extracted SKU candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkuSource {
    /// The cleaned filename is nothing but a valid-length digit run.
    ExactNumeric,
    /// Synthesized zero-padded / de-padded variant of an exact match.
    ZeroPadded,
    /// One token of a `12345.67890.11111` style multi-SKU filename.
    MultiSku,
    /// Digit run found by a contextual pattern (prefix token, anchored run).
    Contextual,
    /// Purely numeric path segment.
    PathBased,
    /// Last-resort digit run harvested from an otherwise unmatched name.
    Fallback,
}

impl SkuSource {
    /// Stable identifier used in persisted match metadata and strategy stats.
    pub fn as_str(&self) -> &'static str {
        match self {
            SkuSource::ExactNumeric => "exact_numeric",
            SkuSource::ZeroPadded => "zero_padded",
            SkuSource::MultiSku => "multi_sku",
            SkuSource::Contextual => "contextual",
            SkuSource::PathBased => "path_based",
            SkuSource::Fallback => "fallback",
        }
    }
}

/// A single SKU candidate extracted from a filename or path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedSku {
    pub sku: String,
    /// 0–100; strategies assign these on a fixed scale so candidates from
    /// different files are comparable.
    pub confidence: u8,
    pub source: SkuSource,
}

/// Tuning knobs for the extractor. Defaults mirror the catalog conventions:
/// numeric SKUs between 3 and 8 digits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorOptions {
    /// Minimum digits for a candidate to be considered a SKU at any stage.
    pub min_sku_length: usize,
    /// Maximum digits for a candidate to be considered a SKU at any stage.
    pub max_sku_length: usize,
    /// Candidates below this confidence are dropped in the final pass.
    pub min_confidence: u8,
    /// Synthesize 6/7/8-digit padded and de-padded variants of exact matches.
    pub enable_zero_padding: bool,
    /// Recognize `A.B.C` style filenames carrying several SKUs.
    pub enable_multi_sku: bool,
    /// Consider purely numeric path segments (folder names) as candidates.
    pub enable_path_extraction: bool,
}

impl Default for ExtractorOptions {
    fn default() -> Self {
        Self {
            min_sku_length: 3,
            max_sku_length: 8,
            min_confidence: 30,
            enable_zero_padding: true,
            enable_multi_sku: true,
            enable_path_extraction: true,
        }
    }
}

/// Filename → SKU candidate extractor with pre-compiled pattern tables.
///
/// Strategies are tried in order and short-circuit: each is attempted only if
/// every previous one produced nothing. The single exception is zero-padding
/// augmentation, which always runs on top of an exact numeric match.
pub struct SkuExtractor {
    options: ExtractorOptions,
    exact_numeric: Regex,
    multi_sku: Regex,
    digit_run: Regex,
    /// Ordered contextual patterns, most specific first, with the confidence
    /// each match is worth. All matches from all patterns are kept.
    contextual: Vec<(Regex, u8)>,
}

impl SkuExtractor {
    /// Build an extractor, compiling the pattern tables once.
    pub fn new(options: ExtractorOptions) -> Self {
        let exact_numeric = Regex::new(&format!(
            r"^\d{{{},{}}}$",
            options.min_sku_length, options.max_sku_length
        ))
        .expect("exact numeric pattern is valid for any length bounds");
        let multi_sku = Regex::new(r"^\d+(?:[._-]\d+)+$").expect("multi-sku pattern is valid");
        let digit_run = Regex::new(r"\d+").expect("digit run pattern is valid");

        // Contextual runs are bounded to 4-8 digits regardless of the general
        // length options; shorter runs are too noisy outside exact matches.
        let contextual = vec![
            (
                Regex::new(r"(?i)(?:sku|prod(?:uct)?|img|item)[\s_#-]*(\d{4,8})")
                    .expect("prefix token pattern is valid"),
                90,
            ),
            (
                Regex::new(r"^(\d{4,8})[\s._-]").expect("leading run pattern is valid"),
                88,
            ),
            (
                Regex::new(r"[\s._-](\d{4,8})$").expect("trailing run pattern is valid"),
                85,
            ),
        ];

        Self {
            options,
            exact_numeric,
            multi_sku,
            digit_run,
            contextual,
        }
    }

    /// Extract ranked SKU candidates from `filename`, optionally considering
    /// the surrounding `full_path`. Never fails: malformed or empty input
    /// yields an empty list.
    pub fn extract(&self, filename: &str, full_path: Option<&str>) -> Vec<ExtractedSku> {
        let filename = filename.trim();
        if filename.is_empty() {
            return Vec::new();
        }

        let clean_name = strip_image_extension(filename);
        if clean_name.is_empty() {
            return Vec::new();
        }

        let mut found: Vec<ExtractedSku> = Vec::new();

        // Strategy 1: the whole cleaned name is one valid digit run.
        if self.exact_numeric.is_match(&clean_name) {
            found.push(ExtractedSku {
                sku: clean_name.clone(),
                confidence: 100,
                source: SkuSource::ExactNumeric,
            });
            if self.options.enable_zero_padding {
                self.push_padding_variants(&clean_name, &mut found);
            }
        }

        // Strategy 2: several SKUs joined by '.', '-' or '_'.
        if found.is_empty() && self.options.enable_multi_sku && self.multi_sku.is_match(&clean_name)
        {
            let mut seen = HashSet::new();
            let mut position = 0u8;
            for token in clean_name.split(['.', '-', '_']) {
                if !self.is_valid_sku(token) || !seen.insert(token.to_string()) {
                    continue;
                }
                let confidence = 92u8.saturating_sub(3 * position).max(70);
                found.push(ExtractedSku {
                    sku: token.to_string(),
                    confidence,
                    source: SkuSource::MultiSku,
                });
                position += 1;
            }
        }

        // Strategy 3: contextual patterns; every distinct hit is kept.
        if found.is_empty() {
            for (pattern, confidence) in &self.contextual {
                for caps in pattern.captures_iter(&clean_name) {
                    let sku = &caps[1];
                    if self.is_valid_sku(sku) {
                        found.push(ExtractedSku {
                            sku: sku.to_string(),
                            confidence: *confidence,
                            source: SkuSource::Contextual,
                        });
                    }
                }
            }
            // Any maximal 4-8 digit run is implicitly bounded by non-digits;
            // these rank below the anchored patterns above.
            for run in self.digit_run.find_iter(&clean_name) {
                let sku = run.as_str();
                if (4..=8).contains(&sku.len()) && self.is_valid_sku(sku) {
                    found.push(ExtractedSku {
                        sku: sku.to_string(),
                        confidence: 78,
                        source: SkuSource::Contextual,
                    });
                }
            }
        }

        // Strategy 4: purely numeric folder names along the path.
        if found.is_empty() && self.options.enable_path_extraction {
            if let Some(path) = full_path {
                for segment in path.split('/') {
                    if segment != filename && self.is_valid_sku(segment) {
                        found.push(ExtractedSku {
                            sku: segment.to_string(),
                            confidence: 60,
                            source: SkuSource::PathBased,
                        });
                    }
                }
            }
        }

        // Strategy 5: harvest every valid digit run as a last resort.
        if found.is_empty() {
            let mut position = 0u8;
            for run in self.digit_run.find_iter(&clean_name) {
                let sku = run.as_str();
                if !self.is_valid_sku(sku) {
                    continue;
                }
                let confidence = 40u8.saturating_sub(5 * position).max(20);
                found.push(ExtractedSku {
                    sku: sku.to_string(),
                    confidence,
                    source: SkuSource::Fallback,
                });
                position += 1;
            }
        }

        self.finalize(found)
    }

    /// Synthesized variants for an exact numeric match: pad to 6/7/8 digits
    /// when shorter, and strip leading zeros when present. Catalogs are
    /// inconsistent about zero padding, so both directions are offered.
    fn push_padding_variants(&self, sku: &str, found: &mut Vec<ExtractedSku>) {
        for (width, confidence) in [(6usize, 94u8), (7, 92), (8, 90)] {
            if sku.len() < width
                && width >= self.options.min_sku_length
                && width <= self.options.max_sku_length
            {
                found.push(ExtractedSku {
                    sku: format!("{sku:0>width$}"),
                    confidence,
                    source: SkuSource::ZeroPadded,
                });
            }
        }

        let stripped = sku.trim_start_matches('0');
        if stripped != sku && self.is_valid_sku(stripped) {
            found.push(ExtractedSku {
                sku: stripped.to_string(),
                confidence: 93,
                source: SkuSource::ZeroPadded,
            });
        }
    }

    /// A candidate is a plausible SKU iff it is all digits within the
    /// configured length bounds. Enforced at every stage.
    fn is_valid_sku(&self, candidate: &str) -> bool {
        !candidate.is_empty()
            && candidate.len() >= self.options.min_sku_length
            && candidate.len() <= self.options.max_sku_length
            && candidate.bytes().all(|b| b.is_ascii_digit())
    }

    /// Dedupe by SKU value keeping the first (highest-ranked) occurrence,
    /// drop everything under the confidence floor, sort descending.
    fn finalize(&self, found: Vec<ExtractedSku>) -> Vec<ExtractedSku> {
        let mut seen = HashSet::new();
        let mut out: Vec<ExtractedSku> = found
            .into_iter()
            .filter(|c| seen.insert(c.sku.clone()))
            .filter(|c| c.confidence >= self.options.min_confidence)
            .collect();
        out.sort_by(|a, b| b.confidence.cmp(&a.confidence));
        out
    }
}

impl Default for SkuExtractor {
    fn default() -> Self {
        Self::new(ExtractorOptions::default())
    }
}

/// Strip a recognized image extension and any trailing dots from a filename.
/// `"445033.png"` → `"445033"`, `"445033."` → `"445033"`, names without an
/// image extension are returned unchanged.
pub fn strip_image_extension(filename: &str) -> String {
    let mut name = filename;
    if let Some(idx) = filename.rfind('.') {
        let ext = &filename[idx + 1..];
        if IMAGE_EXTENSIONS
            .iter()
            .any(|known| known.eq_ignore_ascii_case(ext))
        {
            name = &filename[..idx];
        }
    }
    name.trim_end_matches('.').to_string()
}

/// True when the filename carries a recognized image extension.
pub fn has_image_extension(filename: &str) -> bool {
    filename
        .rfind('.')
        .map(|idx| &filename[idx + 1..])
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
}
