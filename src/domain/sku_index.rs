//! In-memory product SKU index and match resolution
//!
//! Built once per linking run from the full product catalog, then queried for
//! every extracted SKU candidate. Three lookup maps cover the ways catalogs
//! and filenames disagree about the same SKU: verbatim, leading zeros
//! stripped, and zero-padded to the common 6/7/8 digit widths.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

use super::product::Product;

/// How an extracted SKU resolved against the catalog. Order is the
/// resolution priority and drives the confidence discount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    /// Candidate equals a catalog SKU verbatim (or case-folded).
    Exact,
    /// Candidate and catalog SKU agree after stripping leading zeros.
    Normalized,
    /// Candidate equals a catalog SKU zero-padded to 6, 7 or 8 digits.
    Padded,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Exact => "exact",
            MatchType::Normalized => "normalized",
            MatchType::Padded => "padded",
        }
    }

    /// Discount applied to the extractor's confidence for this match type.
    pub fn confidence_factor(&self) -> f64 {
        match self {
            MatchType::Exact => 1.0,
            MatchType::Normalized => 0.95,
            MatchType::Padded => 0.90,
        }
    }
}

/// A successful resolution of one extracted SKU against the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkuMatch {
    pub product_id: i64,
    /// The index key that produced the hit, for match metadata.
    pub matched_key: String,
    pub match_type: MatchType,
}

/// Two different products claimed the same index key. The first writer keeps
/// the key; the loser is recorded here and surfaced as a session warning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexCollision {
    pub key: String,
    pub kind: MatchType,
    pub kept_product_id: i64,
    pub rejected_product_id: i64,
}

/// Product catalog indexed by SKU in exact, normalized and padded forms.
#[derive(Debug, Default)]
pub struct ProductSkuIndex {
    exact: HashMap<String, i64>,
    normalized: HashMap<String, i64>,
    padded: HashMap<String, i64>,
    indexed_products: usize,
    collisions: Vec<IndexCollision>,
}

impl ProductSkuIndex {
    /// Build the index in a single pass over the catalog. Inactive products
    /// and products with an empty SKU are skipped.
    pub fn build(products: &[Product]) -> Self {
        let mut index = Self::default();

        for product in products {
            let sku = product.sku.trim();
            if !product.is_active || sku.is_empty() {
                continue;
            }
            index.indexed_products += 1;

            index.insert(MatchType::Exact, sku.to_string(), product.id);
            let lower = sku.to_lowercase();
            if lower != sku {
                index.insert(MatchType::Exact, lower.clone(), product.id);
            }

            let stripped = lower.trim_start_matches('0');
            if !stripped.is_empty() {
                index.insert(MatchType::Normalized, stripped.to_string(), product.id);
            }

            if sku.bytes().all(|b| b.is_ascii_digit()) {
                for width in [6usize, 7, 8] {
                    if sku.len() < width {
                        index.insert(MatchType::Padded, format!("{sku:0>width$}"), product.id);
                    }
                }
            }
        }

        debug!(
            products = index.indexed_products,
            exact = index.exact.len(),
            normalized = index.normalized.len(),
            padded = index.padded.len(),
            collisions = index.collisions.len(),
            "product SKU index built"
        );
        index
    }

    fn insert(&mut self, kind: MatchType, key: String, product_id: i64) {
        let map = match kind {
            MatchType::Exact => &mut self.exact,
            MatchType::Normalized => &mut self.normalized,
            MatchType::Padded => &mut self.padded,
        };
        match map.get(&key) {
            None => {
                map.insert(key, product_id);
            }
            Some(&kept) if kept != product_id => {
                warn!(
                    key = %key,
                    kind = kind.as_str(),
                    kept_product_id = kept,
                    rejected_product_id = product_id,
                    "SKU index collision, keeping first writer"
                );
                self.collisions.push(IndexCollision {
                    key,
                    kind,
                    kept_product_id: kept,
                    rejected_product_id: product_id,
                });
            }
            Some(_) => {}
        }
    }

    /// Resolve one extracted SKU against the catalog. Lookup priority is
    /// exact, then normalized, then padded; the first hit wins.
    pub fn find_match(&self, target: &str) -> Option<SkuMatch> {
        let target = target.trim();
        if target.is_empty() {
            return None;
        }

        if let Some(&id) = self.exact.get(target) {
            return Some(SkuMatch {
                product_id: id,
                matched_key: target.to_string(),
                match_type: MatchType::Exact,
            });
        }
        let lower = target.to_lowercase();
        if lower != target {
            if let Some(&id) = self.exact.get(&lower) {
                return Some(SkuMatch {
                    product_id: id,
                    matched_key: lower,
                    match_type: MatchType::Exact,
                });
            }
        }

        let stripped = lower.trim_start_matches('0');
        if !stripped.is_empty() {
            if let Some(&id) = self.normalized.get(stripped) {
                return Some(SkuMatch {
                    product_id: id,
                    matched_key: stripped.to_string(),
                    match_type: MatchType::Normalized,
                });
            }
        }

        if let Some(&id) = self.padded.get(target) {
            return Some(SkuMatch {
                product_id: id,
                matched_key: target.to_string(),
                match_type: MatchType::Padded,
            });
        }
        if target.bytes().all(|b| b.is_ascii_digit()) {
            for width in [6usize, 7, 8] {
                if target.len() < width {
                    let padded = format!("{target:0>width$}");
                    if let Some(&id) = self.padded.get(&padded) {
                        return Some(SkuMatch {
                            product_id: id,
                            matched_key: padded,
                            match_type: MatchType::Padded,
                        });
                    }
                }
            }
        }

        None
    }

    /// Number of products that contributed at least one key.
    pub fn len(&self) -> usize {
        self.indexed_products
    }

    pub fn is_empty(&self) -> bool {
        self.indexed_products == 0
    }

    /// Key collisions recorded during the build, in insertion order.
    pub fn collisions(&self) -> &[IndexCollision] {
        &self.collisions
    }
}

/// Final confidence for a resolved match: the extractor's confidence scaled
/// by the match-type discount, rounded and clamped to 0–100.
pub fn match_confidence(extracted: u8, match_type: MatchType) -> u8 {
    (f64::from(extracted) * match_type.confidence_factor())
        .round()
        .clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::product::Product;

    fn product(id: i64, sku: &str) -> Product {
        Product::new(id, sku)
    }

    fn index(skus: &[(i64, &str)]) -> ProductSkuIndex {
        let products: Vec<Product> = skus.iter().map(|(id, sku)| product(*id, sku)).collect();
        ProductSkuIndex::build(&products)
    }

    #[test]
    fn exact_match_wins_verbatim() {
        let idx = index(&[(1, "445033")]);
        let hit = idx.find_match("445033").unwrap();
        assert_eq!(hit.product_id, 1);
        assert_eq!(hit.match_type, MatchType::Exact);
    }

    #[test]
    fn exact_beats_padded_when_both_exist() {
        // "00123" is a real catalog SKU and also the 5->padded form of "123".
        let idx = index(&[(1, "00123"), (2, "123")]);
        let hit = idx.find_match("00123").unwrap();
        assert_eq!(hit.product_id, 1);
        assert_eq!(hit.match_type, MatchType::Exact);
        let hit = idx.find_match("123").unwrap();
        assert_eq!(hit.product_id, 2);
        assert_eq!(hit.match_type, MatchType::Exact);
    }

    #[test]
    fn normalized_bridges_leading_zero_disagreement() {
        let idx = index(&[(7, "0455470")]);
        let hit = idx.find_match("455470").unwrap();
        assert_eq!(hit.product_id, 7);
        assert_eq!(hit.match_type, MatchType::Normalized);
    }

    #[test]
    fn normalized_bridges_the_other_direction() {
        let idx = index(&[(7, "455470")]);
        let hit = idx.find_match("0455470").unwrap();
        assert_eq!(hit.product_id, 7);
        assert_eq!(hit.match_type, MatchType::Normalized);
    }

    #[test]
    fn padded_lookup_hits_catalog_padded_forms() {
        let idx = index(&[(3, "45033")]);
        let hit = idx.find_match("045033").unwrap();
        assert_eq!(hit.product_id, 3);
        // Normalized strips the candidate back to the catalog form first.
        assert_eq!(hit.match_type, MatchType::Normalized);
    }

    #[test]
    fn case_folded_exact_match() {
        let idx = index(&[(4, "AB123")]);
        let hit = idx.find_match("ab123").unwrap();
        assert_eq!(hit.product_id, 4);
        assert_eq!(hit.match_type, MatchType::Exact);
    }

    #[test]
    fn inactive_and_blank_skus_are_skipped() {
        let mut inactive = product(5, "999888");
        inactive.is_active = false;
        let blank = product(6, "   ");
        let idx = ProductSkuIndex::build(&[inactive, blank]);
        assert!(idx.is_empty());
        assert!(idx.find_match("999888").is_none());
    }

    #[test]
    fn collisions_keep_first_writer_and_are_recorded() {
        // Both products normalize to "123" and share every padded form.
        let idx = index(&[(1, "0123"), (2, "00123")]);
        let hit = idx.find_match("123").unwrap();
        assert_eq!(hit.product_id, 1);
        assert_eq!(hit.match_type, MatchType::Normalized);

        let collisions = idx.collisions();
        assert_eq!(collisions.len(), 4);
        assert!(collisions.iter().all(|c| c.kept_product_id == 1));
        assert!(collisions.iter().all(|c| c.rejected_product_id == 2));
        assert_eq!(collisions[0].kind, MatchType::Normalized);
        assert_eq!(
            collisions
                .iter()
                .filter(|c| c.kind == MatchType::Padded)
                .count(),
            3
        );
    }

    #[test]
    fn same_product_reclaiming_a_key_is_not_a_collision() {
        // Duplicate catalog rows for the same product are tolerated silently.
        let idx = index(&[(1, "123456"), (1, "123456")]);
        assert!(idx.collisions().is_empty());
        assert_eq!(idx.find_match("123456").unwrap().product_id, 1);
    }

    #[test]
    fn padded_match_covers_skus_normalization_cannot_reach() {
        // An all-zero SKU has no normalized form, so only the padded map
        // bridges width disagreements.
        let idx = index(&[(9, "000")]);
        let hit = idx.find_match("000000").unwrap();
        assert_eq!(hit.product_id, 9);
        assert_eq!(hit.match_type, MatchType::Padded);
        // Candidate-side padding covers the reverse direction.
        let hit = idx.find_match("0000").unwrap();
        assert_eq!(hit.match_type, MatchType::Padded);
        assert_eq!(hit.matched_key, "000000");
    }

    #[test]
    fn no_match_returns_none() {
        let idx = index(&[(1, "445033")]);
        assert!(idx.find_match("999999").is_none());
        assert!(idx.find_match("").is_none());
        assert!(idx.find_match("  ").is_none());
    }

    #[test]
    fn confidence_discounts_per_match_type() {
        assert_eq!(match_confidence(100, MatchType::Exact), 100);
        assert_eq!(match_confidence(100, MatchType::Normalized), 95);
        assert_eq!(match_confidence(100, MatchType::Padded), 90);
        assert_eq!(match_confidence(92, MatchType::Normalized), 87);
        assert_eq!(match_confidence(0, MatchType::Padded), 0);
    }
}
