//! Domain module - Core matching logic and entities
//!
//! Pure types and algorithms of the linking pipeline: SKU extraction, the
//! product SKU index, link/candidate records and the session state machine.
//! Nothing in here performs I/O.

pub mod extraction;
pub mod product;
pub mod repositories;
pub mod session;
pub mod sku_index;

// Re-export commonly used items
pub use extraction::{ExtractedSku, ExtractorOptions, SkuExtractor, SkuSource};
pub use product::{ImageCandidate, MatchMetadata, Product, ProductImage};
pub use session::{LinkingMode, LinkingPhase, LinkingSession, SessionStatus};
pub use sku_index::{IndexCollision, MatchType, ProductSkuIndex, SkuMatch, match_confidence};
