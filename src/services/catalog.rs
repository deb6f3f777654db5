use crate::config::CatalogConfig;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// One purchasable product variant
#[derive(Debug, Clone, PartialEq)]
pub struct ProductCatalogEntry {
    pub variant: String,
    pub turns_granted: i32,
    pub processor_variant_id: Option<String>,
    /// Keyed by upper-case currency code
    pub prices: HashMap<String, Decimal>,
}

impl ProductCatalogEntry {
    pub fn expected_amount(&self, currency: &str) -> Option<Decimal> {
        self.prices.get(&currency.to_uppercase()).copied()
    }
}

/// Read-mostly product configuration shared by the resolver and the verifier
#[derive(Debug, Clone, Default)]
pub struct ProductCatalog {
    entries: Vec<ProductCatalogEntry>,
}

impl ProductCatalog {
    pub fn new(config: &CatalogConfig) -> Self {
        Self::from_entries(
            config
                .products
                .iter()
                .map(|product| ProductCatalogEntry {
                    variant: product.variant.clone(),
                    turns_granted: product.turns_granted,
                    processor_variant_id: product.processor_variant_id.clone(),
                    prices: product
                        .prices
                        .iter()
                        .map(|(currency, amount)| (currency.to_uppercase(), *amount))
                        .collect(),
                })
                .collect(),
        )
    }

    pub fn from_entries(entries: Vec<ProductCatalogEntry>) -> Self {
        Self { entries }
    }

    /// Look up by our own variant code
    pub fn find(&self, variant: &str) -> Option<&ProductCatalogEntry> {
        self.entries.iter().find(|entry| entry.variant == variant)
    }

    /// Look up a variant as reported by the processor: its own id first, then our code
    pub fn find_for_processor(&self, variant_ref: &str) -> Option<&ProductCatalogEntry> {
        self.entries
            .iter()
            .find(|entry| entry.processor_variant_id.as_deref() == Some(variant_ref))
            .or_else(|| self.find(variant_ref))
    }
}
