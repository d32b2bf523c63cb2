//! In-process brand table.

use async_trait::async_trait;
use std::collections::HashMap;

use super::{no_data, Lookup, LookupError};

const BUILTIN: &[(&str, u16, &str)] = &[
    ("BMW", 1916, "Germany"),
    ("Mercedes-Benz", 1926, "Germany"),
    ("Volkswagen", 1937, "Germany"),
    ("Toyota", 1937, "Japan"),
    ("Honda", 1948, "Japan"),
    ("Ford", 1903, "United States"),
    ("Ferrari", 1939, "Italy"),
    ("Alfa Romeo", 1910, "Italy"),
    ("Volvo", 1927, "Sweden"),
    ("Skoda", 1895, "Czech Republic"),
];

/// Case-insensitive brand → description map.
#[derive(Debug, Clone, Default)]
pub struct BrandTable {
    entries: HashMap<String, String>,
}

impl BrandTable {
    /// Table seeded with a handful of well-known manufacturers.
    pub fn builtin() -> Self {
        Self::from_entries(BUILTIN.iter().map(|(brand, founded, country)| {
            (
                *brand,
                format!("CAR INFO: {brand} - Founded: {founded}, Country: {country}"),
            )
        }))
    }

    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(brand, text)| (brand.as_ref().to_lowercase(), text.into()))
                .collect(),
        }
    }

    pub fn get(&self, brand: &str) -> Option<&str> {
        self.entries.get(&brand.to_lowercase()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[async_trait]
impl Lookup for BrandTable {
    async fn resolve(&self, brand: &str) -> Result<String, LookupError> {
        Ok(self
            .get(brand)
            .map(str::to_owned)
            .unwrap_or_else(|| no_data(brand)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_builtin_bmw() {
        let table = BrandTable::builtin();
        assert_eq!(table.len(), BUILTIN.len());
        assert_eq!(
            table.resolve("BMW").await.unwrap(),
            "CAR INFO: BMW - Founded: 1916, Country: Germany"
        );
        assert_eq!(
            table.resolve("bmw").await.unwrap(),
            "CAR INFO: BMW - Founded: 1916, Country: Germany"
        );
    }

    #[tokio::test]
    async fn test_multi_word_brand() {
        let table = BrandTable::builtin();
        assert_eq!(
            table.resolve("alfa romeo").await.unwrap(),
            "CAR INFO: Alfa Romeo - Founded: 1910, Country: Italy"
        );
    }

    #[tokio::test]
    async fn test_unknown_brand() {
        let table = BrandTable::builtin();
        assert_eq!(
            table.resolve("Trabant").await.unwrap(),
            "ERROR NoCarDataFound for brand: Trabant"
        );
    }

    #[tokio::test]
    async fn test_custom_entries_replace_builtin() {
        let table = BrandTable::from_entries([("Lada", "CAR INFO: Lada")]);
        assert_eq!(table.len(), 1);
        assert_eq!(table.resolve("LADA").await.unwrap(), "CAR INFO: Lada");
        assert_eq!(
            table.resolve("BMW").await.unwrap(),
            "ERROR NoCarDataFound for brand: BMW"
        );
    }
}
