//! Constraints and indexes that must exist before any write.

use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaKind {
    Unique,
    Index,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct SchemaItem {
    pub name: &'static str,
    pub kind: SchemaKind,
    pub label: &'static str,
    pub property: &'static str,
}

impl SchemaItem {
    const fn unique(name: &'static str, label: &'static str, property: &'static str) -> Self {
        Self {
            name,
            kind: SchemaKind::Unique,
            label,
            property,
        }
    }

    const fn index(name: &'static str, label: &'static str, property: &'static str) -> Self {
        Self {
            name,
            kind: SchemaKind::Index,
            label,
            property,
        }
    }

    /// Cypher statement that declares this item. Re-running it is a no-op.
    pub fn cypher(&self) -> String {
        match self.kind {
            SchemaKind::Unique => format!(
                "CREATE CONSTRAINT {} IF NOT EXISTS FOR (n:{}) REQUIRE n.{} IS UNIQUE",
                self.name, self.label, self.property
            ),
            SchemaKind::Index => format!(
                "CREATE INDEX {} IF NOT EXISTS FOR (n:{}) ON (n.{})",
                self.name, self.label, self.property
            ),
        }
    }
}

pub const SCHEMA: &[SchemaItem] = &[
    SchemaItem::unique("company_ticker", "Company", "ticker"),
    SchemaItem::unique("document_id", "Document", "id"),
    SchemaItem::unique("transcript_id", "Transcript", "id"),
    SchemaItem::unique("price_point_id", "PricePoint", "id"),
    SchemaItem::unique("news_item_link", "NewsItem", "link"),
    SchemaItem::unique("text_chunk_id", "TextChunk", "chunk_id"),
    SchemaItem::unique("sector_name", "Sector", "name"),
    SchemaItem::unique("segment_id", "Segment", "id"),
    SchemaItem::unique("analysis_ticker", "Analysis", "ticker"),
    SchemaItem::unique("sentiment_ticker", "SentimentAnalysis", "ticker"),
    SchemaItem::index("company_sector", "Company", "sector"),
    SchemaItem::index("document_type", "Document", "type"),
    SchemaItem::index("news_item_date", "NewsItem", "date"),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_statement_is_idempotent() {
        for item in SCHEMA {
            assert!(item.cypher().contains("IF NOT EXISTS"), "{}", item.name);
        }
    }

    #[test]
    fn test_schema_names_are_unique() {
        let mut names: Vec<_> = SCHEMA.iter().map(|i| i.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), SCHEMA.len());
    }

    #[test]
    fn test_constraint_cypher() {
        let item = SchemaItem::unique("company_ticker", "Company", "ticker");
        assert_eq!(
            item.cypher(),
            "CREATE CONSTRAINT company_ticker IF NOT EXISTS FOR (n:Company) REQUIRE n.ticker IS UNIQUE"
        );
    }
}
