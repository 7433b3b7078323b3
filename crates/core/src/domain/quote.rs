use serde::{Deserialize, Serialize};

/// Row id assigned by the remote store, e.g. `recA1b2C3d4E5f6G7`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuoteId(pub String);

impl std::fmt::Display for QuoteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub id: QuoteId,
    pub text: String,
    /// Remote `Name` column. Read for logging only.
    pub name: Option<String>,
}

impl Quote {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self { id: QuoteId(id.into()), text: text.into(), name: None }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::{Quote, QuoteId};

    #[test]
    fn builder_keeps_name_optional() {
        let quote = Quote::new("rec1", "ship it");
        assert_eq!(quote.id, QuoteId("rec1".to_owned()));
        assert!(quote.name.is_none());

        let named = quote.with_name("Bill");
        assert_eq!(named.name.as_deref(), Some("Bill"));
        assert_eq!(named.text, "ship it");
    }

    #[test]
    fn quote_id_displays_raw_value() {
        assert_eq!(QuoteId("recXYZ".to_owned()).to_string(), "recXYZ");
    }
}
