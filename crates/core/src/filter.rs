use crate::error::IngestError;
use crate::models::{Element, ElementCategory};
use regex::Regex;

/// Drops page furniture: stray page numbers and known boilerplate lines.
#[derive(Debug, Clone)]
pub struct JunkFilter {
    boilerplate: Vec<String>,
    numeric_re: Regex,
}

impl JunkFilter {
    pub fn new(boilerplate: &[String]) -> Result<Self, IngestError> {
        Ok(Self {
            boilerplate: boilerplate.to_vec(),
            numeric_re: Regex::new(r"^[+-]?[0-9]+$")?,
        })
    }

    pub fn is_junk(&self, element: &Element) -> bool {
        let text = element.text.trim();

        if element.category == ElementCategory::UncategorizedText && self.numeric_re.is_match(text) {
            return true;
        }

        self.boilerplate.iter().any(|line| line == text)
    }

    pub fn retain(&self, elements: Vec<Element>) -> Vec<Element> {
        elements
            .into_iter()
            .filter(|element| !self.is_junk(element))
            .collect()
    }
}

pub fn is_junk_element(element: &Element, boilerplate: &[String]) -> Result<bool, IngestError> {
    Ok(JunkFilter::new(boilerplate)?.is_junk(element))
}

pub fn drop_junk(elements: Vec<Element>, boilerplate: &[String]) -> Result<Vec<Element>, IngestError> {
    Ok(JunkFilter::new(boilerplate)?.retain(elements))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkingOptions;

    fn element(category: ElementCategory, text: &str) -> Element {
        Element {
            element_id: text.to_string(),
            category,
            text: text.to_string(),
            page_number: Some(1),
            coordinates: None,
            text_as_html: None,
        }
    }

    #[test]
    fn boilerplate_lines_are_junk() -> Result<(), IngestError> {
        let options = ChunkingOptions::default();
        let footer = element(ElementCategory::Footer, "  System Reference Document 5.1 ");
        let notice = element(
            ElementCategory::NarrativeText,
            "Not for resale. Permission granted to print or photocopy this document for personal use only.",
        );

        assert!(is_junk_element(&footer, &options.boilerplate)?);
        assert!(is_junk_element(&notice, &options.boilerplate)?);
        Ok(())
    }

    #[test]
    fn numeric_text_is_junk_only_when_uncategorized() -> Result<(), IngestError> {
        let filter = JunkFilter::new(&ChunkingOptions::default().boilerplate)?;

        assert!(filter.is_junk(&element(ElementCategory::UncategorizedText, "42")));
        assert!(filter.is_junk(&element(ElementCategory::UncategorizedText, " -7 ")));
        assert!(!filter.is_junk(&element(ElementCategory::NarrativeText, "42")));
        assert!(!filter.is_junk(&element(ElementCategory::UncategorizedText, "4d6")));
        assert!(!filter.is_junk(&element(ElementCategory::UncategorizedText, "")));
        Ok(())
    }

    #[test]
    fn drop_junk_keeps_content() -> Result<(), IngestError> {
        let elements = vec![
            element(ElementCategory::Title, "Barbarian"),
            element(ElementCategory::UncategorizedText, "8"),
            element(ElementCategory::Footer, "System Reference Document 5.1"),
            element(ElementCategory::NarrativeText, "A fierce warrior."),
        ];

        let kept = drop_junk(elements, &ChunkingOptions::default().boilerplate)?;

        let texts: Vec<&str> = kept.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["Barbarian", "A fierce warrior."]);
        Ok(())
    }
}
