//! HTML field extraction
//!
//! Pulls the trimmed text content of configured CSS selectors out of a
//! fetched document. Only the first match of each selector is used.

use crate::config::FieldSelector;
use crate::ConfigError;
use scraper::{Html, Selector};
use std::collections::BTreeMap;

/// A field selector parsed once at startup
#[derive(Debug, Clone)]
pub struct CompiledField {
    pub name: String,
    pub selector: Selector,
    pub required: bool,
}

/// Text pulled out of one document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    /// The page title (from <title> tag)
    pub title: Option<String>,

    /// Field name to trimmed text, for every field that matched
    pub fields: BTreeMap<String, String>,

    /// Required fields with no match or only whitespace
    pub missing_required: Vec<String>,
}

impl Extraction {
    pub fn is_complete(&self) -> bool {
        self.missing_required.is_empty()
    }
}

/// Parses every configured selector
///
/// # Returns
///
/// * `Ok(Vec<CompiledField>)` - Selectors in configuration order
/// * `Err(ConfigError::Validation)` - A selector is not valid CSS
pub fn compile_fields(fields: &[FieldSelector]) -> Result<Vec<CompiledField>, ConfigError> {
    fields
        .iter()
        .map(|field| {
            let selector = Selector::parse(&field.selector).map_err(|e| {
                ConfigError::Validation(format!(
                    "Invalid selector for field '{}': {}",
                    field.name, e
                ))
            })?;
            Ok(CompiledField {
                name: field.name.clone(),
                selector,
                required: field.required,
            })
        })
        .collect()
}

/// Extracts the title and configured fields from an HTML document
///
/// # Example
///
/// ```
/// use sumi_sweep::config::FieldSelector;
/// use sumi_sweep::fetch::{compile_fields, extract};
///
/// let fields = compile_fields(&[FieldSelector {
///     name: "answer".to_string(),
///     selector: "p.answer".to_string(),
///     required: true,
/// }])
/// .unwrap();
///
/// let html = r#"<html><head><title>Q</title></head><body><p class="answer"> 42 </p></body></html>"#;
/// let extraction = extract(html, &fields);
/// assert_eq!(extraction.title.as_deref(), Some("Q"));
/// assert_eq!(extraction.fields["answer"], "42");
/// assert!(extraction.is_complete());
/// ```
pub fn extract(html: &str, fields: &[CompiledField]) -> Extraction {
    let document = Html::parse_document(html);
    let mut extraction = Extraction {
        title: extract_title(&document),
        ..Extraction::default()
    };

    for field in fields {
        match first_text(&document, &field.selector) {
            Some(text) => {
                extraction.fields.insert(field.name.clone(), text);
            }
            None if field.required => extraction.missing_required.push(field.name.clone()),
            None => {}
        }
    }

    extraction
}

fn extract_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;
    first_text(document, &title_selector)
}

fn first_text(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}
