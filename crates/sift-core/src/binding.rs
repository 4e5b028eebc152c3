use crate::error::AppError;
use crate::models::{NewPattern, Page};

/// Internal fields of target entities that extracted text must never
/// populate: identifiers, audit columns, and visibility flags.
pub const DENIED_ATTRIBUTES: &[&str] = &[
    "id",
    "pk",
    "uuid",
    "created_at",
    "created_by",
    "updated_at",
    "updated_by",
    "modified_at",
    "deleted_at",
    "is_active",
    "is_visible",
    "is_public",
    "is_deleted",
];

pub fn is_selectable(attribute: &str) -> bool {
    !DENIED_ATTRIBUTES
        .iter()
        .any(|denied| denied.eq_ignore_ascii_case(attribute.trim()))
}

/// The attributes of a target type that an operator may bind a rule to.
pub fn selectable_attributes<'a, I>(fields: I) -> Vec<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    fields.into_iter().filter(|f| is_selectable(f)).collect()
}

/// What a rule does with the text (or input field) it matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    /// Populate `mapped_attribute` of a `mapped_type` entity. `function` is an
    /// opaque transformation evaluated by the extractor.
    Mapped {
        mapped_type: String,
        mapped_attribute: String,
        function: Option<String>,
    },
    /// Type `value` into the matched input (login pages).
    Input { value: String },
}

impl Binding {
    pub fn mapped(mapped_type: impl Into<String>, mapped_attribute: impl Into<String>) -> Self {
        Binding::Mapped {
            mapped_type: mapped_type.into(),
            mapped_attribute: mapped_attribute.into(),
            function: None,
        }
    }

    pub fn input(value: impl Into<String>) -> Self {
        Binding::Input {
            value: value.into(),
        }
    }

    /// Attach a transformation expression. No effect on input bindings.
    pub fn with_function(self, expression: impl Into<String>) -> Self {
        match self {
            Binding::Mapped {
                mapped_type,
                mapped_attribute,
                ..
            } => Binding::Mapped {
                mapped_type,
                mapped_attribute,
                function: Some(expression.into()),
            },
            input => input,
        }
    }

    /// Check that this binding fits `page`: login pages take input values
    /// only, other pages take type/attribute mappings on selectable fields.
    pub fn validate_for(&self, page: &Page) -> Result<(), AppError> {
        match (self, page.is_login_page) {
            (Binding::Input { .. }, true) => Ok(()),
            (Binding::Input { .. }, false) => Err(AppError::Binding(format!(
                "page '{}' is not a login page; input values are not allowed",
                page.name
            ))),
            (Binding::Mapped { .. }, true) => Err(AppError::Binding(format!(
                "login page '{}' only accepts input values",
                page.name
            ))),
            (
                Binding::Mapped {
                    mapped_type,
                    mapped_attribute,
                    ..
                },
                false,
            ) => {
                if mapped_type.trim().is_empty() || mapped_attribute.trim().is_empty() {
                    return Err(AppError::Binding(
                        "mapped type and attribute must both be set".into(),
                    ));
                }
                if !is_selectable(mapped_attribute) {
                    return Err(AppError::Binding(format!(
                        "attribute '{mapped_attribute}' is internal and cannot be mapped"
                    )));
                }
                Ok(())
            }
        }
    }

    pub fn apply(&self, rule: &mut NewPattern) {
        match self {
            Binding::Mapped {
                mapped_type,
                mapped_attribute,
                function,
            } => {
                rule.mapped_type = Some(mapped_type.clone());
                rule.mapped_attribute = Some(mapped_attribute.clone());
                rule.mapped_attribute_function = function.clone();
                rule.input_value = None;
            }
            Binding::Input { value } => {
                rule.input_value = Some(value.clone());
                rule.mapped_type = None;
                rule.mapped_attribute = None;
                rule.mapped_attribute_function = None;
            }
        }
    }
}
