use migstep_common::{Error, Result};

const MAX_IDENTIFIER_LEN: usize = 128;

/// Validation for table and column names interpolated into SQL.
pub struct IdentifierValidator;

impl IdentifierValidator {
    /// Accept `[A-Za-z_][A-Za-z0-9_]*` up to 128 characters.
    pub fn validate(name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(Error::Validation("identifier cannot be empty".into()));
        }
        if name.len() > MAX_IDENTIFIER_LEN {
            return Err(Error::Validation(format!(
                "identifier too long ({} > {MAX_IDENTIFIER_LEN})",
                name.len()
            )));
        }

        let mut chars = name.chars();
        let starts_ok = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        if !starts_ok || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(Error::Validation(format!("invalid identifier: {name:?}")));
        }
        Ok(())
    }

    pub fn validate_all<'a>(names: impl IntoIterator<Item = &'a str>) -> Result<()> {
        names.into_iter().try_for_each(Self::validate)
    }
}
