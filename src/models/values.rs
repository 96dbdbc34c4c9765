use std::collections::BTreeMap;
use std::fmt;

use crate::error::ProvisionError;

pub const ROLE: &str = "role";
pub const PASSWORD: &str = "password";
pub const DATABASE: &str = "database";

/// PostgreSQL truncates identifiers beyond NAMEDATALEN - 1 bytes.
pub const MAX_IDENTIFIER_LEN: usize = 63;
pub const MAX_PASSWORD_LEN: usize = 1024;

/// Databases every cluster ships with. Tenants never own or drop them.
pub const RESERVED_DATABASES: &[&str] = &["postgres", "template0", "template1"];

/// Role names PostgreSQL reserves or that a stock cluster relies on.
pub const RESERVED_ROLES: &[&str] = &["postgres", "public", "none"];

/// A value bound into a statement template.
#[derive(Clone, PartialEq, Eq)]
pub enum Value {
    /// Rendered through [`quote_ident`].
    Identifier(String),
    /// Rendered through [`quote_literal`]; never printed.
    Secret(String),
}

impl Value {
    pub fn render(&self) -> String {
        match self {
            Self::Identifier(name) => quote_ident(name),
            Self::Secret(text) => quote_literal(text),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identifier(name) => f.debug_tuple("Identifier").field(name).finish(),
            Self::Secret(_) => f.write_str("Secret(<redacted>)"),
        }
    }
}

/// Named parameters for one provisioning or teardown call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValueSet {
    values: BTreeMap<&'static str, Value>,
}

impl ValueSet {
    /// No values, for statements without placeholders (bootstrap).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Values for `CreateUserAndDB`. Every field is validated here, before
    /// any template sees it.
    pub fn for_tenant(role: &str, password: &str, database: &str) -> Result<Self, ProvisionError> {
        validate_role(role)?;
        validate_password(password)?;
        validate_database(database)?;

        let mut values = BTreeMap::new();
        values.insert(ROLE, Value::Identifier(role.to_owned()));
        values.insert(PASSWORD, Value::Secret(password.to_owned()));
        values.insert(DATABASE, Value::Identifier(database.to_owned()));
        Ok(Self { values })
    }

    /// Values for `DropUserAndDB`; teardown never needs the password.
    pub fn for_teardown(role: &str, database: &str) -> Result<Self, ProvisionError> {
        validate_role(role)?;
        validate_database(database)?;

        let mut values = BTreeMap::new();
        values.insert(ROLE, Value::Identifier(role.to_owned()));
        values.insert(DATABASE, Value::Identifier(database.to_owned()));
        Ok(Self { values })
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn identifier(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(Value::Identifier(ident)) => Some(ident),
            _ => None,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }
}

/// Identifiers are interpolated into DDL text, so their shape is restricted
/// to ASCII letters, digits, `_` and `-`, starting with a letter or `_`.
/// The `pg_` prefix is reserved by PostgreSQL for system roles.
pub fn validate_identifier(field: &'static str, value: &str) -> Result<(), ProvisionError> {
    if value.is_empty() {
        return Err(ProvisionError::validation(field, "must not be empty"));
    }
    if value.len() > MAX_IDENTIFIER_LEN {
        return Err(ProvisionError::validation(
            field,
            format!("longer than {MAX_IDENTIFIER_LEN} bytes"),
        ));
    }
    if let Some(bad) = value
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
    {
        return Err(ProvisionError::validation(
            field,
            format!("contains forbidden character {bad:?}"),
        ));
    }
    if value.starts_with(|c: char| c.is_ascii_digit() || c == '-') {
        return Err(ProvisionError::validation(field, "must start with a letter or '_'"));
    }
    if value.to_ascii_lowercase().starts_with("pg_") {
        return Err(ProvisionError::validation(field, "the pg_ prefix is reserved"));
    }
    Ok(())
}

fn validate_role(role: &str) -> Result<(), ProvisionError> {
    validate_identifier(ROLE, role)?;
    reject_reserved(ROLE, role, RESERVED_ROLES)
}

fn validate_database(database: &str) -> Result<(), ProvisionError> {
    validate_identifier(DATABASE, database)?;
    reject_reserved(DATABASE, database, RESERVED_DATABASES)
}

fn reject_reserved(field: &'static str, value: &str, reserved: &[&str]) -> Result<(), ProvisionError> {
    if reserved.iter().any(|r| r.eq_ignore_ascii_case(value)) {
        return Err(ProvisionError::validation(field, format!("{value:?} is reserved")));
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), ProvisionError> {
    if password.is_empty() {
        return Err(ProvisionError::validation(PASSWORD, "must not be empty"));
    }
    if password.len() > MAX_PASSWORD_LEN {
        return Err(ProvisionError::validation(
            PASSWORD,
            format!("longer than {MAX_PASSWORD_LEN} bytes"),
        ));
    }
    if password.contains('\0') {
        return Err(ProvisionError::validation(PASSWORD, "contains a NUL byte"));
    }
    Ok(())
}

/// Quote an identifier the way PostgreSQL's `quote_ident` does, always
/// quoting so case is preserved.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote a string literal. Backslashes switch to the `E''` form so the
/// result is correct whatever `standard_conforming_strings` is set to.
pub fn quote_literal(text: &str) -> String {
    let escaped = text.replace('\'', "''");
    if escaped.contains('\\') {
        format!("E'{}'", escaped.replace('\\', "\\\\"))
    } else {
        format!("'{escaped}'")
    }
}
