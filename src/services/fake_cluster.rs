//! In-memory stand-in for a PostgreSQL cluster. It understands the handful
//! of role/database DDL statements the provisioner issues, answers with the
//! same SQLSTATE codes a real cluster would, and lets tests inject failures.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::db::{SqlFailure, SqlRunner};
use crate::error::{
    SQLSTATE_DUPLICATE_DATABASE, SQLSTATE_DUPLICATE_OBJECT, SQLSTATE_INVALID_CATALOG_NAME,
    SQLSTATE_UNDEFINED_OBJECT,
};
use crate::models::{ConnectionDescriptor, SslMode};

const ADMIN: &str = "provisioner";
const MAINTENANCE_DB: &str = "postgres";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailMode {
    Connect,
    Statement,
}

#[derive(Debug, Default)]
struct State {
    roles: BTreeMap<String, Option<String>>,
    /// (role, member)
    memberships: BTreeSet<(String, String)>,
    /// database -> owner
    databases: BTreeMap<String, String>,
    /// database -> owner of its public schema
    schema_owners: BTreeMap<String, String>,
    failures: Vec<(String, FailMode)>,
    connection_attempts: usize,
    executed: Vec<String>,
}

pub struct FakeCluster {
    state: Mutex<State>,
}

impl FakeCluster {
    pub fn new() -> Self {
        let mut state = State::default();
        state.roles.insert(ADMIN.into(), None);
        state.databases.insert(MAINTENANCE_DB.into(), ADMIN.into());
        state.schema_owners.insert(MAINTENANCE_DB.into(), ADMIN.into());
        Self {
            state: Mutex::new(state),
        }
    }

    /// Administrative descriptor for this cluster.
    pub fn admin(&self) -> ConnectionDescriptor {
        ConnectionDescriptor {
            host: "fake.cluster".into(),
            port: 5432,
            username: ADMIN.into(),
            password: "admin-pw".into(),
            ssl_mode: SslMode::Disable,
            maintenance_database: MAINTENANCE_DB.into(),
            tenant_database: None,
        }
    }

    /// Any statement containing `needle` fails to connect.
    pub fn fail_connect_on(&self, needle: &str) {
        self.lock().failures.push((needle.into(), FailMode::Connect));
    }

    /// Any statement containing `needle` is rejected by the cluster.
    pub fn fail_statement_on(&self, needle: &str) {
        self.lock().failures.push((needle.into(), FailMode::Statement));
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    pub fn connection_attempts(&self) -> usize {
        self.lock().connection_attempts
    }

    /// Statements that reached the cluster over an open connection.
    pub fn executed(&self) -> Vec<String> {
        self.lock().executed.clone()
    }

    pub fn role_exists(&self, role: &str) -> bool {
        self.lock().roles.contains_key(role)
    }

    pub fn role_password(&self, role: &str) -> Option<String> {
        self.lock().roles.get(role).cloned().flatten()
    }

    pub fn role_count(&self) -> usize {
        self.lock().roles.len()
    }

    pub fn is_member(&self, role: &str, member: &str) -> bool {
        self.lock().memberships.contains(&(role.to_owned(), member.to_owned()))
    }

    pub fn database_exists(&self, database: &str) -> bool {
        self.lock().databases.contains_key(database)
    }

    pub fn database_owner(&self, database: &str) -> Option<String> {
        self.lock().databases.get(database).cloned()
    }

    pub fn schema_owner(&self, database: &str) -> Option<String> {
        self.lock().schema_owners.get(database).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }
}

#[async_trait]
impl SqlRunner for FakeCluster {
    async fn run(&self, target: &ConnectionDescriptor, sql: &str) -> Result<(), SqlFailure> {
        let mut state = self.lock();
        state.connection_attempts += 1;

        let injected = state
            .failures
            .iter()
            .find(|(needle, _)| sql.contains(needle.as_str()))
            .map(|(_, mode)| *mode);
        if injected == Some(FailMode::Connect) {
            return Err(SqlFailure::Connect("connection refused".into()));
        }

        let database = target.database().to_owned();
        if database.is_empty() {
            return Err(SqlFailure::Connect("no database named in connection".into()));
        }
        if !state.databases.contains_key(&database) {
            return Err(SqlFailure::Connect(format!("database \"{database}\" does not exist")));
        }

        state.executed.push(sql.to_owned());
        if injected == Some(FailMode::Statement) {
            return Err(rejected(Some("XX000"), "injected failure"));
        }
        state.apply(&database, sql)
    }
}

fn rejected(code: Option<&str>, message: impl Into<String>) -> SqlFailure {
    SqlFailure::Execute {
        code: code.map(str::to_owned),
        message: message.into(),
    }
}

/// Split into words, unquoting `"ident"` and `'literal'` tokens.
fn tokens(sql: &str) -> Vec<String> {
    sql.split_whitespace()
        .map(|word| {
            let word = word.strip_prefix('E').filter(|w| w.starts_with('\'')).unwrap_or(word);
            if let Some(inner) = word.strip_prefix('"').and_then(|w| w.strip_suffix('"')) {
                inner.replace("\"\"", "\"")
            } else if let Some(inner) = word.strip_prefix('\'').and_then(|w| w.strip_suffix('\'')) {
                inner.replace("''", "'")
            } else {
                word.to_owned()
            }
        })
        .collect()
}

impl State {
    fn require_role(&self, role: &str) -> Result<(), SqlFailure> {
        if role == "CURRENT_USER" || self.roles.contains_key(role) {
            Ok(())
        } else {
            Err(rejected(
                Some(SQLSTATE_UNDEFINED_OBJECT),
                format!("role \"{role}\" does not exist"),
            ))
        }
    }

    fn apply(&mut self, database: &str, sql: &str) -> Result<(), SqlFailure> {
        let tokens = tokens(sql);
        let words: Vec<&str> = tokens.iter().map(String::as_str).collect();
        let resolve = |name: &str| {
            if name == "CURRENT_USER" {
                ADMIN.to_owned()
            } else {
                name.to_owned()
            }
        };

        match words.as_slice() {
            ["CREATE", "ROLE", role, options @ ..] => {
                if self.roles.contains_key(*role) {
                    return Err(rejected(
                        Some(SQLSTATE_DUPLICATE_OBJECT),
                        format!("role \"{role}\" already exists"),
                    ));
                }
                let password = options
                    .iter()
                    .position(|w| *w == "PASSWORD")
                    .and_then(|i| options.get(i + 1))
                    .map(|p| p.to_string());
                self.roles.insert(role.to_string(), password);
                Ok(())
            }
            ["DROP", "ROLE", role] => {
                self.require_role(role)?;
                if self.databases.values().any(|owner| owner == role) {
                    return Err(rejected(
                        Some("2BP01"),
                        format!("role \"{role}\" cannot be dropped because some objects depend on it"),
                    ));
                }
                self.roles.remove(*role);
                self.memberships.retain(|(r, m)| r != role && m != role);
                Ok(())
            }
            ["GRANT", role, "TO", member] => {
                self.require_role(role)?;
                self.require_role(member)?;
                self.memberships.insert((role.to_string(), resolve(*member)));
                Ok(())
            }
            ["REVOKE", role, "FROM", member] => {
                self.require_role(role)?;
                self.require_role(member)?;
                self.memberships.remove(&(role.to_string(), resolve(*member)));
                Ok(())
            }
            ["CREATE", "DATABASE", name, "OWNER", owner] => {
                if self.databases.contains_key(*name) {
                    return Err(rejected(
                        Some(SQLSTATE_DUPLICATE_DATABASE),
                        format!("database \"{name}\" already exists"),
                    ));
                }
                self.require_role(owner)?;
                let owner = resolve(*owner);
                if owner != ADMIN && !self.memberships.contains(&(owner.clone(), ADMIN.to_owned())) {
                    return Err(rejected(
                        Some("42501"),
                        format!("must be able to SET ROLE \"{owner}\""),
                    ));
                }
                self.databases.insert(name.to_string(), owner.clone());
                self.schema_owners.insert(name.to_string(), ADMIN.to_owned());
                Ok(())
            }
            ["DROP", "DATABASE", name] => {
                if self.databases.remove(*name).is_none() {
                    return Err(rejected(
                        Some(SQLSTATE_INVALID_CATALOG_NAME),
                        format!("database \"{name}\" does not exist"),
                    ));
                }
                self.schema_owners.remove(*name);
                Ok(())
            }
            ["ALTER", "SCHEMA", "public", "OWNER", "TO", role] => {
                self.require_role(role)?;
                self.schema_owners.insert(database.to_owned(), resolve(*role));
                Ok(())
            }
            _ => Err(rejected(Some("42601"), format!("syntax error in {sql:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_requires_an_existing_database() {
        let cluster = FakeCluster::new();
        let mut admin = cluster.admin();
        cluster.run(&admin, "CREATE ROLE \"tenant_1\"").await.unwrap();

        admin.maintenance_database = "provisioner".into();
        let err = cluster.run(&admin, "CREATE ROLE \"tenant_2\"").await.unwrap_err();
        assert!(matches!(err, SqlFailure::Connect(_)), "{err:?}");

        admin.maintenance_database = String::new();
        let err = cluster.run(&admin, "CREATE ROLE \"tenant_2\"").await.unwrap_err();
        assert!(matches!(err, SqlFailure::Connect(_)), "{err:?}");
        assert!(!cluster.role_exists("tenant_2"));
    }
}
