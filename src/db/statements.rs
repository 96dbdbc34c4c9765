//! DDL text for tenant provisioning. Parsed once into a
//! [`TemplateRegistry`](crate::db::templates::TemplateRegistry).

/// One compensable provisioning step: `backward` undoes `forward`.
#[derive(Debug, Clone, Copy)]
pub struct ProvisionStep {
    pub name: &'static str,
    pub forward: &'static str,
    pub backward: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct StatementSet {
    pub steps: &'static [ProvisionStep],
    /// Run against the tenant database once every step succeeded.
    pub post_create: &'static [(&'static str, &'static str)],
    /// Baseline roles, run once per cluster and safe to repeat.
    pub bootstrap: &'static [(&'static str, &'static str)],
}

/// Names of the roles created by bootstrap.
pub const BASELINE_ROLES: [&str; 2] = ["tenant_readonly", "tenant_readwrite"];

pub const POSTGRES: StatementSet = StatementSet {
    steps: &[
        ProvisionStep {
            name: "create_role",
            forward: "CREATE ROLE {role} WITH LOGIN PASSWORD {password}",
            backward: "DROP ROLE {role}",
        },
        // Managed clusters do not hand out superuser; the admin must be a
        // member of the role before it may create a database owned by it.
        ProvisionStep {
            name: "grant_role_to_admin",
            forward: "GRANT {role} TO CURRENT_USER",
            backward: "REVOKE {role} FROM CURRENT_USER",
        },
        ProvisionStep {
            name: "create_database",
            forward: "CREATE DATABASE {database} OWNER {role}",
            backward: "DROP DATABASE {database}",
        },
    ],
    post_create: &[("transfer_schema_ownership", "ALTER SCHEMA public OWNER TO {role}")],
    bootstrap: &[
        ("create_readonly_role", "CREATE ROLE tenant_readonly NOLOGIN"),
        ("create_readwrite_role", "CREATE ROLE tenant_readwrite NOLOGIN"),
        ("grant_readonly_to_readwrite", "GRANT tenant_readonly TO tenant_readwrite"),
    ],
};
