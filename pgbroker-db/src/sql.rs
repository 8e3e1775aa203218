//! Statement text for the lifecycle sequences.
//!
//! Every builder takes validated identifier types, never `&str`, so a DDL
//! string cannot be assembled from an unchecked value.

use pgbroker_core::{Identifier, InstanceId, Password};

/// Object classes covered by default privileges on the tenant schema.
pub const DEFAULT_PRIVILEGE_OBJECTS: [&str; 3] = ["TABLES", "SEQUENCES", "FUNCTIONS"];

pub const METADATA_TABLE: &str = "service";

pub fn create_metadata_table() -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {METADATA_TABLE} (\
         serviceinstanceid varchar(200) not null default '', \
         servicedefinitionid varchar(200) not null default '', \
         planid varchar(200) not null default '', \
         organizationguid varchar(200) not null default '', \
         spaceguid varchar(200) not null default '', \
         creds varchar(32) not null default '')"
    )
}

pub const INSERT_INSTANCE: &str = "INSERT INTO service (serviceinstanceid, servicedefinitionid, \
     planid, organizationguid, spaceguid, creds) VALUES ($1, $2, $3, $4, $5, $6)";

pub const SELECT_INSTANCE: &str = "SELECT * FROM service WHERE serviceinstanceid = $1";

pub const SELECT_ALL_INSTANCES: &str = "SELECT * FROM service ORDER BY serviceinstanceid";

pub const DELETE_INSTANCE: &str = "DELETE FROM service WHERE serviceinstanceid = $1";

pub const SELECT_CURRENT_USER: &str = "SELECT current_user";

pub const SELECT_ROLE: &str = "SELECT rolname FROM pg_roles WHERE rolname = $1";

pub const TERMINATE_BACKENDS: &str = "SELECT pg_terminate_backend(pg_stat_activity.pid) \
     FROM pg_stat_activity WHERE pg_stat_activity.datname = $1 AND pid <> pg_backend_pid()";

pub fn create_database(db: &InstanceId) -> String {
    format!("CREATE DATABASE {} ENCODING 'UTF8'", db.quoted())
}

pub fn revoke_public(db: &InstanceId) -> String {
    format!("REVOKE ALL ON DATABASE {} FROM PUBLIC", db.quoted())
}

pub fn create_role(role: &impl Identifier) -> String {
    format!("CREATE ROLE {}", role.quoted())
}

/// `GRANT <role> TO <member>`: role membership.
pub fn grant_role(role: &impl Identifier, member: &impl Identifier) -> String {
    format!("GRANT {} TO {}", role.quoted(), member.quoted())
}

/// `REVOKE <role> FROM <member>`: withdraw role membership.
pub fn revoke_role(role: &impl Identifier, member: &impl Identifier) -> String {
    format!("REVOKE {} FROM {}", role.quoted(), member.quoted())
}

pub fn grant_all_on_database(db: &InstanceId, grantee: &impl Identifier) -> String {
    format!("GRANT ALL ON DATABASE {} TO {}", db.quoted(), grantee.quoted())
}

pub fn grant_all_tables(grantee: &impl Identifier) -> String {
    format!(
        "GRANT ALL PRIVILEGES ON ALL TABLES IN SCHEMA public TO {}",
        grantee.quoted()
    )
}

/// Default privileges for objects that `owner` creates later in `public`.
pub fn alter_default_privileges(
    owner: &impl Identifier,
    objects: &str,
    grantee: &impl Identifier,
) -> String {
    format!(
        "ALTER DEFAULT PRIVILEGES FOR ROLE {} IN SCHEMA public GRANT ALL ON {} TO {}",
        owner.quoted(),
        objects,
        grantee.quoted()
    )
}

pub fn alter_database_owner(db: &InstanceId, owner: &impl Identifier) -> String {
    format!("ALTER DATABASE {} OWNER TO {}", db.quoted(), owner.quoted())
}

pub fn set_login_password(role: &impl Identifier, password: &Password) -> String {
    format!(
        "ALTER ROLE {} LOGIN PASSWORD {}",
        role.quoted(),
        password.sql_literal()
    )
}

pub fn set_inherit(role: &impl Identifier) -> String {
    format!("ALTER ROLE {} INHERIT", role.quoted())
}

pub fn set_nologin(role: &impl Identifier) -> String {
    format!("ALTER USER {} NOLOGIN", role.quoted())
}

pub fn drop_database(db: &InstanceId) -> String {
    format!("DROP DATABASE IF EXISTS {}", db.quoted())
}

pub fn drop_role(role: &impl Identifier) -> String {
    format!("DROP ROLE IF EXISTS {}", role.quoted())
}
