use std::collections::HashMap;

use crate::config::Config;
use crate::error::ProvisionError;
use crate::models::{ConnectionDescriptor, Zone};

/// Maps each configured zone to the administrative descriptor of its
/// cluster. Immutable after construction.
#[derive(Debug, Clone)]
pub struct RegionRouter {
    order: Vec<Zone>,
    clusters: HashMap<Zone, ConnectionDescriptor>,
}

impl RegionRouter {
    pub fn new(config: &Config) -> Self {
        Self::from_descriptors(config.zones.iter().map(|z| {
            (
                z.zone.clone(),
                ConnectionDescriptor {
                    host: z.host.clone(),
                    port: z.port,
                    username: z.username.clone(),
                    password: z.password.clone(),
                    ssl_mode: z.ssl_mode,
                    maintenance_database: z.maintenance_database.clone(),
                    tenant_database: None,
                },
            )
        }))
    }

    /// Build from explicit descriptors. Any tenant override is dropped; the
    /// maintenance database is kept.
    pub fn from_descriptors(entries: impl IntoIterator<Item = (Zone, ConnectionDescriptor)>) -> Self {
        let mut order = Vec::new();
        let mut clusters = HashMap::new();
        for (zone, descriptor) in entries {
            if clusters.insert(zone.clone(), descriptor.administrative()).is_none() {
                order.push(zone);
            }
        }
        Self { order, clusters }
    }

    pub fn zones(&self) -> &[Zone] {
        &self.order
    }

    pub fn resolve(&self, zone: &Zone) -> Result<ConnectionDescriptor, ProvisionError> {
        self.clusters
            .get(zone)
            .cloned()
            .ok_or_else(|| ProvisionError::UnknownZone {
                zone: zone.to_string(),
            })
    }

    /// The administrative credentials of `zone`, targeting `database`.
    pub fn resolve_tenant(&self, zone: &Zone, database: &str) -> Result<ConnectionDescriptor, ProvisionError> {
        Ok(self.resolve(zone)?.with_database(database))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::ZoneConfig;
    use crate::error::ErrorKind;
    use crate::models::SslMode;

    fn config() -> Config {
        let zone = |name: &str, host: &str| ZoneConfig {
            zone: Zone::new(name),
            host: host.into(),
            port: 5432,
            username: "provisioner".into(),
            password: "pw".into(),
            ssl_mode: SslMode::Require,
            maintenance_database: "defaultdb".into(),
        };
        Config {
            zones: vec![zone("eu-west", "pg.eu.internal"), zone("us-east", "pg.us.internal")],
            connect_timeout: Duration::from_secs(1),
            statement_timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn test_resolve_known_zones() {
        let router = RegionRouter::new(&config());
        assert_eq!(router.zones(), [Zone::new("eu-west"), Zone::new("us-east")]);

        let admin = router.resolve(&Zone::new("us-east")).unwrap();
        assert_eq!(admin.host, "pg.us.internal");
        assert!(admin.is_administrative());
        assert_eq!(admin.database(), "defaultdb");

        let tenant = router.resolve_tenant(&Zone::new("us-east"), "db_123").unwrap();
        assert_eq!(tenant.host, "pg.us.internal");
        assert_eq!(tenant.database(), "db_123");
    }

    #[test]
    fn test_explicit_descriptors_keep_maintenance_database() {
        let tenant = ConnectionDescriptor {
            host: "pg.local".into(),
            port: 5432,
            username: "provisioner".into(),
            password: "pw".into(),
            ssl_mode: SslMode::Disable,
            maintenance_database: "postgres".into(),
            tenant_database: Some("db_1".into()),
        };
        let router = RegionRouter::from_descriptors([(Zone::new("local"), tenant)]);

        let admin = router.resolve(&Zone::new("local")).unwrap();
        assert!(admin.is_administrative());
        assert_eq!(admin.database(), "postgres");
    }

    #[test]
    fn test_unknown_zone_is_a_configuration_error() {
        let router = RegionRouter::new(&config());
        let err = router.resolve(&Zone::new("ap-south")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(
            router.resolve_tenant(&Zone::new("ap-south"), "db_1").unwrap_err(),
            err
        );
    }
}
