pub mod executor;
pub mod metrics;
pub mod provisioning;
pub mod router;
pub mod saga;

#[cfg(test)]
pub(crate) mod fake_cluster;
