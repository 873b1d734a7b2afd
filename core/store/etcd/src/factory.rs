//! Initialise etcd State Store.
use anyhow::Context as AnyContext;
use anyhow::Result;
use serde_json::Value as Json;

use authproxy_context::Context;
use authproxy_store::Store;
use authproxy_store::StoreFactory;
use authproxy_store::StoreFactoryArgs;

use crate::Conf;
use crate::ConfError;
use crate::EtcdStore;

/// Initialise etcd State Store.
pub struct EtcdFactory;

#[async_trait::async_trait]
impl StoreFactory for EtcdFactory {
    fn conf_check(&self, _: &Context, conf: &Json) -> Result<()> {
        let conf = serde_json::from_value::<Conf>(conf.clone()).context(ConfError)?;
        reqwest::Url::parse(&conf.address).context(ConfError)?;
        Ok(())
    }

    fn register_metrics(&self, registry: &prometheus::Registry) -> Result<()> {
        authproxy_store::telemetry::register_metrics(registry)
    }

    async fn store<'a>(&self, args: StoreFactoryArgs<'a>) -> Result<Store> {
        let conf: Conf = serde_json::from_value(args.conf.clone()).context(ConfError)?;
        slog::debug!(
            args.context.logger, "Initialising etcd state store";
            "address" => &conf.address,
        );
        let store = EtcdStore::new(&conf)?;
        Ok(Store::from(store))
    }
}
