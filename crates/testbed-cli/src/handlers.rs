//! Command handlers.

use crate::commands::UpArgs;
use console::style;
use std::sync::Arc;
use testbed_containers::TestcontainersRuntime;
use testbed_core::{EnvironmentConfig, EnvironmentVariables, ServiceSettings};
use testbed_env::{Environment, ServiceContext};
use testbed_services::{
    ClickHouse, Elasticsearch, EventStore, Maildev, Minio, Mongo, Postgres, RabbitMq, Redis,
    ServiceKind, ServiceStack,
};
use testbed_trace::TracingLogger;
use tracing::warn;

/// Parse `--services`; an empty list means every service.
pub fn selected_services(names: &[String]) -> testbed_core::Result<Vec<ServiceKind>> {
    if names.is_empty() {
        return Ok(ServiceKind::ALL.to_vec());
    }
    names.iter().map(|name| name.parse()).collect()
}

/// Provision the environment's resource in `kind` and describe how to
/// reach it.
async fn provision(kind: ServiceKind, ctx: &ServiceContext) -> testbed_core::Result<String> {
    let ctx = ctx.clone();
    Ok(match kind {
        ServiceKind::Postgres => Postgres::new(ctx).get().await?.url(),
        ServiceKind::Redis => Redis::new(ctx).get().await?.url(),
        ServiceKind::Minio => {
            let bucket = Minio::new(ctx).get().await?;
            format!("{} (bucket {})", bucket.endpoint_url(), bucket.bucket)
        }
        ServiceKind::Mongo => Mongo::new(ctx).get().await?.uri(),
        ServiceKind::Elasticsearch => {
            let indices = Elasticsearch::new(ctx).get().await?;
            format!("{} (indices {}-*)", indices.url(), indices.prefix)
        }
        ServiceKind::RabbitMq => RabbitMq::new(ctx).get().await?.amqp_url(),
        ServiceKind::EventStore => EventStore::new(ctx).get().await?.connection_string(),
        ServiceKind::Maildev => {
            let mailbox = Maildev::new(ctx).get().await?;
            format!("smtp://{} (web {})", mailbox.smtp.address(), mailbox.web_url())
        }
        ServiceKind::ClickHouse => {
            let db = ClickHouse::new(ctx).get().await?;
            format!("{} (database {})", db.url(), db.database)
        }
    })
}

/// Start an environment, print its endpoints and stop it on Ctrl+C.
pub async fn up(args: UpArgs) -> anyhow::Result<()> {
    let services = selected_services(&args.services)?;

    let mut config = EnvironmentConfig::new(args.internal_host).with_proxied(args.proxied);
    if let Some(id) = args.id {
        config = config.with_id(id);
    }
    if let Some(image) = args.proxy_image {
        config = config.with_proxy_image(image);
    }

    let env = Environment::builder(config)
        .runtime(Arc::new(TestcontainersRuntime::new()))
        .application(Arc::new(ServiceStack::new(services.iter().copied())))
        .logger(Arc::new(TracingLogger::new()))
        .variables(EnvironmentVariables::from_process())
        .build()?;

    println!(
        "{} Starting environment {}{}",
        style("▶").cyan(),
        style(env.id()).bold(),
        if env.is_proxied() {
            style(" (proxied)").dim().to_string()
        } else {
            String::new()
        }
    );

    if let Err(e) = env.start().await {
        println!("{} {}", style("✗").red(), e);
        if let Err(stop_error) = env.stop().await {
            warn!(error = %stop_error, "Failed to stop environment after start failure");
        }
        return Err(e.into());
    }

    if args.no_provision {
        for (key, value) in env.variables().iter() {
            println!("  {} = {}", key, value);
        }
    } else {
        let ctx = env.service_context()?;
        for kind in &services {
            match provision(*kind, &ctx).await {
                Ok(description) => {
                    println!("{} {:<14} {}", style("✓").green(), kind.name(), description)
                }
                Err(e) => println!("{} {:<14} {}", style("✗").red(), kind.name(), e),
            }
        }
    }

    if let Some(gateway) = env.gateway() {
        println!("  Proxy API: {}", gateway.control_url());
    }
    println!("{} Ready. Press Ctrl+C to stop.", style("i").blue());

    tokio::signal::ctrl_c().await?;

    println!("Stopping environment {}...", style(env.id()).bold());
    env.stop().await?;
    println!("{} Environment stopped", style("✓").green());
    Ok(())
}

/// List the service catalogue.
pub fn services() {
    for kind in ServiceKind::ALL {
        let ports: Vec<String> = kind
            .published_ports()
            .iter()
            .map(|p| p.container_port.to_string())
            .collect();
        println!(
            "  {:<14} {:<55} {}",
            style(kind.name()).bold(),
            kind.image(),
            style(ports.join(",")).dim()
        );
    }
}

/// Print resolved settings as YAML.
pub fn settings() -> anyhow::Result<()> {
    let settings = ServiceSettings::from_variables(&EnvironmentVariables::from_process())?;
    print!("{}", serde_yaml::to_string(&settings)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_selected_services() {
        assert_eq!(selected_services(&[]).unwrap().len(), 9);
        assert_eq!(
            selected_services(&["redis".into(), "ClickHouse".into()]).unwrap(),
            vec![ServiceKind::Redis, ServiceKind::ClickHouse]
        );
        assert!(selected_services(&["db2".into()]).is_err());
    }
}
