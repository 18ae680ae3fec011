use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// `RUST_LOG` wins; otherwise debug for the service itself and tower_http.
/// Output switches to JSON when `AMORA_ENV=production`.
pub fn init_tracing(service_name: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(service_name)));

    let is_production = std::env::var("AMORA_ENV")
        .map(|v| v == "production")
        .unwrap_or(false);

    if is_production {
        let json_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(json_layer)
            .init();
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_file(true)
            .with_line_number(true);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .init();
    }

    tracing::info!(service = service_name, production = is_production, "tracing initialized");
}

fn default_directives(service_name: &str) -> String {
    // crate targets use underscores
    let target = service_name.replace('-', "_");
    format!("info,{target}=debug,amora_shared=debug,tower_http=debug")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_use_crate_target_names() {
        assert_eq!(
            default_directives("amora-billing"),
            "info,amora_billing=debug,amora_shared=debug,tower_http=debug"
        );
    }
}
