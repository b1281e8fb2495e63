use tracing_subscriber::EnvFilter;

/// `RUST_LOG` wins; otherwise the service and the HTTP trace layer log at info.
pub fn init(service: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "info,{}=info,tower_http=info",
            service.replace('-', "_")
        ))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .init();
}
